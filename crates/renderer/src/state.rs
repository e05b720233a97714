#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileState {
    Idle,
    Connecting,
    Live,
    Error(String),
}

impl TileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::Idle => "idle",
            TileState::Connecting => "connecting",
            TileState::Live => "live",
            TileState::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    Mounted,
    /// Backend status message ("connected", ...).
    Status,
    Frame,
    /// Backend error message, or a frame message that only carries an error.
    BackendError(String),
    /// Transport error or abandoned reconnect reported by the pool.
    PoolError(String),
    Unmounted,
}

pub struct TileStateContext {
    current_state: TileState,
}

impl Default for TileStateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TileStateContext {
    pub fn new() -> Self {
        Self {
            current_state: TileState::Idle,
        }
    }

    /// Applies `event` and returns the new state if it changed.
    pub fn update(&mut self, event: TileEvent) -> Option<TileState> {
        let next = match (&self.current_state, event) {
            (_, TileEvent::Unmounted) => TileState::Idle,
            (TileState::Idle, TileEvent::Mounted) => TileState::Connecting,
            // Late callbacks after teardown never revive the tile.
            (TileState::Idle, _) => return None,

            (_, TileEvent::Mounted) => return None,
            (_, TileEvent::Frame) => TileState::Live,
            (_, TileEvent::BackendError(message) | TileEvent::PoolError(message)) => {
                TileState::Error(message)
            }
            (_, TileEvent::Status) => return None,
        };

        if next != self.current_state {
            self.current_state = next.clone();
            Some(next)
        } else {
            None
        }
    }

    pub fn current_state(&self) -> &TileState {
        &self.current_state
    }
}
