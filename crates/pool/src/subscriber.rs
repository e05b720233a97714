use crate::errors::PoolError;
use schema::ServerMessage;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Called for every decoded message. An `Err` is logged and does not affect
/// other subscribers.
pub type FrameCallback = Arc<dyn Fn(Arc<ServerMessage>) -> anyhow::Result<()> + Send + Sync>;

/// Called on transport errors and once when reconnection is abandoned.
pub type ErrorCallback = Arc<dyn Fn(&PoolError) + Send + Sync>;

/// Opaque subscriber identity, independent of the camera being watched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Advisory load-shedding hint. The pool delivers to every priority alike;
/// consumers decide what to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl TryFrom<&str> for Priority {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("{} is not a priority (high, normal, low)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub priority: Priority,
}

/// One live registration on an endpoint.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) id: SubscriberId,
    pub(crate) registration: u64,
    pub(crate) priority: Priority,
    pub(crate) on_frame: FrameCallback,
    pub(crate) on_error: ErrorCallback,
    /// Cleared on unsubscribe so snapshots taken before removal skip it.
    pub(crate) active: Arc<AtomicBool>,
}

impl Registration {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn info(&self) -> SubscriberInfo {
        SubscriberInfo {
            id: self.id.clone(),
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parses_case_insensitively() {
        assert_eq!(Priority::try_from("HIGH"), Ok(Priority::High));
        assert_eq!(Priority::try_from("low"), Ok(Priority::Low));
        assert!(Priority::try_from("urgent").is_err());
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_subscriber_id_conversions() {
        let a: SubscriberId = "tile-1".into();
        let b = SubscriberId::new(String::from("tile-1"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "tile-1");
    }
}
