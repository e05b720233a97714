use opentelemetry::{global, metrics::Counter};

/// Pool counters. No-ops until a meter provider is installed.
#[derive(Clone)]
pub(crate) struct PoolMetrics {
    pub(crate) messages: Counter<u64>,
    pub(crate) decode_errors: Counter<u64>,
    pub(crate) callback_failures: Counter<u64>,
    pub(crate) reconnects: Counter<u64>,
    pub(crate) sends_refused: Counter<u64>,
}

impl PoolMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("pool");
        Self {
            messages: meter
                .u64_counter("pool_messages_total")
                .with_description("Messages decoded and broadcast to subscribers")
                .build(),
            decode_errors: meter
                .u64_counter("pool_decode_errors_total")
                .with_description("Messages dropped because they failed to decode")
                .build(),
            callback_failures: meter
                .u64_counter("pool_callback_failures_total")
                .with_description("Subscriber callbacks that returned an error or panicked")
                .build(),
            reconnects: meter
                .u64_counter("pool_reconnect_attempts_total")
                .with_description("Reconnect attempts scheduled after an unexpected close")
                .build(),
            sends_refused: meter
                .u64_counter("pool_sends_refused_total")
                .with_description("Outbound messages refused because the send queue was full")
                .build(),
        }
    }
}
