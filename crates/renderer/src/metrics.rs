use opentelemetry::{global, metrics::Counter};

#[derive(Clone)]
pub(crate) struct RenderMetrics {
    pub(crate) frames_painted: Counter<u64>,
    pub(crate) frames_dropped: Counter<u64>,
    pub(crate) decode_failures: Counter<u64>,
}

impl RenderMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("renderer");
        Self {
            frames_painted: meter
                .u64_counter("renderer_frames_painted_total")
                .with_description("Frames drawn to a tile surface")
                .build(),
            frames_dropped: meter
                .u64_counter("renderer_frames_dropped_total")
                .with_description("Frames skipped by load shedding, visibility or ordering")
                .build(),
            decode_failures: meter
                .u64_counter("renderer_decode_failures_total")
                .with_description("Frames whose image could not be decoded")
                .build(),
        }
    }
}
