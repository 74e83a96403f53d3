use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("gate_vision".to_string()), None)
        .expect("valid registry prefix");
    pub static ref FRAMES_READ: IntCounter =
        register_counter("frames_read_total", "Frames read from the source");
    pub static ref FRAMES_ANALYZED: IntCounter =
        register_counter("frames_analyzed_total", "Frames that passed the motion gate");
    pub static ref MALFORMED_FRAMES: IntCounter =
        register_counter("malformed_frames_total", "Frames dropped as malformed");
    pub static ref OCR_FAILURES: IntCounter =
        register_counter("ocr_failures_total", "Failed OCR invocations");
    pub static ref PLATE_DECISIONS: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("plate_decisions_total", "Plate match decisions"),
            &["outcome"],
        )
        .expect("valid metric");
        REGISTRY
            .register(Box::new(counter.clone()))
            .expect("metric registered once");
        counter
    };
    pub static ref TRIGGERS: IntCounter =
        register_counter("triggers_total", "Access triggers dispatched");
    pub static ref SUPPRESSED: IntCounter =
        register_counter("suppressed_total", "Matches suppressed by cooldown");
    pub static ref DELIVERY_FAILURES: IntCounter =
        register_counter("delivery_failures_total", "Failed action deliveries");
    pub static ref RECONNECTS: IntCounter =
        register_counter("reconnects_total", "Source recoveries");
}

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
}

/// Text exposition of every metric.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "encoding metrics failed");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Writes the exposition atomically for a textfile collector.
pub fn write_textfile(path: &std::path::Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, render())?;
    std::fs::rename(tmp, path)
}
