pub mod config;
pub mod error;
pub mod metrics;
pub mod plate_detection;
pub mod utils;

pub use config::Settings;
pub use error::{GateError, Result};
pub use plate_detection::engine::{EngineSettings, EngineState, FrameOutcome, RecognitionEngine};

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `filter`.
pub fn init_logging(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or("gate_vision=info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
