use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gate_vision::metrics;
use gate_vision::plate_detection::dispatch::build_dispatcher;
use gate_vision::plate_detection::dnn_ocr::TesseractReader;
use gate_vision::plate_detection::video_reader::build_source;
use gate_vision::utils::SystemClock;
use gate_vision::{init_logging, EngineSettings, RecognitionEngine, Settings};
use tracing::{error, info};

/// Watches a camera, reads plates and opens the gate for authorized ones.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Settings file (.toml, or .json for add-on options).
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::read(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(settings.log_filter.as_deref());
    if let Err(e) = settings.validate() {
        error!(error = %e, "invalid configuration");
        return Err(e).context("validating settings");
    }

    let clock = SystemClock::new();
    let source = build_source(&settings.source, clock).context("frame source")?;
    let reader =
        TesseractReader::new(&settings.recognition.tesseract).context("starting tesseract")?;
    let dispatcher = build_dispatcher(&settings.action).context("action dispatcher")?;

    let mut engine = RecognitionEngine::new(
        EngineSettings::from(&settings),
        source,
        reader,
        dispatcher,
        clock,
    )?;

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("installing signal handler")?;

    info!("gate vision online");
    engine.run(&shutdown_rx);

    if let Some(path) = &settings.metrics_textfile {
        if let Err(e) = metrics::write_textfile(path) {
            error!(error = %e, path = %path.display(), "writing metrics failed");
        }
    }
    info!("done");
    Ok(())
}
