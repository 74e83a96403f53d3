use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gate_vision::config::CandidateSelection;
use gate_vision::plate_detection::dnn_ocr::TesseractReader;
use gate_vision::plate_detection::matcher::{AuthorizationList, AuthorizationMatcher};
use gate_vision::plate_detection::normalizer::PlateNormalizer;
use gate_vision::plate_detection::{Frame, PlateReader};
use gate_vision::{init_logging, Settings};

/// Runs OCR and plate matching on still images and prints every decision.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Images to read.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::read(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(settings.log_filter.as_deref());

    let recognition = &settings.recognition;
    let normalizer = PlateNormalizer::new(recognition.keep_hyphens);
    let matcher = AuthorizationMatcher::new(
        AuthorizationList::new(settings.authorized_plates.iter().cloned(), &normalizer),
        recognition.min_plate_length,
        recognition.similarity_threshold,
    );
    let mut reader = TesseractReader::new(&recognition.tesseract).context("starting tesseract")?;

    for path in &args.images {
        let image = image::open(path)
            .with_context(|| format!("reading {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        let mut frame = Frame::new(width, height, 3, image.into_raw(), Duration::ZERO);
        if let Some(region) = &recognition.region {
            frame = frame.crop(region)?;
        }

        println!("{}", path.display());
        let candidates = match reader.recognize(&frame) {
            Ok(candidates) => candidates,
            Err(e) => {
                println!("  ocr failed: {e}");
                continue;
            }
        };
        if candidates.is_empty() {
            println!("  no text");
        }
        for candidate in candidates {
            let token = normalizer.normalize(&candidate.raw_text);
            let decision = match recognition.selection {
                CandidateSelection::FirstMatch => matcher.match_token(&token),
                CandidateSelection::BestMatch => matcher.best_match(&token),
            };
            let floor = if candidate.confidence < recognition.confidence_floor {
                " (below confidence floor)"
            } else {
                ""
            };
            println!(
                "  {:?} -> {} conf={:.2} similarity={:.2} {}{}",
                candidate.raw_text,
                token,
                candidate.confidence,
                decision.similarity,
                match &decision.authorized_plate {
                    Some(plate) => format!("AUTHORIZED as {plate}"),
                    None => "unknown".to_string(),
                },
                floor
            );
        }
    }
    Ok(())
}
