//! Service settings, loaded from TOML or from a Home Assistant style
//! `options.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::plate_detection::cooldown::CooldownMode;
use crate::plate_detection::dispatch::ActionSettings;
use crate::plate_detection::engine::EngineSettings;
use crate::plate_detection::motion_gate::MotionSettings;
use crate::plate_detection::BoundingBox;

#[cfg(feature = "tesseract")]
use crate::plate_detection::dnn_ocr::TesseractSettings;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub motion: MotionSettings,
    pub recognition: RecognitionSettings,
    pub authorized_plates: Vec<String>,
    pub cooldown: CooldownSettings,
    pub timing: TimingSettings,
    pub action: ActionSettings,
    pub log_filter: Option<String>,
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Continuous stream through OpenCV: RTSP URL, video file or device index.
    #[default]
    Rtsp,
    /// One HTTP GET per frame.
    HttpSnapshot,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Full address. Takes precedence over the pieces below.
    pub url: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Rtsp,
            url: None,
            host: None,
            user: None,
            password: None,
            path: String::new(),
            timeout_secs: 5,
        }
    }
}

impl SourceSettings {
    /// The address handed to the frame source, empty when nothing is configured.
    pub fn address(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.trim().to_string();
        }
        let host = match self.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => host,
            _ => return String::new(),
        };
        let scheme = match self.kind {
            SourceKind::Rtsp => "rtsp",
            SourceKind::HttpSnapshot => "http",
        };
        // HTTP snapshots authenticate with a header instead.
        let userinfo = match (self.kind, self.user.as_deref(), self.password.as_deref()) {
            (SourceKind::Rtsp, Some(user), Some(password)) if !user.is_empty() => {
                format!("{user}:{password}@")
            }
            (SourceKind::Rtsp, Some(user), None) if !user.is_empty() => format!("{user}@"),
            _ => String::new(),
        };
        let path = self.path.trim_start_matches('/');
        format!("{scheme}://{userinfo}{host}/{path}")
    }

    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.user, &self.password) {
            (Some(user), password) if !user.is_empty() => {
                Some((user.clone(), password.clone().unwrap_or_default()))
            }
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSelection {
    /// Stop at the first candidate that triggers.
    #[default]
    FirstMatch,
    /// Evaluate every candidate of the frame, trigger the most similar.
    BestMatch,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub confidence_floor: f32,
    pub min_plate_length: usize,
    pub similarity_threshold: f32,
    pub keep_hyphens: bool,
    pub selection: CandidateSelection,
    /// Crop applied before OCR.
    pub region: Option<BoundingBox>,
    #[cfg(feature = "tesseract")]
    pub tesseract: TesseractSettings,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            confidence_floor: 0.4,
            min_plate_length: 4,
            similarity_threshold: 0.7,
            keep_hyphens: false,
            selection: CandidateSelection::FirstMatch,
            region: None,
            #[cfg(feature = "tesseract")]
            tesseract: TesseractSettings::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    pub seconds: u64,
    pub mode: CooldownMode,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            seconds: 15,
            mode: CooldownMode::Global,
        }
    }
}

impl CooldownSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub frame_interval_ms: u64,
    pub reconnect_delay_secs: u64,
    pub max_backoff_secs: u64,
    pub post_trigger_pause_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 200,
            reconnect_delay_secs: 5,
            max_backoff_secs: 60,
            post_trigger_pause_ms: 0,
        }
    }
}

impl TimingSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn post_trigger_pause(&self) -> Duration {
        Duration::from_millis(self.post_trigger_pause_ms)
    }
}

impl Settings {
    /// Loads and validates. `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Self::read(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses without validating.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_toml(&text)?,
        };
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        EngineSettings::from(self).validate()?;

        match &self.action {
            ActionSettings::Webhook { url, .. } if url.trim().is_empty() => {
                return Err(ConfigError::Missing("action.url"));
            }
            ActionSettings::Mqtt(mqtt) if mqtt.broker.trim().is_empty() => {
                return Err(ConfigError::Missing("action.broker"));
            }
            _ => {}
        }

        if self.authorized_plates.is_empty() {
            warn!("authorized_plates is empty, no plate can ever open the gate");
        }
        Ok(())
    }
}
