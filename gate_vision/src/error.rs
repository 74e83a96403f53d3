use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

/// Frame source could not be opened. Retried with back-off, never fatal.
#[derive(Debug, Error)]
#[error("cannot open frame source {address}: {reason}")]
pub struct ConnectError {
    pub address: String,
    pub reason: String,
}

impl ConnectError {
    pub fn new(address: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

/// A frame could not be read from an open source.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("end of stream")]
    EndOfStream,
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// OCR failed or returned data that cannot be used.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("ocr backend failed: {0}")]
    Backend(String),
    #[error("ocr returned malformed output: {0}")]
    Malformed(String),
}

/// The action transport failed. The trigger stays spent.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("mqtt client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("mqtt connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),
    #[error("cannot encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("setting `{name}` is out of range: {value}")]
    OutOfRange { name: &'static str, value: String },
    #[error("{0}")]
    Unsupported(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(name: &'static str, value: impl ToString) -> Self {
        ConfigError::OutOfRange {
            name,
            value: value.to_string(),
        }
    }
}

/// A frame that cannot be processed. Aborts the current iteration only.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unsupported channel count {0}")]
    Channels(u32),
    #[error("buffer holds {actual} bytes, {width}x{height}x{channels} needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u32,
        expected: usize,
        actual: usize,
    },
    #[error("region {x},{y} {width}x{height} lies outside the {frame_width}x{frame_height} frame")]
    Region {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
