use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use super::Frame;
use crate::config::{SourceKind, SourceSettings};
use crate::error::{ConfigError, ConnectError, StreamError};
use crate::utils::{Clock, SystemClock};

/// Something frames can be pulled from. Dropping the stream closes it.
pub trait FrameSource {
    type Stream: FrameStream;

    fn open(&mut self, address: &str) -> Result<Self::Stream, ConnectError>;
}

pub trait FrameStream {
    fn read(&mut self) -> Result<Frame, StreamError>;
}

impl<S: FrameStream + ?Sized> FrameStream for Box<S> {
    fn read(&mut self) -> Result<Frame, StreamError> {
        (**self).read()
    }
}

/// Type-erased source so the binary can pick a backend at runtime.
pub struct DynFrameSource {
    inner: Box<dyn FnMut(&str) -> Result<Box<dyn FrameStream>, ConnectError>>,
}

impl DynFrameSource {
    pub fn new<S>(mut source: S) -> Self
    where
        S: FrameSource + 'static,
        S::Stream: 'static,
    {
        Self {
            inner: Box::new(move |address: &str| {
                source
                    .open(address)
                    .map(|stream| Box::new(stream) as Box<dyn FrameStream>)
            }),
        }
    }
}

impl FrameSource for DynFrameSource {
    type Stream = Box<dyn FrameStream>;

    fn open(&mut self, address: &str) -> Result<Self::Stream, ConnectError> {
        (self.inner)(address)
    }
}

/// Picks the backend for the configured source kind.
pub fn build_source(settings: &SourceSettings, clock: SystemClock) -> Result<DynFrameSource, ConfigError> {
    match settings.kind {
        SourceKind::HttpSnapshot => Ok(DynFrameSource::new(HttpSnapshotSource::new(
            settings.timeout(),
            settings.credentials(),
            clock,
        ))),
        #[cfg(feature = "opencv")]
        SourceKind::Rtsp => Ok(DynFrameSource::new(VideoCaptureSource::new(clock))),
        #[cfg(not(feature = "opencv"))]
        SourceKind::Rtsp => Err(ConfigError::Unsupported(
            "source.kind = \"rtsp\" needs the `opencv` feature".to_string(),
        )),
    }
}

/// Pulls one still image per read from a camera snapshot endpoint.
pub struct HttpSnapshotSource {
    timeout: Duration,
    credentials: Option<(String, String)>,
    clock: SystemClock,
}

impl HttpSnapshotSource {
    pub fn new(timeout: Duration, credentials: Option<(String, String)>, clock: SystemClock) -> Self {
        Self {
            timeout,
            credentials,
            clock,
        }
    }
}

impl FrameSource for HttpSnapshotSource {
    type Stream = HttpSnapshotStream;

    fn open(&mut self, address: &str) -> Result<Self::Stream, ConnectError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConnectError::new(address, e))?;
        let mut stream = HttpSnapshotStream {
            client,
            url: address.to_string(),
            credentials: self.credentials.clone(),
            clock: self.clock,
            pending: None,
        };
        // Probe once so an unreachable camera fails here and not mid-session.
        let frame = stream
            .fetch()
            .map_err(|e| ConnectError::new(address, e))?;
        stream.pending = Some(frame);
        Ok(stream)
    }
}

pub struct HttpSnapshotStream {
    client: Client,
    url: String,
    credentials: Option<(String, String)>,
    clock: SystemClock,
    pending: Option<Frame>,
}

impl HttpSnapshotStream {
    fn fetch(&self) -> Result<Frame, StreamError> {
        let mut request = self.client.get(&self.url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::Read(e.to_string()))?;
        let body = response
            .bytes()
            .map_err(|e| StreamError::Read(e.to_string()))?;
        let captured_at = self.clock.now();

        let image = image::load_from_memory(&body)
            .map_err(|e| StreamError::Decode(e.to_string()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        debug!(width, height, bytes = body.len(), "snapshot");
        Ok(Frame::new(width, height, 3, image.into_raw(), captured_at))
    }
}

impl FrameStream for HttpSnapshotStream {
    fn read(&mut self) -> Result<Frame, StreamError> {
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None => self.fetch(),
        }
    }
}

#[cfg(feature = "opencv")]
pub use self::capture::{VideoCaptureSource, VideoCaptureStream};

#[cfg(feature = "opencv")]
mod capture {
    use opencv::imgproc::cvt_color;
    use opencv::imgproc::COLOR_BGR2RGB;
    use opencv::prelude::Mat;
    use opencv::prelude::MatTraitConst;
    use opencv::prelude::MatTraitConstManual;
    use opencv::prelude::VideoCaptureTrait;
    use opencv::prelude::VideoCaptureTraitConst;
    use opencv::videoio::VideoCapture;
    use opencv::videoio::CAP_ANY;

    use super::{FrameSource, FrameStream};
    use crate::error::{ConnectError, StreamError};
    use crate::plate_detection::Frame;
    use crate::utils::{Clock, SystemClock};

    /// RTSP streams, video files and local devices through OpenCV.
    pub struct VideoCaptureSource {
        clock: SystemClock,
    }

    impl VideoCaptureSource {
        pub fn new(clock: SystemClock) -> Self {
            Self { clock }
        }
    }

    impl FrameSource for VideoCaptureSource {
        type Stream = VideoCaptureStream;

        fn open(&mut self, address: &str) -> Result<Self::Stream, ConnectError> {
            let capture = match address.parse::<i32>() {
                Ok(device) => VideoCapture::new(device, CAP_ANY),
                Err(_) => VideoCapture::from_file(address, CAP_ANY),
            }
            .map_err(|e| ConnectError::new(address, e))?;

            if !capture
                .is_opened()
                .map_err(|e| ConnectError::new(address, e))?
            {
                return Err(ConnectError::new(address, "capture did not open"));
            }

            Ok(VideoCaptureStream {
                capture,
                clock: self.clock,
            })
        }
    }

    pub struct VideoCaptureStream {
        capture: VideoCapture,
        clock: SystemClock,
    }

    impl FrameStream for VideoCaptureStream {
        fn read(&mut self) -> Result<Frame, StreamError> {
            let mut image = Mat::default();
            let grabbed = self
                .capture
                .read(&mut image)
                .map_err(|e| StreamError::Read(e.to_string()))?;
            if !grabbed || image.empty() {
                return Err(StreamError::EndOfStream);
            }
            let captured_at = self.clock.now();

            let mut rgb = Mat::default();
            cvt_color(&image, &mut rgb, COLOR_BGR2RGB, 0)
                .map_err(|e| StreamError::Decode(e.to_string()))?;
            let data = rgb
                .data_bytes()
                .map_err(|e| StreamError::Decode(e.to_string()))?
                .to_vec();

            Ok(Frame::new(
                rgb.cols() as u32,
                rgb.rows() as u32,
                rgb.channels() as u32,
                data,
                captured_at,
            ))
        }
    }

    impl Drop for VideoCaptureStream {
        fn drop(&mut self) {
            if let Err(e) = self.capture.release() {
                tracing::warn!(error = %e, "releasing capture failed");
            }
        }
    }
}
