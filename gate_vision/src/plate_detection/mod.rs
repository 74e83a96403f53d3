pub mod cooldown;
pub mod dispatch;
#[cfg(feature = "tesseract")]
pub mod dnn_ocr;
pub mod engine;
pub mod matcher;
pub mod motion_gate;
pub mod normalizer;
pub mod video_reader;

use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, RecognitionError};

/// A captured image. Grayscale (1 channel), RGB (3) or RGBA (4), rows packed.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<u8>,
    /// Clock reading at capture time.
    pub captured_at: Duration,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>, captured_at: Duration) -> Self {
        Self {
            width,
            height,
            channels,
            data,
            captured_at,
        }
    }

    /// A single-colour grayscale frame.
    pub fn filled(width: u32, height: u32, value: u8, captured_at: Duration) -> Self {
        Self::new(
            width,
            height,
            1,
            vec![value; pixel_count(width, height)],
            captured_at,
        )
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(FrameError::Channels(self.channels));
        }
        let expected = pixel_count(self.width, self.height) * self.channels as usize;
        if self.data.len() != expected {
            return Err(FrameError::BufferSize {
                width: self.width,
                height: self.height,
                channels: self.channels,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Downscaled grayscale copy at the given working resolution.
    pub fn luma_scaled(&self, width: u32, height: u32) -> Result<GrayImage, FrameError> {
        self.validate()?;
        let gray = match self.channels {
            1 => scaled_gray::<Luma<u8>>(self, width, height),
            3 => scaled_gray::<Rgb<u8>>(self, width, height),
            _ => scaled_gray::<Rgba<u8>>(self, width, height),
        };
        gray.ok_or(FrameError::Channels(self.channels))
    }

    /// Full resolution grayscale copy.
    pub fn luma(&self) -> Result<GrayImage, FrameError> {
        self.luma_scaled(self.width, self.height)
    }

    pub fn crop(&self, region: &BoundingBox) -> Result<Frame, FrameError> {
        self.validate()?;
        let fits = region.width > 0
            && region.height > 0
            && region.x.checked_add(region.width).is_some_and(|r| r <= self.width)
            && region.y.checked_add(region.height).is_some_and(|b| b <= self.height);
        if !fits {
            return Err(FrameError::Region {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                frame_width: self.width,
                frame_height: self.height,
            });
        }

        let stride = (self.width * self.channels) as usize;
        let row_len = (region.width * self.channels) as usize;
        let mut data = Vec::with_capacity(row_len * region.height as usize);
        for row in region.y..region.y + region.height {
            let start = row as usize * stride + (region.x * self.channels) as usize;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Ok(Frame::new(
            region.width,
            region.height,
            self.channels,
            data,
            self.captured_at,
        ))
    }
}

fn scaled_gray<P>(frame: &Frame, width: u32, height: u32) -> Option<GrayImage>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let view = ImageBuffer::<P, &[u8]>::from_raw(frame.width, frame.height, frame.data.as_slice())?;
    if width == frame.width && height == frame.height {
        return Some(imageops::grayscale(&view));
    }
    let small = imageops::resize(&view, width, height, FilterType::Nearest);
    Some(imageops::grayscale(&small))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One OCR reading, consumed once by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct PlateCandidate {
    pub raw_text: String,
    /// In [0, 1].
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl PlateCandidate {
    pub fn new(raw_text: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            raw_text: raw_text.into(),
            confidence,
            bounding_box,
        }
    }
}

/// Text recognition backend.
pub trait PlateReader {
    /// Candidates in the order the backend produced them.
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<PlateCandidate>, RecognitionError>;
}

impl<R: PlateReader + ?Sized> PlateReader for Box<R> {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<PlateCandidate>, RecognitionError> {
        (**self).recognize(frame)
    }
}

/// Handed to the dispatcher once per electable match.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TriggerEvent {
    /// The authorized entry as configured.
    pub plate: String,
    /// Normalized OCR token that matched it.
    pub token: String,
    #[serde(serialize_with = "serialize_secs")]
    pub timestamp: Duration,
    pub confidence: f32,
    pub similarity: f32,
}

/// Every plate decision, matched or not.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlateSighting {
    pub token: String,
    pub plate: Option<String>,
    pub authorized: bool,
    pub confidence: f32,
    #[serde(serialize_with = "serialize_secs")]
    pub timestamp: Duration,
}

/// `width * height` without the `u32` product wrapping.
fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, channels: u32) -> Frame {
        let data = (0..width * height * channels).map(|i| (i % 251) as u8).collect();
        Frame::new(width, height, channels, data, Duration::ZERO)
    }

    #[test]
    fn validate_rejects_bad_channels_and_sizes() {
        let mut frame = gradient(4, 4, 3);
        assert!(frame.validate().is_ok());

        frame.channels = 2;
        assert!(matches!(frame.validate(), Err(FrameError::Channels(2))));

        let mut short = gradient(4, 4, 3);
        short.data.pop();
        assert!(matches!(
            short.validate(),
            Err(FrameError::BufferSize { expected: 48, actual: 47, .. })
        ));
    }

    #[test]
    fn pixel_count_does_not_wrap_in_u32() {
        assert_eq!(pixel_count(65_536, 65_536) as u64, 1u64 << 32);
        assert_eq!(Frame::filled(3, 2, 7, Duration::ZERO).data, vec![7; 6]);
    }

    #[test]
    fn luma_scaled_has_working_size() {
        let frame = gradient(64, 48, 3);
        let gray = frame.luma_scaled(16, 12).unwrap();
        assert_eq!(gray.dimensions(), (16, 12));

        let rgba = gradient(10, 10, 4).luma().unwrap();
        assert_eq!(rgba.dimensions(), (10, 10));
    }

    #[test]
    fn crop_copies_rows() {
        let data = (0..16u8).collect();
        let frame = Frame::new(4, 4, 1, data, Duration::from_secs(3));
        let cropped = frame.crop(&BoundingBox::new(1, 2, 2, 2)).unwrap();
        assert_eq!(cropped.data, vec![9, 10, 13, 14]);
        assert_eq!(cropped.captured_at, Duration::from_secs(3));

        assert!(frame.crop(&BoundingBox::new(3, 0, 2, 1)).is_err());
        assert!(frame.crop(&BoundingBox::new(0, 0, 0, 1)).is_err());
    }
}
