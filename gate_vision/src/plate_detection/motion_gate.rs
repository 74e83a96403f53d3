use std::time::Duration;

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use serde::Deserialize;

use super::Frame;
use crate::error::{ConfigError, FrameError};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// When false every frame goes to OCR.
    pub enabled: bool,
    pub working_width: u32,
    pub working_height: u32,
    pub blur_sigma: f32,
    /// Weight of the current frame in the running average.
    pub smoothing: f32,
    /// Per-pixel difference that counts as changed.
    pub pixel_threshold: u8,
    /// Changed pixels needed to run OCR.
    pub sensitivity: u32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            working_width: 320,
            working_height: 240,
            blur_sigma: 3.0,
            smoothing: 0.5,
            pixel_threshold: 25,
            sensitivity: 500,
        }
    }
}

impl MotionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(ConfigError::out_of_range("motion.smoothing", self.smoothing));
        }
        if self.working_width == 0 || self.working_height == 0 {
            return Err(ConfigError::out_of_range(
                "motion.working_width",
                format!("{}x{}", self.working_width, self.working_height),
            ));
        }
        // gaussian_blur_f32 asserts on this
        if !(self.blur_sigma > 0.0 && self.blur_sigma.is_finite()) {
            return Err(ConfigError::out_of_range("motion.blur_sigma", self.blur_sigma));
        }
        Ok(())
    }
}

/// Running average background at working resolution.
#[derive(Clone, Debug)]
pub struct MotionState {
    baseline: Vec<f32>,
    updated_at: Duration,
}

impl MotionState {
    pub fn updated_at(&self) -> Duration {
        self.updated_at
    }
}

/// Cheap pre-filter deciding whether a frame is worth OCR.
pub struct MotionGate {
    settings: MotionSettings,
    state: Option<MotionState>,
}

impl MotionGate {
    pub fn new(settings: MotionSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: None,
        })
    }

    pub fn state(&self) -> Option<&MotionState> {
        self.state.as_ref()
    }

    /// Drops the background model. The next frame becomes the new baseline.
    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn should_analyze(&mut self, frame: &Frame) -> Result<bool, FrameError> {
        if !self.settings.enabled {
            frame.validate()?;
            return Ok(true);
        }

        let current = self.prepare(frame)?;
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => {
                self.state = Some(MotionState {
                    baseline: current.pixels().map(|p| p.0[0] as f32).collect(),
                    updated_at: frame.captured_at,
                });
                return Ok(false);
            }
        };

        let alpha = self.settings.smoothing;
        let threshold = self.settings.pixel_threshold as f32;
        let mut changed = 0u32;
        for (avg, pixel) in state.baseline.iter_mut().zip(current.pixels()) {
            let value = pixel.0[0] as f32;
            *avg = alpha * value + (1.0 - alpha) * *avg;
            if (*avg - value).abs() > threshold {
                changed += 1;
            }
        }
        state.updated_at = frame.captured_at;

        tracing::trace!(changed, sensitivity = self.settings.sensitivity, "motion check");
        Ok(changed > self.settings.sensitivity)
    }

    fn prepare(&self, frame: &Frame) -> Result<GrayImage, FrameError> {
        let gray = frame.luma_scaled(self.settings.working_width, self.settings.working_height)?;
        Ok(gaussian_blur_f32(&gray, self.settings.blur_sigma))
    }
}
