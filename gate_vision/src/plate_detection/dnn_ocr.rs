use std::ffi::CString;

use leptess::tesseract::TessApi;
use serde::Deserialize;
use tracing::debug;

use super::{BoundingBox, Frame, PlateCandidate, PlateReader};
use crate::error::RecognitionError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TesseractSettings {
    pub data_path: Option<String>,
    pub language: String,
    pub whitelist: String,
    /// Tesseract page segmentation mode. 7 treats the image as one text line.
    pub page_seg_mode: u8,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
            whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-".to_string(),
            page_seg_mode: 11,
        }
    }
}

pub struct TesseractReader {
    ocr: TessApi,
}

impl TesseractReader {
    pub fn new(settings: &TesseractSettings) -> Result<Self, RecognitionError> {
        let mut api = TessApi::new(settings.data_path.as_deref(), &settings.language)
            .map_err(|e| RecognitionError::Backend(format!("tesseract init: {e:?}")))?;

        set_variable(&mut api, "tessedit_char_whitelist", &settings.whitelist)?;
        set_variable(
            &mut api,
            "tessedit_pageseg_mode",
            &settings.page_seg_mode.to_string(),
        )?;

        Ok(Self { ocr: api })
    }
}

fn set_variable(api: &mut TessApi, name: &str, value: &str) -> Result<(), RecognitionError> {
    let name_c = CString::new(name).map_err(|e| RecognitionError::Backend(e.to_string()))?;
    let value_c = CString::new(value).map_err(|e| RecognitionError::Backend(e.to_string()))?;
    api.raw
        .set_variable(&name_c, &value_c)
        .map_err(|e| RecognitionError::Backend(format!("tesseract {name}: {e:?}")))
}

impl PlateReader for TesseractReader {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<PlateCandidate>, RecognitionError> {
        let grey = frame
            .luma()
            .map_err(|e| RecognitionError::Malformed(e.to_string()))?;
        let (cols, rows) = grey.dimensions();

        self.ocr
            .raw
            .set_image(grey.as_raw(), cols as i32, rows as i32, 1, cols as i32)
            .map_err(|e| RecognitionError::Backend(format!("tesseract set_image: {e:?}")))?;
        let text = self
            .ocr
            .get_utf8_text()
            .map_err(|e| RecognitionError::Malformed(e.to_string()))?;
        let confidence = (self.ocr.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);

        debug!(text = %text.trim(), confidence, "ocr");
        let whole = BoundingBox::new(0, 0, frame.width, frame.height);
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| PlateCandidate::new(line, confidence, whole))
            .collect())
    }
}
