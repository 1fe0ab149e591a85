use opencv::imgproc::{cvt_color, threshold, COLOR_BGR2GRAY, THRESH_BINARY, THRESH_OTSU};
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use tracing::{debug, info, warn};

use super::plate_ocr::OcrEngine;
use super::PlateCandidate;
use crate::error::StationError;

pub const PLATE_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Shorter readings are noise, not plates.
pub const MIN_PLATE_CHARS: usize = 5;

/// Keeps only `A-Z` and `0-9`.
pub fn normalize_plate_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// Reads candidates in order and stops at the first one that yields a
/// plausible plate. Later candidates are never looked at.
pub struct TextExtractor<E: OcrEngine> {
    engine: E,
}

impl<E: OcrEngine> TextExtractor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// `Ok(None)` when no candidate reads as a plate or the OCR engine fails.
    pub fn extract<I>(&mut self, candidates: I) -> Result<Option<String>, StationError>
    where
        I: IntoIterator<Item = Result<PlateCandidate, StationError>>,
    {
        for (index, candidate) in candidates.into_iter().enumerate() {
            let candidate = candidate?;
            let binary = binarize(&candidate.roi)?;

            let raw = match self.engine.recognize_text(&binary, PLATE_CHARSET, true) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("OCR failed on candidate {} at {:?}: {}", index, candidate.bbox, e);
                    return Ok(None);
                }
            };

            let plate = normalize_plate_text(&raw);
            debug!("OCR candidate {}: {:?} -> {:?}", index, raw.trim(), plate);
            if plate.len() >= MIN_PLATE_CHARS {
                info!("Detected plate number: {}", plate);
                return Ok(Some(plate));
            }
        }
        Ok(None)
    }
}

/// Grey plus Otsu global threshold.
fn binarize(roi: &Mat) -> Result<Mat, StationError> {
    let mut grey = Mat::default();
    let grey = if roi.channels() == 1 {
        roi
    } else {
        cvt_color(roi, &mut grey, COLOR_BGR2GRAY, 0)?;
        &grey
    };

    let mut binary = Mat::default();
    threshold(grey, &mut binary, 0.0, 255.0, THRESH_BINARY | THRESH_OTSU)?;
    Ok(binary)
}
