pub mod frame_reader;
pub mod plate_locator;
pub mod plate_ocr;
pub mod preprocess;
pub mod text_extractor;

use opencv::core::Rect;
use opencv::prelude::Mat;

/// A quadrilateral region of the captured frame that may hold a plate.
#[derive(Clone)]
pub struct PlateCandidate {
    /// Bounding box in frame coordinates.
    pub bbox: Rect,
    /// Color crop of the frame, upscaled for recognition.
    pub roi: Mat,
}

impl PlateCandidate {
    pub fn new(bbox: Rect, roi: Mat) -> Self {
        Self { bbox, roi }
    }
}
