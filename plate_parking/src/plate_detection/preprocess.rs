use opencv::core::{Point, Size, BORDER_CONSTANT, BORDER_DEFAULT, CV_8UC3};
use opencv::imgproc::{
    adaptive_threshold, cvt_color, gaussian_blur, get_structuring_element,
    morphology_default_border_value, morphology_ex, ADAPTIVE_THRESH_GAUSSIAN_C, COLOR_BGR2GRAY,
    MORPH_CLOSE, MORPH_RECT, THRESH_BINARY,
};
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::error::StationError;

const BLUR_KERNEL: i32 = 5;
const THRESHOLD_BLOCK_SIZE: i32 = 11;
const THRESHOLD_OFFSET: f64 = 2.0;
const CLOSE_KERNEL: i32 = 3;

/// Turns a BGR frame into a binary image of the same size where plate-like
/// shapes are solid blobs.
///
/// grayscale -> 5x5 gaussian blur -> gaussian adaptive threshold (block 11,
/// offset 2) -> 3x3 morphological close.
pub fn preprocess_frame(frame: &Mat) -> Result<Mat, StationError> {
    validate_frame(frame)?;

    let mut grey = Mat::default();
    cvt_color(frame, &mut grey, COLOR_BGR2GRAY, 0)?;

    let mut blurred = Mat::default();
    gaussian_blur(
        &grey,
        &mut blurred,
        Size::new(BLUR_KERNEL, BLUR_KERNEL),
        0.0,
        0.0,
        BORDER_DEFAULT,
    )?;

    let mut binary = Mat::default();
    adaptive_threshold(
        &blurred,
        &mut binary,
        255.0,
        ADAPTIVE_THRESH_GAUSSIAN_C,
        THRESH_BINARY,
        THRESHOLD_BLOCK_SIZE,
        THRESHOLD_OFFSET,
    )?;

    let kernel = get_structuring_element(
        MORPH_RECT,
        Size::new(CLOSE_KERNEL, CLOSE_KERNEL),
        Point::new(-1, -1),
    )?;
    let mut closed = Mat::default();
    morphology_ex(
        &binary,
        &mut closed,
        MORPH_CLOSE,
        &kernel,
        Point::new(-1, -1),
        1,
        BORDER_CONSTANT,
        morphology_default_border_value()?,
    )?;

    Ok(closed)
}

pub fn validate_frame(frame: &Mat) -> Result<(), StationError> {
    if frame.empty() {
        return Err(StationError::InvalidImage("empty frame".to_string()));
    }
    if frame.channels() != 3 {
        return Err(StationError::InvalidImage(format!(
            "expected a 3 channel BGR frame, got {} channels",
            frame.channels()
        )));
    }
    if frame.typ() != CV_8UC3 {
        return Err(StationError::InvalidImage(format!(
            "expected 8 bits per channel, got Mat type {}",
            frame.typ()
        )));
    }
    Ok(())
}
