use opencv::core::{Point, Rect, Size, Vector};
use opencv::imgproc::{
    approx_poly_dp, arc_length, bounding_rect, find_contours, resize, CHAIN_APPROX_SIMPLE,
    INTER_CUBIC, RETR_EXTERNAL,
};
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tracing::debug;

use super::PlateCandidate;
use crate::error::StationError;

const APPROX_EPSILON_RATIO: f64 = 0.02;
const ROI_SCALE: f64 = 2.0;

/// Outer contours of a binary frame, turned into plate candidates on demand.
///
/// Candidates come out in contour discovery order. Calling `candidates` again
/// starts over from the first contour.
pub struct PlateLocator<'a> {
    frame: &'a Mat,
    contours: Vector<Vector<Point>>,
}

impl<'a> PlateLocator<'a> {
    /// `binary` is the preprocessed frame, `frame` the color image it came from.
    pub fn new(binary: &Mat, frame: &'a Mat) -> Result<Self, StationError> {
        if binary.size()? != frame.size()? {
            return Err(StationError::InvalidImage(format!(
                "binary image is {:?} but frame is {:?}",
                binary.size()?,
                frame.size()?
            )));
        }

        let mut contours = Vector::<Vector<Point>>::new();
        find_contours(
            binary,
            &mut contours,
            RETR_EXTERNAL,
            CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;
        debug!("Found {} external contours", contours.len());

        Ok(Self { frame, contours })
    }

    pub fn contour_count(&self) -> usize {
        self.contours.len()
    }

    pub fn candidates(&self) -> Candidates<'_> {
        Candidates {
            locator: self,
            next: 0,
        }
    }

    /// Crop and upscale for contours that approximate to exactly four corners.
    fn candidate_at(&self, index: usize) -> Result<Option<PlateCandidate>, StationError> {
        let contour = self.contours.get(index)?;
        let perimeter = arc_length(&contour, true)?;

        let mut approx = Vector::<Point>::new();
        approx_poly_dp(&contour, &mut approx, APPROX_EPSILON_RATIO * perimeter, true)?;
        if approx.len() != 4 {
            return Ok(None);
        }

        let bbox = bounding_rect(&approx)?;
        crop_and_upscale(self.frame, bbox).map(Some)
    }
}

pub struct Candidates<'l> {
    locator: &'l PlateLocator<'l>,
    next: usize,
}

impl Iterator for Candidates<'_> {
    type Item = Result<PlateCandidate, StationError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.locator.contours.len() {
            let index = self.next;
            self.next += 1;
            match self.locator.candidate_at(index) {
                Ok(Some(candidate)) => return Some(Ok(candidate)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

fn crop_and_upscale(frame: &Mat, bbox: Rect) -> Result<PlateCandidate, StationError> {
    let x = bbox.x.max(0);
    let y = bbox.y.max(0);
    let bbox = Rect::new(
        x,
        y,
        (bbox.x + bbox.width).min(frame.cols()) - x,
        (bbox.y + bbox.height).min(frame.rows()) - y,
    );
    if bbox.width <= 0 || bbox.height <= 0 {
        return Err(StationError::InvalidImage(format!(
            "plate box {:?} is outside the frame",
            bbox
        )));
    }

    let cropped = frame.apply_1(bbox)?;
    let mut upscaled = Mat::default();
    resize(
        &cropped,
        &mut upscaled,
        Size::new(0, 0),
        ROI_SCALE,
        ROI_SCALE,
        INTER_CUBIC,
    )?;
    debug!(
        "Plate candidate at {:?} upscaled to {}x{}",
        bbox,
        upscaled.cols(),
        upscaled.rows()
    );

    Ok(PlateCandidate::new(bbox, upscaled))
}
