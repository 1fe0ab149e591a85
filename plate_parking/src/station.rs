//! One capture station: frame in, ledger transition out.

use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::sync::Arc;

use opencv::core::Vector;
use opencv::imgcodecs::imencode;
use opencv::prelude::Mat;
use parking_ledger::{LedgerError, ParkingLedger, ParkingStore, Transition};
use tracing::{debug, info, warn};

use crate::error::StationError;
use crate::metrics;
use crate::plate_detection::plate_locator::PlateLocator;
use crate::plate_detection::plate_ocr::OcrEngine;
use crate::plate_detection::preprocess::preprocess_frame;
use crate::plate_detection::text_extractor::TextExtractor;

/// Human check of the OCR reading before anything is committed.
pub trait PlateConfirmation {
    fn confirm(&mut self, plate: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> PlateConfirmation for F {
    fn confirm(&mut self, plate: &str) -> bool {
        self(plate)
    }
}

/// Unattended stations trust the OCR.
pub struct AutoConfirm;

impl PlateConfirmation for AutoConfirm {
    fn confirm(&mut self, _plate: &str) -> bool {
        true
    }
}

/// Asks the operator on a terminal. Only `y` (any case) confirms.
pub struct ConsoleConfirmation<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl ConsoleConfirmation<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn ask(&mut self, plate: &str) -> io::Result<bool> {
        writeln!(self.output, "Detected plate number: {}", plate)?;
        write!(self.output, "Is this plate number correct? (y/n): ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

impl<R: BufRead, W: Write> PlateConfirmation for ConsoleConfirmation<R, W> {
    fn confirm(&mut self, plate: &str) -> bool {
        self.ask(plate).unwrap_or_else(|e| {
            warn!("Could not read the operator answer: {}", e);
            false
        })
    }
}

pub struct ParkingStation<E: OcrEngine, C: PlateConfirmation, S: ParkingStore> {
    extractor: TextExtractor<E>,
    confirmation: C,
    ledger: Arc<ParkingLedger<S>>,
    snapshot_format: String,
}

impl<E: OcrEngine, C: PlateConfirmation, S: ParkingStore> ParkingStation<E, C, S> {
    pub fn new(engine: E, confirmation: C, ledger: Arc<ParkingLedger<S>>) -> Self {
        Self {
            extractor: TextExtractor::new(engine),
            confirmation,
            ledger,
            snapshot_format: ".jpg".to_string(),
        }
    }

    pub fn with_snapshot_format(mut self, extension: &str) -> Self {
        self.snapshot_format = extension.to_string();
        self
    }

    pub fn ledger(&self) -> &Arc<ParkingLedger<S>> {
        &self.ledger
    }

    pub fn extractor(&self) -> &TextExtractor<E> {
        &self.extractor
    }

    /// Preprocess, locate and read. No ledger access.
    pub fn read_plate(&mut self, frame: &Mat) -> Result<Option<String>, StationError> {
        let binary = preprocess_frame(frame)?;
        let locator = PlateLocator::new(&binary, frame)?;
        debug!("{} contours in frame", locator.contour_count());
        self.extractor.extract(locator.candidates())
    }

    /// Runs one full capture cycle on `frame`.
    ///
    /// Nothing changes in the ledger unless a plate was read and confirmed.
    pub fn process_frame(&mut self, frame: &Mat) -> Result<Transition, StationError> {
        metrics::FRAMES_PROCESSED.inc();

        let plate = match self.read_plate(frame)? {
            Some(plate) => plate,
            None => {
                metrics::NO_PLATE.inc();
                warn!("Plate number not detected. Please try again.");
                return Err(StationError::NoPlateDetected);
            }
        };
        if !self.confirmation.confirm(&plate) {
            metrics::NO_PLATE.inc();
            info!("Plate {} rejected by the operator. Please rescan.", plate);
            return Err(StationError::NoPlateDetected);
        }
        metrics::PLATES_RECOGNIZED.inc();

        let snapshot = self.encode_snapshot(frame)?;
        let transition = match self.ledger.reconcile(&plate, snapshot) {
            Ok(transition) => transition,
            Err(e @ LedgerError::NoSlotAvailable { .. }) => {
                metrics::ENTRIES_REFUSED.inc();
                warn!("No available slots for {}", plate);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        metrics::observe_transition(&transition);
        match self.ledger.occupied_count() {
            Ok(occupied) => metrics::OCCUPIED_SLOTS.set(occupied as i64),
            Err(e) => warn!("Could not refresh occupancy: {}", e),
        }
        Ok(transition)
    }

    fn encode_snapshot(&self, frame: &Mat) -> Result<Vec<u8>, StationError> {
        let mut buffer = Vector::<u8>::new();
        if !imencode(&self.snapshot_format, frame, &mut buffer, &Vector::new())? {
            return Err(StationError::InvalidImage(format!(
                "cannot encode snapshot as {}",
                self.snapshot_format
            )));
        }
        Ok(buffer.to_vec())
    }
}
