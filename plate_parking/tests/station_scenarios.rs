use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use opencv::core::{Scalar, CV_8UC3};
use opencv::prelude::Mat;
use parking_ledger::{
    ChannelNotifier, FeeSchedule, LedgerError, ManualClock, MemoryStore, ParkingEventKind,
    ParkingLedger, SlotLayout, Transition,
};
use plate_parking::plate_detection::plate_ocr::{OcrEngine, TimeoutOcr};
use plate_parking::{AutoConfirm, OcrError, ParkingStation, StationError};

/// Answers OCR calls from a shared script, so several stations can read from
/// the same queue.
#[derive(Clone)]
struct ScriptedOcr {
    answers: Arc<Mutex<VecDeque<&'static str>>>,
}

impl ScriptedOcr {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize_text(&mut self, _: &Mat, _: &str, _: bool) -> Result<String, OcrError> {
        let answer = self.answers.lock().unwrap().pop_front();
        answer
            .map(str::to_string)
            .ok_or_else(|| OcrError::Recognize("script exhausted".to_string()))
    }
}

struct SlowOcr;

impl OcrEngine for SlowOcr {
    fn recognize_text(&mut self, _: &Mat, _: &str, _: bool) -> Result<String, OcrError> {
        thread::sleep(StdDuration::from_millis(500));
        Ok("KA01AB1234".to_string())
    }
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 4)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap()
}

/// A flat frame: the whole picture is the only quadrilateral.
fn frame() -> Mat {
    Mat::new_rows_cols_with_default(120, 240, CV_8UC3, Scalar::new(90.0, 120.0, 150.0, 0.0))
        .unwrap()
}

fn shared_ledger(slots_per_row: u8) -> (Arc<ParkingLedger<MemoryStore>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let ledger = ParkingLedger::open(
        MemoryStore::new(),
        SlotLayout::new(vec!['A', 'B'], slots_per_row),
        FeeSchedule::new(20.0).unwrap(),
    )
    .with_clock(clock.clone());
    (Arc::new(ledger), clock)
}

#[test]
fn vehicle_enters_then_leaves_and_pays() {
    let (ledger, clock) = shared_ledger(5);
    let mut station =
        ParkingStation::new(ScriptedOcr::new(&["KA01AB1234", "KA01AB1234"]), AutoConfirm, ledger);

    let entered = station.process_frame(&frame()).unwrap();
    assert!(matches!(entered, Transition::Entered(_)));
    let slot = entered.record().slot;
    assert!(!entered.record().snapshot_image.is_empty());

    clock.advance(Duration::minutes(90));
    let exited = station.process_frame(&frame()).unwrap();

    let Transition::Exited(record) = exited else {
        panic!("expected exit");
    };
    assert_eq!(record.slot, slot);
    assert_eq!(record.fee, 30.0);
    assert_eq!(record.exit_time, Some(t0() + Duration::minutes(90)));
    assert_eq!(station.ledger().occupied_count().unwrap(), 0);
    assert_eq!(station.ledger().records().unwrap().len(), 1);
}

#[test]
fn three_character_reading_is_no_plate() {
    let (ledger, _clock) = shared_ledger(5);
    let mut station = ParkingStation::new(ScriptedOcr::new(&["K4Z"]), AutoConfirm, ledger);

    let err = station.process_frame(&frame()).unwrap_err();
    assert!(matches!(err, StationError::NoPlateDetected));
    assert!(err.is_retryable());
    assert!(station.ledger().records().unwrap().is_empty());
}

#[test]
fn noisy_reading_is_cleaned_before_the_ledger_sees_it() {
    let (ledger, _clock) = shared_ledger(5);
    let mut station =
        ParkingStation::new(ScriptedOcr::new(&[" mh-12 DE 1433\n"]), AutoConfirm, ledger);

    let record = station.process_frame(&frame()).unwrap().record().clone();
    assert_eq!(record.plate_number, "12DE1433");
}

#[test]
fn ocr_timeout_is_no_plate() {
    let (ledger, _clock) = shared_ledger(5);
    let ocr = TimeoutOcr::spawn(|| Ok(SlowOcr), StdDuration::from_millis(50)).unwrap();
    let mut station = ParkingStation::new(ocr, AutoConfirm, ledger);

    assert!(matches!(
        station.process_frame(&frame()),
        Err(StationError::NoPlateDetected)
    ));
    assert_eq!(station.ledger().occupied_count().unwrap(), 0);
}

#[test]
fn full_lot_refuses_without_recording() {
    let (ledger, _clock) = shared_ledger(1);
    let mut station = ParkingStation::new(
        ScriptedOcr::new(&["AAA111", "BBB222", "CCC333"]),
        AutoConfirm,
        ledger,
    );

    station.process_frame(&frame()).unwrap();
    station.process_frame(&frame()).unwrap();
    let err = station.process_frame(&frame()).unwrap_err();

    assert!(matches!(
        err,
        StationError::Ledger(LedgerError::NoSlotAvailable { ref plate }) if plate == "CCC333"
    ));
    assert!(err.is_retryable());
    assert!(!station.ledger().is_active("CCC333").unwrap());
    assert_eq!(station.ledger().records().unwrap().len(), 2);
}

#[test]
fn two_stations_race_for_the_last_slot() {
    let (ledger, _clock) = shared_ledger(1);
    ledger.reconcile("PARKED1", vec![]).unwrap();

    let script = ScriptedOcr::new(&["NORTH123", "SOUTH456"]);
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let mut station = ParkingStation::new(script.clone(), AutoConfirm, ledger.clone());
            thread::spawn(move || station.process_frame(&frame()))
        })
        .collect();
    let results: Vec<Result<Transition, StationError>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let entered = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(StationError::Ledger(LedgerError::NoSlotAvailable { .. }))
            )
        })
        .count();
    assert_eq!((entered, refused), (1, 1));
    assert_eq!(ledger.occupied_count().unwrap(), 2);
}

#[test]
fn events_follow_station_transitions() {
    let clock = Arc::new(ManualClock::new(t0()));
    let (notifier, events) = ChannelNotifier::bounded(8);
    let ledger = Arc::new(
        ParkingLedger::open(MemoryStore::new(), SlotLayout::default(), FeeSchedule::default())
            .with_clock(clock.clone())
            .with_notifier(notifier),
    );
    let mut station =
        ParkingStation::new(ScriptedOcr::new(&["KA01AB1234", "KA01AB1234"]), AutoConfirm, ledger);

    station.process_frame(&frame()).unwrap();
    clock.advance(Duration::minutes(45));
    station.process_frame(&frame()).unwrap();

    let entry = events.try_recv().unwrap();
    let exit = events.try_recv().unwrap();
    assert_eq!(entry.kind, ParkingEventKind::Entry);
    assert_eq!(entry.exit_time, None);
    assert_eq!(exit.kind, ParkingEventKind::Exit);
    assert_eq!(exit.fee, 15.0);

    let json = serde_json::to_value(&exit).unwrap();
    assert_eq!(json["slot"], "A1");
    assert_eq!(json["entry_time"], "2024-11-04 09:15:00");
    assert_eq!(json["exit_time"], "2024-11-04 10:00:00");
}
