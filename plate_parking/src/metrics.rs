use lazy_static::lazy_static;
use parking_ledger::Transition;
use prometheus::{
    register_counter, register_int_counter, register_int_gauge, Counter, Encoder, IntCounter,
    IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref FRAMES_PROCESSED: IntCounter = register_int_counter!(
        "parking_frames_processed_total",
        "Frames that went through a capture cycle"
    )
    .unwrap();
    pub static ref PLATES_RECOGNIZED: IntCounter = register_int_counter!(
        "parking_plates_recognized_total",
        "Frames where OCR produced a confirmed plate number"
    )
    .unwrap();
    pub static ref NO_PLATE: IntCounter = register_int_counter!(
        "parking_no_plate_total",
        "Frames without a usable or confirmed plate"
    )
    .unwrap();
    pub static ref VEHICLE_ENTRIES: IntCounter = register_int_counter!(
        "parking_vehicle_entries_total",
        "Vehicles assigned to a slot"
    )
    .unwrap();
    pub static ref VEHICLE_EXITS: IntCounter = register_int_counter!(
        "parking_vehicle_exits_total",
        "Vehicles checked out"
    )
    .unwrap();
    pub static ref ENTRIES_REFUSED: IntCounter = register_int_counter!(
        "parking_entries_refused_total",
        "Entries refused because the lot was full"
    )
    .unwrap();
    pub static ref FEES_COLLECTED: Counter = register_counter!(
        "parking_fees_collected_total",
        "Sum of fees charged on exit"
    )
    .unwrap();
    pub static ref OCCUPIED_SLOTS: IntGauge =
        register_int_gauge!("parking_occupied_slots", "Slots held by active records").unwrap();
}

pub fn observe_transition(transition: &Transition) {
    match transition {
        Transition::Entered(_) => VEHICLE_ENTRIES.inc(),
        Transition::Exited(record) => {
            VEHICLE_EXITS.inc();
            FEES_COLLECTED.inc_by(record.fee);
        }
    }
}

/// Prometheus text exposition of the default registry.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Could not encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
