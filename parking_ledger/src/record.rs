use chrono::NaiveDateTime;
use serde::Serialize;

use crate::slots::SlotLabel;

pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Vehicle is parked, no exit time yet.
    Active,
    /// Vehicle left, exit time and fee are final.
    Closed,
}

/// One stay of one vehicle in one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParkingRecord {
    pub id: RecordId,
    pub plate_number: String,
    pub slot: SlotLabel,
    pub entry_time: NaiveDateTime,
    pub exit_time: Option<NaiveDateTime>,
    pub fee: f64,
    #[serde(skip)]
    pub snapshot_image: Vec<u8>,
}

impl ParkingRecord {
    pub fn state(&self) -> RecordState {
        match self.exit_time {
            None => RecordState::Active,
            Some(_) => RecordState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.exit_time.is_none()
    }
}

/// A record before the store gave it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewParkingRecord {
    pub plate_number: String,
    pub slot: SlotLabel,
    pub entry_time: NaiveDateTime,
    pub snapshot_image: Vec<u8>,
}

impl NewParkingRecord {
    pub fn into_record(self, id: RecordId) -> ParkingRecord {
        ParkingRecord {
            id,
            plate_number: self.plate_number,
            slot: self.slot,
            entry_time: self.entry_time,
            exit_time: None,
            fee: 0.0,
            snapshot_image: self.snapshot_image,
        }
    }
}
