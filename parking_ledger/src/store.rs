use chrono::NaiveDateTime;

use crate::error::StoreError;
use crate::record::{NewParkingRecord, ParkingRecord, RecordId};
use crate::slots::SlotLabel;

/// Persistence collaborator of the ledger.
///
/// Implementations must refuse a second active record for the same plate.
/// The ledger serializes every call, so implementations need no locking of
/// their own.
pub trait ParkingStore: Send {
    /// All records of `plate` with no exit time. More than one means corrupt data.
    fn active_records_for_plate(&self, plate: &str) -> Result<Vec<ParkingRecord>, StoreError>;

    fn occupied_slots(&self) -> Result<Vec<SlotLabel>, StoreError>;

    fn insert_record(&mut self, record: NewParkingRecord) -> Result<ParkingRecord, StoreError>;

    fn update_record_on_exit(
        &mut self,
        id: RecordId,
        exit_time: NaiveDateTime,
        fee: f64,
    ) -> Result<ParkingRecord, StoreError>;

    /// Every record, active and closed, by ascending id.
    fn records(&self) -> Result<Vec<ParkingRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<ParkingRecord>,
    next_id: RecordId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads records as they are, without the uniqueness checks of
    /// `insert_record`.
    pub fn from_records(mut records: Vec<ParkingRecord>) -> Self {
        records.sort_by_key(|r| r.id);
        let next_id = records.last().map(|r| r.id).unwrap_or(0);
        Self { records, next_id }
    }
}

impl ParkingStore for MemoryStore {
    fn active_records_for_plate(&self, plate: &str) -> Result<Vec<ParkingRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_active() && r.plate_number == plate)
            .cloned()
            .collect())
    }

    fn occupied_slots(&self) -> Result<Vec<SlotLabel>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.slot)
            .collect())
    }

    fn insert_record(&mut self, record: NewParkingRecord) -> Result<ParkingRecord, StoreError> {
        for existing in self.records.iter().filter(|r| r.is_active()) {
            if existing.plate_number == record.plate_number {
                return Err(StoreError::PlateAlreadyActive(record.plate_number));
            }
            if existing.slot == record.slot {
                return Err(StoreError::SlotAlreadyOccupied(record.slot));
            }
        }

        self.next_id += 1;
        let record = record.into_record(self.next_id);
        self.records.push(record.clone());
        Ok(record)
    }

    fn update_record_on_exit(
        &mut self,
        id: RecordId,
        exit_time: NaiveDateTime,
        fee: f64,
    ) -> Result<ParkingRecord, StoreError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RecordNotFound(id))?;
        if !record.is_active() {
            return Err(StoreError::RecordClosed(id));
        }
        record.exit_time = Some(exit_time);
        record.fee = fee;
        Ok(record.clone())
    }

    fn records(&self) -> Result<Vec<ParkingRecord>, StoreError> {
        Ok(self.records.clone())
    }
}
