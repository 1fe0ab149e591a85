//! Occupancy ledger: decides whether a recognized plate is entering or leaving,
//! allocates slots and charges fees.
//!
//! Every read-decide-write sequence runs while holding the store lock, so two
//! capture stations sharing one ledger can neither hand out the same slot nor
//! close the same record twice. Events are published before the lock is
//! released, so notifiers see the transitions of a plate in commit order and
//! must not block.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::clock::{truncate_to_seconds, Clock, SystemClock, TIMESTAMP_FORMAT};
use crate::error::LedgerError;
use crate::fee::FeeSchedule;
use crate::notification::{LogNotifier, ParkingEvent, ParkingNotifier};
use crate::record::{NewParkingRecord, ParkingRecord};
use crate::slots::{SlotLabel, SlotLayout};
use crate::store::ParkingStore;

/// What a recognized plate did to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Unseen or closed plate got a slot.
    Entered(ParkingRecord),
    /// Active record was closed and charged.
    Exited(ParkingRecord),
}

impl Transition {
    pub fn record(&self) -> &ParkingRecord {
        match self {
            Transition::Entered(record) | Transition::Exited(record) => record,
        }
    }
}

pub struct ParkingLedger<S: ParkingStore> {
    store: Mutex<S>,
    layout: SlotLayout,
    fees: FeeSchedule,
    clock: Box<dyn Clock>,
    notifier: Box<dyn ParkingNotifier>,
}

impl<S: ParkingStore> ParkingLedger<S> {
    /// Takes ownership of an opened store. Give it back with `close`.
    pub fn open(store: S, layout: SlotLayout, fees: FeeSchedule) -> Self {
        info!(
            "Opening parking ledger with {} slots at {:.2}/hour",
            layout.capacity(),
            fees.rate_per_hour()
        );
        Self {
            store: Mutex::new(store),
            layout,
            fees,
            clock: Box::new(SystemClock),
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_notifier(mut self, notifier: impl ParkingNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Releases the store. Nothing else can reach it afterwards.
    pub fn close(self) -> Result<S, LedgerError> {
        info!("Closing parking ledger");
        self.store.into_inner().map_err(|_| LedgerError::Poisoned)
    }

    /// Opens a record for an unseen plate or closes the active one.
    ///
    /// `snapshot_image` is only kept when the plate enters.
    pub fn reconcile(&self, plate: &str, snapshot_image: Vec<u8>) -> Result<Transition, LedgerError> {
        validate_plate(plate)?;
        let now = self.clock.now();

        let mut store = self.lock()?;
        let transition = match load_active_record(&*store, plate)? {
            Some(active) => Transition::Exited(self.close_record(&mut *store, active, now)?),
            None => {
                let slot = self
                    .free_slot(&*store)?
                    .ok_or_else(|| no_slot_for(plate))?;
                Transition::Entered(insert_entry(&mut *store, plate, slot, now, snapshot_image)?)
            }
        };

        self.publish(transition.record());
        drop(store);
        Ok(transition)
    }

    pub fn find_available_slot(&self) -> Result<Option<SlotLabel>, LedgerError> {
        let store = self.lock()?;
        self.free_slot(&*store)
    }

    pub fn is_active(&self, plate: &str) -> Result<bool, LedgerError> {
        let store = self.lock()?;
        Ok(load_active_record(&*store, plate)?.is_some())
    }

    /// Opens a record in a slot chosen by the caller.
    pub fn record_entry(
        &self,
        plate: &str,
        slot: SlotLabel,
        entry_time: NaiveDateTime,
        snapshot_image: Vec<u8>,
    ) -> Result<ParkingRecord, LedgerError> {
        validate_plate(plate)?;
        if !self.layout.contains(&slot) {
            return Err(LedgerError::UnknownSlot(slot));
        }

        let entry_time = truncate_to_seconds(entry_time);

        let mut store = self.lock()?;
        if load_active_record(&*store, plate)?.is_some() {
            return Err(LedgerError::AlreadyActive(plate.to_string()));
        }
        if store.occupied_slots()?.contains(&slot) {
            return Err(LedgerError::SlotOccupied(slot));
        }
        let record = insert_entry(&mut *store, plate, slot, entry_time, snapshot_image)?;

        self.publish(&record);
        drop(store);
        Ok(record)
    }

    /// Closes the active record of `plate` now. The returned record carries the fee.
    pub fn record_exit(&self, plate: &str) -> Result<ParkingRecord, LedgerError> {
        let now = self.clock.now();
        let mut store = self.lock()?;
        let active = load_active_record(&*store, plate)?
            .ok_or_else(|| LedgerError::NotActive(plate.to_string()))?;
        let record = self.close_record(&mut *store, active, now)?;

        self.publish(&record);
        drop(store);
        Ok(record)
    }

    pub fn records(&self) -> Result<Vec<ParkingRecord>, LedgerError> {
        Ok(self.lock()?.records()?)
    }

    pub fn occupied_count(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.occupied_slots()?.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>, LedgerError> {
        self.store.lock().map_err(|_| {
            error!("Parking ledger lock poisoned");
            LedgerError::Poisoned
        })
    }

    fn free_slot(&self, store: &S) -> Result<Option<SlotLabel>, LedgerError> {
        let occupied: BTreeSet<SlotLabel> = store.occupied_slots()?.into_iter().collect();
        Ok(self.layout.first_free(&occupied))
    }

    fn close_record(
        &self,
        store: &mut S,
        active: ParkingRecord,
        exit_time: NaiveDateTime,
    ) -> Result<ParkingRecord, LedgerError> {
        let fee = self.fees.fee_for(active.entry_time, exit_time);
        debug!(
            "Closing record {} of {}: {} -> {}",
            active.id,
            active.plate_number,
            active.entry_time.format(TIMESTAMP_FORMAT),
            exit_time.format(TIMESTAMP_FORMAT)
        );
        Ok(store.update_record_on_exit(active.id, exit_time, fee)?)
    }

    /// Called with the store lock held.
    fn publish(&self, record: &ParkingRecord) {
        if let Err(e) = self.notifier.notify(&ParkingEvent::from_record(record)) {
            warn!(
                "Could not deliver parking event for {}: {}",
                record.plate_number, e
            );
        }
    }
}

fn load_active_record<S: ParkingStore>(
    store: &S,
    plate: &str,
) -> Result<Option<ParkingRecord>, LedgerError> {
    let mut active = store.active_records_for_plate(plate)?;
    if active.len() > 1 {
        error!(
            "Plate {} has {} active records, ledger data is corrupt",
            plate,
            active.len()
        );
        return Err(LedgerError::DuplicateActiveRecord {
            plate: plate.to_string(),
            count: active.len(),
        });
    }
    Ok(active.pop())
}

fn insert_entry<S: ParkingStore>(
    store: &mut S,
    plate: &str,
    slot: SlotLabel,
    entry_time: NaiveDateTime,
    snapshot_image: Vec<u8>,
) -> Result<ParkingRecord, LedgerError> {
    Ok(store.insert_record(NewParkingRecord {
        plate_number: plate.to_string(),
        slot,
        entry_time,
        snapshot_image,
    })?)
}

fn no_slot_for(plate: &str) -> LedgerError {
    warn!("No available parking slots for {}", plate);
    LedgerError::NoSlotAvailable {
        plate: plate.to_string(),
    }
}

fn validate_plate(plate: &str) -> Result<(), LedgerError> {
    if plate.is_empty() || !plate.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(LedgerError::InvalidPlate(plate.to_string()));
    }
    Ok(())
}
