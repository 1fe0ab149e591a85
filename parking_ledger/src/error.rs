//! Error types of the occupancy ledger and its collaborators.

use thiserror::Error;

use crate::record::RecordId;
use crate::slots::SlotLabel;

/// Failures reported by a persistence backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("record {0} is already closed")]
    RecordClosed(RecordId),

    #[error("plate {0} already has an active record")]
    PlateAlreadyActive(String),

    #[error("slot {0} is already held by an active record")]
    SlotAlreadyOccupied(SlotLabel),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Every slot is held by an active record, the vehicle has to wait.
    #[error("no parking slot available for {plate}")]
    NoSlotAvailable { plate: String },

    /// The store returned more than one active record for a plate.
    #[error("plate {plate} has {count} active records")]
    DuplicateActiveRecord { plate: String, count: usize },

    #[error("plate {0} is already parked")]
    AlreadyActive(String),

    #[error("plate {0} has no active record")]
    NotActive(String),

    #[error("slot {0} is already occupied")]
    SlotOccupied(SlotLabel),

    #[error("slot {0} is not part of the parking layout")]
    UnknownSlot(SlotLabel),

    #[error("invalid plate number {0:?}")]
    InvalidPlate(String),

    #[error("invalid hourly rate {0}")]
    InvalidRate(f64),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger lock poisoned by a panicking caller")]
    Poisoned,
}

impl LedgerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::NoSlotAvailable { .. } => "NO_SLOT_AVAILABLE",
            LedgerError::DuplicateActiveRecord { .. } => "DUPLICATE_ACTIVE_RECORD",
            LedgerError::AlreadyActive(_) => "ALREADY_ACTIVE",
            LedgerError::NotActive(_) => "NOT_ACTIVE",
            LedgerError::SlotOccupied(_) => "SLOT_OCCUPIED",
            LedgerError::UnknownSlot(_) => "UNKNOWN_SLOT",
            LedgerError::InvalidPlate(_) => "INVALID_PLATE",
            LedgerError::InvalidRate(_) => "INVALID_RATE",
            LedgerError::Store(_) => "STORE_ERROR",
            LedgerError::Poisoned => "POISONED",
        }
    }

    /// The operator can simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NoSlotAvailable { .. })
    }

    /// The ledger data can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::DuplicateActiveRecord { .. } | LedgerError::Poisoned
        )
    }
}

/// A notifier could not hand an event over. Never undoes a transition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification receiver is gone")]
    Disconnected,

    #[error("notification failed: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let no_slot = LedgerError::NoSlotAvailable {
            plate: "KA01AB1234".to_string(),
        };
        assert!(no_slot.is_retryable());
        assert!(!no_slot.is_fatal());
        assert_eq!(no_slot.error_code(), "NO_SLOT_AVAILABLE");

        let duplicate = LedgerError::DuplicateActiveRecord {
            plate: "KA01AB1234".to_string(),
            count: 2,
        };
        assert!(duplicate.is_fatal());
        assert!(!duplicate.is_retryable());
        assert_eq!(duplicate.to_string(), "plate KA01AB1234 has 2 active records");
    }

    #[test]
    fn test_store_error_converts() {
        let err: LedgerError = StoreError::RecordNotFound(7).into();
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(err.to_string(), "storage error: record 7 not found");
    }
}
