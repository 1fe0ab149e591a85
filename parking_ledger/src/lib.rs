pub mod clock;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod notification;
pub mod record;
pub mod slots;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock, TIMESTAMP_FORMAT};
pub use error::{LedgerError, NotificationError, StoreError};
pub use fee::{FeeSchedule, DEFAULT_RATE_PER_HOUR};
pub use ledger::{ParkingLedger, Transition};
pub use notification::{
    ChannelNotifier, FanoutNotifier, LogNotifier, ParkingEvent, ParkingEventKind, ParkingNotifier,
};
pub use record::{NewParkingRecord, ParkingRecord, RecordId, RecordState};
pub use slots::{SlotLabel, SlotLayout};
pub use store::{MemoryStore, ParkingStore};
