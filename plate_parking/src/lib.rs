pub mod config;
pub mod error;
pub mod metrics;
pub mod plate_detection;
pub mod station;

pub use config::{ConfigError, StationConfig};
pub use error::{OcrError, StationError};
pub use station::{AutoConfirm, ConsoleConfirmation, ParkingStation, PlateConfirmation};
