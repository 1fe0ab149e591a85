use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use parking_ledger::{FeeSchedule, SlotLayout, DEFAULT_RATE_PER_HOUR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Folder holding `<language>.traineddata`. Tesseract's own default when unset.
    pub tessdata_dir: Option<String>,
    pub language: String,
    pub timeout_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            language: "eng".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Lot layout and tariff
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ParkingConfig {
    pub rate_per_hour: f64,
    pub rows: Vec<char>,
    pub slots_per_row: u8,
    /// Extension handed to `imencode` for entry snapshots.
    pub snapshot_format: String,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
            rows: vec!['A', 'B'],
            slots_per_row: 5,
            snapshot_format: ".jpg".to_string(),
        }
    }
}

impl ParkingConfig {
    pub fn layout(&self) -> SlotLayout {
        SlotLayout::new(self.rows.clone(), self.slots_per_row)
    }

    pub fn fee_schedule(&self) -> Result<FeeSchedule, ConfigError> {
        FeeSchedule::new(self.rate_per_hour).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    pub ocr: OcrConfig,
    pub parking: ParkingConfig,
}

impl StationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: StationConfig = serde_yaml::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parking = &self.parking;
        if !parking.rate_per_hour.is_finite() || parking.rate_per_hour < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rate_per_hour must be a non-negative number, got {}",
                parking.rate_per_hour
            )));
        }
        if parking.rows.is_empty() {
            return Err(ConfigError::Invalid("at least one row is needed".to_string()));
        }
        if let Some(row) = parking.rows.iter().find(|r| !r.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "row labels are uppercase letters, got {:?}",
                row
            )));
        }
        let unique: BTreeSet<char> = parking.rows.iter().copied().collect();
        if unique.len() != parking.rows.len() {
            return Err(ConfigError::Invalid(format!(
                "row labels must be unique, got {:?}",
                parking.rows
            )));
        }
        if parking.slots_per_row == 0 {
            return Err(ConfigError::Invalid("slots_per_row must be at least 1".to_string()));
        }
        if !parking.snapshot_format.starts_with('.') || parking.snapshot_format.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "snapshot_format must be a file extension such as .jpg, got {:?}",
                parking.snapshot_format
            )));
        }
        if self.ocr.timeout_ms == 0 {
            return Err(ConfigError::Invalid("ocr.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
