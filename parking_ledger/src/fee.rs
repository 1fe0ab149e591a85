use chrono::NaiveDateTime;

use crate::error::LedgerError;

pub const DEFAULT_RATE_PER_HOUR: f64 = 20.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Linear hourly pricing. No minimum charge, no rounding up to whole hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    rate_per_hour: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
        }
    }
}

impl FeeSchedule {
    pub fn new(rate_per_hour: f64) -> Result<Self, LedgerError> {
        if !rate_per_hour.is_finite() || rate_per_hour < 0.0 {
            return Err(LedgerError::InvalidRate(rate_per_hour));
        }
        Ok(Self { rate_per_hour })
    }

    pub fn rate_per_hour(&self) -> f64 {
        self.rate_per_hour
    }

    /// Fee for a stay, rounded to cents.
    ///
    /// An exit stamped before the entry (clock stepped backwards) is charged
    /// as a zero length stay.
    pub fn fee_for(&self, entry_time: NaiveDateTime, exit_time: NaiveDateTime) -> f64 {
        let millis = (exit_time - entry_time).num_milliseconds().max(0);
        let hours = millis as f64 / MILLIS_PER_HOUR;
        round_cents(hours * self.rate_per_hour)
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 3)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_hour_and_a_half() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(at(9, 0, 0), at(10, 30, 0)), 30.0);
    }

    #[test]
    fn test_fractional_hours_round_to_cents() {
        let fees = FeeSchedule::default();
        // 7 minutes at 20/h = 2.3333..
        assert_eq!(fees.fee_for(at(9, 0, 0), at(9, 7, 0)), 2.33);
        // 1 second at 20/h = 0.00555..
        assert_eq!(fees.fee_for(at(9, 0, 0), at(9, 0, 1)), 0.01);
    }

    #[test]
    fn test_zero_and_negative_durations() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(at(9, 0, 0), at(9, 0, 0)), 0.0);
        assert_eq!(fees.fee_for(at(9, 0, 0), at(8, 0, 0)), 0.0);
    }

    #[test]
    fn test_fee_is_monotonic_in_duration() {
        let fees = FeeSchedule::new(17.5).unwrap();
        let entry = at(0, 0, 0);
        let mut previous = 0.0;
        for minutes in (0..48 * 60).step_by(7) {
            let fee = fees.fee_for(entry, entry + Duration::minutes(minutes));
            assert!(fee >= previous, "fee dropped at {} minutes", minutes);
            assert!(fee >= 0.0);
            previous = fee;
        }
    }

    #[test]
    fn test_invalid_rates() {
        assert!(FeeSchedule::new(-1.0).is_err());
        assert!(FeeSchedule::new(f64::NAN).is_err());
        assert!(FeeSchedule::new(f64::INFINITY).is_err());
        assert_eq!(FeeSchedule::new(0.0).unwrap().fee_for(at(1, 0, 0), at(5, 0, 0)), 0.0);
    }
}
