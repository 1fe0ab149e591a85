//! Notification boundary between the ledger and whatever renders its decisions
//! (reports, QR links, displays).
//!
//! Delivery is best effort. The ledger has already committed the transition
//! when a notifier runs, so a failing notifier is logged and otherwise ignored.

use chrono::NaiveDateTime;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::info;

use crate::clock::TIMESTAMP_FORMAT;
use crate::error::NotificationError;
use crate::record::ParkingRecord;
use crate::slots::SlotLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParkingEventKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParkingEvent {
    pub kind: ParkingEventKind,
    pub plate_number: String,
    pub slot: SlotLabel,
    #[serde(serialize_with = "serialize_timestamp")]
    pub entry_time: NaiveDateTime,
    #[serde(serialize_with = "serialize_optional_timestamp")]
    pub exit_time: Option<NaiveDateTime>,
    pub fee: f64,
}

impl ParkingEvent {
    pub fn from_record(record: &ParkingRecord) -> Self {
        let kind = if record.is_active() {
            ParkingEventKind::Entry
        } else {
            ParkingEventKind::Exit
        };
        Self {
            kind,
            plate_number: record.plate_number.clone(),
            slot: record.slot,
            entry_time: record.entry_time,
            exit_time: record.exit_time,
            fee: record.fee,
        }
    }
}

fn serialize_timestamp<S: serde::Serializer>(
    time: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(TIMESTAMP_FORMAT))
}

fn serialize_optional_timestamp<S: serde::Serializer>(
    time: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serialize_timestamp(time, serializer),
        None => serializer.serialize_none(),
    }
}

pub trait ParkingNotifier: Send + Sync {
    /// Must not block on the consumer.
    fn notify(&self, event: &ParkingEvent) -> Result<(), NotificationError>;
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ParkingNotifier for LogNotifier {
    fn notify(&self, event: &ParkingEvent) -> Result<(), NotificationError> {
        match event.kind {
            ParkingEventKind::Entry => info!(
                "Car {} is assigned to slot {} at {}",
                event.plate_number,
                event.slot,
                event.entry_time.format(TIMESTAMP_FORMAT)
            ),
            ParkingEventKind::Exit => info!(
                "Car {} exited from slot {}. Total fee: {:.2}",
                event.plate_number, event.slot, event.fee
            ),
        }
        Ok(())
    }
}

/// Hands events to another thread over a bounded queue.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<ParkingEvent>,
}

impl ChannelNotifier {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ParkingEvent>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl ParkingNotifier for ChannelNotifier {
    fn notify(&self, event: &ParkingEvent) -> Result<(), NotificationError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::QueueFull,
            TrySendError::Disconnected(_) => NotificationError::Disconnected,
        })
    }
}

/// Delivers to every inner notifier, reporting the first failure after
/// trying them all.
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn ParkingNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl ParkingNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }
}

impl ParkingNotifier for FanoutNotifier {
    fn notify(&self, event: &ParkingEvent) -> Result<(), NotificationError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn exit_event() -> ParkingEvent {
        let entry = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        ParkingEvent {
            kind: ParkingEventKind::Exit,
            plate_number: "KA01AB1234".to_string(),
            slot: "B2".parse().unwrap(),
            entry_time: entry,
            exit_time: Some(entry + chrono::Duration::minutes(90)),
            fee: 30.0,
        }
    }

    #[test]
    fn test_channel_notifier_delivers_and_reports_full() {
        let (notifier, receiver) = ChannelNotifier::bounded(1);
        notifier.notify(&exit_event()).unwrap();
        assert_eq!(notifier.notify(&exit_event()), Err(NotificationError::QueueFull));
        assert_eq!(receiver.try_recv().unwrap(), exit_event());
    }

    #[test]
    fn test_channel_notifier_disconnected() {
        let (notifier, receiver) = ChannelNotifier::bounded(4);
        drop(receiver);
        assert_eq!(
            notifier.notify(&exit_event()),
            Err(NotificationError::Disconnected)
        );
    }

    #[test]
    fn test_fanout_tries_every_notifier() {
        let (full, _full_rx) = ChannelNotifier::bounded(0);
        let (ok, ok_rx) = ChannelNotifier::bounded(1);
        let fanout = FanoutNotifier::new().with(LogNotifier).with(full).with(ok);

        assert_eq!(fanout.notify(&exit_event()), Err(NotificationError::QueueFull));
        assert_eq!(ok_rx.try_recv().unwrap().plate_number, "KA01AB1234");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(exit_event()).unwrap();
        assert_eq!(json["kind"], "exit");
        assert_eq!(json["slot"], "B2");
        assert_eq!(json["entry_time"], "2024-03-09 10:00:00");
        assert_eq!(json["exit_time"], "2024-03-09 11:30:00");
        assert_eq!(json["fee"], 30.0);
    }
}
