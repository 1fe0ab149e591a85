use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// A parking slot, a row letter followed by its position in the row ("A1", "B5").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotLabel {
    row: char,
    position: u8,
}

impl SlotLabel {
    pub fn new(row: char, position: u8) -> Self {
        Self { row, position }
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn position(&self) -> u8 {
        self.position
    }
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.position)
    }
}

impl Serialize for SlotLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSlotError(pub String);

impl fmt::Display for ParseSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid slot label {:?}", self.0)
    }
}

impl std::error::Error for ParseSlotError {}

impl FromStr for SlotLabel {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let row = chars
            .next()
            .filter(|c| c.is_ascii_uppercase())
            .ok_or_else(|| ParseSlotError(s.to_string()))?;
        let position = chars
            .as_str()
            .parse::<u8>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| ParseSlotError(s.to_string()))?;
        Ok(Self { row, position })
    }
}

/// The fixed set of slots of a parking lot.
///
/// Free slots are handed out lowest label first: rows in the order they were
/// configured, then by position inside the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    rows: Vec<char>,
    slots_per_row: u8,
}

impl Default for SlotLayout {
    /// Two rows of five slots, A1..A5 and B1..B5.
    fn default() -> Self {
        Self {
            rows: vec!['A', 'B'],
            slots_per_row: 5,
        }
    }
}

impl SlotLayout {
    pub fn new(rows: Vec<char>, slots_per_row: u8) -> Self {
        Self {
            rows,
            slots_per_row,
        }
    }

    pub fn capacity(&self) -> usize {
        self.rows.len() * self.slots_per_row as usize
    }

    pub fn contains(&self, slot: &SlotLabel) -> bool {
        self.rows.contains(&slot.row) && slot.position >= 1 && slot.position <= self.slots_per_row
    }

    /// Every slot in allocation order.
    pub fn slots(&self) -> impl Iterator<Item = SlotLabel> + '_ {
        self.rows.iter().flat_map(move |row| {
            (1..=self.slots_per_row).map(move |position| SlotLabel::new(*row, position))
        })
    }

    pub fn first_free(&self, occupied: &BTreeSet<SlotLabel>) -> Option<SlotLabel> {
        self.slots().find(|slot| !occupied.contains(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_has_ten_slots() {
        let layout = SlotLayout::default();
        let labels: Vec<String> = layout.slots().map(|s| s.to_string()).collect();
        assert_eq!(layout.capacity(), 10);
        assert_eq!(
            labels,
            vec!["A1", "A2", "A3", "A4", "A5", "B1", "B2", "B3", "B4", "B5"]
        );
    }

    #[test]
    fn test_first_free_skips_occupied() {
        let layout = SlotLayout::default();
        let occupied: BTreeSet<SlotLabel> = ["A1", "A2", "A4"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(layout.first_free(&occupied), Some(SlotLabel::new('A', 3)));
    }

    #[test]
    fn test_first_free_none_when_full() {
        let layout = SlotLayout::new(vec!['C'], 2);
        let occupied: BTreeSet<SlotLabel> =
            [SlotLabel::new('C', 1), SlotLabel::new('C', 2)].into();
        assert_eq!(layout.first_free(&occupied), None);
    }

    #[test]
    fn test_parse_slot_label() {
        assert_eq!("B4".parse::<SlotLabel>(), Ok(SlotLabel::new('B', 4)));
        assert!("b4".parse::<SlotLabel>().is_err());
        assert!("B0".parse::<SlotLabel>().is_err());
        assert!("B".parse::<SlotLabel>().is_err());
        assert!("".parse::<SlotLabel>().is_err());
    }

    #[test]
    fn test_contains() {
        let layout = SlotLayout::default();
        assert!(layout.contains(&SlotLabel::new('B', 5)));
        assert!(!layout.contains(&SlotLabel::new('B', 6)));
        assert!(!layout.contains(&SlotLabel::new('C', 1)));
    }
}
