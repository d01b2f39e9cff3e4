// libs/appointment-cell/src/services/slots.rs
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use tracing::debug;

use crate::models::{BookingError, SelectedSlot, Slot};

/// Daily template: label and whether the slot is open.
const SLOT_TEMPLATE: [(&str, bool); 12] = [
    ("09:00 AM", true),
    ("09:30 AM", true),
    ("10:00 AM", false),
    ("10:30 AM", true),
    ("11:00 AM", true),
    ("11:30 AM", false),
    ("01:00 PM", true),
    ("01:30 PM", true),
    ("02:00 PM", true),
    ("02:30 PM", false),
    ("03:00 PM", true),
    ("03:30 PM", false),
];

/// Weekends only offer the morning block.
const WEEKEND_SLOT_COUNT: usize = 6;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Slots shown for `date`. Deterministic and independent of the clock.
pub fn generate_slots(date: NaiveDate) -> Vec<Slot> {
    let count = if is_weekend(date) { WEEKEND_SLOT_COUNT } else { SLOT_TEMPLATE.len() };

    SLOT_TEMPLATE[..count]
        .iter()
        .map(|(time, available)| Slot {
            time: (*time).to_string(),
            available: *available,
        })
        .collect()
}

pub fn is_bookable_date(date: NaiveDate, today: NaiveDate) -> bool {
    date >= today
}

/// `"10:30 AM"` → 10:30, `"01:00 PM"` → 13:00.
pub fn parse_slot_time(label: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(label.trim(), "%I:%M %p").ok()
}

pub struct SlotCalendar;

impl SlotCalendar {
    pub fn slots_for(date: NaiveDate, today: NaiveDate) -> Result<Vec<Slot>, BookingError> {
        if !is_bookable_date(date, today) {
            return Err(BookingError::PastDate(date));
        }

        let slots = generate_slots(date);
        debug!("Generated {} slots for {}", slots.len(), date);
        Ok(slots)
    }

    /// A selection is bookable only if it names an open slot of its day.
    pub fn check_available(slot: &SelectedSlot, today: NaiveDate) -> Result<(), BookingError> {
        let label = slot.time.trim();
        let open = Self::slots_for(slot.date, today)?
            .iter()
            .any(|candidate| candidate.available && candidate.time == label);

        if open {
            Ok(())
        } else {
            debug!("Rejected unavailable slot {} on {}", label, slot.date);
            Err(BookingError::SlotUnavailable(label.to_string()))
        }
    }
}
