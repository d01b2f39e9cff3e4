// libs/messaging-cell/src/services/formatting.rs
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::models::{Avatar, Counterpart, DayGroup, Message};

const DAY_HEADER_FORMAT: &str = "%B %-d, %Y";
const MESSAGE_TIME_FORMAT: &str = "%-I:%M %p";

fn local_day(ts: &DateTime<Utc>, tz: &FixedOffset) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// `"January 1, 2025"`.
pub fn format_day_header(date: NaiveDate) -> String {
    date.format(DAY_HEADER_FORMAT).to_string()
}

/// `"9:00 AM"` in the given local offset.
pub fn format_message_time(ts: &DateTime<Utc>, tz: &FixedOffset) -> String {
    ts.with_timezone(tz).format(MESSAGE_TIME_FORMAT).to_string()
}

/// One entry per message: a day header when the local calendar day differs
/// from the message right before it. The first message always gets one.
pub fn date_headers(messages: &[Message], tz: &FixedOffset) -> Vec<Option<String>> {
    let mut previous: Option<NaiveDate> = None;

    messages
        .iter()
        .map(|message| {
            let day = local_day(&message.created_at, tz);
            let header = (previous != Some(day)).then(|| format_day_header(day));
            previous = Some(day);
            header
        })
        .collect()
}

pub fn group_by_day(messages: &[Message], tz: &FixedOffset) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();

    for message in messages {
        let day = local_day(&message.created_at, tz);
        match groups.last_mut() {
            Some(group) if group.date == day => group.messages.push(message.clone()),
            _ => groups.push(DayGroup {
                date: day,
                header: format_day_header(day),
                messages: vec![message.clone()],
            }),
        }
    }

    groups
}

/// First letter of each word, uppercased: `"Sarah Johnson"` → `"SJ"`.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn avatar(counterpart: &Counterpart) -> Avatar {
    match counterpart.avatar_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Avatar::Image(url.to_string()),
        None => Avatar::Initials(initials(counterpart.display_name())),
    }
}

/// Badge shown next to the caller's own messages.
pub fn self_badge(email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => email.chars().take(2).collect::<String>().to_uppercase(),
        None => "Me".to_string(),
    }
}

pub fn conversation_summary(message_count: usize) -> String {
    match message_count {
        0 => "Start chatting".to_string(),
        1 => "1 message".to_string(),
        n => format!("{} messages", n),
    }
}
