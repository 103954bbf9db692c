//! Presentation helpers for message lists.

use chrono::{DateTime, TimeZone};

use crate::types::{Message, UserId};

/// Format as `dd/mm/yyyy, HH:MM` in the timestamp's own zone.
pub fn format_timestamp<Tz>(ts: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    ts.format("%d/%m/%Y, %H:%M").to_string()
}

/// True when `messages[i]` is from someone else and the next message has a
/// different sender, i.e. the avatar should be drawn under it.
pub fn is_same_sender(messages: &[Message], i: usize, me: &UserId) -> bool {
    match (messages.get(i), messages.get(i + 1)) {
        (Some(current), Some(next)) => {
            next.sender.id != current.sender.id && current.sender.id != *me
        }
        _ => false,
    }
}

/// True for the final message when someone else sent it.
pub fn is_last_message(messages: &[Message], i: usize, me: &UserId) -> bool {
    i + 1 == messages.len() && messages.last().is_some_and(|m| m.sender.id != *me)
}

/// True when the previous message has the same sender.
pub fn is_same_user(messages: &[Message], i: usize) -> bool {
    i > 0
        && matches!(
            (messages.get(i - 1), messages.get(i)),
            (Some(prev), Some(current)) if prev.sender.id == current.sender.id
        )
}
