//! Outgoing typing indicator.
//!
//! The first keystroke after idling emits `Start`. Once no keystroke has
//! arrived for the timeout, `Stop` is emitted exactly once. Sending a message
//! or leaving the chat also stops.

use std::time::Duration;

use tokio::time::Instant;

use parley_shared::constants::TYPING_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

#[derive(Debug)]
pub struct TypingController {
    timeout: Duration,
    /// `Some` while typing.
    last_keystroke: Option<Instant>,
}

impl Default for TypingController {
    fn default() -> Self {
        Self::new(TYPING_TIMEOUT)
    }
}

impl TypingController {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_keystroke: None,
        }
    }

    pub fn on_keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_idle = self.last_keystroke.is_none();
        self.last_keystroke = Some(now);
        was_idle.then_some(TypingSignal::Start)
    }

    /// When the stop timer should fire, if typing.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_keystroke.map(|last| last + self.timeout)
    }

    pub fn on_deadline(&mut self, now: Instant) -> Option<TypingSignal> {
        let last = self.last_keystroke?;
        if now.saturating_duration_since(last) < self.timeout {
            return None;
        }
        self.last_keystroke = None;
        Some(TypingSignal::Stop)
    }

    /// A message was sent.
    pub fn on_send(&mut self) -> Option<TypingSignal> {
        self.reset()
    }

    /// Leave the typing state immediately.
    pub fn reset(&mut self) -> Option<TypingSignal> {
        self.last_keystroke.take().map(|_| TypingSignal::Stop)
    }

    pub fn is_typing(&self) -> bool {
        self.last_keystroke.is_some()
    }
}
