//! The decoded unit of the whole pipeline: a [`ButtonEvent`] says which
//! handset pressed which button, and when.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// A button on a handset. The receiver reports buttons as integer codes
/// `1..=8`, see [`Button::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Button {
    A,
    B,
    C,
    D,
    E,
    F,
    Y,
    N,
}

impl Button {
    /// Every button, in code order.
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::C,
        Button::D,
        Button::E,
        Button::F,
        Button::Y,
        Button::N,
    ];

    /// Maps a wire code to a button. Anything outside `1..=8` is `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1..=8 => Some(Self::ALL[(code - 1) as usize]),
            _ => None,
        }
    }

    /// The wire code of this button.
    pub fn code(self) -> u8 {
        self as u8 + 1
    }

    /// The multiple choice option this button selects, `A` is the first
    /// option. `Y` and `N` never select an option.
    pub fn option_index(self) -> Option<usize> {
        match self {
            Button::Y | Button::N => None,
            other => Some(other as usize),
        }
    }

    /// The label printed on the handset.
    pub fn symbol(self) -> char {
        match self {
            Button::A => 'A',
            Button::B => 'B',
            Button::C => 'C',
            Button::D => 'D',
            Button::E => 'E',
            Button::F => 'F',
            Button::Y => 'Y',
            Button::N => 'N',
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Monotonic capture time in milliseconds since the [`SessionClock`] epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Whole seconds since the epoch.
    pub fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1000)
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}

/// Shared time base for the read loop and the countdown timer, so that
/// event timestamps and window closing instants are comparable.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    /// A clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// The current capture time.
    pub fn now(&self) -> Timestamp {
        self.at(Instant::now())
    }

    /// The capture time of `instant`, zero if it predates the epoch.
    pub fn at(&self, instant: Instant) -> Timestamp {
        let elapsed = instant.saturating_duration_since(self.epoch);
        Timestamp(elapsed.as_millis() as u64)
    }

    /// Time since the epoch.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One validated button press. Duplicate physical presses produce duplicate
/// events, nothing is deduplicated at this level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    /// Id of the handset that was pressed.
    pub source_remote_id: String,
    /// The button that was pressed.
    pub button: Button,
    /// When the chunk carrying the press was read.
    pub timestamp: Timestamp,
}

impl ButtonEvent {
    /// A press of `button` on `source_remote_id`, captured at `timestamp`.
    pub fn new(source_remote_id: impl Into<String>, button: Button, timestamp: Timestamp) -> Self {
        Self {
            source_remote_id: source_remote_id.into(),
            button,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_the_fixed_table() {
        let symbols: String = (1..=8)
            .map(|c| Button::from_code(c).unwrap().symbol())
            .collect();
        assert_eq!(symbols, "ABCDEFYN");
        assert_eq!(Button::from_code(0), None);
        assert_eq!(Button::from_code(9), None);
        assert_eq!(Button::from_code(-1), None);
    }

    #[test]
    fn code_is_inverse_of_from_code() {
        for b in Button::ALL {
            assert_eq!(Button::from_code(b.code() as i64), Some(b));
        }
    }

    #[test]
    fn only_letters_select_options() {
        assert_eq!(Button::A.option_index(), Some(0));
        assert_eq!(Button::D.option_index(), Some(3));
        assert_eq!(Button::F.option_index(), Some(5));
        assert_eq!(Button::Y.option_index(), None);
        assert_eq!(Button::N.option_index(), None);
    }

    #[test]
    fn timestamps_display_as_seconds() {
        assert_eq!(Timestamp(1500).to_string(), "1.500s");
        assert_eq!(Timestamp::from_secs(30), Timestamp(30_000));
    }
}
