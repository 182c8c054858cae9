//! Timed collection of answers, one window per quiz question.
//!
//! A [`CollectionWindow`] starts out collecting with a countdown. Every tick
//! takes one off the countdown and the window closes when it reaches zero
//! (or when the quiz is advanced early). While it is collecting, each
//! registered remote has at most one response in it: the latest press wins,
//! so a student can correct a mis-press until the window closes. Presses
//! are ordered by capture time, not by delivery, and a press captured after
//! the closing instant never counts even if it was delivered first.
//!
//! The [`QuizController`] walks a list of question ids, one window after
//! the other, until none are left.

use crate::event::{ButtonEvent, Timestamp};

use log::{debug, info};
use std::collections::{BTreeMap, HashSet};

/// Countdown length, in ticks, used when nothing else is configured.
pub const DEFAULT_WINDOW_TICKS: u32 = 30;

/// Where a window's countdown stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Still taking presses, `remaining` ticks to go.
    Collecting {
        /// Ticks until the window closes.
        remaining: u32,
    },
    /// Closed at `at`. Presses captured later do not count.
    Closed {
        /// The closing instant.
        at: Timestamp,
    },
}

/// What happened to an event offered to a window. Only `Accepted` and
/// `Replaced` change the remote's current response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First press from that remote.
    Accepted,
    /// Newer than the remote's current response, and now replaces it.
    Replaced,
    /// Older than the response already held for that remote. It is kept in
    /// case the newer press turns out to be past the closing instant.
    Superseded,
    /// Not registered with the active receiver.
    UnknownRemote,
    /// Captured before this window opened.
    Early,
    /// The window has closed.
    Closed,
}

impl Admission {
    /// Whether the event became the remote's response.
    pub fn counted(self) -> bool {
        matches!(self, Admission::Accepted | Admission::Replaced)
    }
}

/// The answers to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionWindow {
    question_id: String,
    opened_at: Timestamp,
    state: WindowState,
    // Per remote, every admitted press in capture order.
    presses: BTreeMap<String, Vec<ButtonEvent>>,
}

impl CollectionWindow {
    /// Opens a window for `question_id` at `opened_at` that closes after
    /// `ticks` ticks. A zero tick window is closed from the start.
    pub fn open(question_id: impl Into<String>, opened_at: Timestamp, ticks: u32) -> Self {
        let question_id = question_id.into();
        let state = if ticks == 0 {
            WindowState::Closed { at: opened_at }
        } else {
            WindowState::Collecting { remaining: ticks }
        };
        debug!("Window for {} open for {} ticks", question_id, ticks);
        Self {
            question_id,
            opened_at,
            state,
            presses: BTreeMap::new(),
        }
    }

    /// The question this window collects answers to.
    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    /// When the window opened. Earlier presses are not admitted.
    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// The countdown state.
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Whether presses are still taken.
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, WindowState::Collecting { .. })
    }

    /// Ticks left, zero once closed.
    pub fn remaining(&self) -> u32 {
        match self.state {
            WindowState::Collecting { remaining } => remaining,
            WindowState::Closed { .. } => 0,
        }
    }

    /// Advances the countdown. Returns `true` if this tick closed the window.
    pub fn tick(&mut self, now: Timestamp) -> bool {
        match self.state {
            WindowState::Collecting { remaining } if remaining > 1 => {
                self.state = WindowState::Collecting {
                    remaining: remaining - 1,
                };
                false
            }
            WindowState::Collecting { .. } => {
                self.close(now);
                true
            }
            WindowState::Closed { .. } => false,
        }
    }

    /// Closes the window early. Closing a closed window changes nothing.
    pub fn close(&mut self, now: Timestamp) {
        if self.is_collecting() {
            self.state = WindowState::Closed { at: now };
            for presses in self.presses.values_mut() {
                presses.retain(|e| e.timestamp <= now);
            }
            self.presses.retain(|_, presses| !presses.is_empty());
            debug!(
                "Window for {} closed at {} with {} responses",
                self.question_id,
                now,
                self.presses.len()
            );
        }
    }

    /// Offers an event from a remote the caller has already checked is
    /// registered. See [`CollectionWindow::offer`] for the checking version.
    fn admit(&mut self, event: ButtonEvent) -> Admission {
        if !self.is_collecting() {
            return Admission::Closed;
        }
        if event.timestamp < self.opened_at {
            return Admission::Early;
        }
        let presses = self.presses.entry(event.source_remote_id.clone()).or_default();
        let at = presses.partition_point(|e| e.timestamp <= event.timestamp);
        let admission = if presses.is_empty() {
            Admission::Accepted
        } else if at == presses.len() {
            Admission::Replaced
        } else {
            Admission::Superseded
        };
        presses.insert(at, event);
        admission
    }

    /// Offers an event. Only remotes in `roster` are counted.
    pub fn offer(&mut self, event: ButtonEvent, roster: &HashSet<String>) -> Admission {
        if !roster.contains(&event.source_remote_id) {
            return Admission::UnknownRemote;
        }
        self.admit(event)
    }

    /// The press that counts for a remote: its latest one.
    pub fn response(&self, remote_id: &str) -> Option<&ButtonEvent> {
        self.presses.get(remote_id)?.last()
    }

    /// One response per remote that answered, ordered by remote id.
    pub fn responses(&self) -> impl Iterator<Item = &ButtonEvent> {
        self.presses.values().filter_map(|p| p.last())
    }

    /// How many remotes answered.
    pub fn response_count(&self) -> usize {
        self.presses.len()
    }
}

/// Where the quiz stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Phase {
    NotStarted,
    Collecting,
    /// The current window has closed and waits for the quiz to advance.
    Displaying,
    Finished,
}

/// Runs one [`CollectionWindow`] per question, in order.
#[derive(Debug)]
pub struct QuizController {
    question_ids: Vec<String>,
    roster: HashSet<String>,
    ticks: u32,
    current: Option<CollectionWindow>,
    finished: Vec<CollectionWindow>,
}

impl QuizController {
    /// `roster` holds the remote ids registered with the active receiver.
    pub fn new(
        question_ids: Vec<String>,
        roster: impl IntoIterator<Item = String>,
        ticks: u32,
    ) -> Self {
        Self {
            question_ids,
            roster: roster.into_iter().collect(),
            ticks,
            current: None,
            finished: Vec::new(),
        }
    }

    /// Opens the first window. Does nothing if the quiz already started.
    pub fn start(&mut self, now: Timestamp) -> Phase {
        if self.current.is_none() && self.finished.is_empty() {
            self.open_next(now);
        }
        self.phase()
    }

    fn open_next(&mut self, now: Timestamp) {
        let idx = self.finished.len();
        if let Some(id) = self.question_ids.get(idx) {
            info!("Question {} of {} ({})", idx + 1, self.question_ids.len(), id);
            self.current = Some(CollectionWindow::open(id.clone(), now, self.ticks));
        }
    }

    /// Where the quiz stands now.
    pub fn phase(&self) -> Phase {
        match &self.current {
            Some(w) if w.is_collecting() => Phase::Collecting,
            Some(_) => Phase::Displaying,
            None if self.finished.is_empty() && !self.question_ids.is_empty() => Phase::NotStarted,
            None => Phase::Finished,
        }
    }

    /// The window of the current question, open or closed.
    pub fn current(&self) -> Option<&CollectionWindow> {
        self.current.as_ref()
    }

    /// Zero-based index of the current question.
    pub fn question_index(&self) -> usize {
        self.finished.len()
    }

    /// Offers a press to the current window.
    pub fn on_event(&mut self, event: ButtonEvent) -> Admission {
        let admission = match self.current.as_mut() {
            Some(window) => window.offer(event.clone(), &self.roster),
            None => Admission::Closed,
        };
        if !admission.counted() {
            debug!(
                "Dropped {} from {} at {}: {:?}",
                event.button, event.source_remote_id, event.timestamp, admission
            );
        }
        admission
    }

    /// Returns `true` when this tick closed the current window.
    pub fn on_tick(&mut self, now: Timestamp) -> bool {
        self.current.as_mut().is_some_and(|w| w.tick(now))
    }

    /// Closes the current window if it is still open, files it, and opens
    /// the next one.
    pub fn advance(&mut self, now: Timestamp) -> Phase {
        if let Some(mut window) = self.current.take() {
            window.close(now);
            self.finished.push(window);
            self.open_next(now);
        }
        self.phase()
    }

    /// Every window that has been filed, in question order.
    pub fn windows(&self) -> &[CollectionWindow] {
        &self.finished
    }

    /// Closes the current window at `now` and hands back every window.
    pub fn into_windows(mut self, now: Timestamp) -> Vec<CollectionWindow> {
        if let Some(mut window) = self.current.take() {
            window.close(now);
            self.finished.push(window);
        }
        self.finished
    }
}
