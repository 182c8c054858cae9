//! Drives a quiz from a single input queue.
//!
//! Button presses from the connection session, countdown ticks from the
//! [`Ticker`] and operator commands all arrive as [`Input`]s on one channel
//! and are handled one at a time by a [`QuizRunner`], so the collection
//! window only ever has one writer.

use crate::collection_window::{Phase, QuizController};
use crate::event::{SessionClock, Timestamp};
use crate::quiz::Quiz;
use crate::registry::Receiver;
use crate::scorer::{score, QuizReport};
use crate::session::{CancelToken, SessionMessage};
use crate::transport::TransportError;

use log::{info, warn};
use std::{
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Period of one countdown tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Everything a [`QuizRunner`] reacts to.
#[derive(Debug)]
pub enum Input {
    /// A press, or the end of the connection.
    Session(SessionMessage),
    /// One countdown tick, stamped on the session clock.
    Tick(Timestamp),
    /// Close the current question, if it is still open, and go to the next.
    Advance,
    /// End the quiz where it stands.
    Stop,
}

impl From<SessionMessage> for Input {
    fn from(value: SessionMessage) -> Self {
        Input::Session(value)
    }
}

/// Sends an [`Input::Tick`] every period until stopped.
pub struct Ticker {
    stop: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Starts ticking into `tx` once per `period`, without drifting.
    pub fn spawn(tx: Sender<Input>, clock: SessionClock, period: Duration) -> Self {
        let stop = CancelToken::new();
        let th_stop = stop.clone();
        let thread = thread::spawn(move || {
            let start = Instant::now();
            let mut n = 1u32;
            // Sleep in short slices so a stop request is noticed quickly.
            let slice = Duration::from_millis(50);
            loop {
                let deadline = start + period * n;
                loop {
                    if th_stop.is_cancelled() {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    spin_sleep::sleep((deadline - now).min(slice));
                }
                if tx.send(Input::Tick(clock.now())).is_err() {
                    return;
                }
                n += 1;
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stops the thread and waits for it.
    pub fn stop(&mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What the caller should do after an input was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep feeding inputs.
    Continue,
    /// The connection failed. The quiz state is kept, the caller decides
    /// whether to reconnect.
    Faulted,
    /// Every question is done.
    Finished,
    /// The operator stopped the quiz.
    Stopped,
}

/// One student line of the live view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentStatus {
    /// What the remote is called.
    pub remote_name: String,
    /// Whether the window holds a response from this remote.
    pub answered: bool,
    /// Only known once the window has closed.
    pub correct: Option<bool>,
}

/// Everything the live view shows.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct QuizStatus {
    pub title: String,
    pub phase: Phase,
    pub question_number: usize,
    pub total_questions: usize,
    pub question_text: String,
    pub options: Vec<String>,
    pub remaining: u32,
    pub students: Vec<StudentStatus>,
    pub fault: Option<String>,
}

/// A quiz in progress: its windows, the receiver's roster and any fault.
pub struct QuizRunner {
    quiz: Quiz,
    receiver: Receiver,
    controller: QuizController,
    clock: SessionClock,
    auto_advance: bool,
    fault: Option<TransportError>,
}

impl QuizRunner {
    /// A runner for `quiz` with `receiver`'s remotes, `ticks` ticks per
    /// question. Nothing opens before [`QuizRunner::start`].
    pub fn new(quiz: Quiz, receiver: Receiver, ticks: u32, clock: SessionClock) -> Self {
        let roster = receiver.remotes.iter().map(|r| r.remote_id.clone());
        let controller = QuizController::new(quiz.question_ids(), roster, ticks);
        Self {
            quiz,
            receiver,
            controller,
            clock,
            auto_advance: false,
            fault: None,
        }
    }

    /// Moves on to the next question as soon as a countdown runs out.
    pub fn auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    /// Opens the first question, or finishes straight away if there is none.
    pub fn start(&mut self) -> Flow {
        let now = self.clock.now();
        to_flow(self.controller.start(now))
    }

    /// Applies one input.
    pub fn handle(&mut self, input: Input) -> Flow {
        match input {
            Input::Session(SessionMessage::Button(event)) => {
                self.controller.on_event(event);
                Flow::Continue
            }
            Input::Session(SessionMessage::Closed(Some(e))) => {
                warn!("Receiver lost during quiz: {}", e);
                self.fault = Some(e);
                Flow::Faulted
            }
            // We closed it ourselves.
            Input::Session(SessionMessage::Closed(None)) => Flow::Continue,
            Input::Tick(now) => {
                if self.controller.on_tick(now) {
                    info!("Time is up for question {}", self.controller.question_index() + 1);
                    if self.auto_advance {
                        return to_flow(self.controller.advance(now));
                    }
                }
                Flow::Continue
            }
            Input::Advance => {
                let now = self.clock.now();
                to_flow(self.controller.advance(now))
            }
            Input::Stop => Flow::Stopped,
        }
    }

    /// The fault that ended the last session, until cleared.
    pub fn fault(&self) -> Option<&TransportError> {
        self.fault.as_ref()
    }

    /// Call once a new session is running again.
    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Where the quiz stands.
    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    /// A snapshot for the live view.
    pub fn status(&self) -> QuizStatus {
        let phase = self.controller.phase();
        let index = self.controller.question_index();
        let question = self.quiz.questions.get(index);
        let window = self.controller.current();
        let closed = phase == Phase::Displaying;

        let students = self
            .receiver
            .students()
            .map(|remote| {
                let response = window.and_then(|w| w.response(&remote.remote_id));
                let correct = match (closed, question, response) {
                    (true, Some(q), Some(e)) => Some(q.option_for(e.button).is_some_and(|o| o.is_correct)),
                    (true, _, None) => Some(false),
                    _ => None,
                };
                StudentStatus {
                    remote_name: remote.display_name().to_owned(),
                    answered: response.is_some(),
                    correct,
                }
            })
            .collect();

        QuizStatus {
            title: self.quiz.title.clone(),
            phase,
            question_number: (index + 1).min(self.quiz.questions.len()),
            total_questions: self.quiz.questions.len(),
            question_text: question.map(|q| q.question_text.clone()).unwrap_or_default(),
            options: question
                .map(|q| q.options.iter().map(|o| o.option_text.clone()).collect())
                .unwrap_or_default(),
            remaining: window.map_or(0, |w| w.remaining()),
            students,
            fault: self.fault.as_ref().map(|e| e.to_string()),
        }
    }

    /// Closes whatever is still open and scores the quiz.
    pub fn report(self) -> QuizReport {
        let windows = self.controller.into_windows(self.clock.now());
        score(&self.quiz, &windows, &self.receiver)
    }
}

fn to_flow(phase: Phase) -> Flow {
    match phase {
        Phase::Finished => Flow::Finished,
        _ => Flow::Continue,
    }
}

/// Feeds inputs from `rx` to the runner until it finishes, stops, faults,
/// or every sender is gone. `on_update` sees the runner after each input.
pub fn drive<F>(runner: &mut QuizRunner, rx: &mpsc::Receiver<Input>, mut on_update: F) -> Flow
where
    F: FnMut(&QuizRunner),
{
    while let Ok(input) = rx.recv() {
        let flow = runner.handle(input);
        on_update(runner);
        if flow != Flow::Continue {
            return flow;
        }
    }
    Flow::Stopped
}
