//! ClickerHub runs multiple choice quizzes with RF clickers.
//!
//! A USB receiver picks up button presses from wireless handsets and
//! forwards them, encrypted, over a serial line. This crate reads that
//! line, cuts it into frames, decrypts them into presses, pairs handsets
//! with a receiver (the first one is the teacher's), collects one answer
//! per student per question inside a timed window, and scores the result.
//!
//! The pipeline, from the wire up:
//!
//! - [`transport`]: the byte pipe to the receiver
//! - [`frame_decoder`]: reassembles delimited 17 byte frames from chunks
//! - [`cipher`] and [`packet_interpreter`]: frames to [`event::ButtonEvent`]s
//! - [`session`]: one connection's read loop, on its own thread
//! - [`registry`] and [`store`]: receivers, their remotes, and persistence
//! - [`collection_window`], [`quiz_runner`] and [`scorer`]: the quiz itself

#![warn(missing_docs)]
pub mod args;
pub mod cipher;
pub mod collection_window;
pub mod connect;
pub mod dummy_receiver;
pub mod event;
pub mod frame_decoder;
pub mod gui;
pub mod packet_interpreter;
pub mod quiz;
pub mod quiz_runner;
pub mod registry;
pub mod scorer;
pub mod session;
pub mod store;
pub mod transport;
