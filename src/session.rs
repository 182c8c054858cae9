//! One connection to a receiver, from open to close.
//!
//! A [`ConnectionSession`] owns the transport, a fresh [`FrameDecoder`] and
//! the key derived for this connection. Running it moves all of that onto a
//! reader thread that loops "read chunk, decode, interpret, dispatch" and
//! sends every [`ButtonEvent`] down a channel. The thread stops when its
//! [`SessionHandle`] is closed or the transport fails; in both cases the
//! residual bytes die with it, so nothing leaks into the next connection.

use crate::cipher::{Decryptor, Platform, SessionKey};
use crate::event::{ButtonEvent, SessionClock};
use crate::frame_decoder::{FrameDecoder, FrameError};
use crate::packet_interpreter::PacketInterpreter;
use crate::transport::{Transport, TransportError, CHUNK_SIZE, START_COMMAND};

use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{self, JoinHandle},
};

/// After this many overruns without a single frame in between, the line is
/// treated as broken.
pub const MAX_CONSECUTIVE_OVERRUNS: usize = 4;

/// What a running session reports.
#[derive(Debug)]
pub enum SessionMessage {
    /// A validated press.
    Button(ButtonEvent),
    /// The read loop has exited. `None` means it was cancelled.
    Closed(Option<TransportError>),
}

/// Cloneable cancellation flag shared between a session and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether any clone was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An opened receiver together with everything needed to read it: the
/// connection's own decoder, its key and the clock that stamps presses.
pub struct ConnectionSession<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
    interpreter: PacketInterpreter,
    clock: SessionClock,
    overruns: usize,
    last_overrun: Option<FrameError>,
}

impl<T: Transport + 'static> ConnectionSession<T> {
    /// Derives the session key and tells the receiver to start sending.
    ///
    /// Fails with [`TransportError::Protocol`] when the device reported
    /// nothing to derive a key from, since no frame could ever decrypt.
    pub fn open(
        mut transport: T,
        decryptor: Arc<dyn Decryptor>,
        platform: Platform,
        clock: SessionClock,
    ) -> Result<Self, TransportError> {
        let string_descriptor = transport.string_descriptor();
        let serial_number = transport
            .descriptor()
            .serial_number
            .clone()
            .unwrap_or_default();
        let key = SessionKey::derive(platform, string_descriptor.as_deref(), &serial_number);
        debug!("Derived {:?} for {:?}", key, platform);
        if key.as_bytes().is_empty() {
            transport.close();
            return Err(TransportError::Protocol(
                "the receiver reported no serial number to derive the session key from".to_owned(),
            ));
        }

        if let Err(e) = transport.write(START_COMMAND) {
            transport.close();
            return Err(e);
        }
        info!("Receiver started");

        Ok(Self {
            transport,
            decoder: FrameDecoder::new(),
            interpreter: PacketInterpreter::new(decryptor, key),
            clock,
            overruns: 0,
            last_overrun: None,
        })
    }

    /// Decodes one chunk and returns the events it completed. Frames that
    /// were complete before an overrun still count.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<ButtonEvent> {
        let at = self.clock.now();
        let decoded = self.decoder.push(chunk);
        if !decoded.frames.is_empty() {
            self.overruns = 0;
        }
        if let Some(e) = decoded.overrun {
            self.overruns += 1;
            self.last_overrun = Some(e);
        }
        decoded
            .frames
            .iter()
            .filter_map(|frame| self.interpreter.event(frame, at))
            .collect()
    }

    /// Overruns since the last decoded frame.
    pub fn overruns(&self) -> usize {
        self.overruns
    }

    /// Starts the read loop on its own thread. Events go to `tx`, wrapped in
    /// whatever message type the owner's queue carries.
    pub fn run<M>(self, tx: Sender<M>) -> SessionHandle
    where
        M: From<SessionMessage> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let th_cancel = cancel.clone();
        let thread = thread::spawn(move || {
            let reason = self.read_loop(&th_cancel, &tx);
            if let Some(e) = &reason {
                warn!("Session ended: {}", e);
            } else {
                info!("Session closed");
            }
            // The owner may already be gone, nothing to do about it.
            let _ = tx.send(SessionMessage::Closed(reason).into());
        });
        SessionHandle {
            cancel,
            thread: Some(thread),
        }
    }

    fn read_loop<M>(mut self, cancel: &CancelToken, tx: &Sender<M>) -> Option<TransportError>
    where
        M: From<SessionMessage>,
    {
        let mut buffer = [0u8; CHUNK_SIZE];

        let reason = loop {
            if cancel.is_cancelled() {
                break None;
            }
            let read = self.transport.read_chunk(&mut buffer);
            // Whatever arrived while we were being cancelled is dropped.
            if cancel.is_cancelled() {
                break None;
            }
            let len = match read {
                Ok(0) => continue,
                Ok(len) => len,
                Err(e) => break Some(e),
            };

            for event in self.ingest(&buffer[..len]) {
                debug!("{} pressed {}", event.source_remote_id, event.button);
                if tx.send(SessionMessage::Button(event).into()).is_err() {
                    debug!("Event receiver dropped, stopping");
                    cancel.cancel();
                    break;
                }
            }
            if self.overruns >= MAX_CONSECUTIVE_OVERRUNS {
                let last = self.last_overrun.as_ref().map(|e| e.to_string()).unwrap_or_default();
                break Some(TransportError::Protocol(format!(
                    "{} overruns without a frame, last: {}",
                    self.overruns, last
                )));
            }
        };

        self.transport.close();
        reason
    }
}

/// The owner's side of a running session.
pub struct SessionHandle {
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Stops the read loop without waiting for a read in flight. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this session.
    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the reader thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Closes the session and waits for the reader thread to exit.
    pub fn join(&mut self) {
        self.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Session reader thread panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
