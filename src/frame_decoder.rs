//! Splits the raw byte stream coming off the receiver into fixed length
//! encrypted frames.
//!
//! The receiver terminates every frame with `\r\n`, but the transport hands
//! us whatever it has in arbitrary chunks: a chunk may hold several frames,
//! part of one, or the tail of one and the head of the next. The
//! [`FrameDecoder`] keeps the bytes it could not resolve yet in a residual
//! buffer and only emits a frame once its delimiter has been seen.

use log::{debug, warn};
use std::fmt;

/// Terminates every frame on the wire.
pub const DELIMITER: [u8; 2] = [0x0D, 0x0A];

/// Length of an encrypted frame, not counting the delimiter.
pub const FRAME_LEN: usize = 17;

/// Upper bound on undelimited bytes held between reads. A healthy line puts
/// a delimiter every `FRAME_LEN + 2` bytes, so this is plenty.
pub const MAX_RESIDUAL: usize = 256;

/// One complete, correctly sized, still encrypted message.
pub type Frame = [u8; FRAME_LEN];

/// Trouble on the line that framing could not absorb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The residual buffer grew past [`MAX_RESIDUAL`] without a delimiter.
    /// The buffer has been discarded.
    Overrun {
        /// Bytes in the buffer when it was discarded.
        len: usize,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Overrun { len } => {
                write!(f, "{} bytes without a frame delimiter", len)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// What one [`FrameDecoder::push`] produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Every frame the chunk completed, in arrival order.
    pub frames: Vec<Frame>,
    /// Set when the bytes left over after the last delimiter overran the
    /// residual buffer. The frames above were taken out before it was
    /// discarded.
    pub overrun: Option<FrameError>,
}

/// Incremental frame splitter. One instance belongs to one connection and is
/// dropped with it, so residual bytes never outlive the connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    residual: Vec<u8>,
    // Everything before this index has already been searched for a delimiter.
    scanned: usize,
    discarded: usize,
}

impl FrameDecoder {
    /// An empty decoder, for a connection that has not read anything yet.
    pub fn new() -> Self {
        Self {
            residual: Vec::with_capacity(MAX_RESIDUAL),
            scanned: 0,
            discarded: 0,
        }
    }

    /// Feeds one chunk and returns every frame it completed, in arrival
    /// order. Wrong length candidates are dropped with a diagnostic.
    pub fn push(&mut self, chunk: &[u8]) -> Decoded {
        self.residual.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        // A delimiter may straddle the previous chunk boundary, so step back
        // one byte from where the last scan stopped.
        let mut cursor = self.scanned.saturating_sub(1).max(start);

        while cursor + 1 < self.residual.len() {
            if self.residual[cursor..cursor + 2] == DELIMITER {
                let candidate = &self.residual[start..cursor];
                match Frame::try_from(candidate) {
                    Ok(frame) => frames.push(frame),
                    Err(_) => {
                        debug!(
                            "Dropping {} byte candidate, expected {}",
                            candidate.len(),
                            FRAME_LEN
                        );
                        self.discarded += 1;
                    }
                }
                cursor += DELIMITER.len();
                start = cursor;
            } else {
                cursor += 1;
            }
        }

        self.residual.drain(..start);
        self.scanned = self.residual.len();

        let mut overrun = None;
        if self.residual.len() > MAX_RESIDUAL {
            let len = self.residual.len();
            warn!("Residual buffer overrun at {} bytes, resynchronising", len);
            self.reset();
            overrun = Some(FrameError::Overrun { len });
        }

        Decoded { frames, overrun }
    }

    /// Bytes waiting for a delimiter.
    pub fn residual(&self) -> &[u8] {
        &self.residual
    }

    /// How many delimited candidates were thrown away for having the wrong
    /// length.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Forgets every byte still waiting for a delimiter.
    pub fn reset(&mut self) {
        self.residual.clear();
        self.scanned = 0;
    }
}

/// Appends the delimiter to a frame, producing what the receiver sends.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_LEN + DELIMITER.len());
    out.extend_from_slice(frame);
    out.extend_from_slice(&DELIMITER);
    out
}
