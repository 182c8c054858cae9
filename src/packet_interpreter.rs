//! Turns decrypted frames into [`ButtonEvent`]s.
//!
//! A good decrypt is a small JSON object, `{"MAC":"<handset id>","value":n}`
//! with `n` in `1..=8`. The line is noisy, so everything else is an expected
//! outcome and comes back as a tagged [`Reject`] instead of an error.

use crate::cipher::{Decryptor, SessionKey};
use crate::event::{Button, ButtonEvent, Timestamp};
use crate::frame_decoder::Frame;

use log::{debug, trace};
use serde::Deserialize;
use std::{fmt, sync::Arc};

/// What a handset reported, before it is stamped with a capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePress {
    /// Handset id, as the receiver spells it.
    pub mac: String,
    /// Which button was pressed.
    pub button: Button,
}

/// Why a decrypted payload did not produce an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    /// The decrypt failed outright.
    Undecryptable,
    /// The text does not start with `{`, usually a partial or wrong-key
    /// decrypt.
    NotJson,
    /// Looked like JSON but did not fit the schema.
    Malformed(String),
    /// A well formed payload with a button code outside `1..=8`.
    ButtonOutOfRange(i64),
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reject::Undecryptable => write!(f, "undecryptable payload"),
            Reject::NotJson => write!(f, "payload is not JSON"),
            Reject::Malformed(why) => write!(f, "malformed payload: {}", why),
            Reject::ButtonOutOfRange(v) => write!(f, "button value {} out of range", v),
        }
    }
}

// Members other than these two are ignored.
#[derive(Deserialize)]
struct Payload {
    #[serde(rename = "MAC")]
    mac: String,
    value: i64,
}

/// Validates decrypted text against the payload schema.
pub fn parse_payload(text: &str) -> Result<RemotePress, Reject> {
    if !text.trim_start().starts_with('{') {
        return Err(Reject::NotJson);
    }

    let Payload { mac, value } =
        serde_json::from_str::<Payload>(text).map_err(|e| Reject::Malformed(e.to_string()))?;
    if mac.is_empty() {
        return Err(Reject::Malformed("empty MAC".to_owned()));
    }
    let button = Button::from_code(value).ok_or(Reject::ButtonOutOfRange(value))?;

    Ok(RemotePress { mac, button })
}

/// Decrypts frames with one connection's key and validates the result.
#[derive(Clone)]
pub struct PacketInterpreter {
    decryptor: Arc<dyn Decryptor>,
    key: SessionKey,
}

impl PacketInterpreter {
    /// An interpreter for one connection, keyed with that connection's key.
    pub fn new(decryptor: Arc<dyn Decryptor>, key: SessionKey) -> Self {
        Self { decryptor, key }
    }

    /// The key every frame is decrypted with.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Full interpretation with the reason for any discard.
    pub fn interpret(&self, frame: &Frame) -> Result<RemotePress, Reject> {
        let text = self
            .decryptor
            .decrypt(&self.key, frame)
            .map_err(|e| {
                debug!("Decrypt failed: {}", e);
                Reject::Undecryptable
            })?;
        parse_payload(&text)
    }

    /// Interprets a frame captured at `at`, logging and swallowing rejects.
    pub fn event(&self, frame: &Frame, at: Timestamp) -> Option<ButtonEvent> {
        match self.interpret(frame) {
            Ok(RemotePress { mac, button }) => Some(ButtonEvent::new(mac, button, at)),
            Err(Reject::NotJson) => {
                trace!("Ignoring non-JSON decrypt");
                None
            }
            Err(reject) => {
                debug!("Ignoring frame: {}", reject);
                None
            }
        }
    }
}
