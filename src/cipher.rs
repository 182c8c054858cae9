//! The boundary to the receiver's decryption primitive.
//!
//! Frames are encrypted with a key derived from the receiver's serial
//! number. The primitive itself is opaque to us: it is deterministic, takes
//! the key and a 17 byte payload, and returns text. Most of the time that
//! text is a small JSON object, sometimes it is noise, and either is a
//! legitimate result.

use crate::frame_decoder::{Frame, FRAME_LEN};

use libc::{c_char, c_int, c_void, size_t};
use log::{debug, info};
use std::{
    ffi::{CStr, CString},
    fmt,
    path::Path,
};

/// Which derivation of the key the host needs. Windows reports the serial
/// number through a raw string descriptor, everything else through the
/// device's serial number string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    /// Key from the raw USB string descriptor.
    Windows,
    /// Key from the serial number string.
    Other,
}

impl Platform {
    /// The rules of the host we run on.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// The key bytes handed to the decryption primitive. Derived once per
/// connection and never carried over to another one.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// A key made of exactly these bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        SessionKey(bytes.into())
    }

    /// Derives the key from what the device reported.
    ///
    /// On [`Platform::Windows`] this takes every second byte of the USB
    /// string descriptor, starting at offset 2 (the low bytes of its UTF-16
    /// code units). Elsewhere, and when no descriptor could be read, each
    /// UTF-16 code unit of the serial number string is truncated to a byte.
    /// Both produce the same bytes for the same serial number.
    pub fn derive(platform: Platform, descriptor: Option<&[u8]>, serial_number: &str) -> Self {
        match (platform, descriptor) {
            (Platform::Windows, Some(desc)) => {
                SessionKey(desc.iter().skip(2).step_by(2).copied().collect())
            }
            (Platform::Windows, None) => {
                debug!("No string descriptor, deriving key from the serial number string");
                Self::from_serial_string(serial_number)
            }
            (Platform::Other, _) => Self::from_serial_string(serial_number),
        }
    }

    fn from_serial_string(serial_number: &str) -> Self {
        SessionKey(serial_number.encode_utf16().map(|u| u as u8).collect())
    }

    /// The raw key, as handed to the primitive.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

/// Why a frame could not be decrypted.
#[derive(Debug)]
pub enum DecryptError {
    /// The primitive rejected the payload.
    Failed(i32),
    /// The library could not be loaded or lacks the primitive.
    Library(String),
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptError::Failed(code) => write!(f, "decrypt failed with code {}", code),
            DecryptError::Library(msg) => write!(f, "cipher library: {}", msg),
        }
    }
}

impl std::error::Error for DecryptError {}

/// The decryption primitive. Implementations must be deterministic.
pub trait Decryptor: Send + Sync {
    /// Decrypts one frame with `key` into text.
    fn decrypt(&self, key: &SessionKey, payload: &Frame) -> Result<String, DecryptError>;
}

type RawDecrypt = unsafe extern "C" fn(
    key: *const u8,
    key_len: size_t,
    payload: *const u8,
    payload_len: size_t,
    out: *mut c_char,
    out_cap: size_t,
) -> c_int;

/// Symbol the vendor library has to export.
pub const DECRYPT_SYMBOL: &str = "remote_decrypt";

const OUT_CAP: usize = 256;

/// The vendor's primitive, loaded from a shared library at run time.
pub struct LibraryCipher {
    handle: *mut c_void,
    decrypt: RawDecrypt,
}

// The handle is only used to close the library on drop, and the primitive
// is required to be reentrant.
unsafe impl Send for LibraryCipher {}
unsafe impl Sync for LibraryCipher {}

impl LibraryCipher {
    /// Loads the library at `path` and looks up [`DECRYPT_SYMBOL`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecryptError> {
        let path = path.as_ref();
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|e| DecryptError::Library(e.to_string()))?;
        let c_symbol =
            CString::new(DECRYPT_SYMBOL).map_err(|e| DecryptError::Library(e.to_string()))?;

        unsafe {
            let handle = libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL);
            if handle.is_null() {
                return Err(DecryptError::Library(last_dl_error()));
            }
            let sym = libc::dlsym(handle, c_symbol.as_ptr());
            if sym.is_null() {
                let msg = last_dl_error();
                libc::dlclose(handle);
                return Err(DecryptError::Library(msg));
            }
            info!("Loaded {} from {}", DECRYPT_SYMBOL, path.display());
            Ok(Self {
                handle,
                decrypt: std::mem::transmute::<*mut c_void, RawDecrypt>(sym),
            })
        }
    }
}

fn last_dl_error() -> String {
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown dlopen error".to_owned()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

impl Decryptor for LibraryCipher {
    fn decrypt(&self, key: &SessionKey, payload: &Frame) -> Result<String, DecryptError> {
        let mut out = [0u8; OUT_CAP];
        let written = unsafe {
            (self.decrypt)(
                key.as_bytes().as_ptr(),
                key.as_bytes().len(),
                payload.as_ptr(),
                payload.len(),
                out.as_mut_ptr() as *mut c_char,
                out.len(),
            )
        };
        if written < 0 {
            return Err(DecryptError::Failed(written));
        }
        let written = (written as usize).min(OUT_CAP);
        Ok(String::from_utf8_lossy(&out[..written]).into_owned())
    }
}

impl Drop for LibraryCipher {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

/// Length of a handset id in an emulated frame.
pub const MAC_LEN: usize = 6;

/// A stand-in cipher used by the simulated receiver, so the whole tool can
/// run without hardware or the vendor library.
///
/// Plain frame layout: 6 byte handset id, 1 byte button code, zero padding.
/// The frame is XORed with the key, repeated. Delimiter bytes are avoided by
/// [`EmulatedCipher::encrypt`] returning `None` for frames that would contain
/// `\r\n`, so callers can pick another press.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedCipher;

impl EmulatedCipher {
    /// Builds the frame a handset `mac` pressing `code` would send.
    pub fn encrypt(&self, key: &SessionKey, mac: &[u8; MAC_LEN], code: u8) -> Option<Frame> {
        let mut plain = [0u8; FRAME_LEN];
        plain[..MAC_LEN].copy_from_slice(mac);
        plain[MAC_LEN] = code;
        let frame = xor_with_key(key, plain);
        let has_delimiter = frame.windows(2).any(|w| w == [0x0D, 0x0A]);
        (!has_delimiter).then_some(frame)
    }
}

fn xor_with_key(key: &SessionKey, mut data: Frame) -> Frame {
    if !key.as_bytes().is_empty() {
        for (b, k) in data.iter_mut().zip(key.as_bytes().iter().cycle()) {
            *b ^= k;
        }
    }
    data
}

/// Formats a handset id the way the receiver reports it.
pub fn format_mac(mac: &[u8]) -> String {
    mac.iter().map(|b| format!("{:02X}", b)).collect()
}

impl Decryptor for EmulatedCipher {
    fn decrypt(&self, key: &SessionKey, payload: &Frame) -> Result<String, DecryptError> {
        let plain = xor_with_key(key, *payload);
        if plain[MAC_LEN + 1..].iter().any(|&b| b != 0) {
            // Wrong key or line noise, hand back garbage like the real thing.
            return Ok(String::from_utf8_lossy(&plain).into_owned());
        }
        Ok(format!(
            "{{\"MAC\":\"{}\",\"value\":{}}}",
            format_mac(&plain[..MAC_LEN]),
            plain[MAC_LEN]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A USB string descriptor for serial "AB12": bLength, bDescriptorType,
    /// then UTF-16LE.
    const DESCRIPTOR: [u8; 10] = [10, 3, b'A', 0, b'B', 0, b'1', 0, b'2', 0];

    #[test]
    fn windows_takes_every_second_byte_from_offset_two() {
        let key = SessionKey::derive(Platform::Windows, Some(&DESCRIPTOR), "ignored");
        assert_eq!(key.as_bytes(), b"AB12");
    }

    #[test]
    fn other_platforms_use_the_serial_string() {
        let key = SessionKey::derive(Platform::Other, Some(&DESCRIPTOR), "XY9");
        assert_eq!(key.as_bytes(), b"XY9");
    }

    #[test]
    fn both_derivations_agree_on_ascii_serials() {
        let from_desc = SessionKey::derive(Platform::Windows, Some(&DESCRIPTOR), "");
        let from_str = SessionKey::derive(Platform::Other, None, "AB12");
        assert_eq!(from_desc, from_str);
    }

    #[test]
    fn non_ascii_serial_is_truncated_per_code_unit() {
        // U+0141 truncates to 0x41.
        let key = SessionKey::derive(Platform::Other, None, "\u{0141}1");
        assert_eq!(key.as_bytes(), &[0x41, b'1']);
    }

    #[test]
    fn emulated_cipher_round_trips_a_press() {
        let key = SessionKey::from_bytes(b"SN0042".to_vec());
        let mac = [0xCC, 0xF9, 0x57, 0x8E, 0x0D, 0x8A];
        let frame = EmulatedCipher.encrypt(&key, &mac, 3).unwrap();
        let text = EmulatedCipher.decrypt(&key, &frame).unwrap();
        assert_eq!(text, "{\"MAC\":\"CCF9578E0D8A\",\"value\":3}");
    }

    #[test]
    fn emulated_cipher_with_wrong_key_is_noise() {
        let key = SessionKey::from_bytes(b"SN0042".to_vec());
        let other = SessionKey::from_bytes(b"SN9999".to_vec());
        let frame = EmulatedCipher.encrypt(&key, &[1, 2, 3, 4, 5, 6], 1).unwrap();
        let text = EmulatedCipher.decrypt(&other, &frame).unwrap();
        assert!(!text.trim_start().starts_with('{'));
    }

    #[test]
    fn missing_library_is_an_error() {
        assert!(LibraryCipher::open("/nonexistent/libremote.so").is_err());
    }
}
