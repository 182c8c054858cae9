//! The duplex byte pipe to the USB receiver.
//!
//! The receiver enumerates as a USB serial device. [`SerialTransport`] wraps
//! a [`serial2::SerialPort`]; anything else that can hand out byte chunks
//! (the [simulated receiver](crate::dummy_receiver), test fixtures) can stand
//! in for it through the [`Transport`] trait. No retrying happens here, a
//! fault goes straight back to whoever opened the transport.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serial2::SerialPort;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

/// Known receiver vendor/product pairs.
pub const RECEIVER_IDS: [(u16, u16); 2] = [(0xB1B0, 0x8055), (0xB1B0, 0x5508)];

/// Default line speed of the receiver.
pub const DEFAULT_BAUD: u32 = 9600;

/// How many bytes we ask the transport for per read.
pub const CHUNK_SIZE: usize = 64;

/// How long a single read may block before the read loop gets to look at
/// its cancellation handle again.
pub const READ_POLL: Duration = Duration::from_millis(100);

/// Command that makes the receiver start forwarding handset presses.
pub const START_COMMAND: &[u8] = b"START\n";

/// Enough to find the same physical receiver again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// `None` when the system could not tell.
    pub serial_number: Option<String>,
    /// Where the receiver was last seen.
    pub port: Option<PathBuf>,
}

impl DeviceDescriptor {
    /// Whether the ids are a known receiver's.
    pub fn is_receiver(&self) -> bool {
        RECEIVER_IDS.contains(&(self.vendor_id, self.product_id))
    }

    /// Whether `other` is the device this descriptor was saved from. The
    /// serial number only counts if one was saved.
    pub fn matches(&self, other: &DeviceDescriptor) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && match &self.serial_number {
                Some(sn) => other.serial_number.as_ref() == Some(sn),
                None => true,
            }
    }
}

/// Why the receiver cannot be talked to.
#[derive(Debug)]
pub enum TransportError {
    /// No such device, or no port matching a saved descriptor.
    DeviceNotFound,
    /// The system refused to open the port.
    AuthorizationDenied,
    /// The receiver went away.
    Disconnected,
    /// The receiver cannot be used as it is: nothing on the line frames,
    /// or it gave us nothing to derive a key from.
    Protocol(String),
    /// Any other I/O failure.
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::DeviceNotFound => write!(f, "receiver not found"),
            TransportError::AuthorizationDenied => write!(f, "access to the receiver was denied"),
            TransportError::Disconnected => write!(f, "receiver disconnected"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            TransportError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => TransportError::DeviceNotFound,
            io::ErrorKind::PermissionDenied => TransportError::AuthorizationDenied,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => TransportError::Disconnected,
            _ => TransportError::Io(value),
        }
    }
}

/// A connected receiver.
pub trait Transport: Send {
    /// Sends a command to the receiver.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads whatever arrived, up to `buf.len()` bytes. `Ok(0)` means
    /// nothing arrived within the poll interval; a gone device is
    /// [`TransportError::Disconnected`].
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Releases the device. Safe to call any number of times.
    fn close(&mut self);

    /// What the device reported about itself when it was opened.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// The raw USB serial number string descriptor, where the platform lets
    /// us read it.
    fn string_descriptor(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read_chunk(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        (**self).descriptor()
    }

    fn string_descriptor(&mut self) -> Option<Vec<u8>> {
        (**self).string_descriptor()
    }
}

/// A receiver on a serial port.
pub struct SerialTransport {
    port: Option<SerialPort>,
    descriptor: DeviceDescriptor,
}

impl SerialTransport {
    /// Opens the receiver at `path`.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self, TransportError> {
        let path = path.as_ref();
        if !path.exists() && cfg!(unix) {
            return Err(TransportError::DeviceNotFound);
        }
        let mut port = SerialPort::open(path, baud)?;
        port.set_read_timeout(READ_POLL)?;

        let descriptor = port_identity(path).unwrap_or_else(|| {
            debug!("No USB identity for {}, assuming a receiver", path.display());
            DeviceDescriptor {
                vendor_id: RECEIVER_IDS[0].0,
                product_id: RECEIVER_IDS[0].1,
                serial_number: None,
                port: Some(path.to_owned()),
            }
        });
        info!(
            "Opened {} ({:04x}:{:04x})",
            path.display(),
            descriptor.vendor_id,
            descriptor.product_id
        );

        Ok(Self {
            port: Some(port),
            descriptor,
        })
    }

    /// Finds and opens the receiver a [`DeviceDescriptor`] was saved from.
    /// A saved serial number fills in for one the system cannot report.
    pub fn reacquire(saved: &DeviceDescriptor, baud: u32) -> Result<Self, TransportError> {
        Ok(Self::find_saved(saved, baud)?.remember_serial(saved))
    }

    fn find_saved(saved: &DeviceDescriptor, baud: u32) -> Result<Self, TransportError> {
        if let Some(path) = &saved.port {
            if port_identity(path).map_or(true, |found| saved.matches(&found)) && path.exists() {
                return Self::open(path, baud);
            }
        }
        let path = available_ports()?
            .into_iter()
            .find(|p| port_identity(p).is_some_and(|found| saved.matches(&found)))
            .ok_or(TransportError::DeviceNotFound)?;
        Self::open(path, baud)
    }

    fn remember_serial(self, saved: &DeviceDescriptor) -> Self {
        match (&self.descriptor.serial_number, &saved.serial_number) {
            (None, Some(sn)) => self.with_serial_number(sn.clone()),
            _ => self,
        }
    }

    /// Sets the serial number when the operating system could not tell us.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.descriptor.serial_number = Some(serial_number.into());
        self
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        port.write_all(bytes)?;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        match port.read(buf) {
            // A serial device that reads zero bytes without timing out is gone.
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed receiver port");
        }
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// serial2 cannot read USB descriptors, so this is rebuilt from the
    /// serial number string.
    fn string_descriptor(&mut self) -> Option<Vec<u8>> {
        self.descriptor.serial_number.as_deref().map(string_descriptor_for)
    }
}

/// A USB string descriptor (`bLength`, `bDescriptorType` 3, UTF-16LE text)
/// carrying `text`.
pub fn string_descriptor_for(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut desc = Vec::with_capacity(2 + units.len() * 2);
    desc.push((2 + units.len() * 2).min(u8::MAX as usize) as u8);
    desc.push(0x03);
    for unit in units {
        desc.extend_from_slice(&unit.to_le_bytes());
    }
    desc
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serial ports the operating system knows about.
pub fn available_ports() -> Result<Vec<PathBuf>, TransportError> {
    Ok(SerialPort::available_ports()?)
}

/// Looks up the USB identity behind a serial port.
#[cfg(target_os = "linux")]
pub fn port_identity(path: &Path) -> Option<DeviceDescriptor> {
    use std::fs;

    let name = fs::canonicalize(path).ok()?.file_name()?.to_owned();
    // /sys/class/tty/ttyACM0/device points at the USB interface; the
    // vendor, product and serial attributes live on its parent.
    let interface = fs::canonicalize(Path::new("/sys/class/tty").join(name).join("device")).ok()?;
    let usb_device = interface.parent()?;
    let read = |attr: &str| -> Option<String> {
        fs::read_to_string(usb_device.join(attr))
            .ok()
            .map(|s| s.trim().to_owned())
    };
    let hex = |attr: &str| read(attr).and_then(|s| u16::from_str_radix(&s, 16).ok());

    Some(DeviceDescriptor {
        vendor_id: hex("idVendor")?,
        product_id: hex("idProduct")?,
        serial_number: read("serial"),
        port: Some(path.to_owned()),
    })
}

/// Looks up the USB identity behind a serial port. Only Linux exposes it.
#[cfg(not(target_os = "linux"))]
pub fn port_identity(_path: &Path) -> Option<DeviceDescriptor> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{Platform, SessionKey};

    fn desc(serial: Option<&str>) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: 0xB1B0,
            product_id: 0x8055,
            serial_number: serial.map(str::to_owned),
            port: None,
        }
    }

    #[test]
    fn descriptor_matching() {
        assert!(desc(None).matches(&desc(Some("X1"))));
        assert!(desc(Some("X1")).matches(&desc(Some("X1"))));
        assert!(!desc(Some("X1")).matches(&desc(Some("X2"))));
        assert!(!desc(Some("X1")).matches(&desc(None)));

        let mut other = desc(None);
        other.product_id = 0x5508;
        assert!(!desc(None).matches(&other));
        assert!(other.is_receiver());
    }

    #[test]
    fn io_errors_map_to_transport_faults() {
        let e = |k| TransportError::from(io::Error::from(k));
        assert!(matches!(e(io::ErrorKind::NotFound), TransportError::DeviceNotFound));
        assert!(matches!(
            e(io::ErrorKind::PermissionDenied),
            TransportError::AuthorizationDenied
        ));
        assert!(matches!(e(io::ErrorKind::BrokenPipe), TransportError::Disconnected));
        assert!(matches!(e(io::ErrorKind::Other), TransportError::Io(_)));
    }

    #[test]
    fn string_descriptor_gives_the_serial_number_key() {
        let desc = string_descriptor_for("AB12");
        assert_eq!(desc, vec![10, 3, b'A', 0, b'B', 0, b'1', 0, b'2', 0]);
        assert_eq!(
            SessionKey::derive(Platform::Windows, Some(&desc), ""),
            SessionKey::derive(Platform::Other, None, "AB12")
        );
    }

    #[test]
    fn missing_port_is_not_found() {
        let res = SerialTransport::open("/dev/definitely-not-a-receiver", DEFAULT_BAUD);
        assert!(matches!(res, Err(TransportError::DeviceNotFound)));
    }
}
