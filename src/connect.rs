//! Finds the receiver and the decrypt primitive the command line asks for.

use crate::args::DeviceArgs;
use crate::cipher::{DecryptError, Decryptor, EmulatedCipher, LibraryCipher};
use crate::dummy_receiver::DummyReceiver;
use crate::event::SessionClock;
use crate::gui::{device_selector, GuiError, PortChoice};
use crate::session::ConnectionSession;
use crate::store::{Store, StoreError};
use crate::transport::{available_ports, port_identity, SerialTransport, Transport, TransportError};

use log::{info, warn};
use std::{fmt, sync::Arc};

/// Whichever receiver the command line picked.
pub type BoxedTransport = Box<dyn Transport>;

/// Why no session could be opened.
#[derive(Debug)]
pub enum ConnectError {
    /// The receiver could not be opened or started.
    Transport(TransportError),
    /// The cipher library could not be loaded.
    Decrypt(DecryptError),
    /// The port picker failed.
    Gui(GuiError),
    /// The chosen device could not be saved.
    Store(StoreError),
    /// Hardware was asked for without a cipher library.
    NoCipher,
    /// The user picked no port.
    Cancelled,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::Transport(e) => write!(f, "{}", e),
            ConnectError::Decrypt(e) => write!(f, "{}", e),
            ConnectError::Gui(e) => write!(f, "{}", e),
            ConnectError::Store(e) => write!(f, "{}", e),
            ConnectError::NoCipher => write!(f, "no decrypt primitive, pass --cipher-lib or --simulate"),
            ConnectError::Cancelled => write!(f, "no receiver selected"),
        }
    }
}

impl std::error::Error for ConnectError {}

impl From<TransportError> for ConnectError {
    fn from(value: TransportError) -> Self {
        ConnectError::Transport(value)
    }
}

impl From<DecryptError> for ConnectError {
    fn from(value: DecryptError) -> Self {
        ConnectError::Decrypt(value)
    }
}

impl From<GuiError> for ConnectError {
    fn from(value: GuiError) -> Self {
        ConnectError::Gui(value)
    }
}

impl From<StoreError> for ConnectError {
    fn from(value: StoreError) -> Self {
        ConnectError::Store(value)
    }
}

/// The decrypt primitive: the vendor library when one is given, the
/// emulated one for the simulated receiver.
pub fn decryptor(args: &DeviceArgs) -> Result<Arc<dyn Decryptor>, ConnectError> {
    match (&args.cipher_lib, args.simulate) {
        (Some(path), _) => Ok(Arc::new(LibraryCipher::open(path)?)),
        (None, Some(_)) => Ok(Arc::new(EmulatedCipher)),
        (None, None) => Err(ConnectError::NoCipher),
    }
}

/// Opens the receiver: the simulated one, the given port, the saved device,
/// or one the user picks, in that order. `--serial` overrides whatever
/// serial number the system reported. A hardware receiver is remembered in
/// the store.
pub fn open_transport(args: &DeviceArgs, store: &mut Store) -> Result<BoxedTransport, ConnectError> {
    if let Some(n) = args.simulate {
        info!("Using a simulated receiver with {} remotes", n);
        return Ok(Box::new(DummyReceiver::builder().num_remotes(n).build()));
    }

    let transport = if let Some(port) = &args.port {
        SerialTransport::open(port, args.baud)?
    } else if let Some(saved) = &store.data.device {
        SerialTransport::reacquire(saved, args.baud)?
    } else {
        let ports: Vec<PortChoice> = available_ports()?
            .into_iter()
            .map(|path| PortChoice {
                identity: port_identity(&path),
                path,
            })
            .collect();
        let choice = device_selector(ports)?.ok_or(ConnectError::Cancelled)?;
        SerialTransport::open(choice.path, args.baud)?
    };
    let transport = match &args.serial {
        Some(serial) => transport.with_serial_number(serial.clone()),
        None => transport,
    };
    if transport.descriptor().serial_number.is_none() {
        warn!("The receiver's serial number is unknown, pass --serial");
    }

    store.data.device = Some(transport.descriptor().clone());
    store.save()?;
    Ok(Box::new(transport))
}

/// A fresh session on a freshly opened receiver.
pub fn open_session(
    args: &DeviceArgs,
    store: &mut Store,
    decryptor: Arc<dyn Decryptor>,
    clock: SessionClock,
) -> Result<ConnectionSession<BoxedTransport>, ConnectError> {
    let transport = open_transport(args, store)?;
    Ok(ConnectionSession::open(transport, decryptor, args.platform(), clock)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        device: DeviceArgs,
    }

    fn args(argv: &[&str]) -> DeviceArgs {
        Wrapper::parse_from(std::iter::once("test").chain(argv.iter().copied())).device
    }

    #[test]
    fn hardware_needs_a_cipher_library() {
        assert!(matches!(decryptor(&args(&[])), Err(ConnectError::NoCipher)));
        assert!(decryptor(&args(&["--simulate", "3"])).is_ok());
        assert!(matches!(
            decryptor(&args(&["--cipher-lib", "/nonexistent/libremote.so"])),
            Err(ConnectError::Decrypt(_))
        ));
    }

    #[test]
    fn simulated_session_opens_without_touching_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ron");
        let mut store = Store::open(&path).unwrap();
        let device = args(&["--simulate", "2"]);
        let session = open_session(
            &device,
            &mut store,
            decryptor(&device).unwrap(),
            SessionClock::new(),
        );
        assert!(session.is_ok());
        assert!(store.data.device.is_none());
        assert!(!path.exists());
    }
}
