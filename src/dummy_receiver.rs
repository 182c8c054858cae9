//! A pretend receiver, so everything above the transport can be exercised
//! without hardware.
//!
//! A background thread makes random handsets press random buttons, encrypts
//! each press with [`EmulatedCipher`] under a key derived from the fake
//! serial number, and queues the bytes. Reads then hand those bytes out in
//! random sized chunks, now and then with some line noise mixed in, which
//! is exactly the mess the frame decoder has to cope with.

use crate::cipher::{format_mac, EmulatedCipher, Platform, SessionKey, MAC_LEN};
use crate::frame_decoder::encode_frame;
use crate::transport::{DeviceDescriptor, Transport, TransportError, RECEIVER_IDS};

use log::{debug, info};
use rand::prelude::*;
use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Serial number the pretend receiver reports.
pub const DUMMY_SERIAL: &str = "SIM0000001";

/// Handsets are told apart by the last two bytes of their id.
pub const MAX_REMOTES: usize = 1 << 16;

enum Signal {
    Interval(Duration),
    Noise(f64),
    Stop,
}

#[derive(Debug, Default)]
struct Line {
    bytes: VecDeque<u8>,
    unplugged: bool,
}

/// A simulated receiver with a fixed set of handsets.
pub struct DummyReceiver {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    line: Arc<Mutex<Line>>,
    remotes: Vec<[u8; MAC_LEN]>,
    descriptor: DeviceDescriptor,
    started: bool,
    rng: StdRng,
}

/// Configures a [`DummyReceiver`].
pub struct DummyReceiverBuilder {
    num_remotes: usize,
    interval: Duration,
    noise: f64,
    seed: Option<u64>,
}

impl DummyReceiverBuilder {
    fn new() -> Self {
        Self {
            num_remotes: 4,
            interval: Duration::from_millis(500),
            noise: 0.1,
            seed: None,
        }
    }

    /// How many handsets are pressing, at most [`MAX_REMOTES`].
    pub fn num_remotes(mut self, num_remotes: usize) -> Self {
        self.num_remotes = num_remotes.min(MAX_REMOTES);
        self
    }

    /// Time between two presses.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probability, per press, that a junk fragment goes out first.
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise.clamp(0.0, 1.0);
        self
    }

    /// Makes the presses repeatable, and picks other handset ids.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Starts the generator.
    pub fn build(self) -> DummyReceiver {
        // Handset ids stay the same from run to run so registrations stick.
        let mut mac_rng = StdRng::seed_from_u64(self.seed.unwrap_or(0));
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let remotes: Vec<[u8; MAC_LEN]> = (0..self.num_remotes)
            .map(|i| {
                let mut mac = [0u8; MAC_LEN];
                mac_rng.fill(&mut mac[..MAC_LEN - 2]);
                mac[MAC_LEN - 2..].copy_from_slice(&(i as u16).to_be_bytes());
                mac
            })
            .collect();

        let (tx, rx) = mpsc::channel::<Signal>();
        let line = Arc::new(Mutex::new(Line::default()));
        let th_line = Arc::clone(&line);
        let th_remotes = remotes.clone();
        let mut th_rng = StdRng::seed_from_u64(rng.gen());
        let key = SessionKey::derive(Platform::Other, None, DUMMY_SERIAL);
        let mut interval = self.interval;
        let mut noise = self.noise;

        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Ok(Signal::Interval(new_interval)) => interval = new_interval,
                Ok(Signal::Noise(new_noise)) => noise = new_noise,
                Ok(Signal::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if th_remotes.is_empty() {
                        continue;
                    }
                    let bytes = random_press(&mut th_rng, &key, &th_remotes, noise);
                    th_line.lock().unwrap().bytes.extend(bytes);
                }
            }
        });

        DummyReceiver {
            handle: Some(handle),
            tx,
            line,
            remotes,
            descriptor: DeviceDescriptor {
                vendor_id: RECEIVER_IDS[0].0,
                product_id: RECEIVER_IDS[0].1,
                serial_number: Some(DUMMY_SERIAL.to_owned()),
                port: None,
            },
            started: false,
            rng,
        }
    }
}

fn random_press(rng: &mut StdRng, key: &SessionKey, remotes: &[[u8; MAC_LEN]], noise: f64) -> Vec<u8> {
    let mut out = Vec::new();
    if rng.gen_bool(noise) {
        let len = rng.gen_range(1..30);
        out.extend((0..len).map(|_| rng.gen_range(0x20..0x7F)));
        out.extend_from_slice(b"\r\n");
    }
    // Some presses encrypt to a frame containing the delimiter; the real
    // receiver would garble those too, so pick again.
    loop {
        let mac = remotes[rng.gen_range(0..remotes.len())];
        let code = rng.gen_range(1..=8);
        if let Some(frame) = EmulatedCipher.encrypt(key, &mac, code) {
            out.extend(encode_frame(&frame));
            return out;
        }
    }
}

impl DummyReceiver {
    /// Four remotes, a press every half second, some noise.
    pub fn builder() -> DummyReceiverBuilder {
        DummyReceiverBuilder::new()
    }

    /// Handset ids as the receiver reports them.
    pub fn remote_ids(&self) -> Vec<String> {
        self.remotes.iter().map(|m| format_mac(m)).collect()
    }

    /// Changes the time between presses.
    pub fn set_interval(&self, interval: Duration) {
        // The generator only stops once the receiver is dropped.
        let _ = self.tx.send(Signal::Interval(interval));
    }

    /// Changes the noise probability.
    pub fn set_noise(&self, noise: f64) {
        let _ = self.tx.send(Signal::Noise(noise.clamp(0.0, 1.0)));
    }

    /// A handle that makes the next read fail as if the cable was pulled.
    pub fn plug(&self) -> DummyPlug {
        DummyPlug {
            line: Arc::clone(&self.line),
        }
    }

    /// Stops generating presses.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            if thread.join().is_err() {
                debug!("Dummy receiver generator panicked");
            }
        }
    }
}

/// Lets a test or a demo pull the pretend cable.
#[derive(Clone)]
pub struct DummyPlug {
    line: Arc<Mutex<Line>>,
}

impl DummyPlug {
    /// Every later read and write fails with a disconnect.
    pub fn unplug(&self) {
        self.line.lock().unwrap().unplugged = true;
    }
}

impl Transport for DummyReceiver {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.line.lock().unwrap().unplugged {
            return Err(TransportError::Disconnected);
        }
        if bytes == crate::transport::START_COMMAND {
            info!("Dummy receiver started");
            self.started = true;
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = {
            let mut line = self.line.lock().unwrap();
            if line.unplugged {
                return Err(TransportError::Disconnected);
            }
            if !self.started {
                // Nothing is forwarded before START.
                line.bytes.clear();
                0
            } else {
                let n = self.rng.gen_range(1..=buf.len()).min(line.bytes.len());
                for (slot, byte) in buf.iter_mut().zip(line.bytes.drain(..n)) {
                    *slot = byte;
                }
                n
            }
        };
        if n == 0 {
            thread::sleep(Duration::from_millis(20));
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.stop();
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

impl Drop for DummyReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
