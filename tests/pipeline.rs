//! Whole pipeline runs: bytes in, scores out.

use clickerhub::{
    cipher::{format_mac, DecryptError, Decryptor, EmulatedCipher, Platform, SessionKey, MAC_LEN},
    collection_window::Phase,
    dummy_receiver::DummyReceiver,
    event::{Button, ButtonEvent, SessionClock, Timestamp},
    frame_decoder::{encode_frame, Frame},
    quiz::{Question, Quiz, QuizOption},
    quiz_runner::{drive, Flow, Input, QuizRunner, Ticker},
    registry::{Receiver, RegistrationSession, Registry},
    session::{ConnectionSession, SessionMessage},
    transport::{DeviceDescriptor, Transport, TransportError},
};

use std::{collections::VecDeque, sync::mpsc, sync::Arc, time::Duration};

const TEACHER: [u8; MAC_LEN] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0x00];
const S1: [u8; MAC_LEN] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0x01];
const S2: [u8; MAC_LEN] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0x02];

/// Hands out scripted reads, then reports the device gone.
struct Scripted {
    reads: VecDeque<Vec<u8>>,
    descriptor: DeviceDescriptor,
}

impl Scripted {
    fn new(serial: &str) -> Self {
        Self {
            reads: VecDeque::new(),
            descriptor: DeviceDescriptor {
                vendor_id: 0xB1B0,
                product_id: 0x8055,
                serial_number: Some(serial.to_owned()),
                port: None,
            },
        }
    }
}

impl Transport for Scripted {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let chunk = self.reads.pop_front().ok_or(TransportError::Disconnected)?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn close(&mut self) {}

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

/// Emulated cipher, except that frames starting with 0xFF decrypt to
/// "garbage".
struct Noisy;

impl Decryptor for Noisy {
    fn decrypt(&self, key: &SessionKey, payload: &Frame) -> Result<String, DecryptError> {
        if payload[0] == 0xFF {
            return Ok("garbage".to_owned());
        }
        EmulatedCipher.decrypt(key, payload)
    }
}

fn key(serial: &str) -> SessionKey {
    SessionKey::derive(Platform::Other, None, serial)
}

fn wire(serial: &str, mac: &[u8; MAC_LEN], code: u8) -> Vec<u8> {
    let frame = EmulatedCipher
        .encrypt(&key(serial), mac, code)
        .expect("test frames avoid the delimiter");
    encode_frame(&frame)
}

fn open(serial: &str) -> ConnectionSession<Scripted> {
    ConnectionSession::open(Scripted::new(serial), Arc::new(Noisy), Platform::Other, SessionClock::new()).unwrap()
}

/// Feeds `bytes` to the session in awkward pieces.
fn ingest_split(session: &mut ConnectionSession<Scripted>, bytes: &[u8], piece: usize) -> Vec<ButtonEvent> {
    bytes
        .chunks(piece)
        .flat_map(|chunk| session.ingest(chunk))
        .collect()
}

fn at(mut event: ButtonEvent, secs: u64) -> Input {
    event.timestamp = Timestamp::from_secs(secs);
    SessionMessage::Button(event).into()
}

fn receiver() -> Receiver {
    let mut reg = Registry::new();
    let rid = reg.create_receiver("Room 101").receiver_id.clone();
    let mut session = RegistrationSession::new();
    for mac in [TEACHER, S1, S2] {
        session.observe(&format_mac(&mac));
    }
    reg.commit(&rid, &session).unwrap();
    reg.find_by_receiver(&rid).unwrap().clone()
}

fn quiz() -> Quiz {
    Quiz {
        test_id: "t".to_owned(),
        title: "Pipeline".to_owned(),
        questions: vec![Question {
            question_id: "q1".to_owned(),
            question_text: "Pick A".to_owned(),
            options: ["A", "B", "C", "D"]
                .iter()
                .map(|o| QuizOption {
                    option_id: o.to_string(),
                    option_text: format!("Option {}", o),
                    is_correct: *o == "A",
                })
                .collect(),
        }],
    }
}

/// Runs one question from t=0: every input in `inputs`, then 30 one-second
/// ticks.
fn run_question(inputs: Vec<Input>) -> QuizRunner {
    let mut runner = QuizRunner::new(quiz(), receiver(), 30, SessionClock::new());
    runner.start();
    for input in inputs {
        assert_eq!(runner.handle(input), Flow::Continue);
    }
    for s in 1..=30 {
        runner.handle(Input::Tick(Timestamp::from_secs(s)));
    }
    assert_eq!(runner.phase(), Phase::Displaying);
    runner
}

#[test]
fn scenario_a_two_students_answer() {
    let mut session = open("RX1");
    let mut bytes = wire("RX1", &S1, 1);
    bytes.extend(wire("RX1", &S2, 2));
    let events = ingest_split(&mut session, &bytes, 5);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].button, Button::A);
    assert_eq!(events[1].button, Button::B);

    let mut events = events.into_iter();
    let runner = run_question(vec![
        at(events.next().unwrap(), 1),
        at(events.next().unwrap(), 5),
    ]);

    let report = runner.report();
    assert_eq!(report.total_students, 2);
    let s1 = &report.student_results[0];
    let s2 = &report.student_results[1];
    assert_eq!(s1.remote_id, format_mac(&S1));
    assert_eq!((s1.correct_answers, s1.answered_questions), (1, 1));
    assert_eq!((s2.correct_answers, s2.incorrect_answered, s2.answered_questions), (0, 1, 1));
    assert_eq!(report.question_stats[0].options[0].response_count, 1);
    assert_eq!(report.question_stats[0].options[1].response_count, 1);
}

#[test]
fn scenario_b_latest_press_wins() {
    let mut session = open("RX1");
    let mut bytes = wire("RX1", &S1, 1);
    bytes.extend(wire("RX1", &S1, 3));
    let mut events = ingest_split(&mut session, &bytes, 7).into_iter();

    let first = events.next().unwrap();
    let second = events.next().unwrap();
    // Delivered newest first, the capture time still decides.
    let runner = run_question(vec![at(second, 4), at(first, 2)]);

    let report = runner.report();
    let s1 = &report.student_results[0];
    assert_eq!(s1.answer_details[0].selected_option_id.as_deref(), Some("C"));
    assert!(!s1.answer_details[0].is_correct);
}

#[test]
fn scenario_c_garbage_is_dropped_and_decoding_continues() {
    let mut session = open("RX1");
    let mut bytes = vec![0xFF; 17];
    bytes.extend_from_slice(b"\r\n");
    bytes.extend(wire("RX1", &S2, 4));
    let events = ingest_split(&mut session, &bytes, 3);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_remote_id, format_mac(&S2));
    assert_eq!(events[0].button, Button::D);
}

#[test]
fn reconnect_starts_from_a_clean_slate() {
    let full = wire("RX1", &S1, 2);
    let (head, tail) = full.split_at(9);

    let mut first = open("RX1");
    assert!(first.ingest(head).is_empty());
    drop(first);

    // The new connection has a different key and must not see `head`.
    let mut second = open("RX2");
    let mut bytes = tail.to_vec();
    bytes.extend(wire("RX2", &S2, 5));
    let events = second.ingest(&bytes);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_remote_id, format_mac(&S2));
    assert_eq!(events[0].button, Button::E);
}

#[test]
fn disconnect_reaches_the_runner_as_a_fault() {
    let mut transport = Scripted::new("RX1");
    transport.reads.push_back(wire("RX1", &S1, 1));
    let clock = SessionClock::new();
    let mut runner = QuizRunner::new(quiz(), receiver(), 30, clock);
    runner.start();
    let session = ConnectionSession::open(transport, Arc::new(Noisy), Platform::Other, clock).unwrap();

    let (tx, rx) = mpsc::channel::<Input>();
    let mut handle = session.run(tx);
    assert_eq!(drive(&mut runner, &rx, |_| {}), Flow::Faulted);
    assert!(matches!(runner.fault(), Some(TransportError::Disconnected)));
    handle.join();

    let report = runner.report();
    assert_eq!(report.student_results[0].correct_answers, 1);
}

#[test]
fn simulated_receiver_runs_a_quiz_to_the_end() {
    let dummy = DummyReceiver::builder()
        .num_remotes(4)
        .interval(Duration::from_millis(1))
        .noise(0.3)
        .seed(11)
        .build();
    let mut reg = Registry::new();
    let rid = reg.create_receiver("Sim").receiver_id.clone();
    let mut discovered = RegistrationSession::new();
    for id in dummy.remote_ids() {
        discovered.observe(&id);
    }
    reg.commit(&rid, &discovered).unwrap();
    let receiver = reg.find_by_receiver(&rid).unwrap().clone();

    let clock = SessionClock::new();
    let session = ConnectionSession::open(dummy, Arc::new(EmulatedCipher), Platform::Other, clock).unwrap();
    let (tx, rx) = mpsc::channel::<Input>();
    let mut handle = session.run(tx.clone());
    let mut ticker = Ticker::spawn(tx, clock, Duration::from_millis(20));

    let mut runner = QuizRunner::new(quiz(), receiver, 10, clock).auto_advance(true);
    runner.start();
    assert_eq!(drive(&mut runner, &rx, |_| {}), Flow::Finished);
    ticker.stop();
    handle.join();

    let report = runner.report();
    assert_eq!(report.total_students, 3);
    for s in &report.student_results {
        assert_eq!(s.correct_answers + s.incorrect_answered + s.unanswered, 1);
        assert_eq!(s.score_obtained, s.correct_answers as u32 * 10);
    }
}
