//! Shows every press from a receiver's registered remotes, with its role,
//! so each handset can be checked before a quiz.

use clap::Parser;
use clickerhub::{
    args::MonitorArgs,
    connect::{decryptor, open_session},
    event::SessionClock,
    gui::{monitor_screen, run_until_stop, Control, MonitorLine},
    session::SessionMessage,
    store::Store,
};

use crossterm::event::KeyCode;
use log::warn;
use std::{error::Error, sync::mpsc};

const MAX_LINES: usize = 500;

struct Monitoring {
    lines: Vec<MonitorLine>,
    rx: mpsc::Receiver<SessionMessage>,
    fault: Option<String>,
    reconnect: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MonitorArgs::parse();
    let mut store = Store::open(&args.device.store)?;
    let receiver = store.data.registry.resolve(args.receiver.as_deref())?.clone();

    let decryptor = decryptor(&args.device)?;
    let clock = SessionClock::new();
    let (tx, rx) = mpsc::channel();
    let mut handle = open_session(&args.device, &mut store, decryptor.clone(), clock)?.run(tx.clone());

    let mut state = Monitoring {
        lines: Vec::new(),
        rx,
        fault: None,
        reconnect: false,
    };
    loop {
        run_until_stop(
            &mut state,
            |s| {
                for message in s.rx.try_iter() {
                    match message {
                        SessionMessage::Button(e) => s.lines.extend(MonitorLine::from_event(&receiver, &e)),
                        SessionMessage::Closed(Some(e)) => s.fault = Some(e.to_string()),
                        SessionMessage::Closed(None) => {}
                    }
                }
                if s.lines.len() > MAX_LINES {
                    s.lines.drain(..s.lines.len() - MAX_LINES);
                }
                Control::Continue
            },
            |s, frame| monitor_screen(frame, &receiver, &s.lines, s.fault.as_deref()),
            |s, key| match key {
                KeyCode::Char('r') if s.fault.is_some() => {
                    s.reconnect = true;
                    Control::Stop
                }
                KeyCode::Char('q') | KeyCode::Esc => Control::Stop,
                _ => Control::Continue,
            },
        )?;
        if !state.reconnect {
            break;
        }
        state.reconnect = false;
        handle.join();
        match open_session(&args.device, &mut store, decryptor.clone(), clock) {
            Ok(session) => {
                handle = session.run(tx.clone());
                state.fault = None;
            }
            Err(e) => {
                warn!("Reconnect failed: {}", e);
                state.fault = Some(e.to_string());
            }
        }
    }
    handle.join();

    Ok(())
}
