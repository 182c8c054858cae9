//! Registers clicker handsets and runs quizzes with them.

use clap::Parser;
use clickerhub::{
    args::{CommandTask, DeviceArgs, HubArgs, QuizCommand, RegisterCommand},
    connect::{decryptor, open_session},
    event::SessionClock,
    gui::{quiz_screen, registration_screen, run_until_stop, Control},
    quiz::Quiz,
    quiz_runner::{Flow, Input, QuizRunner, Ticker, TICK_PERIOD},
    registry::{CommitOutcome, RegistrationSession},
    scorer::QuizReport,
    session::SessionMessage,
    store::Store,
};

use crossterm::event::KeyCode;
use log::{info, warn};
use std::{error::Error, sync::mpsc};

// Example:
// cargo run --bin clickerhub -- --simulate 5 register --name "Room 101"
// cargo run --bin clickerhub -- --simulate 5 quiz --quiz demos/fractions.ron

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = HubArgs::parse();
    let mut store = Store::open(&args.device.store)?;

    match args.command {
        CommandTask::Receivers => list_receivers(&store),
        CommandTask::Register(cmd) => register(&args.device, &mut store, cmd)?,
        CommandTask::RenameReceiver(cmd) => {
            store.data.registry.rename_receiver(&cmd.receiver, &cmd.name)?;
            store.save()?;
        }
        CommandTask::RenameRemote(cmd) => {
            let rid = store.data.registry.resolve(cmd.receiver.as_deref())?.receiver_id.clone();
            store.data.registry.rename_remote(&rid, &cmd.remote, &cmd.name)?;
            store.save()?;
        }
        CommandTask::DeleteRemote(cmd) => {
            let rid = store.data.registry.resolve(cmd.receiver.as_deref())?.receiver_id.clone();
            let removed = store.data.registry.delete_remote(&rid, &cmd.remote)?;
            store.save()?;
            println!("Deleted {} ({})", removed.display_name(), removed.remote_id);
        }
        CommandTask::Select(cmd) => {
            store.data.registry.select(&cmd.receiver)?;
            store.save()?;
        }
        CommandTask::Quiz(cmd) => run_quiz(&args.device, &mut store, cmd)?,
    }

    Ok(())
}

fn list_receivers(store: &Store) {
    let current = store.data.registry.current().map(|r| r.receiver_id.as_str());
    if store.data.registry.receivers().is_empty() {
        println!("No receivers registered yet");
    }
    for receiver in store.data.registry.receivers() {
        let mark = if Some(receiver.receiver_id.as_str()) == current { "*" } else { " " };
        println!("{} {}  {}", mark, receiver.receiver_id, receiver.receiver_name);
        for remote in &receiver.remotes {
            println!(
                "      {:<14} {:<20} {}",
                remote.remote_id,
                remote.display_name(),
                receiver.role_label(&remote.remote_id).unwrap_or_default()
            );
        }
    }
}

struct Registering {
    discovered: RegistrationSession,
    rx: mpsc::Receiver<SessionMessage>,
    fault: Option<String>,
    save: bool,
    reconnect: bool,
}

fn register(device: &DeviceArgs, store: &mut Store, cmd: RegisterCommand) -> Result<(), Box<dyn Error>> {
    let receiver = match &cmd.receiver {
        Some(id) => store.data.registry.resolve(Some(id.as_str()))?.clone(),
        None => {
            let receiver = store
                .data
                .registry
                .create_receiver(cmd.name.as_deref().unwrap_or(""))
                .clone();
            store.save()?;
            receiver
        }
    };

    let decryptor = decryptor(device)?;
    let clock = SessionClock::new();
    let (tx, rx) = mpsc::channel();
    let mut handle = open_session(device, store, decryptor.clone(), clock)?.run(tx.clone());

    let mut state = Registering {
        discovered: RegistrationSession::new(),
        rx,
        fault: None,
        save: false,
        reconnect: false,
    };
    loop {
        run_until_stop(
            &mut state,
            |s| {
                for message in s.rx.try_iter() {
                    match message {
                        SessionMessage::Button(e) => {
                            s.discovered.observe(&e.source_remote_id);
                        }
                        SessionMessage::Closed(Some(e)) => s.fault = Some(e.to_string()),
                        SessionMessage::Closed(None) => {}
                    }
                }
                Control::Continue
            },
            |s, frame| registration_screen(frame, &receiver, &s.discovered, s.fault.as_deref()),
            |s, key| match key {
                KeyCode::Enter => {
                    s.save = true;
                    Control::Stop
                }
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
        match open_session(device, store, decryptor.clone(), clock) {
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

    if !state.save {
        println!("Registration cancelled");
        return Ok(());
    }
    let outcome = store
        .data
        .registry
        .commit(&receiver.receiver_id, &state.discovered)?;
    store.save()?;
    match outcome {
        CommitOutcome::Added(n) => println!("Added {} remotes to {}", n, receiver.receiver_name),
        CommitOutcome::AllAlreadyAdded => println!("All remotes were already added"),
        CommitOutcome::NothingDiscovered => println!("No remotes were discovered"),
    }
    Ok(())
}

struct Running {
    runner: QuizRunner,
    rx: mpsc::Receiver<Input>,
    flow: Flow,
    reconnect: bool,
}

fn run_quiz(device: &DeviceArgs, store: &mut Store, cmd: QuizCommand) -> Result<(), Box<dyn Error>> {
    let quiz = Quiz::from_path(&cmd.quiz)?;
    let receiver = store.data.registry.resolve(cmd.receiver.as_deref())?.clone();
    if receiver.students().next().is_none() {
        warn!("Receiver {} has no student remotes", receiver.receiver_name);
    }
    info!(
        "Running {} ({} questions) on {}",
        quiz.title,
        quiz.questions.len(),
        receiver.receiver_name
    );

    let decryptor = decryptor(device)?;
    let clock = SessionClock::new();
    let (tx, rx) = mpsc::channel::<Input>();
    let mut handle = open_session(device, store, decryptor.clone(), clock)?.run(tx.clone());
    let mut ticker = Ticker::spawn(tx.clone(), clock, TICK_PERIOD);

    let mut runner = QuizRunner::new(quiz, receiver, cmd.window, clock).auto_advance(cmd.auto_advance);
    let flow = runner.start();
    let mut state = Running {
        runner,
        rx,
        flow,
        reconnect: false,
    };

    while state.flow == Flow::Continue || state.flow == Flow::Faulted {
        run_until_stop(
            &mut state,
            |s| {
                for input in s.rx.try_iter() {
                    s.flow = s.runner.handle(input);
                    if matches!(s.flow, Flow::Finished | Flow::Stopped) {
                        return Control::Stop;
                    }
                }
                Control::Continue
            },
            |s, frame| quiz_screen(frame, &s.runner.status()),
            |s, key| {
                let input = match key {
                    KeyCode::Char('n') | KeyCode::Enter => Input::Advance,
                    KeyCode::Char('q') | KeyCode::Esc => Input::Stop,
                    KeyCode::Char('r') if s.runner.fault().is_some() => {
                        s.reconnect = true;
                        return Control::Stop;
                    }
                    _ => return Control::Continue,
                };
                s.flow = s.runner.handle(input);
                match s.flow {
                    Flow::Finished | Flow::Stopped => Control::Stop,
                    _ => Control::Continue,
                }
            },
        )?;
        if !state.reconnect {
            break;
        }
        state.reconnect = false;
        handle.join();
        match open_session(device, store, decryptor.clone(), clock) {
            Ok(session) => {
                handle = session.run(tx.clone());
                state.runner.clear_fault();
                state.flow = Flow::Continue;
            }
            Err(e) => warn!("Reconnect failed: {}", e),
        }
    }

    ticker.stop();
    handle.join();

    let report = state.runner.report();
    print_report(&report);
    if let Some(path) = &cmd.report {
        report.to_path(path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_report(report: &QuizReport) {
    println!("{}: {} students, {} questions", report.test_title, report.total_students, report.total_questions);
    for s in &report.student_results {
        println!(
            "  {:<20} {:>4}/{:<4} correct {:>2}  incorrect {:>2}  unanswered {:>2}",
            s.remote_name,
            s.score_obtained,
            s.max_score,
            s.correct_answers,
            s.incorrect_answered,
            s.unanswered
        );
    }
    for q in &report.question_stats {
        println!(
            "  {:<20} {:>3} responses, {:.0}% correct",
            q.question_id, q.total_responses, q.percentage_correct
        );
    }
    println!("Average score: {:.1}%", report.average_score);
}
