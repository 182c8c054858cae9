//! What the live views draw.

use crate::collection_window::Phase;
use crate::event::{Button, ButtonEvent, Timestamp};
use crate::quiz_runner::QuizStatus;
use crate::registry::{Receiver, RegistrationSession};

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

fn framed<'a>(title: String, keys: Vec<Span<'a>>) -> Block<'a> {
    Block::default()
        .title(Title::from(title.magenta().bold()).alignment(Alignment::Center))
        .title(
            Title::from(Line::from(keys))
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL)
}

fn fault_line(fault: Option<&str>) -> Option<Line<'static>> {
    fault.map(|f| {
        Line::from(vec![
            " Receiver lost: ".red().bold(),
            f.to_owned().red(),
            " <R> to reconnect ".into(),
        ])
    })
}

/// Handsets seen so far, and the role each would get on saving.
pub fn registration_screen(
    frame: &mut Frame,
    receiver: &Receiver,
    session: &RegistrationSession,
    fault: Option<&str>,
) {
    let block = framed(
        format!(" Registering remotes for {} ", receiver.receiver_name),
        vec![
            " Save ".into(),
            "<Enter>".magenta().bold(),
            " Cancel ".into(),
            "<Q> ".magenta().bold(),
        ],
    );

    let mut lines = vec![
        Line::from(" Press any button on each remote. The first one registered is the teacher's."),
        Line::from(""),
    ];
    lines.extend(fault_line(fault));
    let mut students = receiver.students().count();
    let mut has_teacher = receiver.teacher().is_some();
    for d in session.discovered() {
        let label = if receiver.find_remote(&d.remote_id).is_some() {
            "already registered".to_owned()
        } else if !has_teacher {
            has_teacher = true;
            "Teacher Remote".to_owned()
        } else {
            students += 1;
            format!("Student Remote {}", students)
        };
        lines.push(Line::from(vec![
            format!(" {:<14}", d.remote_id).bold(),
            format!(" {}", label).into(),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(format!(" {} remotes seen", session.discovered().len())));

    frame.render_widget(Paragraph::new(lines).block(block), frame.size());
}

/// The current question, its countdown and who has answered.
pub fn quiz_screen(frame: &mut Frame, status: &QuizStatus) {
    let keys = match status.phase {
        Phase::Collecting => vec![" Close question ".into(), "<N>".magenta().bold()],
        _ => vec![" Next question ".into(), "<N>".magenta().bold()],
    };
    let mut keys = keys;
    keys.extend([" Stop ".into(), "<Q> ".magenta().bold()]);
    let block = framed(
        format!(
            " {}: question {} of {} ",
            status.title, status.question_number, status.total_questions
        ),
        keys,
    );
    let inner = block.inner(frame.size());
    frame.render_widget(block, frame.size());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(status.options.len() as u16 + 3),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(inner);

    let mut question = vec![Line::from(status.question_text.clone().bold()), Line::from("")];
    question.extend(fault_line(status.fault.as_deref()));
    for (button, text) in Button::ALL.iter().zip(&status.options) {
        question.push(Line::from(format!("  {}  {}", button.symbol(), text)));
    }
    frame.render_widget(Paragraph::new(question), rows[0]);

    let (label, color) = match status.phase {
        Phase::Collecting => (format!("{}s left", status.remaining), Color::Green),
        Phase::Displaying => ("Time is up".to_owned(), Color::Yellow),
        Phase::NotStarted => ("Waiting".to_owned(), Color::Gray),
        Phase::Finished => ("Finished".to_owned(), Color::Gray),
    };
    frame.render_widget(Paragraph::new(label.fg(color).bold()), rows[1]);

    let answered = status.students.iter().filter(|s| s.answered).count();
    let items = status.students.iter().map(|s| {
        let mark = match (s.correct, s.answered) {
            (Some(true), _) => "✓".green(),
            (Some(false), _) => "✗".red(),
            (None, true) => "●".cyan(),
            (None, false) => "·".dark_gray(),
        };
        ListItem::new(Line::from(vec![mark, format!(" {}", s.remote_name).into()]))
    });
    let list = List::new(items).block(
        Block::default()
            .title(format!(" Answered {}/{} ", answered, status.students.len()))
            .borders(Borders::TOP),
    );
    frame.render_widget(list, rows[2]);
}

/// A press as the remote tester shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MonitorLine {
    pub remote_name: String,
    pub role_label: String,
    pub button: Button,
    pub at: Timestamp,
}

impl MonitorLine {
    /// Presses from remotes `receiver` does not know are not shown.
    pub fn from_event(receiver: &Receiver, event: &ButtonEvent) -> Option<Self> {
        let remote = receiver.find_remote(&event.source_remote_id)?;
        Some(Self {
            remote_name: remote.display_name().to_owned(),
            role_label: receiver.role_label(&remote.remote_id)?,
            button: event.button,
            at: event.timestamp,
        })
    }
}

/// The latest presses, newest at the bottom.
pub fn monitor_screen(frame: &mut Frame, receiver: &Receiver, lines: &[MonitorLine], fault: Option<&str>) {
    let block = framed(
        format!(" Testing remotes of {} ", receiver.receiver_name),
        vec![" Quit ".into(), "<Q> ".magenta().bold()],
    );
    let height = frame.size().height.saturating_sub(2) as usize;
    let mut shown: Vec<Line> = fault_line(fault).into_iter().collect();
    // Newest at the bottom, oldest scroll off the top.
    let skip = (lines.len() + shown.len()).saturating_sub(height);
    shown.extend(lines.iter().skip(skip).map(|l| {
        Line::from(vec![
            format!(" {:>9} ", l.at.to_string()).dark_gray(),
            format!(" {} ", l.button.symbol()).black().on_magenta().bold(),
            format!("  {}", l.remote_name).bold(),
            format!("  {}", l.role_label).into(),
        ])
    }));
    frame.render_widget(Paragraph::new(shown).block(block), frame.size());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn monitor_lines_carry_role_labels() {
        let mut reg = Registry::new();
        let rid = reg.create_receiver("Lab").receiver_id.clone();
        let mut session = RegistrationSession::new();
        session.observe("T");
        session.observe("S1");
        reg.commit(&rid, &session).unwrap();
        let receiver = reg.find_by_receiver(&rid).unwrap();

        let line = MonitorLine::from_event(receiver, &ButtonEvent::new("S1", Button::Y, Timestamp(1500)))
            .unwrap();
        assert_eq!(line.role_label, "Student Remote 1");
        assert_eq!(line.remote_name, "Remote 2");
        assert_eq!(line.button, Button::Y);

        let teacher = MonitorLine::from_event(receiver, &ButtonEvent::new("T", Button::N, Timestamp(0)))
            .unwrap();
        assert_eq!(teacher.role_label, "Teacher Remote");

        assert_eq!(
            MonitorLine::from_event(receiver, &ButtonEvent::new("X", Button::A, Timestamp(0))),
            None
        );
    }

    #[test]
    fn screens_render_to_a_test_backend() {
        use crate::quiz_runner::StudentStatus;
        use ratatui::backend::TestBackend;

        let status = QuizStatus {
            title: "Demo".to_owned(),
            phase: Phase::Displaying,
            question_number: 1,
            total_questions: 2,
            question_text: "Pick one".to_owned(),
            options: vec!["yes".to_owned(), "no".to_owned()],
            remaining: 0,
            students: vec![StudentStatus {
                remote_name: "Alice".to_owned(),
                answered: true,
                correct: Some(true),
            }],
            fault: None,
        };
        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal.draw(|f| quiz_screen(f, &status)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Pick one"));
        assert!(text.contains("Alice"));
        assert!(text.contains("Time is up"));
    }
}
