use std::{io::stdout, path::PathBuf};

use crate::gui::error::GuiError;
use crate::transport::DeviceDescriptor;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// A port on offer, with whatever we know about the device behind it.
#[derive(Debug, Clone)]
pub struct PortChoice {
    /// Path of the serial port.
    pub path: PathBuf,
    /// The USB identity behind it, where the system exposes one.
    pub identity: Option<DeviceDescriptor>,
}

impl PortChoice {
    fn label(&self) -> String {
        let path = self.path.to_string_lossy();
        match &self.identity {
            Some(d) if d.is_receiver() => format!(
                "{}  receiver {:04x}:{:04x} {}",
                path,
                d.vendor_id,
                d.product_id,
                d.serial_number.as_deref().unwrap_or("")
            ),
            Some(d) => format!("{}  ({:04x}:{:04x})", path, d.vendor_id, d.product_id),
            None => path.into_owned(),
        }
    }
}

/// Lets the user pick one of `ports`. Receivers are listed first. Returns
/// `None` if the user quit.
pub fn device_selector(mut ports: Vec<PortChoice>) -> Result<Option<PortChoice>, GuiError> {
    if ports.is_empty() {
        return Err(GuiError::NoPorts);
    }
    ports.sort_by_key(|p| !p.identity.as_ref().is_some_and(|d| d.is_receiver()));

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = select_loop(&mut terminal, &ports);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| ports.swap_remove(i)))
}

fn select_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ports: &[PortChoice],
) -> Result<Option<usize>, GuiError> {
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_ports = ports.len();
    loop {
        let title = Title::from(" Select Receiver ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let list = List::new(ports.iter().map(PortChoice::label))
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => {
                            cursor = (cursor + 1) % n_ports;
                        }
                        KeyCode::Up => {
                            cursor = (cursor + n_ports - 1) % n_ports;
                        }
                        KeyCode::Enter => return Ok(Some(cursor)),
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_show_receivers() {
        let choice = PortChoice {
            path: PathBuf::from("/dev/ttyACM0"),
            identity: Some(DeviceDescriptor {
                vendor_id: 0xB1B0,
                product_id: 0x8055,
                serial_number: Some("SN1".to_owned()),
                port: None,
            }),
        };
        assert_eq!(choice.label(), "/dev/ttyACM0  receiver b1b0:8055 SN1");

        let plain = PortChoice {
            path: PathBuf::from("/dev/ttyS0"),
            identity: None,
        };
        assert_eq!(plain.label(), "/dev/ttyS0");
    }
}
