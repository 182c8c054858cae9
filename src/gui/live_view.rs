use std::{io::stdout, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{prelude::*, Terminal};

/// Whether a view keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Control {
    Continue,
    Stop,
}

/// Runs a full-screen view over `state` until `step` or `on_key` says stop.
///
/// Every turn, `step` gets to update the state (it should not block for
/// long, draining a channel with a short timeout is the usual thing), then
/// the screen is redrawn with `render` and pending key presses are handed
/// to `on_key`.
pub fn run_until_stop<T, S, R, K>(
    state: &mut T,
    mut step: S,
    render: R,
    mut on_key: K,
) -> Result<(), GuiError>
where
    S: FnMut(&mut T) -> Control,
    R: Fn(&T, &mut Frame),
    K: FnMut(&mut T, KeyCode) -> Control,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = (|| -> Result<(), GuiError> {
        loop {
            let control = step(state);
            terminal.draw(|frame| render(&*state, frame))?;
            if control == Control::Stop {
                return Ok(());
            }
            while event::poll(Duration::from_millis(16))? {
                if let event::Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && on_key(state, key.code) == Control::Stop {
                        return Ok(());
                    }
                }
            }
        }
    })();

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    res
}
