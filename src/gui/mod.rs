//! Terminal views, drawn with ratatui over crossterm.

mod device_selector;
mod error;
mod live_view;
mod screens;

pub use device_selector::{device_selector, PortChoice};
pub use error::GuiError;
pub use live_view::{run_until_stop, Control};
pub use screens::{monitor_screen, quiz_screen, registration_screen, MonitorLine};
