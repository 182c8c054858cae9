//! Commandline argument parser using clap for ClickerHub

use crate::cipher::Platform;
use crate::collection_window::DEFAULT_WINDOW_TICKS;
use crate::transport::DEFAULT_BAUD;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Where the receiver comes from and how to talk to it. Shared by every
/// binary.
#[derive(Debug, Args, Clone)]
pub struct DeviceArgs {
    /// File holding registered receivers and the last used device
    #[arg(long, default_value = "clickerhub.ron")]
    pub store: PathBuf,

    /// Serial port of the receiver. Without it, the saved device is looked
    /// up again, or a port is picked interactively
    #[arg(long)]
    pub port: Option<PathBuf>,

    /// Line speed of the receiver
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Serial number of the receiver, for hosts that cannot read it from
    /// the USB device. The session key is derived from it
    #[arg(long)]
    pub serial: Option<String>,

    /// Shared library exporting the handset decrypt primitive
    #[arg(long = "cipher-lib")]
    pub cipher_lib: Option<PathBuf>,

    /// Use a simulated receiver with this many remotes instead of hardware
    #[arg(long, value_name = "N")]
    pub simulate: Option<usize>,

    /// Key derivation rules to use, defaults to the host's
    #[arg(long, value_enum)]
    pub platform: Option<Platform>,
}

impl DeviceArgs {
    /// The key derivation rules asked for, or the host's.
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }
}

/// Arguments of the quiz tool.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct HubArgs {
    #[command(flatten)]
    #[allow(missing_docs)]
    pub device: DeviceArgs,

    #[command(subcommand)]
    /// Which task to perform
    pub command: CommandTask,
}

/// What the quiz tool should do.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// List registered receivers and their remotes
    Receivers,

    /// Pair handsets with a receiver by pressing a button on each
    #[command(about)]
    Register(RegisterCommand),

    /// Give a receiver a new name
    RenameReceiver(RenameReceiverCommand),

    /// Give a remote a new name
    RenameRemote(RenameRemoteCommand),

    /// Forget a remote
    DeleteRemote(RemoteCommand),

    /// Make a receiver the current one
    Select(SelectCommand),

    /// Run a quiz against the registered remotes
    #[command(about)]
    Quiz(QuizCommand),
}

/// Arguments of `register`.
#[derive(Debug, Args, Clone)]
pub struct RegisterCommand {
    /// Receiver to add remotes to. A new receiver is created without it
    #[arg(short, long)]
    pub receiver: Option<String>,

    /// Name of the new receiver
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments of `rename-receiver`.
#[derive(Debug, Args, Clone)]
pub struct RenameReceiverCommand {
    /// Id of the receiver
    pub receiver: String,
    /// Its new name
    pub name: String,
}

/// Arguments of `rename-remote`.
#[derive(Debug, Args, Clone)]
pub struct RenameRemoteCommand {
    /// Defaults to the current receiver
    #[arg(short, long)]
    pub receiver: Option<String>,

    /// Handset id of the remote
    pub remote: String,
    /// Its new name
    pub name: String,
}

/// Arguments naming one remote.
#[derive(Debug, Args, Clone)]
pub struct RemoteCommand {
    /// Defaults to the current receiver
    #[arg(short, long)]
    pub receiver: Option<String>,

    /// Handset id of the remote
    pub remote: String,
}

/// Arguments of `select`.
#[derive(Debug, Args, Clone)]
pub struct SelectCommand {
    /// Id of the receiver
    pub receiver: String,
}

/// Arguments of `quiz`.
#[derive(Debug, Args, Clone)]
pub struct QuizCommand {
    /// Quiz file, in RON
    #[arg(short, long)]
    pub quiz: PathBuf,

    /// Defaults to the current receiver
    #[arg(short, long)]
    pub receiver: Option<String>,

    /// Length of each answer window, in seconds
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_TICKS)]
    pub window: u32,

    /// Where to write the results, in RON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Go to the next question as soon as time is up
    #[arg(long)]
    pub auto_advance: bool,
}

/// Arguments of the remote tester.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Shows every handset press as it arrives")]
pub struct MonitorArgs {
    #[command(flatten)]
    #[allow(missing_docs)]
    pub device: DeviceArgs,

    /// Defaults to the current receiver
    #[arg(short, long)]
    pub receiver: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_defaults() {
        let args = HubArgs::parse_from(["clickerhub", "quiz", "--quiz", "q.ron"]);
        assert_eq!(args.device.baud, 9600);
        assert_eq!(args.device.store, PathBuf::from("clickerhub.ron"));
        match args.command {
            CommandTask::Quiz(q) => {
                assert_eq!(q.window, 30);
                assert!(!q.auto_advance);
                assert_eq!(q.receiver, None);
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn global_options() {
        let args = HubArgs::parse_from([
            "clickerhub",
            "--simulate",
            "5",
            "--platform",
            "windows",
            "rename-remote",
            "AABB",
            "Alice",
        ]);
        assert_eq!(args.device.simulate, Some(5));
        assert_eq!(args.device.platform(), Platform::Windows);
        assert!(matches!(args.command, CommandTask::RenameRemote(c) if c.name == "Alice"));
    }

    #[test]
    fn monitor_args() {
        let args = MonitorArgs::parse_from([
            "monitor",
            "--port",
            "/dev/ttyACM0",
            "--serial",
            "SN0042",
            "-r",
            "17",
        ]);
        assert_eq!(args.device.port, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(args.device.serial.as_deref(), Some("SN0042"));
        assert_eq!(args.receiver.as_deref(), Some("17"));
    }
}
