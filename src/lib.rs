use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{debug, info};
use traits::display::{Button, Connector, RemoteDisplay};

pub mod config;
pub mod error;

pub use config::{Config, Timing};
pub use error::{Error, Result};

pub const DEFAULT_SCREENSHOT_PATH: &str = "./tmp/vnc-screen.png";

pub const USAGE: &str = "\
VNC remote control

Usage:
    vnc-control [OPTIONS] <action> [args...]

Actions:
    screenshot [path]    save the remote screen (default ./tmp/vnc-screen.png)
    click <x> <y>        click the primary button at (x, y)
    type <text>          type text
    key <key-name>       press a key or combination, e.g. enter or ctrl-c
    move <x> <y>         move the pointer to (x, y)

Options (before the action):
    --host <HOST>          server host [env: VNC_HOST]
    -p, --port <PORT>      server port [env: VNC_PORT]
    --password <SECRET>    server password [env: VNC_PASSWORD]
    --no-password          connect without a password
    --server <ADDR>        server as host, host:display or host::port
    --config <FILE>        config file [env: VNC_CONTROL_CONFIG]

Examples:
    vnc-control screenshot ./tmp/screen.png
    vnc-control click 352 50
    vnc-control type \"Hello\"
    vnc-control key enter
    vnc-control move 960 540
";

#[derive(Parser, Debug, Default)]
#[command(name = "vnc-control", version, about = "Send one remote-control command to a VNC server", after_help = USAGE)]
pub struct Cli {
    /// Server host
    #[arg(long, env = "VNC_HOST")]
    pub host: Option<String>,
    /// Server port
    #[arg(short, long, env = "VNC_PORT")]
    pub port: Option<u16>,
    /// Server password
    #[arg(long, env = "VNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Connect without a password
    #[arg(long)]
    pub no_password: bool,
    /// Server as host, host:display or host::port
    #[arg(long)]
    pub server: Option<String>,
    /// Config file
    #[arg(long, env = "VNC_CONTROL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Action to perform
    #[arg(allow_hyphen_values = true)]
    pub action: Option<String>,
    /// Arguments of the action
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parse the command line.  Help and version requests are printed by clap,
/// which exits; anything else clap rejects becomes a usage error.
pub fn parse_args<I, T>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => {
            let message = e.to_string();
            let first = message.lines().next().unwrap_or_default();
            Error::Usage(first.trim_start_matches("error: ").to_string())
        }
    })
}

/// One remote-control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Screenshot { path: PathBuf },
    Click { x: u16, y: u16 },
    Type { text: String },
    Key { key: String },
    Move { x: u16, y: u16 },
}

impl Action {
    /// Turn an action name and its positional arguments into an action.
    /// Nothing here touches the network.
    pub fn parse(name: Option<&str>, args: &[String]) -> Result<Action> {
        let name = name.ok_or(Error::NoAction)?;
        let (action, used) = match name {
            "screenshot" => {
                let path = args
                    .first()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SCREENSHOT_PATH));
                (Action::Screenshot { path }, 1)
            }
            "click" => {
                let (x, y) = coordinates(name, args)?;
                (Action::Click { x, y }, 2)
            }
            "type" => {
                let text = required(name, "<text>", args)?;
                (Action::Type { text }, 1)
            }
            "key" => {
                let key = required(name, "<key-name>", args)?;
                (Action::Key { key }, 1)
            }
            "move" => {
                let (x, y) = coordinates(name, args)?;
                (Action::Move { x, y }, 2)
            }
            _ => return Err(Error::UnknownCommand(name.to_string())),
        };
        if args.len() > used {
            debug!("Ignoring extra arguments {:?}", &args[used..]);
        }
        Ok(action)
    }

    /// The line printed once the action went through.
    pub fn confirmation(&self) -> String {
        match self {
            Action::Screenshot { path } => format!("📸 Screenshot saved to {}", path.display()),
            Action::Click { x, y } => format!("🖱️  Clicked at ({x}, {y})"),
            Action::Type { text } => format!("⌨️  Typed: {text}"),
            Action::Key { key } => format!("⌨️  Pressed: {key}"),
            Action::Move { x, y } => format!("🖱️  Moved to ({x}, {y})"),
        }
    }
}

fn required(name: &str, what: &str, args: &[String]) -> Result<String> {
    args.first()
        .cloned()
        .ok_or_else(|| Error::Usage(format!("{name} needs {what}")))
}

fn coordinates(name: &str, args: &[String]) -> Result<(u16, u16)> {
    let [x, y, ..] = args else {
        return Err(Error::Usage(format!("{name} needs <x> <y>")));
    };
    Ok((coordinate("x", x)?, coordinate("y", y)?))
}

fn coordinate(name: &'static str, value: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| Error::Parse {
        name,
        value: value.to_string(),
    })
}

async fn perform(
    session: &mut impl RemoteDisplay,
    timing: &Timing,
    action: &Action,
) -> anyhow::Result<()> {
    match action {
        Action::Screenshot { path } => session.capture_screen(path).await,
        Action::Click { x, y } => {
            session.mouse_move(*x, *y).await?;
            tokio::time::sleep(timing.press_delay()).await;
            session.mouse_press(Button::Left).await?;
            tokio::time::sleep(timing.hold()).await;
            session.mouse_release(Button::Left).await
        }
        Action::Type { text } => session.key_press(text).await,
        Action::Key { key } => session.key_press(key).await,
        Action::Move { x, y } => session.mouse_move(*x, *y).await,
    }
}

/// Open a session, let it settle, perform the action and close the session
/// again.  The session is closed even when the action fails.
pub async fn run<C: Connector>(
    connector: &C,
    config: &Config,
    action: &Action,
    out: &mut impl Write,
) -> Result<()> {
    let mut session = connector
        .connect(&config.target())
        .await
        .map_err(Error::Connection)?;

    tokio::time::sleep(config.timing.settle()).await;

    info!("Performing {:?}", action);
    let result = match perform(&mut session, &config.timing, action).await {
        Ok(()) => writeln!(out, "{}", action.confirmation()).map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    let closed = session.disconnect().await;

    result.map_err(Error::Action)?;
    closed.map_err(Error::Action)
}

/// Everything `main` does short of printing errors: parse the action,
/// resolve the config and run.
pub async fn execute<C: Connector>(cli: &Cli, connector: &C, out: &mut impl Write) -> Result<()> {
    let action = Action::parse(cli.action.as_deref(), &cli.args)?;
    let config = Config::resolve(cli)?;
    run(connector, &config, &action, out).await
}

/// Print an error the way the user should see it.  Input mistakes go to
/// `out` together with the usage text, everything else goes to `err_out`.
pub fn report(err: &Error, out: &mut impl Write, err_out: &mut impl Write) -> std::io::Result<()> {
    match err {
        Error::NoAction => write!(out, "{USAGE}"),
        e if e.shows_usage() => write!(out, "❌ {e}\n{USAGE}"),
        e => writeln!(err_out, "❌ {e}"),
    }
}
