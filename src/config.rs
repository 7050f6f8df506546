use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::digit1,
    combinator::{all_consuming, map, map_res, opt},
    sequence::{pair, preceded},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use traits::display::Target;

use crate::error::{Error, Result};
use crate::Cli;

/// Where to connect and how long to wait around input events.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// An empty password connects without authentication.
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub timing: Timing,
}

fn default_host() -> String {
    "192.168.1.200".to_string()
}

fn default_port() -> u16 {
    5900
}

fn default_password() -> String {
    "winmage".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: default_password(),
            timing: Timing::default(),
        }
    }
}

/// Fixed delays, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Timing {
    /// wait after connecting before the first event
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// wait between moving the pointer and pressing the button of a click
    #[serde(default = "default_press_delay_ms")]
    pub press_delay_ms: u64,
    /// how long the button of a click stays down
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_press_delay_ms() -> u64 {
    200
}

fn default_hold_ms() -> u64 {
    100
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            press_delay_ms: default_press_delay_ms(),
            hold_ms: default_hold_ms(),
        }
    }
}

impl Timing {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            press_delay_ms: 0,
            hold_ms: 0,
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn press_delay(&self) -> Duration {
        Duration::from_millis(self.press_delay_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

impl Config {
    /// The per-user config file
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config/vnc-control/config.toml"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load an explicitly requested config file.  It has to exist and parse.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the per-user config file, returning defaults if it doesn't exist
    /// or can't be read.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path().filter(|p| p.exists()) else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file: {}", e);
                Self::default()
            }
        }
    }

    /// Build the config for this invocation: file first, then `--server`,
    /// then the individual flags and environment variables.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from(path)?,
            None => Self::load_default(),
        };

        if let Some(server) = &cli.server {
            let (host, port) = parse_server(server)?;
            config.host = host;
            config.port = port;
        }
        if let Some(host) = &cli.host {
            config.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(password) = &cli.password {
            config.password = password.clone();
        }
        if cli.no_password {
            config.password.clear();
        }
        Ok(config)
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
            password: (!self.password.is_empty()).then(|| self.password.clone()),
        }
    }
}

enum PortSpec {
    Port(u16),
    Display(u16),
}

fn server_address(data: &str) -> IResult<&str, (&str, Option<PortSpec>)> {
    let number = || map_res(digit1, str::parse::<u16>);
    all_consuming(pair(
        take_till1(|c: char| c == ':'),
        opt(alt((
            map(preceded(tag("::"), number()), PortSpec::Port),
            map(preceded(tag(":"), number()), PortSpec::Display),
        ))),
    ))(data)
}

/// Parse a server in `host`, `host:display` or `host::port` form.  A display
/// number is an offset from 5900.
pub fn parse_server(server: &str) -> Result<(String, u16)> {
    let invalid = || Error::Config(format!("invalid server address {:?}", server));
    let (_, (host, port)) = server_address(server).finish().map_err(|_| invalid())?;
    let port = match port {
        None => default_port(),
        Some(PortSpec::Port(port)) => port,
        Some(PortSpec::Display(display)) => display.checked_add(5900).ok_or_else(invalid)?,
    };
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let target = Config::default().target();
        assert_eq!(target.host, "192.168.1.200");
        assert_eq!(target.port, 5900);
        assert_eq!(target.password.as_deref(), Some("winmage"));
        assert_eq!(Config::default().timing.settle(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            host = "10.0.0.5"
            password = ""

            [timing]
            settle_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 5900);
        assert_eq!(config.target().password, None);
        assert_eq!(config.timing.settle_ms, 250);
        assert_eq!(config.timing.hold_ms, 100);
    }

    #[test]
    fn test_from_toml_rejects_bad_port() {
        let err = Config::from_toml("port = 70000").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_server() {
        assert_eq!(parse_server("host").unwrap(), ("host".to_string(), 5900));
        assert_eq!(parse_server("host:1").unwrap(), ("host".to_string(), 5901));
        assert_eq!(
            parse_server("192.168.1.200::5999").unwrap(),
            ("192.168.1.200".to_string(), 5999)
        );
        assert!(parse_server("host:").is_err());
        assert!(parse_server(":5900").is_err());
        assert!(parse_server("host::port").is_err());
        assert!(parse_server("host:65000").is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/vnc-control.toml")).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_resolve_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "host = \"filehost\"\nport = 5901\npassword = \"filepass\"\n").unwrap();

        let cli = Cli {
            config: Some(path.clone()),
            ..Cli::default()
        };
        let config = Config::resolve(&cli).unwrap();
        assert_eq!((config.host.as_str(), config.port), ("filehost", 5901));
        assert_eq!(config.password, "filepass");

        let cli = Cli {
            config: Some(path),
            server: Some("serverhost::6000".into()),
            host: Some("flaghost".into()),
            no_password: true,
            ..Cli::default()
        };
        let config = Config::resolve(&cli).unwrap();
        assert_eq!(config.host, "flaghost");
        assert_eq!(config.port, 6000);
        assert_eq!(config.target().password, None);
    }
}
