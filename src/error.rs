use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no action given")]
    NoAction,

    #[error("{0}")]
    Usage(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{name} must be an integer between 0 and 65535, got {value:?}")]
    Parse { name: &'static str, value: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("connection failed: {0:#}")]
    Connection(anyhow::Error),

    #[error("{0:#}")]
    Action(anyhow::Error),
}

impl Error {
    /// Process exit status for this error.  Bad input is 1, anything that
    /// went wrong talking to the server is 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoAction
            | Error::Usage(_)
            | Error::UnknownCommand(_)
            | Error::Parse { .. }
            | Error::Config(_) => 1,
            Error::Connection(_) | Error::Action(_) => 2,
        }
    }

    /// Whether the usage text should accompany the message.
    pub fn shows_usage(&self) -> bool {
        matches!(
            self,
            Error::NoAction | Error::Usage(_) | Error::UnknownCommand(_) | Error::Parse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
