use std::str::FromStr;
use std::time;

use clap::Parser;
use envconfig::Envconfig;

use common_pgping::PingTarget;

use crate::error::ConfigError;
use crate::wait::WaitPolicy;

/// Wait for a PostgreSQL server to accept connections, then exec a command.
///
/// The server is pinged at a fixed cadence until it answers the startup
/// packet; the ping never authenticates. Once the server is ready the
/// command replaces this process, keeping its arguments, environment and
/// stdio untouched. With no command, exit 0 as soon as the server is ready.
#[derive(Parser, Debug)]
#[command(name = "pgwait", version, about)]
pub struct Cli {
    /// Host the PostgreSQL server listens on
    pub host: String,

    /// Command to exec once the server is ready
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Give up and exit 124 after this many seconds (0 waits forever)
    #[arg(
        short = 't',
        long,
        env = "PGWAIT_TIMEOUT",
        value_name = "SECONDS",
        default_value = "0"
    )]
    pub timeout: u64,
}

/// Connection details and polling cadence, read from the environment. The
/// variables match what the server container itself is configured with, so a
/// compose file can feed both from one env block.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "POSTGRES_USER", default = "postgres")]
    pub user: NonEmptyString,

    /// Defaults to the user name, the libpq convention.
    #[envconfig(from = "POSTGRES_DB")]
    pub database: Option<NonEmptyString>,

    #[envconfig(from = "POSTGRES_PORT", default = "5432")]
    pub port: u16,

    #[envconfig(default = "1000")]
    pub poll_interval: EnvMsDuration,

    /// Per-attempt cap in milliseconds; `0` leaves attempts unbounded, the
    /// same convention as a zero `--timeout`.
    #[envconfig(default = "3000")]
    pub connect_timeout: EnvMsDuration,
}

impl Config {
    /// Probe target for the given host.
    pub fn target(&self, host: &str) -> Result<PingTarget, ConfigError> {
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let database = self.database.as_ref().unwrap_or(&self.user);
        Ok(PingTarget::new(host, self.port, self.user.as_str())
            .database(database.as_str())
            .application_name("pgwait"))
    }

    /// Polling policy, with the command-line timeout as the deadline.
    pub fn policy(&self, timeout_secs: u64) -> WaitPolicy {
        WaitPolicy {
            poll_interval: self.poll_interval.0,
            connect_timeout: self.connect_timeout.0,
            deadline: match timeout_secs {
                0 => None,
                secs => Some(time::Duration::from_secs(secs)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
