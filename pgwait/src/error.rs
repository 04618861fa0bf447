use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use common_pgping::PingError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration from the environment: {0}")]
    Env(#[from] envconfig::Error),

    #[error("host must not be empty")]
    EmptyHost,
}

#[derive(Error, Debug)]
pub enum WaitError {
    /// The deadline passed without the server accepting connections.
    #[error("server was not ready after {waited:.1?} ({attempts} attempts)")]
    DeadlineExceeded { waited: Duration, attempts: u64 },

    #[error(transparent)]
    Ping(#[from] PingError),
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("no command to exec")]
    Empty,

    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("exec {program:?} failed: {errno}")]
    Exec { program: String, errno: Errno },
}

impl ExecError {
    /// Exit code a shell would report for the same failure: 127 for a
    /// missing program, 126 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::Exec {
                errno: Errno::ENOENT,
                ..
            } => 127,
            _ => 126,
        }
    }
}

/// Everything that can stop the bootstrap before the command takes over.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl BootstrapError {
    /// Exit codes wrapper scripts can dispatch on: 2 for configuration the
    /// tool refuses to run with, 124 when the deadline passes (the
    /// `timeout(1)` convention), 126 and 127 for exec failures, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Config(_) => 2,
            BootstrapError::Runtime(_) => 1,
            BootstrapError::Wait(WaitError::DeadlineExceeded { .. }) => 124,
            // Startup parameters the server could never parse are a
            // configuration problem, not a liveness one.
            BootstrapError::Wait(WaitError::Ping(_)) => 2,
            BootstrapError::Exec(err) => err.exit_code(),
        }
    }
}
