//! PostgreSQL readiness pings.
//!
//! Speaks just enough of the version 3.0 startup protocol to learn whether a
//! server is accepting connections, mirroring the contract of libpq's
//! `PQping` (the machinery behind `pg_isready`): a ping never authenticates,
//! and a server that answers the startup packet at all - even with an
//! authentication failure - counts as accepting connections. Only the
//! `cannot_connect_now` SQLSTATE is an explicit rejection, and transport
//! failures are classified as "no response" rather than surfaced as errors,
//! so callers can retry without inspecting causes.

pub mod protocol;

use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Connection details for a readiness ping.
#[derive(Debug, Clone)]
pub struct PingTarget {
    pub host: String,
    pub port: u16,
    /// User named in the startup packet. Sent, never authenticated.
    pub user: String,
    /// Database named in the startup packet.
    pub database: String,
    /// What the probe connections show up as in the server log.
    pub application_name: String,
}

impl PingTarget {
    /// Target `host:port` as `user`, with the database defaulting to the user
    /// name per the libpq convention.
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            host: host.into(),
            port,
            database: user.clone(),
            user,
            application_name: "pgping".to_string(),
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = application_name.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outcome of a single readiness ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ping {
    /// The server answered the startup packet; it is accepting connections.
    Ok,
    /// The server is up but explicitly not ready: starting up, shutting down,
    /// or in recovery.
    Reject { message: String },
    /// Nothing answered: the connection failed, the peer went away before
    /// responding, or whatever answered is not a PostgreSQL server.
    NoResponse { reason: String },
}

impl Ping {
    /// True when the server is accepting connections.
    pub fn accepting(&self) -> bool {
        matches!(self, Ping::Ok)
    }

    /// Payload-free view for comparing and logging outcomes.
    pub fn kind(&self) -> PingKind {
        match self {
            Ping::Ok => PingKind::Ok,
            Ping::Reject { .. } => PingKind::Reject,
            Ping::NoResponse { .. } => PingKind::NoResponse,
        }
    }

    /// Server message or failure reason, when there is one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Ping::Ok => None,
            Ping::Reject { message } => Some(message),
            Ping::NoResponse { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingKind {
    Ok,
    Reject,
    NoResponse,
}

impl fmt::Display for PingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingKind::Ok => write!(f, "accepting connections"),
            PingKind::Reject => write!(f, "rejecting connections"),
            PingKind::NoResponse => write!(f, "no response"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PingError {
    /// Startup parameters that can never produce a valid packet. Retrying
    /// cannot help.
    #[error("invalid startup parameter {parameter:?}: {reason}")]
    InvalidParameter {
        parameter: String,
        reason: &'static str,
    },
}

/// Ping the target once.
///
/// Name resolution, the TCP connect, and a single startup exchange all happen
/// inside this future. It completes quickly on transport errors but is
/// unbounded against a silent peer, so callers should race it against a
/// timeout of their choosing.
pub async fn ping(target: &PingTarget) -> Result<Ping, PingError> {
    if target.user.is_empty() {
        return Err(PingError::InvalidParameter {
            parameter: "user".to_string(),
            reason: "user must not be empty",
        });
    }
    let startup = protocol::startup_message(&[
        ("user", target.user.as_str()),
        ("database", target.database.as_str()),
        ("application_name", target.application_name.as_str()),
    ])?;

    let mut stream = match TcpStream::connect((target.host.as_str(), target.port)).await {
        Ok(stream) => stream,
        Err(err) => {
            return Ok(Ping::NoResponse {
                reason: err.to_string(),
            })
        }
    };

    if let Err(err) = stream.write_all(&startup).await {
        return Ok(Ping::NoResponse {
            reason: err.to_string(),
        });
    }

    let mut header = [0u8; 5];
    if let Err(err) = stream.read_exact(&mut header).await {
        return Ok(Ping::NoResponse {
            reason: read_failure(err),
        });
    }

    let (tag, body_len) = match protocol::parse_header(&header) {
        Some(parsed) => parsed,
        None => {
            return Ok(Ping::NoResponse {
                reason: "peer is not speaking the PostgreSQL protocol".to_string(),
            })
        }
    };

    let mut body = vec![0u8; body_len];
    if let Err(err) = stream.read_exact(&mut body).await {
        return Ok(Ping::NoResponse {
            reason: read_failure(err),
        });
    }

    Ok(classify(tag, &body))
}

/// Classify the first backend message of the session.
fn classify(tag: u8, body: &[u8]) -> Ping {
    match tag {
        protocol::TAG_ERROR_RESPONSE => {
            let fields = protocol::error_fields(body);
            let message = protocol::field(&fields, protocol::FIELD_MESSAGE)
                .unwrap_or("server sent an error during startup")
                .to_string();
            match protocol::field(&fields, protocol::FIELD_SQLSTATE) {
                Some(protocol::CANNOT_CONNECT_NOW) => Ping::Reject { message },
                // Any other startup error (unknown user or database, pg_hba
                // policy, TLS required) still proves the server is up and
                // accepting connections.
                _ => Ping::Ok,
            }
        }
        protocol::TAG_AUTHENTICATION
        | protocol::TAG_NOTICE_RESPONSE
        | protocol::TAG_NEGOTIATE_PROTOCOL_VERSION => Ping::Ok,
        other => Ping::NoResponse {
            reason: format!("unexpected startup response (tag {other:#04x})"),
        },
    }
}

fn read_failure(err: std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        "server closed the connection during startup".to_string()
    } else {
        err.to_string()
    }
}
