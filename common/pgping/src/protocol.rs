//! Just enough of the PostgreSQL frontend/backend protocol (version 3.0) to
//! ask a server whether it is accepting connections.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::PingError;

/// Protocol version 3.0, the only version spoken since PostgreSQL 7.4.
pub const PROTOCOL_VERSION: i32 = 3 << 16;

/// Backend messages larger than this are treated as evidence that the peer is
/// not a PostgreSQL server. Startup-phase messages are tiny in practice.
pub const MAX_BACKEND_BODY: usize = 64 * 1024;

/// AuthenticationRequest, the first message from a healthy server.
pub const TAG_AUTHENTICATION: u8 = b'R';
/// ErrorResponse.
pub const TAG_ERROR_RESPONSE: u8 = b'E';
/// NoticeResponse, which the server may emit ahead of anything else.
pub const TAG_NOTICE_RESPONSE: u8 = b'N';
/// NegotiateProtocolVersion, sent when the server wants to downgrade.
pub const TAG_NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';

/// ErrorResponse field holding the SQLSTATE code.
pub const FIELD_SQLSTATE: u8 = b'C';
/// ErrorResponse field holding the human-readable message.
pub const FIELD_MESSAGE: u8 = b'M';

/// SQLSTATE reported while the server is starting up, shutting down, or in
/// recovery (`cannot_connect_now`).
pub const CANNOT_CONNECT_NOW: &str = "57P03";

/// Encode a StartupMessage carrying the given parameter pairs.
///
/// The length prefix counts itself, the protocol version, the NUL-terminated
/// key/value pairs, and the closing NUL. Keys must be non-empty and neither
/// keys nor values may contain NUL bytes.
pub fn startup_message(params: &[(&str, &str)]) -> Result<Bytes, PingError> {
    let mut body = BytesMut::with_capacity(64);
    body.put_i32(PROTOCOL_VERSION);
    for (key, value) in params {
        put_param(&mut body, key, value)?;
    }
    body.put_u8(0);

    let mut message = BytesMut::with_capacity(body.len() + 4);
    message.put_i32((body.len() + 4) as i32);
    message.extend_from_slice(&body);
    Ok(message.freeze())
}

fn put_param(body: &mut BytesMut, key: &str, value: &str) -> Result<(), PingError> {
    if key.is_empty() {
        return Err(PingError::InvalidParameter {
            parameter: key.to_string(),
            reason: "parameter keys must be non-empty",
        });
    }
    if key.as_bytes().contains(&0) || value.as_bytes().contains(&0) {
        return Err(PingError::InvalidParameter {
            parameter: key.to_string(),
            reason: "NUL bytes cannot cross the wire",
        });
    }
    body.put_slice(key.as_bytes());
    body.put_u8(0);
    body.put_slice(value.as_bytes());
    body.put_u8(0);
    Ok(())
}

/// Parse the five-byte backend message header into a tag and body length.
///
/// Returns `None` when the header is short or the self-inclusive length is
/// outside the sane range, both signs the peer is not speaking PostgreSQL.
pub fn parse_header(mut header: &[u8]) -> Option<(u8, usize)> {
    if header.len() < 5 {
        return None;
    }
    let tag = header.get_u8();
    let len = header.get_i32();
    if len < 4 || len as usize - 4 > MAX_BACKEND_BODY {
        return None;
    }
    Some((tag, len as usize - 4))
}

/// Decode ErrorResponse/NoticeResponse fields: repeated (code, C string)
/// pairs closed by a single NUL. Truncated bodies yield the fields that
/// survived.
pub fn error_fields(body: &[u8]) -> Vec<(u8, String)> {
    let mut fields = Vec::new();
    let mut rest = body;
    while let [code, tail @ ..] = rest {
        if *code == 0 {
            break;
        }
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        fields.push((*code, String::from_utf8_lossy(&tail[..end]).into_owned()));
        rest = &tail[(end + 1).min(tail.len())..];
    }
    fields
}

/// Look up a single field by code.
pub fn field(fields: &[(u8, String)], code: u8) -> Option<&str> {
    fields
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, value)| value.as_str())
}
