use crate::endpoint::{EndpointError, EndpointStatus};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chardev_core::{OpenFlags, Whence};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ProtocolError {
    pub fn to_response(&self) -> Response {
        Response::Error {
            kind: "bad_request".to_string(),
            errno: -22,
            message: self.to_string(),
        }
    }
}

/// Seek origin on the wire: `"start"`/`"current"`/`"end"`, or the raw
/// `SEEK_SET`/`SEEK_CUR`/`SEEK_END` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", try_from = "RawWhence")]
pub enum WireWhence {
    Start,
    Current,
    End,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWhence {
    Name(String),
    Code(i32),
}

impl TryFrom<RawWhence> for WireWhence {
    type Error = String;

    fn try_from(raw: RawWhence) -> Result<Self, Self::Error> {
        match raw {
            RawWhence::Name(name) => match name.as_str() {
                "start" => Ok(Self::Start),
                "current" => Ok(Self::Current),
                "end" => Ok(Self::End),
                other => Err(format!("unknown whence {other:?}")),
            },
            RawWhence::Code(code) => Whence::from_raw(code)
                .map(Self::from)
                .ok_or_else(|| format!("unknown whence code {code}")),
        }
    }
}

impl From<Whence> for WireWhence {
    fn from(w: Whence) -> Self {
        match w {
            Whence::Start => WireWhence::Start,
            Whence::Current => WireWhence::Current,
            Whence::End => WireWhence::End,
        }
    }
}

impl From<WireWhence> for Whence {
    fn from(w: WireWhence) -> Self {
        match w {
            WireWhence::Start => Whence::Start,
            WireWhence::Current => Whence::Current,
            WireWhence::End => Whence::End,
        }
    }
}

/// One line sent by a bridge client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Open {
        minor: u32,
        #[serde(default)]
        truncate: bool,
        #[serde(default)]
        append: bool,
        /// Raw `open(2)` flag bits; `O_TRUNC`/`O_APPEND` add to the booleans.
        #[serde(default)]
        flags: u32,
    },
    Read {
        handle: u64,
        len: usize,
    },
    Write {
        handle: u64,
        /// Base64-encoded payload.
        data: String,
    },
    Seek {
        handle: u64,
        offset: i64,
        whence: WireWhence,
    },
    Release {
        handle: u64,
    },
    Status,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn open_flags(truncate: bool, append: bool, posix: u32) -> OpenFlags {
        let mut flags = OpenFlags::from_posix(posix);
        if truncate {
            flags |= OpenFlags::TRUNCATE;
        }
        if append {
            flags |= OpenFlags::APPEND;
        }
        flags
    }
}

pub fn decode_payload(data: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(STANDARD.decode(data)?)
}

pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMsg {
    pub capacity: usize,
    pub used_length: usize,
    pub sessions: usize,
    pub frequency_hz: u32,
    pub actuation_state: String,
    pub actuator_failed: bool,
    pub live_tasks: usize,
    pub toggles: u64,
}

impl From<&EndpointStatus> for StatusMsg {
    fn from(status: &EndpointStatus) -> Self {
        Self {
            capacity: status.capacity,
            used_length: status.used_length,
            sessions: status.sessions,
            frequency_hz: status.frequency_hz,
            actuation_state: status.actuation_state.as_str().to_string(),
            actuator_failed: status.actuator_failed,
            live_tasks: status.live_tasks,
            toggles: status.actuation.toggles,
        }
    }
}

/// One line sent back to a bridge client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Opened {
        handle: u64,
    },
    Data {
        count: usize,
        data: String,
    },
    Written {
        count: usize,
    },
    Position {
        position: usize,
    },
    Released {
        handle: u64,
    },
    Status(StatusMsg),
    Error {
        kind: String,
        errno: i32,
        message: String,
    },
}

impl From<&EndpointError> for Response {
    fn from(err: &EndpointError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            errno: err.errno(),
            message: err.to_string(),
        }
    }
}

impl Response {
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"type":"error","kind":"internal","errno":-5,"message":"encode failed"}"#.to_vec()
        });
        line.push(b'\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_defaults_flags_off() {
        let req = Request::parse(r#"{"type":"open","minor":1}"#).unwrap();
        assert_eq!(
            req,
            Request::Open {
                minor: 1,
                truncate: false,
                append: false,
                flags: 0
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Request::parse(r#"{"type":"ioctl","cmd":3}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(matches!(err.to_response(), Response::Error { errno: -22, .. }));
    }

    #[test]
    fn open_flags_from_wire() {
        let flags = Request::open_flags(true, true, 0);
        assert!(flags.truncate() && flags.append());
        assert!(Request::open_flags(false, false, 0).is_empty());
    }

    #[test]
    fn posix_open_bits_from_wire() {
        let req = Request::parse(r#"{"type":"open","minor":0,"flags":1538}"#).unwrap();
        let Request::Open {
            truncate,
            append,
            flags,
            ..
        } = req
        else {
            panic!("expected open");
        };
        // O_RDWR | O_TRUNC | O_APPEND
        let flags = Request::open_flags(truncate, append, flags);
        assert!(flags.truncate() && flags.append());
    }

    #[test]
    fn whence_accepts_names_and_codes() {
        let by_name = Request::parse(r#"{"type":"seek","handle":1,"offset":0,"whence":"end"}"#);
        let by_code = Request::parse(r#"{"type":"seek","handle":1,"offset":0,"whence":2}"#);
        assert_eq!(by_name.unwrap(), by_code.unwrap());
        assert!(Request::parse(r#"{"type":"seek","handle":1,"offset":0,"whence":7}"#).is_err());
    }

    #[test]
    fn error_response_line() {
        let err = EndpointError::NotSeekable;
        let line = Response::from(&err).to_line();
        let text = String::from_utf8(line).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["kind"], "not_seekable");
        assert_eq!(value["errno"], -29);
    }

    #[test]
    fn payload_codec() {
        assert_eq!(decode_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(encode_payload(b"world"), "d29ybGQ=");
        assert!(matches!(decode_payload("%%%"), Err(ProtocolError::Base64(_))));
    }
}
