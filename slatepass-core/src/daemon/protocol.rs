//! Request/response protocol for the browser extension.
//!
//! Messages are JSON. On the native-messaging transport each message is
//! preceded by its byte length as a little-endian `u32`.

use crate::codec::{RecordField, RecordKey, RecordParams};
use crate::crypto::DeriveError;
use crate::storage::{SettingField, SettingKey, Settings, StorageError};
use crate::SlatePassError;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Native messaging protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// What asked for a password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GenerationMode {
    /// Regenerated by an input change; never recorded in history
    Automatic,
    /// Explicit user action
    Human,
    /// Explicit user action that also copies the result
    HumanCopy,
}

impl GenerationMode {
    pub fn is_human(self) -> bool {
        !matches!(self, GenerationMode::Automatic)
    }
}

impl TryFrom<u8> for GenerationMode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(GenerationMode::Automatic),
            1 => Ok(GenerationMode::Human),
            2 => Ok(GenerationMode::HumanCopy),
            other => Err(format!("unknown generation mode {}", other)),
        }
    }
}

impl From<GenerationMode> for u8 {
    fn from(mode: GenerationMode) -> Self {
        match mode {
            GenerationMode::Automatic => 0,
            GenerationMode::Human => 1,
            GenerationMode::HumanCopy => 2,
        }
    }
}

/// A request from the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    CheckInitStatus,
    Heartbeat,
    /// One field, or the whole UI state when `key` is absent
    GetState {
        #[serde(default)]
        key: Option<RecordKey>,
    },
    /// Set one UI field; a positive `ttl_secs` resets it to its default later
    SetState {
        field: RecordField,
        #[serde(default)]
        ttl_secs: Option<i64>,
    },
    ClearAllStates,
    GetSettings {
        #[serde(default)]
        key: Option<SettingKey>,
    },
    SetSettings {
        field: SettingField,
    },
    SaveSettings,
    GetHistory,
    DeleteHistory {
        index: usize,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    ClearHistory,
    SearchHistory {
        salt: String,
    },
    GeneratePassword {
        mode: GenerationMode,
    },
}

/// Payload of a successful response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseData {
    Ack,
    InitStatus {
        initialized: bool,
    },
    UiState {
        state: RecordParams,
    },
    UiField {
        field: RecordField,
    },
    Settings {
        settings: Settings,
    },
    Setting {
        field: SettingField,
    },
    History {
        items: Vec<RecordParams>,
    },
    Deleted {
        deleted: bool,
    },
    Search {
        found: bool,
    },
    Password {
        password: String,
        /// Secret fingerprint, or `RANDOM` for random passwords
        fingerprint: String,
        need_copy: bool,
        recorded: bool,
    },
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    EmptySecret,
    NoCharsetSelected,
    LengthUnsupported,
    RandomFailed,
    Codec,
    StorageUnavailable,
    Internal,
}

/// Tagged outcome sent back for every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { data: ResponseData },
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn ok(data: ResponseData) -> Self {
        Response::Ok { data }
    }

    pub fn ack() -> Self {
        Self::ok(ResponseData::Ack)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<&SlatePassError> for ErrorKind {
    fn from(error: &SlatePassError) -> Self {
        match error {
            SlatePassError::Derive(DeriveError::EmptySecret) => ErrorKind::EmptySecret,
            SlatePassError::Derive(DeriveError::NoCharsetSelected) => ErrorKind::NoCharsetSelected,
            SlatePassError::Derive(DeriveError::LengthUnsupported { .. }) => {
                ErrorKind::LengthUnsupported
            }
            SlatePassError::Derive(DeriveError::RandomFailed(_)) => ErrorKind::RandomFailed,
            SlatePassError::Derive(DeriveError::KeyRejected(_)) => ErrorKind::Internal,
            SlatePassError::Codec(_) | SlatePassError::Storage(StorageError::Codec(_)) => {
                ErrorKind::Codec
            }
            SlatePassError::Storage(_) | SlatePassError::Io(_) => ErrorKind::StorageUnavailable,
            SlatePassError::Config(_) | SlatePassError::Task(_) => ErrorKind::Internal,
        }
    }
}

impl From<SlatePassError> for Response {
    fn from(error: SlatePassError) -> Self {
        Response::error(ErrorKind::from(&error), error.to_string())
    }
}

/// Parse a request body; malformed input becomes an error response
pub fn decode_request(body: &[u8]) -> std::result::Result<Request, Response> {
    serde_json::from_slice(body)
        .map_err(|e| Response::error(ErrorKind::InvalidRequest, format!("Failed to parse JSON: {}", e)))
}

/// Read one length-prefixed frame. `Ok(None)` on a clean EOF before the length.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    match reader.read_exact(&mut length_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let length = u32::from_le_bytes(length_bytes) as usize;
    if length > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame of {} bytes exceeds limit of {}", length, max_len),
        ));
    }

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Frame too large"))?;
    writer.write_all(&length.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Serialize and write a response frame
pub async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_frame(writer, &json).await
}
