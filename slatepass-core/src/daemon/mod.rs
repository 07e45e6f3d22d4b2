//! Background service and the extension-facing protocol.

pub mod expiry;
pub mod protocol;
pub mod service;

pub use expiry::{ttl_from_secs, ExpiryQueue};
pub use protocol::{
    decode_request, read_frame, write_frame, write_response, ErrorKind, GenerationMode, Request,
    Response, ResponseData, PROTOCOL_VERSION,
};
pub use service::PassService;
