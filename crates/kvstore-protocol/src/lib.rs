//! Length-prefixed binary wire protocol for client requests and replication
//! messages (§6). Deliberately not HTTP: a single `[len:u32][tag:u8][body]`
//! frame per request/response/message keeps the hot path allocation-light
//! and makes the framing trivial to reason about for crash/replay testing.

pub mod error;
pub mod replication;
pub mod request;
pub mod response;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use replication::ReplicationMessage;
pub use request::{ClientRequest, SearchMode};
pub use response::{ClientResponse, StatusCode};
pub use wire::{decode_frame, encode_frame, MAX_MESSAGE_SIZE};
