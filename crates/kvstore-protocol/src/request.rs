use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{Reader, Writer};

/// `search_text` combinator, wire-encoded as a single byte (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    And,
    Or,
}

impl SearchMode {
    fn to_byte(self) -> u8 {
        match self {
            SearchMode::And => 0,
            SearchMode::Or => 1,
        }
    }

    fn from_byte(b: u8) -> ProtocolResult<Self> {
        match b {
            0 => Ok(SearchMode::And),
            1 => Ok(SearchMode::Or),
            other => Err(ProtocolError::Malformed(format!("unknown search mode {other}"))),
        }
    }
}

/// The client request half of the wire protocol table in §6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientRequest {
    Set { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
    BulkSet { pairs: Vec<(Vec<u8>, Vec<u8>)> },
    Search { mode: SearchMode, query: Vec<u8> },
    SemSearch { k: u32, threshold: f32, query: Vec<u8> },
}

impl ClientRequest {
    pub fn tag(&self) -> u8 {
        match self {
            ClientRequest::Set { .. } => 0x01,
            ClientRequest::Get { .. } => 0x02,
            ClientRequest::Delete { .. } => 0x03,
            ClientRequest::BulkSet { .. } => 0x04,
            ClientRequest::Search { .. } => 0x05,
            ClientRequest::SemSearch { .. } => 0x06,
        }
    }

    /// Encode the tag byte followed by the request body; this is the
    /// payload that gets length-prefixed by [`crate::wire::encode_frame`].
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(self.tag());
        match self {
            ClientRequest::Set { key, value } => {
                w.bytes(key).bytes(value);
            }
            ClientRequest::Get { key } => {
                w.bytes(key);
            }
            ClientRequest::Delete { key } => {
                w.bytes(key);
            }
            ClientRequest::BulkSet { pairs } => {
                w.u32(pairs.len() as u32);
                for (k, v) in pairs {
                    w.bytes(k).bytes(v);
                }
            }
            ClientRequest::Search { mode, query } => {
                w.u8(mode.to_byte()).bytes(query);
            }
            ClientRequest::SemSearch { k, threshold, query } => {
                w.u32(*k).f32(*threshold).bytes(query);
            }
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut r = Reader::new(payload);
        let tag = r.u8()?;
        let request = match tag {
            0x01 => ClientRequest::Set {
                key: r.bytes()?,
                value: r.bytes()?,
            },
            0x02 => ClientRequest::Get { key: r.bytes()? },
            0x03 => ClientRequest::Delete { key: r.bytes()? },
            0x04 => {
                let n = r.u32()? as usize;
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    pairs.push((r.bytes()?, r.bytes()?));
                }
                ClientRequest::BulkSet { pairs }
            }
            0x05 => {
                let mode = SearchMode::from_byte(r.u8()?)?;
                ClientRequest::Search {
                    mode,
                    query: r.bytes()?,
                }
            }
            0x06 => {
                let k = r.u32()?;
                let threshold = r.f32()?;
                ClientRequest::SemSearch {
                    k,
                    threshold,
                    query: r.bytes()?,
                }
            }
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(request)
    }
}
