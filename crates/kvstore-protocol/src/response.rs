use kvstore_types::NodeId;

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{Reader, Writer};

/// Status codes carried in `STATUS` responses (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotPrimary,
    IoError,
    Malformed,
}

impl StatusCode {
    fn to_byte(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::NotPrimary => 1,
            StatusCode::IoError => 2,
            StatusCode::Malformed => 3,
        }
    }

    fn from_byte(b: u8) -> ProtocolResult<Self> {
        match b {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::NotPrimary),
            2 => Ok(StatusCode::IoError),
            3 => Ok(StatusCode::Malformed),
            other => Err(ProtocolError::Malformed(format!("unknown status code {other}"))),
        }
    }
}

/// The response half of the wire protocol table in §6.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientResponse {
    /// Ack for SET/BULKSET. `leader_hint` is populated only alongside
    /// `StatusCode::NotPrimary`.
    Status {
        code: StatusCode,
        leader_hint: Option<NodeId>,
    },
    /// Ack for DELETE; `existed` reflects whether the key was present
    /// before deletion but never affects durability (§4.1).
    DeleteStatus {
        code: StatusCode,
        existed: bool,
        leader_hint: Option<NodeId>,
    },
    Value {
        value: Option<Vec<u8>>,
    },
    KeyList {
        keys: Vec<Vec<u8>>,
    },
    ScoredList {
        scored: Vec<(Vec<u8>, f32)>,
    },
}

impl ClientResponse {
    fn tag(&self) -> u8 {
        match self {
            ClientResponse::Status { .. } => 0x01,
            ClientResponse::Value { .. } => 0x02,
            ClientResponse::DeleteStatus { .. } => 0x03,
            ClientResponse::KeyList { .. } => 0x04,
            ClientResponse::ScoredList { .. } => 0x05,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(self.tag());
        match self {
            ClientResponse::Status { code, leader_hint } => {
                write_status(&mut w, *code, *leader_hint);
            }
            ClientResponse::DeleteStatus {
                code,
                existed,
                leader_hint,
            } => {
                write_status(&mut w, *code, *leader_hint);
                w.u8(*existed as u8);
            }
            ClientResponse::Value { value } => match value {
                Some(v) => {
                    w.u8(1).bytes(v);
                }
                None => {
                    w.u8(0);
                }
            },
            ClientResponse::KeyList { keys } => {
                w.u32(keys.len() as u32);
                for key in keys {
                    w.bytes(key);
                }
            }
            ClientResponse::ScoredList { scored } => {
                w.u32(scored.len() as u32);
                for (key, score) in scored {
                    w.bytes(key).f32(*score);
                }
            }
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut r = Reader::new(payload);
        let tag = r.u8()?;
        let response = match tag {
            0x01 => {
                let (code, leader_hint) = read_status(&mut r)?;
                ClientResponse::Status { code, leader_hint }
            }
            0x02 => {
                let present = r.u8()?;
                let value = if present == 1 { Some(r.bytes()?) } else { None };
                ClientResponse::Value { value }
            }
            0x03 => {
                let (code, leader_hint) = read_status(&mut r)?;
                let existed = r.u8()? == 1;
                ClientResponse::DeleteStatus {
                    code,
                    existed,
                    leader_hint,
                }
            }
            0x04 => {
                let n = r.u32()? as usize;
                let mut keys = Vec::with_capacity(n);
                for _ in 0..n {
                    keys.push(r.bytes()?);
                }
                ClientResponse::KeyList { keys }
            }
            0x05 => {
                let n = r.u32()? as usize;
                let mut scored = Vec::with_capacity(n);
                for _ in 0..n {
                    scored.push((r.bytes()?, r.f32()?));
                }
                ClientResponse::ScoredList { scored }
            }
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(response)
    }
}

fn write_status(w: &mut Writer, code: StatusCode, leader_hint: Option<NodeId>) {
    w.u8(code.to_byte());
    match leader_hint {
        Some(node_id) => {
            w.u8(1);
            w.u32(node_id.get() as u32);
        }
        None => {
            w.u8(0);
        }
    }
}

fn read_status(r: &mut Reader) -> ProtocolResult<(StatusCode, Option<NodeId>)> {
    let code = StatusCode::from_byte(r.u8()?)?;
    let has_hint = r.u8()? == 1;
    let leader_hint = if has_hint {
        Some(NodeId::new(r.u32()? as u16))
    } else {
        None
    };
    Ok((code, leader_hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! roundtrip_test {
        ($name:ident, $resp:expr) => {
            #[test]
            fn $name() {
                let resp = $resp;
                let encoded = resp.encode();
                let decoded = ClientResponse::decode(&encoded).unwrap();
                assert_eq!(decoded, resp);
            }
        };
    }

    roundtrip_test!(
        status_ok_roundtrip,
        ClientResponse::Status {
            code: StatusCode::Ok,
            leader_hint: None,
        }
    );
    roundtrip_test!(
        status_not_primary_roundtrip,
        ClientResponse::Status {
            code: StatusCode::NotPrimary,
            leader_hint: Some(NodeId::new(2)),
        }
    );
    roundtrip_test!(
        delete_status_roundtrip,
        ClientResponse::DeleteStatus {
            code: StatusCode::Ok,
            existed: true,
            leader_hint: None,
        }
    );
    roundtrip_test!(
        value_present_roundtrip,
        ClientResponse::Value {
            value: Some(b"v".to_vec()),
        }
    );
    roundtrip_test!(value_absent_roundtrip, ClientResponse::Value { value: None });
    roundtrip_test!(
        key_list_roundtrip,
        ClientResponse::KeyList {
            keys: vec![b"a".to_vec(), b"b".to_vec()],
        }
    );
    roundtrip_test!(
        scored_list_roundtrip,
        ClientResponse::ScoredList {
            scored: vec![(b"k1".to_vec(), 0.9), (b"k2".to_vec(), 0.4)],
        }
    );
}
