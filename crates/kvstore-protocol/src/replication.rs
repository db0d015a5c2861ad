use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{Reader, Writer};

/// The replication/election wire protocol (§6), multiplexed on tags `>= 0x80`
/// so it can share a listener with the client protocol if a deployment
/// chooses to, though the node binary runs it on its own port.
///
/// `Append`'s `kind`/`payload` fields are opaque here: they carry whatever
/// byte encoding the storage engine's WAL payload uses, so this crate has no
/// dependency on `kvstore-storage`. The replication sender/receiver decode
/// them at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicationMessage {
    Append {
        term: u64,
        seq: u64,
        kind: u8,
        payload: Vec<u8>,
    },
    AppendAck {
        term: u64,
        seq: u64,
        ok: bool,
    },
    VoteRequest {
        term: u64,
        candidate_id: u16,
        last_applied_seq: u64,
    },
    VoteResponse {
        term: u64,
        vote_granted: bool,
    },
    Heartbeat {
        term: u64,
        leader_id: u16,
        commit_seq: u64,
    },
    SnapshotBegin {
        seq: u64,
    },
    SnapshotChunk {
        bytes: Vec<u8>,
    },
    SnapshotEnd,
}

impl ReplicationMessage {
    pub fn tag(&self) -> u8 {
        match self {
            ReplicationMessage::Append { .. } => 0x80,
            ReplicationMessage::AppendAck { .. } => 0x81,
            ReplicationMessage::VoteRequest { .. } => 0x82,
            ReplicationMessage::VoteResponse { .. } => 0x83,
            ReplicationMessage::Heartbeat { .. } => 0x84,
            ReplicationMessage::SnapshotBegin { .. } => 0x85,
            ReplicationMessage::SnapshotChunk { .. } => 0x86,
            ReplicationMessage::SnapshotEnd => 0x87,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(self.tag());
        match self {
            ReplicationMessage::Append {
                term,
                seq,
                kind,
                payload,
            } => {
                w.u64(*term).u64(*seq).u8(*kind).bytes(payload);
            }
            ReplicationMessage::AppendAck { term, seq, ok } => {
                w.u64(*term).u64(*seq).u8(*ok as u8);
            }
            ReplicationMessage::VoteRequest {
                term,
                candidate_id,
                last_applied_seq,
            } => {
                w.u64(*term).u32(*candidate_id as u32).u64(*last_applied_seq);
            }
            ReplicationMessage::VoteResponse { term, vote_granted } => {
                w.u64(*term).u8(*vote_granted as u8);
            }
            ReplicationMessage::Heartbeat {
                term,
                leader_id,
                commit_seq,
            } => {
                w.u64(*term).u32(*leader_id as u32).u64(*commit_seq);
            }
            ReplicationMessage::SnapshotBegin { seq } => {
                w.u64(*seq);
            }
            ReplicationMessage::SnapshotChunk { bytes } => {
                w.bytes(bytes);
            }
            ReplicationMessage::SnapshotEnd => {}
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut r = Reader::new(payload);
        let tag = r.u8()?;
        let message = match tag {
            0x80 => ReplicationMessage::Append {
                term: r.u64()?,
                seq: r.u64()?,
                kind: r.u8()?,
                payload: r.bytes()?,
            },
            0x81 => ReplicationMessage::AppendAck {
                term: r.u64()?,
                seq: r.u64()?,
                ok: r.u8()? == 1,
            },
            0x82 => ReplicationMessage::VoteRequest {
                term: r.u64()?,
                candidate_id: r.u32()? as u16,
                last_applied_seq: r.u64()?,
            },
            0x83 => ReplicationMessage::VoteResponse {
                term: r.u64()?,
                vote_granted: r.u8()? == 1,
            },
            0x84 => ReplicationMessage::Heartbeat {
                term: r.u64()?,
                leader_id: r.u32()? as u16,
                commit_seq: r.u64()?,
            },
            0x85 => ReplicationMessage::SnapshotBegin { seq: r.u64()? },
            0x86 => ReplicationMessage::SnapshotChunk { bytes: r.bytes()? },
            0x87 => ReplicationMessage::SnapshotEnd,
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! roundtrip_test {
        ($name:ident, $msg:expr) => {
            #[test]
            fn $name() {
                let msg = $msg;
                let encoded = msg.encode();
                let decoded = ReplicationMessage::decode(&encoded).unwrap();
                assert_eq!(decoded, msg);
            }
        };
    }

    roundtrip_test!(
        append_roundtrip,
        ReplicationMessage::Append {
            term: 3,
            seq: 50,
            kind: 1,
            payload: b"serialized-set".to_vec(),
        }
    );
    roundtrip_test!(
        append_ack_roundtrip,
        ReplicationMessage::AppendAck {
            term: 3,
            seq: 50,
            ok: true,
        }
    );
    roundtrip_test!(
        vote_request_roundtrip,
        ReplicationMessage::VoteRequest {
            term: 4,
            candidate_id: 2,
            last_applied_seq: 49,
        }
    );
    roundtrip_test!(
        vote_response_roundtrip,
        ReplicationMessage::VoteResponse {
            term: 4,
            vote_granted: false,
        }
    );
    roundtrip_test!(
        heartbeat_roundtrip,
        ReplicationMessage::Heartbeat {
            term: 3,
            leader_id: 0,
            commit_seq: 50,
        }
    );
    roundtrip_test!(snapshot_begin_roundtrip, ReplicationMessage::SnapshotBegin { seq: 50 });
    roundtrip_test!(
        snapshot_chunk_roundtrip,
        ReplicationMessage::SnapshotChunk {
            bytes: vec![1, 2, 3, 4],
        }
    );
    roundtrip_test!(snapshot_end_roundtrip, ReplicationMessage::SnapshotEnd);
}
