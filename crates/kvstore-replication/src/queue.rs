use kvstore_types::Seq;

/// Default bound on a follower's pending-entry queue. Exceeding it forces a
/// snapshot resync rather than let the primary's write gate block on a slow
/// or partitioned follower (§4.3).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One WAL entry queued for shipment to a follower. `kind`/`payload` are the
/// same bytes the storage engine would have written to its own WAL, so the
/// follower can append and apply them without re-deriving anything.
#[derive(Clone, Debug)]
pub struct QueuedEntry {
    pub seq: Seq,
    pub kind: u8,
    pub payload: Vec<u8>,
}
