/// Component-boundary error type, mirroring the teacher's `ShipperError`
/// shape (`services/log-collector/src/shipper/shipper.rs`): small, named
/// variants instead of a string bag.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("entry rejected: content or source name empty")]
    InvalidEntry,
    #[error("queue at MaxQueueSize, entry rejected")]
    Full,
    #[error("queue in backpressure mode, entry priority too low")]
    Backpressure,
}
