#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("subscriber limit reached ({0} max)")]
    SubscriberLimitReached(usize),
    #[error("subscriber {0:?} not found or already disconnected")]
    Disconnected(String),
}
