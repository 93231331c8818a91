#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("health check {0:?} timed out")]
    Timeout(String),
}
