/// Component-boundary error type for the Tailing Engine, mirroring the
/// teacher's `ShipperError` shape.
#[derive(Debug, thiserror::Error)]
pub enum TailingError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("source {0:?} already exists")]
    SourceExists(String),
    #[error("source {0:?} not found")]
    SourceNotFound(String),
    #[error("invalid glob pattern {0:?}: {1}")]
    InvalidPattern(String, String),
}
