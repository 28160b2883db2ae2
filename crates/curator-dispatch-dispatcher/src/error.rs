/// Fatal bootstrap conditions. Never raised for per-request failures, which
/// are recorded as permanent-failure log entries instead (§7).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("input file not found: {0}")]
    InputNotFound(std::path::PathBuf),

    #[error("could not open response log at {path}: {source}")]
    ResponseLog {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input file: {0}")]
    InputIo(#[from] std::io::Error),

    #[error("malformed request on input line {line}: {source}")]
    MalformedRequest {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("no API key configured and none found in the environment")]
    MissingApiKey,
}
