//! Append-only response log: the resume source and the sole durable record
//! of a run's outcomes.
//!
//! Writes are serialized behind one [`tokio::sync::Mutex`] guarding the open
//! file handle, mirroring the single-writer-many-reader shape used
//! throughout this workspace's ancestor crates for shared mutable state that
//! must never interleave.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_dispatch_core::GenericResponse;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Scans an existing response log (if any) and returns the set of
/// `original_row_idx` values already recorded.
///
/// A line that fails to deserialize as a [`GenericResponse`] is logged at
/// `warn` and skipped; scanning continues past it rather than aborting, so
/// a malformed tail (e.g. from a process killed mid-write) never blocks
/// resume.
pub async fn scan_resume_set(path: &Path) -> std::io::Result<HashSet<i64>> {
    let mut resumed = HashSet::new();

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(resumed),
        Err(err) => return Err(err),
    };

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<GenericResponse>(&line) {
            Ok(response) => {
                resumed.insert(response.generic_request.original_row_idx);
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(line = line_no, "skipping malformed response log line");
            }
        }
    }

    Ok(resumed)
}

/// Derives the output log path from the input request file's path by
/// substituting a `requests_` segment with `responses_`.
///
/// Falls back to appending `.responses.jsonl` (logged at `warn`) when the
/// input path contains no `requests_` segment, so the tool never silently
/// overwrites its own input.
pub fn derive_output_path(input: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if let Some(replaced) = file_name
        .contains("requests_")
        .then(|| file_name.replacen("requests_", "responses_", 1))
    {
        return input.with_file_name(replaced);
    }

    #[cfg(feature = "tracing")]
    tracing::warn!(
        input = %input.display(),
        "input path has no requests_ segment; appending .responses.jsonl instead"
    );
    let mut path = input.as_os_str().to_owned();
    path.push(".responses.jsonl");
    PathBuf::from(path)
}

/// A handle to the append-only response log.
#[derive(Clone)]
pub struct ResponseLog {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl ResponseLog {
    /// Opens (creating if necessary) the log file in append mode.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Serializes `response` as one JSON line and appends it atomically
    /// with respect to other concurrent callers of this method.
    pub async fn append(&self, response: &GenericResponse) -> std::io::Result<()> {
        let mut line = serde_json::to_string(response).map_err(std::io::Error::other)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use curator_dispatch_core::{ChatMessage, GenericRequest};
    use serde_json::Value;
    use tempfile_for_tests::TempPath;

    mod tempfile_for_tests {
        use std::path::{Path, PathBuf};

        /// Minimal scoped-temp-path helper so these tests don't need an
        /// extra dev-dependency for a one-line job: a unique path under the
        /// OS temp dir, removed on drop.
        pub struct TempPath(PathBuf);

        impl TempPath {
            pub fn new(label: &str) -> Self {
                let mut path = std::env::temp_dir();
                let unique = format!(
                    "curator-dispatch-log-test-{label}-{}",
                    std::process::id()
                );
                path.push(unique);
                TempPath(path)
            }
        }

        impl AsRef<Path> for TempPath {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    fn sample_response(idx: i64) -> GenericResponse {
        let now = Utc::now();
        GenericResponse {
            response_message: Some(Value::String("ok".into())),
            response_errors: None,
            raw_request: Value::Null,
            raw_response: None,
            generic_request: GenericRequest {
                original_row_idx: idx,
                model: "gpt-4o-mini".into(),
                messages: vec![ChatMessage {
                    role: "user".into(),
                    content: "hi".into(),
                    name: None,
                }],
                response_schema: None,
                generation_params: Value::Null,
            },
            created_at: now,
            finished_at: now,
            token_usage: None,
            response_cost: None,
            finish_reason: Some("stop".into()),
        }
    }

    #[test]
    fn derives_responses_path_from_requests_path() {
        let input = Path::new("/data/requests_batch1.jsonl");
        let output = derive_output_path(input);
        assert_eq!(output, Path::new("/data/responses_batch1.jsonl"));
    }

    #[test]
    fn falls_back_to_suffix_when_no_requests_segment() {
        let input = Path::new("/data/input.jsonl");
        let output = derive_output_path(input);
        assert_eq!(output, Path::new("/data/input.jsonl.responses.jsonl"));
    }

    #[tokio::test]
    async fn append_then_scan_round_trips() {
        let path = TempPath::new("roundtrip");
        let log = ResponseLog::open(path.as_ref()).await.unwrap();
        log.append(&sample_response(1)).await.unwrap();
        log.append(&sample_response(2)).await.unwrap();

        let resumed = scan_resume_set(path.as_ref()).await.unwrap();
        assert_eq!(resumed.len(), 2);
        assert!(resumed.contains(&1));
        assert!(resumed.contains(&2));
    }

    #[tokio::test]
    async fn scan_skips_malformed_lines_and_continues() {
        let path = TempPath::new("malformed");
        let log = ResponseLog::open(path.as_ref()).await.unwrap();
        log.append(&sample_response(1)).await.unwrap();
        {
            let mut file = log.file.lock().await;
            file.write_all(b"not json at all\n").await.unwrap();
        }
        log.append(&sample_response(2)).await.unwrap();

        let resumed = scan_resume_set(path.as_ref()).await.unwrap();
        assert_eq!(resumed.len(), 2);
    }

    #[tokio::test]
    async fn scan_of_missing_file_returns_empty_set() {
        let path = TempPath::new("missing");
        let resumed = scan_resume_set(path.as_ref()).await.unwrap();
        assert!(resumed.is_empty());
    }
}
