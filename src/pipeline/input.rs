//! Input resolution: load a user-supplied path or URL into an [`Artifact`].
//!
//! Documents are uploaded from memory, so both local files and downloads end
//! up as a byte buffer. The content type comes from the response's
//! `Content-Type` header when downloading, and from the file extension
//! otherwise.

use crate::error::SubmissionError;
use crate::model::Artifact;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` into memory.
///
/// If the input is a URL, download it with a `timeout_secs` budget.
/// Otherwise read it as a local file.
pub async fn load_artifact(input: &str, timeout_secs: u64) -> Result<Artifact, SubmissionError> {
    let artifact = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    if artifact.bytes.is_empty() {
        return Err(SubmissionError::EmptyArtifact {
            name: artifact.name,
        });
    }
    Ok(artifact)
}

async fn read_local(path_str: &str) -> Result<Artifact, SubmissionError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SubmissionError::FileNotFound { path });
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(SubmissionError::PermissionDenied { path });
        }
        Err(source) => return Err(SubmissionError::ReadFailed { path, source }),
    };

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(Artifact::from_bytes(path_str, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Artifact, SubmissionError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| SubmissionError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SubmissionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?
        .to_vec();

    info!("Downloaded {} ({} bytes)", filename, bytes.len());

    Ok(match content_type {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => {
            Artifact::new(filename, ct, bytes)
        }
        _ => Artifact::from_bytes(filename, bytes),
    })
}

/// Last non-empty path segment of `url`, or `document` when there is none.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
