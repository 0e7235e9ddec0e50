//! Streaming HTTP download to a file.
//!
//! The body is streamed chunk by chunk into `<dest>.part` and renamed to
//! `dest` only once the whole response has been written, so `dest` never
//! holds a truncated download. Nothing is retried.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::LauncherError;

/// Sends `request` and streams a successful body into `dest`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// - `Network` if the request cannot be sent or the body stream breaks
/// - `Http` (carrying the response body) on a non-success status
/// - `Io` if the file cannot be created, written or renamed
pub async fn download_to_file(
    request: reqwest::RequestBuilder,
    url: &str,
    dest: &Path,
) -> Result<u64> {
    let response = request
        .send()
        .await
        .map_err(|e| LauncherError::network(format!("failed to connect to {url}"), e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .ok()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("no response body").to_string());
        return Err(LauncherError::http(status.as_u16(), body).into());
    }

    let total_size = response.content_length().unwrap_or(0);
    let temp_path = partial_path(dest);

    match stream_body(response, url, &temp_path).await {
        Ok(downloaded) => {
            tokio::fs::rename(&temp_path, dest).await.map_err(|e| {
                LauncherError::io(
                    format!(
                        "failed to rename {} to {}",
                        temp_path.display(),
                        dest.display()
                    ),
                    e,
                )
            })?;
            debug!(url, downloaded, total_size, "download complete");
            Ok(downloaded)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

async fn stream_body(response: reqwest::Response, url: &str, dest: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| LauncherError::io(format!("failed to create {}", dest.display()), e))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let start_time = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| LauncherError::network(format!("failed to read chunk from {url}"), e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| LauncherError::io(format!("failed to write to {}", dest.display()), e))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| LauncherError::io(format!("failed to flush {}", dest.display()), e))?;

    debug!(
        url,
        downloaded,
        elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        "streamed body"
    );
    Ok(downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
