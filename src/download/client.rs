//! HTTP client wrapper that performs a single transfer.
//!
//! A transfer streams the response body into a temporary file next to the
//! destination, reports cumulative byte counts after every chunk, and then
//! moves the payload into place, replacing whatever was there before.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, PARTIAL_SUFFIX};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for streaming downloads.
///
/// Create once and reuse for every transfer in a batch so connections are
/// pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Outcome of a finalized transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Final destination path.
    pub path: PathBuf,
    /// Size of the file on disk after the move.
    pub bytes: u64,
    /// Length the server declared, if any.
    pub content_length: Option<u64>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice; use [`Self::with_connect_timeout`]
    /// to handle the error instead.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_connect_timeout(CONNECT_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with an explicit connect timeout.
    ///
    /// No overall request timeout is set: a large payload may legitimately
    /// take a long time, and stalled connections are left to the transport.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the TLS backend cannot be initialized.
    pub fn with_connect_timeout(connect_timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Downloads `url` into `destination_root/file_name`.
    ///
    /// `on_progress` receives the cumulative byte count and the declared
    /// content length after every received chunk.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] if `cancel` fires before the
    /// payload is in place, and the other [`DownloadError`] variants for
    /// network, HTTP, and filesystem failures. The temporary file is removed
    /// on every error path.
    #[instrument(skip(self, cancel, on_progress), fields(url = %url, file = %file_name))]
    pub async fn download<F>(
        &self,
        url: &str,
        destination_root: &Path,
        file_name: &str,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TransferResult, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let destination = destination_root.join(file_name);
        let partial = partial_path(destination_root, file_name);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            response = self.send_request(url) => response?,
        };

        let content_length = response.content_length().filter(|len| *len > 0);
        debug!(content_length, partial = %partial.display(), "response accepted, streaming");

        let streamed = stream_to_file(response, url, &partial, cancel, &mut on_progress).await;
        let bytes = match streamed {
            Ok(0) => {
                remove_quietly(&partial).await;
                return Err(DownloadError::empty_payload(url));
            }
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %partial.display(), "cleaning up partial file after error");
                remove_quietly(&partial).await;
                return Err(error);
            }
        };

        if cancel.is_cancelled() {
            remove_quietly(&partial).await;
            return Err(DownloadError::cancelled(url));
        }

        let final_size = finalize(&partial, &destination).await?;
        info!(
            path = %destination.display(),
            streamed = bytes,
            bytes = final_size,
            "download finalized"
        );

        Ok(TransferResult {
            path: destination,
            bytes: final_size,
            content_length,
        })
    }

    async fn send_request(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Temporary path a transfer writes to before finalization.
#[must_use]
pub fn partial_path(destination_root: &Path, file_name: &str) -> PathBuf {
    destination_root.join(format!(".{file_name}{PARTIAL_SUFFIX}"))
}

/// Streams the body into `path`, returning the number of bytes written.
async fn stream_to_file<F>(
    response: reqwest::Response,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
    on_progress: &mut F,
) -> Result<u64, DownloadError>
where
    F: FnMut(u64, Option<u64>) + Send,
{
    let content_length = response.content_length().filter(|len| *len > 0);
    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        bytes_written += chunk.len() as u64;
        on_progress(bytes_written, content_length);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}

/// Moves the finished payload over `destination` and returns its size.
///
/// A file already present at `destination` is replaced.
async fn finalize(partial: &Path, destination: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!(path = %destination.display(), "replaced existing file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            remove_quietly(partial).await;
            return Err(DownloadError::io(destination, e));
        }
    }

    if let Err(e) = tokio::fs::rename(partial, destination).await {
        remove_quietly(partial).await;
        return Err(DownloadError::io(destination, e));
    }

    tokio::fs::metadata(destination)
        .await
        .map(|meta| meta.len())
        .map_err(|e| DownloadError::io(destination, e))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %e, "could not remove temporary file");
    }
}
