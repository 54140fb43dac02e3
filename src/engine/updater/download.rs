//! HTTP Download Manager
//!
//! Streams update artifacts to the staging file with byte-offset resume,
//! bounded retries and container-format sniffing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_ENCODING, RANGE};
use reqwest::redirect::Policy;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::engine::config::DownloadConfig;
use crate::engine::error::{Result, UpdateError};

/// ZIP local-file-header signature
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Snapshot handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received_bytes: u64,
    pub total_bytes: u64,
}

/// Download result with metadata
#[derive(Debug)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub bytes_downloaded: u64,
    pub is_container: bool,
    pub attempts: u32,
}

/// One ranged GET as seen by a transport
#[derive(Debug)]
pub struct DownloadRequest<'a> {
    pub url: &'a Url,
    pub offset: u64,
}

pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }
}

/// Opens one streaming response per attempt. Errors are transient by contract.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &DownloadRequest<'_>) -> std::result::Result<TransportResponse, String>;
}

/// Blocking reqwest transport with redirects disabled
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| UpdateError::unknown("Error building HTTP client", e))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &DownloadRequest<'_>) -> std::result::Result<TransportResponse, String> {
        let response = self
            .client
            .get(request.url.clone())
            .header(RANGE, format!("bytes={}-", request.offset))
            .header(ACCEPT_ENCODING, "identity")
            .header("x-accept-ranges", "partial-content")
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

/// Result of a single attempt, consumed by the retry driver
#[derive(Debug)]
enum AttemptOutcome {
    Complete,
    Retryable(String),
    Fatal(UpdateError),
}

/// Transfer bookkeeping that survives across attempts
#[derive(Debug, Default)]
struct TransferState {
    offset: u64,
    declared_total: Option<u64>,
    header: [u8; 4],
}

impl TransferState {
    fn capture_header(&mut self, chunk: &[u8]) {
        let mut position = self.offset;
        for byte in chunk {
            if position >= ZIP_MAGIC.len() as u64 {
                break;
            }
            self.header[position as usize] = *byte;
            position += 1;
        }
    }

    fn is_container(&self) -> bool {
        self.offset >= ZIP_MAGIC.len() as u64 && self.header == ZIP_MAGIC
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            received_bytes: self.offset,
            total_bytes: self.declared_total.unwrap_or(0),
        }
    }
}

/// Download manager for update artifacts
pub struct Downloader {
    transport: Box<dyn HttpTransport>,
    max_retries: u32,
    buffer_size: usize,
    retry_delay: Duration,
}

impl Downloader {
    /// Create a downloader backed by reqwest
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Ok(Self::with_transport(Box::new(ReqwestTransport::new(config)?), config))
    }

    pub fn with_transport(transport: Box<dyn HttpTransport>, config: &DownloadConfig) -> Self {
        Self {
            transport,
            max_retries: config.max_retries,
            buffer_size: config.buffer_size.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Download `url` to `dest`, resuming across failed attempts.
    ///
    /// The progress callback runs synchronously on the calling thread.
    pub fn download<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<DownloadResult>
    where
        F: FnMut(DownloadProgress),
    {
        let parsed = parse_download_url(url)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UpdateError::unknown(format!("Error creating {}", parent.display()), e)
            })?;
        }
        // Leftovers from an earlier run have no declared total to resume against.
        discard_partial(dest);

        let mut transfer = TransferState::default();
        let mut retried: u32 = 0;

        loop {
            let started = Instant::now();
            let outcome = self.attempt(&parsed, dest, &mut transfer, retried == 0, &mut on_progress);
            let elapsed_ms = started.elapsed().as_millis();

            match outcome {
                AttemptOutcome::Complete => {
                    info!(
                        "Download finished successful, {} ms, offset {}/{}",
                        elapsed_ms,
                        transfer.offset,
                        transfer.offset
                    );
                    return Ok(DownloadResult {
                        path: dest.to_path_buf(),
                        bytes_downloaded: transfer.offset,
                        is_container: transfer.is_container(),
                        attempts: retried + 1,
                    });
                }
                AttemptOutcome::Fatal(err) => {
                    discard_partial(dest);
                    return Err(err);
                }
                AttemptOutcome::Retryable(reason) => {
                    warn!(
                        "Download finished failed, {} ms, offset {}/{}: {}",
                        elapsed_ms,
                        transfer.offset,
                        transfer.declared_total.unwrap_or(0),
                        reason
                    );
                    if retried < self.max_retries {
                        retried += 1;
                        info!("Going to retry, retried [{}/{}]", retried, self.max_retries);
                        if !self.retry_delay.is_zero() {
                            thread::sleep(self.retry_delay);
                        }
                        continue;
                    }

                    warn!("Exceeded retry ceiling [{}], giving up", self.max_retries);
                    discard_partial(dest);
                    return Err(UpdateError::Network {
                        url: url.to_string(),
                        attempts: retried + 1,
                        received: transfer.offset,
                        expected: transfer.declared_total,
                        reason,
                    });
                }
            }
        }
    }

    fn attempt<F>(
        &self,
        url: &Url,
        dest: &Path,
        transfer: &mut TransferState,
        first_attempt: bool,
        on_progress: &mut F,
    ) -> AttemptOutcome
    where
        F: FnMut(DownloadProgress),
    {
        // Resume from what actually reached the disk.
        transfer.offset = if first_attempt {
            0
        } else {
            fs::metadata(dest).map(|m| m.len()).unwrap_or(0)
        };

        let response = match self.transport.get(&DownloadRequest {
            url,
            offset: transfer.offset,
        }) {
            Ok(response) => response,
            Err(reason) => return AttemptOutcome::Retryable(reason),
        };

        if transfer.offset > 0 && !response.is_partial_content() {
            warn!(
                "Server ignored range request at offset {}, restarting from byte 0",
                transfer.offset
            );
            transfer.offset = 0;
        }

        if transfer.offset == 0 {
            match response.content_length {
                Some(total) => transfer.declared_total = Some(total),
                None => {
                    return AttemptOutcome::Retryable(
                        "response did not declare a content length".to_string(),
                    )
                }
            }
        }

        let file = if transfer.offset == 0 {
            File::create(dest)
        } else {
            info!(
                "Append file for resume offset {}, file {}",
                transfer.offset,
                dest.display()
            );
            OpenOptions::new().append(true).open(dest)
        };
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                return AttemptOutcome::Retryable(format!("cannot open {}: {}", dest.display(), e))
            }
        };

        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut body = response.body;
        let streamed = self.stream_body(&mut body, &mut writer, transfer, on_progress);

        // Release the connection and the file before judging the attempt.
        drop(body);
        let closed = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all());
        if let Err(e) = closed {
            return AttemptOutcome::Fatal(UpdateError::unknown("Error closing IO resources", e));
        }

        if let Err(reason) = streamed {
            return AttemptOutcome::Retryable(reason);
        }

        let expected = transfer.declared_total.unwrap_or(0);
        if transfer.offset != expected {
            return AttemptOutcome::Retryable(format!(
                "Received {} bytes, expected {}",
                transfer.offset, expected
            ));
        }

        AttemptOutcome::Complete
    }

    fn stream_body<F>(
        &self,
        body: &mut Box<dyn Read + Send>,
        writer: &mut BufWriter<File>,
        transfer: &mut TransferState,
        on_progress: &mut F,
    ) -> std::result::Result<(), String>
    where
        F: FnMut(DownloadProgress),
    {
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("Read stream error: {}", e)),
            };

            transfer.capture_header(&buffer[..read]);
            writer
                .write_all(&buffer[..read])
                .map_err(|e| format!("Write error: {}", e))?;
            transfer.offset += read as u64;
            on_progress(transfer.progress());
        }
        debug!(
            "Stream ended, received {} bytes, expected {:?}",
            transfer.offset, transfer.declared_total
        );
        Ok(())
    }
}

/// Parse a download URL, rejecting anything that is not http(s)
pub fn parse_download_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| UpdateError::MalformedUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(UpdateError::MalformedUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme \"{}\"", other),
        }),
    }
}

/// Check whether `bytes` start with the ZIP signature
pub fn is_container_magic(bytes: &[u8]) -> bool {
    bytes.len() >= ZIP_MAGIC.len() && bytes[..ZIP_MAGIC.len()] == ZIP_MAGIC
}

pub(crate) fn discard_partial(dest: &Path) {
    if dest.exists() {
        if let Err(e) = fs::remove_file(dest) {
            warn!("Could not delete partial download {}: {}", dest.display(), e);
        }
    }
}
