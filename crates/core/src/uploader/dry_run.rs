//! Local uploader that reads the video in chunks and reports progress
//! without touching the network.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::UploadError;
use crate::event::UploadEvent;
use crate::uploader::{EventSink, UploadRequest, UploadResult, Uploader};

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub struct DryRunUploader {
    chunk_size: usize,
    chunk_delay: Duration,
}

impl DryRunUploader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_delay: Duration::ZERO,
        }
    }

    /// Sleep between chunks, to make a local run look like a slow link.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    async fn read_pages(
        &self,
        request: &UploadRequest,
        events: &mut dyn EventSink,
    ) -> Result<[u8; 32], UploadError> {
        let total_bytes = request.total_bytes();
        let mut hasher = Sha256::new();
        let mut sent: u64 = 0;
        let largest_page = request.pages.iter().map(|p| p.size_bytes).max().unwrap_or(0);
        let buf_len = usize::try_from(largest_page.max(1))
            .map_or(self.chunk_size, |n| n.min(self.chunk_size));
        let mut buf = vec![0u8; buf_len];

        for (index, page) in request.pages.iter().enumerate() {
            let page_number = u32::try_from(index + 1).ok();
            events.emit(UploadEvent::PrePage { page_number });

            let chunks = page.size_bytes.div_ceil(self.chunk_size as u64).max(1);
            events.emit(UploadEvent::PreChunk { total_chunks: Some(chunks) });

            let mut file = tokio::fs::File::open(&page.path).await?;
            loop {
                let n = read_chunk(&mut file, &mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                sent += n as u64;
                let percentage = if total_bytes == 0 {
                    100.0
                } else {
                    (sent as f64 * 100.0 / total_bytes as f64).min(100.0)
                };
                events.emit(UploadEvent::AfterChunk { percentage: Some(percentage) });
                if !self.chunk_delay.is_zero() {
                    tokio::time::sleep(self.chunk_delay).await;
                }
            }
            if page.size_bytes == 0 {
                events.emit(UploadEvent::AfterChunk { percentage: Some(100.0) });
            }

            events.emit(UploadEvent::AfterPage { page_number });
        }
        hasher.update(request.meta.title.as_bytes());
        Ok(hasher.finalize().into())
    }
}

impl Default for DryRunUploader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Uploader for DryRunUploader {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn start(
        &mut self,
        request: &UploadRequest,
        events: &mut dyn EventSink,
    ) -> Result<UploadResult, UploadError> {
        events.emit(UploadEvent::PreUpload);
        match self.read_pages(request, events).await {
            Ok(digest) => {
                events.emit(UploadEvent::Completed);
                Ok(result_from_digest(&digest))
            }
            Err(e) => {
                events.emit(UploadEvent::Failed { error: Some(e.to_string()) });
                Err(e)
            }
        }
    }
}

/// Fill `buf` unless the file ends first.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Stable fake identifiers derived from the uploaded content.
fn result_from_digest(digest: &[u8; 32]) -> UploadResult {
    let mut aid = [0u8; 8];
    aid.copy_from_slice(&digest[..8]);
    let mut cid = [0u8; 8];
    cid.copy_from_slice(&digest[8..16]);
    let bvid: String = digest[16..21].iter().map(|b| format!("{:02x}", b)).collect();
    UploadResult {
        aid: u64::from_be_bytes(aid) >> 24,
        bvid: format!("BV{}", bvid),
        cid: Some(u64::from_be_bytes(cid) >> 24),
    }
}
