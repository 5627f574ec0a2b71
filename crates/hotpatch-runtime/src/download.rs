use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use hotpatch_core::UpdateError;

const DOWNLOAD_BUFFER_SIZE: usize = 256 * 1024;

/// Local-file-header magic of the archive format.
const ARCHIVE_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub bytes_received: u64,
    /// Whether the first four bytes of the stream carried the archive
    /// magic number. Detected from the live stream, never from a re-read.
    pub is_archive: bool,
}

/// Streams `url` to `destination` in fixed-size chunks, reporting progress
/// after every chunk as `(declared_total, received_so_far)`. The declared
/// total is `None` when the response carries no length; callers must
/// tolerate that. When a length is declared, receiving a different number
/// of bytes fails closed with a transfer error.
///
/// There is no built-in timeout or cancellation; tearing down the
/// connection is the cancellation mechanism, and the partial destination
/// file is the caller's to clean up.
pub fn download<Progress>(
    url: &str,
    destination: &Path,
    mut progress: Progress,
) -> Result<DownloadOutcome>
where
    Progress: FnMut(Option<u64>, u64),
{
    // A malformed URL must fail before any network or file I/O happens.
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| UpdateError::MalformedData(format!("invalid download url '{url}': {err}")))?;

    let response = reqwest::blocking::get(parsed)
        .map_err(|err| UpdateError::Transfer(format!("request to {url} failed: {err}")))?
        .error_for_status()
        .map_err(|err| UpdateError::Transfer(format!("request to {url} failed: {err}")))?;
    let declared_length = response.content_length();

    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);

    let mut reader = response;
    let mut buffer = vec![0_u8; DOWNLOAD_BUFFER_SIZE];
    let mut header = [0_u8; 4];
    let mut received: u64 = 0;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| UpdateError::Transfer(format!("download stream from {url} failed: {err}")))?;
        if read == 0 {
            break;
        }

        if received < 4 {
            for (offset, byte) in buffer[..read].iter().enumerate() {
                let header_offset = received as usize + offset;
                if header_offset >= 4 {
                    break;
                }
                header[header_offset] = *byte;
            }
        }

        writer
            .write_all(&buffer[..read])
            .with_context(|| format!("failed writing {}", destination.display()))?;
        received += read as u64;
        progress(declared_length, received);
    }

    writer
        .flush()
        .with_context(|| format!("failed flushing {}", destination.display()))?;

    if let Some(expected) = declared_length {
        if received != expected {
            return Err(UpdateError::Transfer(format!(
                "received {received} bytes from {url}, expected {expected}"
            ))
            .into());
        }
    }

    Ok(DownloadOutcome {
        bytes_received: received,
        is_archive: received >= 4 && header == ARCHIVE_MAGIC,
    })
}
