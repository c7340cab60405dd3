use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use std::path::Path;
use std::time::{Instant, SystemTime};
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::reporter::ProgressReporter;
use crate::utils::fs::{persist, temp_file_beside};

/// Outcome of a single HTTP exchange.
#[derive(Debug)]
pub(crate) enum Transfer {
    NotModified { last_modified: Option<SystemTime> },
    Downloaded { bytes: u64 },
}

pub(crate) fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub(crate) fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// HTTP dates carry whole seconds only.
pub(crate) fn same_second(a: SystemTime, b: SystemTime) -> bool {
    DateTime::<Utc>::from(a).timestamp() == DateTime::<Utc>::from(b).timestamp()
}

fn network_error(url: &str, reason: impl ToString) -> anyhow::Error {
    Error::NetworkError {
        url: url.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Request `url` and, unless the server answers 304, stream the body into a
/// temporary file beside `destination`. The file is SHA1 verified, stamped
/// with the server's `Last-Modified` and only then moved into place.
pub(crate) async fn transfer(
    client: &Client,
    url: &str,
    destination: &Path,
    expected_sha1: Option<&str>,
    if_modified_since: Option<SystemTime>,
    reporter: &dyn ProgressReporter,
) -> Result<Transfer> {
    let start = Instant::now();
    let mut request = client.get(url);
    if let Some(since) = if_modified_since {
        request = request.header(IF_MODIFIED_SINCE, http_date(since));
    }

    let response = request.send().await.map_err(|e| network_error(url, e))?;
    let last_modified = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    if response.status() == StatusCode::NOT_MODIFIED {
        return Ok(Transfer::NotModified { last_modified });
    }
    if !response.status().is_success() {
        return Err(network_error(url, format!("HTTP {}", response.status())));
    }

    let total_size = response.content_length();
    log::debug!("Download size: {:?} bytes", total_size);

    let temp = temp_file_beside(destination)?;
    let mut file = tokio::fs::File::from_std(
        temp.as_file()
            .try_clone()
            .context("Failed to open temporary download file")?,
    );
    let mut downloaded: u64 = 0;
    let mut chunk_count: u64 = 0;
    let mut hasher = Sha1::new();

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| network_error(url, e))?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);

        downloaded += chunk.len() as u64;
        chunk_count += 1;
        reporter.update_bytes(downloaded, total_size);
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let computed = format!("{:x}", hasher.finalize());
    if let Some(expected) = expected_sha1 {
        if !computed.eq_ignore_ascii_case(expected) {
            // dropping `temp` deletes the partial file
            return Err(Error::HashMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual: computed,
            }
            .into());
        }
        log::debug!("SHA1 validated: {}", computed);
    }

    persist(temp, destination)?;

    if let Some(time) = last_modified {
        if let Err(e) = stamp_modified(destination, time) {
            log::warn!("Failed to apply Last-Modified to {:?}: {}", destination, e);
        }
    }

    let elapsed = start.elapsed();
    let secs = elapsed.as_secs_f64();
    let throughput = (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001); // MB/s
    log::info!(
        "Download stats: url={}, size={} bytes, chunks={}, time={:.2}s, throughput={:.2} MB/s",
        url,
        downloaded,
        chunk_count,
        secs,
        throughput
    );

    Ok(Transfer::Downloaded { bytes: downloaded })
}

fn stamp_modified(path: &Path, time: SystemTime) -> std::io::Result<()> {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)?
        .set_modified(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_http_date_round_trip() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        let formatted = http_date(time);
        assert_eq!(formatted, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&formatted), Some(time));
    }

    #[test]
    fn test_same_second_ignores_subsecond() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert!(same_second(base, base + Duration::from_millis(400)));
        assert!(!same_second(base, base + Duration::from_secs(1)));
    }

    #[test]
    fn test_parse_http_date_rejects_garbage() {
        assert_eq!(parse_http_date("yesterday"), None);
    }
}
