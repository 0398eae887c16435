//! HTTP downloads for toolchain artifacts.
//!
//! Bodies are streamed to `<dest>.tmp` and renamed into place only once
//! complete, so `dest` never holds a truncated artifact. Transient failures
//! are retried three times with exponential backoff. A one-line progress
//! meter is drawn on stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use futures_util::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const ATTEMPTS: u32 = 3;

/// First retry waits about this long; each later one doubles it.
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Whole-request timeout. The LLVM tarball is large.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1800);

/// Minimum time between redraws of the progress meter.
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

/// Downloads `url` to `dest`, replacing any existing file.
///
/// # Errors
///
/// Returns the last attempt's error if every attempt fails (connection
/// errors, non-success HTTP statuses, interrupted bodies), or an error if the
/// destination directory cannot be created or the finished file cannot be
/// moved into place.
pub async fn download_file(url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;
    let partial = temp_path_for(dest);

    let mut failure = None;
    for attempt in 1..=ATTEMPTS {
        if attempt > 1 {
            warn!("retrying download of {url} (attempt {attempt}/{ATTEMPTS})");
            tokio::time::sleep(retry_delay(attempt - 1)).await;
        }

        match fetch_once(&client, url, &partial).await {
            Ok(()) => {
                tokio::fs::rename(&partial, dest).await.with_context(|| {
                    format!("Failed to move {} into place", partial.display())
                })?;
                debug!("downloaded {url} to {}", dest.display());
                return Ok(());
            }
            Err(e) => {
                debug!("attempt {attempt} for {url} failed: {e:#}");
                let _ = tokio::fs::remove_file(&partial).await;
                failure = Some(e);
            }
        }
    }

    Err(failure.unwrap_or_else(|| anyhow!("no download attempts made for {url}")))
}

/// `dest` with `.tmp` appended to the whole file name, so that
/// `foo.tar.xz` and `foo.tar.gz` never share a temporary file.
fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

async fn fetch_once(client: &reqwest::Client, url: &str, into: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP error {status}: {url}");
    }

    let mut meter = Progress::new(response.content_length());
    let mut out = tokio::fs::File::create(into)
        .await
        .with_context(|| format!("Failed to create file: {}", into.display()))?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Connection dropped while reading {url}"))?;
        out.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write to {}", into.display()))?;
        meter.advance(chunk.len());
    }
    out.flush()
        .await
        .with_context(|| format!("Failed to flush {}", into.display()))?;

    meter.finish();
    Ok(())
}

/// Progress meter for a single transfer.
struct Progress {
    expected: Option<u64>,
    received: u64,
    started: Instant,
    drawn: Instant,
}

impl Progress {
    fn new(expected: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            expected,
            received: 0,
            started: now,
            drawn: now,
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.received += bytes as u64;
        if self.drawn.elapsed() >= REDRAW_INTERVAL {
            self.draw();
            self.drawn = Instant::now();
        }
    }

    fn finish(&self) {
        self.draw();
        println!();
    }

    fn draw(&self) {
        print!("\r{}     ", self.line(self.started.elapsed()));
        let _ = std::io::stdout().flush();
    }

    #[allow(clippy::cast_precision_loss)]
    fn line(&self, elapsed: Duration) -> String {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        };
        let received = human_size(self.received as f64);
        match self.expected {
            Some(total) if total > 0 => format!(
                "{received} of {} ({}%) at {}/s",
                human_size(total as f64),
                self.received.saturating_mul(100) / total,
                human_size(rate)
            ),
            _ => format!("{received} at {}/s", human_size(rate)),
        }
    }
}

/// Formats a byte quantity with binary units, e.g. `1.50 MB`.
fn human_size(bytes: f64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024.0 {
        return format!("{bytes:.0} B");
    }
    let mut value = bytes / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Backoff before retry number `retry` (1-based): the base delay doubled per
/// retry, with up to 25% jitter either way.
fn retry_delay(retry: u32) -> Duration {
    let nominal = RETRY_BASE * 2u32.pow(retry);
    let spread = nominal / 4;
    let jitter = rand::rng().random_range(Duration::ZERO..=spread * 2);
    nominal - spread + jitter
}
