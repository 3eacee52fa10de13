//! Remote CSV acquisition.
//!
//! The file is streamed to a `.part` sibling and renamed into place once
//! complete. Large Google Drive files answer with a virus-scan page first;
//! its confirmation link is followed once.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncWriteExt as _;

use crate::LoadError;

/// Retries for transient failures (connection errors, timeouts, 429, 5xx).
const MAX_RETRIES: u32 = 4;

/// Per-request timeout. The dataset is large.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Progress is logged every this many bytes.
const LOG_EVERY_BYTES: u64 = 50 * 1024 * 1024;

/// Host serving confirmed Google Drive downloads.
const DRIVE_DOWNLOAD_URL: &str = "https://drive.usercontent.google.com/download";

static FORM_ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"action="([^"]+)""#).expect("valid regex"));

static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="id"\s+value="([^"]+)""#).expect("valid regex"));

/// Finds the direct download link on a Google Drive virus-scan page.
///
/// Prefers a link built from the hidden `id` field and falls back to the
/// form action. Returns `None` for any other HTML page.
#[must_use]
pub fn confirm_url(html: &str) -> Option<String> {
    if !html.contains("drive.usercontent.google.com/download") {
        return None;
    }

    if let Some(id) = FILE_ID_RE.captures(html).and_then(|c| c.get(1)) {
        return Some(format!(
            "{DRIVE_DOWNLOAD_URL}?id={}&export=download&confirm=t",
            id.as_str()
        ));
    }

    FORM_ACTION_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|action| action.as_str().replace("&amp;", "&"))
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Downloads `url` into `path`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// * If the request fails after all retries
/// * If the server answers with an HTML page that is not a download
///   confirmation, or confirming still yields HTML
/// * If writing the file fails
pub async fn fetch_to_file(url: &str, path: &Path) -> Result<u64, LoadError> {
    log::info!("Dataset file not found. Downloading from {url}...");

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let mut response = send_with_retry(|| client.get(url)).await?;

    if is_html(&response) {
        let page = response.text().await?;
        let Some(confirmed) = confirm_url(&page) else {
            return Err(LoadError::Download {
                message: format!("{url} returned an HTML page instead of CSV data"),
            });
        };

        log::info!("Received a virus scan page, following the download link...");
        response = send_with_retry(|| client.get(&confirmed)).await?;
        if is_html(&response) {
            return Err(LoadError::Download {
                message: format!("{confirmed} returned an HTML page instead of CSV data"),
            });
        }
    }

    let expected = response.content_length();
    if let Some(total) = expected {
        log::info!("Downloading {:.2} MB...", mib(total));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(path);
    let mut file = tokio::fs::File::create(&partial).await?;

    let mut written = 0_u64;
    let mut next_log = LOG_EVERY_BYTES;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if written >= next_log {
            log::info!("Downloaded {:.2} MB", mib(written));
            next_log += LOG_EVERY_BYTES;
        }
    }
    file.flush().await?;
    drop(file);

    if let Some(total) = expected.filter(|&total| total != written) {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(LoadError::Download {
            message: format!("expected {total} bytes but received {written}"),
        });
    }

    tokio::fs::rename(&partial, path).await?;
    log::info!("Download complete! Total: {:.2} MB", mib(written));

    Ok(written)
}

#[allow(clippy::cast_precision_loss)]
fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Sends a request, retrying transient failures with exponential backoff.
async fn send_with_retry<F>(build_request: F) -> Result<reqwest::Response, LoadError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                log::warn!("  transient error: {e}");
            }
            Err(e) => return Err(e.into()),
            Ok(response) => {
                let status = response.status();
                let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error();

                if retryable && attempt < MAX_RETRIES {
                    log::warn!("  HTTP {status}");
                } else if !status.is_success() {
                    return Err(LoadError::Download {
                        message: format!("HTTP {status}"),
                    });
                } else {
                    return Ok(response);
                }
            }
        }

        attempt += 1;
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("data/crashes.csv")),
            PathBuf::from("data/crashes.csv.part")
        );
        assert_eq!(
            partial_path(Path::new("crashes.csv")),
            PathBuf::from("crashes.csv.part")
        );
    }

    #[test]
    fn builds_confirm_url_from_hidden_id() {
        let page = r#"<html><body>
<p>Google Drive can't scan this file for viruses.</p>
<form id="download-form" action="https://drive.usercontent.google.com/download" method="get">
<input type="submit" value="Download anyway"/>
<input type="hidden" name="id" value="1AbC-dEf_9">
<input type="hidden" name="export" value="download">
<input type="hidden" name="confirm" value="t">
</form></body></html>"#;

        assert_eq!(
            confirm_url(page).as_deref(),
            Some("https://drive.usercontent.google.com/download?id=1AbC-dEf_9&export=download&confirm=t")
        );
    }

    #[test]
    fn falls_back_to_form_action() {
        let page = r#"<form action="https://drive.usercontent.google.com/download?id=xyz&amp;confirm=t" method="get"></form>"#;

        assert_eq!(
            confirm_url(page).as_deref(),
            Some("https://drive.usercontent.google.com/download?id=xyz&confirm=t")
        );
    }

    #[test]
    fn ignores_other_html_pages() {
        assert_eq!(confirm_url("<html><body>Sign in</body></html>"), None);
        assert_eq!(
            confirm_url(r#"<form action="/login"><input name="id" value="u1"></form>"#),
            None
        );
    }

    #[test]
    fn converts_bytes_to_mib() {
        assert!((mib(50 * 1024 * 1024) - 50.0).abs() < f64::EPSILON);
    }
}
