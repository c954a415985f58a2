//! Image URL detection and download for multimodal analysis.

use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::{PipelineError, PipelineResult};

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Media hosts that serve images without an extension in the path
const MEDIA_HOSTS: [&str; 3] = ["i.redd.it", "preview.redd.it", "i.imgur.com"];

/// A downloaded image ready to attach to a multimodal request
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Recognize an image URL by extension or media-host pattern.
pub fn is_image_url(raw: &str) -> bool {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return false,
    };

    let path = parsed.path().to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    parsed
        .host_str()
        .map(|host| MEDIA_HOSTS.contains(&host))
        .unwrap_or(false)
}

/// Guess the MIME type from the URL extension
pub fn mime_type_for(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Download an image with a short timeout, retrying transient failures
/// with exponential backoff. Permanent errors (404, 403) abort at once.
pub async fn download(
    http: &reqwest::Client,
    url: &str,
    max_attempts: u32,
    timeout_seconds: u64,
) -> PipelineResult<DownloadedImage> {
    let mut attempt: u32 = 0;

    loop {
        let err = match fetch_once(http, url, timeout_seconds).await {
            Ok(image) => return Ok(image),
            Err(e) => e,
        };

        attempt += 1;
        if !err.is_retryable() || attempt >= max_attempts {
            warn!("Image download failed for {}: {}", url, err);
            return Err(PipelineError::ImageUnavailable {
                reason: err.to_string(),
            });
        }

        let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
        debug!(
            "Transient image download error (attempt {}/{}), retrying in {:?}: {}",
            attempt, max_attempts, backoff, err
        );
        tokio::time::sleep(backoff).await;
    }
}

async fn fetch_once(
    http: &reqwest::Client,
    url: &str,
    timeout_seconds: u64,
) -> PipelineResult<DownloadedImage> {
    let response = match tokio::time::timeout(
        Duration::from_secs(timeout_seconds),
        http.get(url).send(),
    )
    .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(PipelineError::Network(e)),
        Err(_) => {
            return Err(PipelineError::Timeout {
                timeout_seconds,
            })
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::api_error(
            status.as_u16(),
            format!("image download failed for {}", url),
        ));
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.starts_with("image/"))
        .map(|ct| ct.to_string())
        .unwrap_or_else(|| mime_type_for(url).to_string());

    let bytes = response.bytes().await?.to_vec();
    Ok(DownloadedImage { bytes, mime_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_by_extension() {
        assert!(is_image_url("http://example.test/x.png"));
        assert!(is_image_url("https://example.test/charts/spy.JPG"));
        assert!(is_image_url("https://example.test/a.webp?width=640"));
        assert!(!is_image_url("https://example.test/article.html"));
        assert!(!is_image_url("not a url"));
    }

    #[test]
    fn test_image_url_by_media_host() {
        assert!(is_image_url("https://i.redd.it/abc123"));
        assert!(is_image_url("https://preview.redd.it/xyz?format=pjpg"));
        assert!(!is_image_url("https://www.reddit.com/r/stocks/comments/abc"));
    }

    #[test]
    fn test_mime_type_guessing() {
        assert_eq!(mime_type_for("http://x.test/a.png"), "image/png");
        assert_eq!(mime_type_for("http://x.test/a.gif"), "image/gif");
        assert_eq!(mime_type_for("http://x.test/a.webp"), "image/webp");
        assert_eq!(mime_type_for("https://i.redd.it/abc123"), "image/jpeg");
    }
}
