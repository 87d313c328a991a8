use reqwest::Client;
use std::time::Duration;
use terra_shared::config::{HTTP_BACKOFF_FACTOR, HTTP_TOTAL_RETRIES};
use terra_shared::error::TerraError;

const RETRYABLE_STATUS: [u16; 4] = [500, 502, 503, 504];

pub enum RetryOutcome {
    Ok(bytes::Bytes),
    /// The provider's own "area too large" signal (spec §4.1, §7) — not a
    /// transport failure, consumed internally by the zoom probe.
    AreaTooLarge,
}

/// Fetches `url` through `client`, retrying up to [`HTTP_TOTAL_RETRIES`]
/// times with exponential backoff (`factor * 2^(attempt-1)`, spec §4.3) on
/// `{500, 502, 503, 504}` or a transport-level error. A `404` is treated as
/// final (mirrors the teacher's `fetch_gibs_tiles.rs`, which never retries
/// a 404). Never panics or propagates past `MaxRetriesExceeded` — callers
/// record the tile as failed and keep going (spec §4.3, §7).
pub async fn get_with_retry(client: &Client, url: &str, area_too_large_marker: &str) -> Result<RetryOutcome, TerraError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let bytes = resp.bytes().await.map_err(|e| TerraError::Other(e.into()))?;
                    return Ok(RetryOutcome::Ok(bytes));
                }
                if status.as_u16() == 404 {
                    return Err(TerraError::MaxRetriesExceeded { url: url.to_string() });
                }
                let body = resp.text().await.unwrap_or_default();
                if body.contains(area_too_large_marker) {
                    return Ok(RetryOutcome::AreaTooLarge);
                }
                if !RETRYABLE_STATUS.contains(&status.as_u16()) {
                    return Err(TerraError::MaxRetriesExceeded { url: url.to_string() });
                }
            }
            Err(_err) => {
                // transport failure: retryable, same backoff path below.
            }
        }

        if attempt >= HTTP_TOTAL_RETRIES {
            return Err(TerraError::MaxRetriesExceeded { url: url.to_string() });
        }
        let backoff = HTTP_BACKOFF_FACTOR * 2f64.powi(attempt as i32 - 1);
        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nonexistent_host_eventually_gives_up() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        // a reserved, non-routable address so the connection fails fast
        // instead of retrying the full backoff ladder in a unit test.
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            get_with_retry(&client, "http://198.51.100.1/tile", "area too large"),
        )
        .await;
        assert!(result.is_err() || matches!(result.unwrap(), Err(TerraError::MaxRetriesExceeded { .. })));
    }
}
