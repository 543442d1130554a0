use std::time::Duration;

use anyhow::{Context as _, anyhow};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("ig-profile-crawl/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: usize = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Longest `Retry-After` honored; a server asking for more gets this.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;
        Ok(Self { client })
    }

    /// GET `url` as text. Returns the body and the final URL after redirects.
    pub async fn get_text(&self, url: &Url) -> anyhow::Result<(String, Url)> {
        let mut backoff = Duration::from_millis(250);

        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("GET {}", url))?;

            let status = resp.status();
            let final_url = resp.url().clone();

            if status.is_success() {
                let text = resp.text().await.context("read response body")?;
                return Ok((text, final_url));
            }

            if status.as_u16() == 429 || status.as_u16() == 503 {
                if attempt == MAX_ATTEMPTS {
                    break;
                }
                let wait = retry_after_duration(resp.headers()).unwrap_or(backoff);
                tracing::warn!(
                    %status,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "throttled; backing off"
                );
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }

            return Err(anyhow!("GET {} failed with status {}", url, status));
        }

        Err(anyhow!("GET {} still throttled after {MAX_ATTEMPTS} attempts", url))
    }
}

fn retry_after_duration(headers: &HeaderMap) -> Option<Duration> {
    let v = headers.get(RETRY_AFTER)?;
    let s = v.to_str().ok()?.trim();
    let seconds: u64 = s.parse().ok()?;
    Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_reads_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after_duration(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after_duration(&headers), None);
        assert_eq!(retry_after_duration(&HeaderMap::new()), None);
    }

    #[test]
    fn retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(retry_after_duration(&headers), Some(MAX_RETRY_AFTER));
    }

    #[tokio::test]
    async fn throttled_get_gives_up_without_a_final_sleep() {
        use httpmock::Method::GET;

        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/busy/");
                then.status(429).header("Retry-After", "0");
            })
            .await;

        let fetcher = Fetcher::new(None, Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.url("/busy/")).unwrap();
        let started = std::time::Instant::now();
        let err = fetcher.get_text(&url).await.unwrap_err();

        assert!(format!("{err:#}").contains("still throttled"));
        mock.assert_hits_async(MAX_ATTEMPTS).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
