use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context as _, anyhow};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt as _;
use url::Url;

use crate::page::{PageReader, non_blank};

#[derive(Debug, Clone, Default)]
pub struct ChromeOptions {
    /// Persistent profile directory; reusing it keeps an existing login session.
    pub user_data_dir: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub request_timeout: Duration,
}

/// One browser with a single tab, driven over CDP.
///
/// Acquire with [`ChromePage::launch`] and release with [`ChromePage::close`];
/// the caller is responsible for closing on every exit path.
pub struct ChromePage {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
}

impl ChromePage {
    pub async fn launch(opts: &ChromeOptions) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder().viewport(None);
        if !opts.headless {
            builder = builder.with_head();
        }
        if !opts.request_timeout.is_zero() {
            builder = builder.request_timeout(opts.request_timeout);
        }
        if let Some(dir) = &opts.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(exe) = &opts.executable {
            builder = builder.chrome_executable(exe);
        }
        if let Some(ua) = &opts.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "cdp handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = shutdown(browser, handler).await {
                    tracing::debug!(error = %format!("{close_err:#}"), "close browser after failed launch");
                }
                return Err(e).context("open browser tab");
            }
        };

        tracing::info!(
            user_data_dir = ?opts.user_data_dir,
            headless = opts.headless,
            "browser launched"
        );
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    pub async fn close(self) -> anyhow::Result<()> {
        let ChromePage {
            browser,
            page,
            handler,
        } = self;
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "close tab");
        }
        shutdown(browser, handler).await
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> anyhow::Result<T> {
        self.page
            .evaluate(script)
            .await
            .context("evaluate script")?
            .into_value()
            .context("decode script result")
    }
}

/// Close the browser process and stop its CDP handler task.
async fn shutdown(
    mut browser: Browser,
    handler: tokio::task::JoinHandle<()>,
) -> anyhow::Result<()> {
    let res = browser.close().await.context("close browser");
    if let Err(e) = browser.wait().await {
        tracing::debug!(error = %e, "wait for browser exit");
    }
    handler.abort();
    res.map(|_| ())
}

fn js_str(s: &str) -> anyhow::Result<String> {
    serde_json::to_string(s).context("quote selector")
}

impl PageReader for ChromePage {
    async fn navigate(&mut self, url: &Url) -> anyhow::Result<()> {
        self.page
            .goto(url.as_str())
            .await
            .with_context(|| format!("navigate to {}", url))?;
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<Option<Url>> {
        let url = self.page.url().await.context("read page url")?;
        Ok(url.and_then(|u| Url::parse(&u).ok()))
    }

    async fn find_links(&self, selector: &str) -> anyhow::Result<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(a => a.href || '').filter(h => h.length > 0)",
            js_str(selector)?
        );
        self.eval(script).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(selector).await? > 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn read_text(&self, selector: &str) -> anyhow::Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.innerText || el.textContent || '') : ''; }})()",
            js_str(selector)?
        );
        let text: String = self.eval(script).await?;
        Ok(non_blank(text))
    }

    async fn read_attr(&self, selector: &str, attr: &str) -> anyhow::Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.getAttribute({}) || '') : ''; }})()",
            js_str(selector)?,
            js_str(attr)?
        );
        let value: String = self.eval(script).await?;
        Ok(non_blank(value))
    }

    async fn count(&self, selector: &str) -> anyhow::Result<usize> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_str(selector)?
        );
        self.eval(script).await
    }

    async fn scroll(&mut self) -> anyhow::Result<()> {
        let _: bool = self
            .eval("window.scrollTo(0, document.body.scrollHeight); true".to_string())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_browser_binary_fails_launch() {
        let opts = ChromeOptions {
            executable: Some(PathBuf::from("/nonexistent/chromium-binary")),
            headless: true,
            ..ChromeOptions::default()
        };
        assert!(ChromePage::launch(&opts).await.is_err());
    }
}
