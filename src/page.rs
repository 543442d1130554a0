use std::time::Duration;

use url::Url;

/// DOM capabilities the crawler needs from a page driver.
///
/// Selectors are CSS selector lists. Text and attribute reads look at the
/// first match only and return `None` when nothing matches or the value is
/// blank. Implementations are driven sequentially from a single task.
#[allow(async_fn_in_trait)]
pub trait PageReader {
    async fn navigate(&mut self, url: &Url) -> anyhow::Result<()>;

    /// URL of the loaded document after redirects, if any page is loaded.
    async fn current_url(&self) -> anyhow::Result<Option<Url>>;

    /// Absolute `href` of every element matching `selector`, in document order.
    async fn find_links(&self, selector: &str) -> anyhow::Result<Vec<String>>;

    /// Wait until `selector` matches something. `Ok(false)` on timeout.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<bool>;

    async fn read_text(&self, selector: &str) -> anyhow::Result<Option<String>>;

    async fn read_attr(&self, selector: &str, attr: &str) -> anyhow::Result<Option<String>>;

    async fn count(&self, selector: &str) -> anyhow::Result<usize>;

    /// Scroll to the bottom of the document to trigger lazy loading.
    async fn scroll(&mut self) -> anyhow::Result<()>;
}

pub(crate) fn non_blank(s: String) -> Option<String> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
