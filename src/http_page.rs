use std::time::Duration;

use anyhow::anyhow;
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink as _;
use url::Url;

use crate::fetcher::Fetcher;
use crate::page::{PageReader, non_blank};

/// Static page driver: fetch the HTML once per navigation and query it with
/// kuchiki. Nothing is rendered, so scrolling never reveals more content.
pub struct HttpPage {
    fetcher: Fetcher,
    current: Option<Loaded>,
}

struct Loaded {
    url: Url,
    document: NodeRef,
}

impl HttpPage {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            current: None,
        }
    }

    fn loaded(&self) -> anyhow::Result<&Loaded> {
        self.current
            .as_ref()
            .ok_or_else(|| anyhow!("no page loaded"))
    }

    fn select(
        &self,
        selector: &str,
    ) -> anyhow::Result<Vec<kuchiki::NodeDataRef<kuchiki::ElementData>>> {
        let loaded = self.loaded()?;
        let nodes = loaded
            .document
            .select(selector)
            .map_err(|()| anyhow!("invalid selector {selector:?}"))?;
        Ok(nodes.collect())
    }
}

impl PageReader for HttpPage {
    async fn navigate(&mut self, url: &Url) -> anyhow::Result<()> {
        self.current = None;
        let (html, final_url) = self.fetcher.get_text(url).await?;
        let document = kuchiki::parse_html().one(html);
        tracing::debug!(%url, %final_url, "loaded page");
        self.current = Some(Loaded {
            url: final_url,
            document,
        });
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<Option<Url>> {
        Ok(self.current.as_ref().map(|l| l.url.clone()))
    }

    async fn find_links(&self, selector: &str) -> anyhow::Result<Vec<String>> {
        let base = &self.loaded()?.url;
        let mut out = Vec::new();
        for node in self.select(selector)? {
            let href = node.attributes.borrow().get("href").map(|s| s.to_string());
            let Some(href) = href else { continue };
            if let Ok(abs) = base.join(href.trim()) {
                out.push(abs.to_string());
            }
        }
        Ok(out)
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> anyhow::Result<bool> {
        Ok(!self.select(selector)?.is_empty())
    }

    async fn read_text(&self, selector: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .select(selector)?
            .into_iter()
            .next()
            .and_then(|n| non_blank(n.text_contents())))
    }

    async fn read_attr(&self, selector: &str, attr: &str) -> anyhow::Result<Option<String>> {
        Ok(self.select(selector)?.into_iter().next().and_then(|n| {
            n.attributes
                .borrow()
                .get(attr)
                .map(|s| s.to_string())
                .and_then(non_blank)
        }))
    }

    async fn count(&self, selector: &str) -> anyhow::Result<usize> {
        Ok(self.select(selector)?.len())
    }

    async fn scroll(&mut self) -> anyhow::Result<()> {
        self.loaded()?;
        Ok(())
    }
}
