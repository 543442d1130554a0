use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, bail};
use url::Url;

use crate::cli::Args;
use crate::extract::extract_post;
use crate::output::{output_path, write_records};
use crate::pacing::Pacing;
use crate::page::PageReader;
use crate::progress::Progress;
use crate::record::PostRecord;
use crate::selectors;

pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com/";

/// Instagram usernames are at most 30 characters.
const MAX_HANDLE_LEN: usize = 30;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: Url,
    /// Wait after each grid scroll.
    pub scroll_pacing: Pacing,
    /// Wait between post pages.
    pub post_pacing: Pacing,
    pub page_timeout: Duration,
    /// Hard ceiling on grid scrolls, independent of the post cap.
    pub max_scroll_rounds: u32,
    /// Consecutive scrolls without new posts before the grid counts as exhausted.
    pub stable_rounds: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url"),
            scroll_pacing: Pacing::from_millis(2000, 1000),
            post_pacing: Pacing::from_millis(3000, 2000),
            page_timeout: Duration::from_secs(15),
            max_scroll_rounds: 50,
            stable_rounds: 3,
        }
    }
}

impl CrawlConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            base_url: args.base_url.clone(),
            scroll_pacing: Pacing::from_millis(args.scroll_delay_ms, args.scroll_jitter_ms),
            post_pacing: Pacing::from_millis(args.post_delay_ms, args.post_jitter_ms),
            page_timeout: Duration::from_secs(args.page_timeout_secs),
            max_scroll_rounds: args.max_scroll_rounds,
            stable_rounds: args.stable_rounds,
        }
    }
}

/// Trim a handle and strip a leading `@`; reject anything that is not a
/// plausible username.
pub fn normalize_handle(raw: &str) -> anyhow::Result<String> {
    let handle = raw.trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle);
    if handle.is_empty() {
        bail!("profile handle is empty");
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        bail!("invalid profile handle {raw:?}");
    }
    // A dot-only handle or a `..` run would resolve to a parent path.
    if handle.chars().all(|c| c == '.') || handle.contains("..") {
        bail!("invalid profile handle {raw:?}");
    }
    if handle.len() > MAX_HANDLE_LEN {
        bail!("profile handle {raw:?} is longer than {MAX_HANDLE_LEN} characters");
    }
    Ok(handle.to_string())
}

pub fn profile_url(base: &Url, handle: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("{handle}/"))
        .with_context(|| format!("build profile url for {handle}"))
}

/// Reduce a thumbnail href to `scheme://host/p/<code>/` (or `/reel/<code>/`).
/// Returns `None` for links that do not point at a post.
pub fn canonical_post_url(href: &str, base: &Url) -> Option<Url> {
    let url = base.join(href.trim()).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let pos = segments
        .iter()
        .position(|s| *s == "p" || *s == "reel")?;
    let code = segments.get(pos + 1)?;
    let mut canonical = url.clone();
    canonical.set_path(&format!("/{}/{}/", segments[pos], code));
    canonical.set_query(None);
    canonical.set_fragment(None);
    Some(canonical)
}

/// Scroll the profile grid and collect post URLs in discovery order.
///
/// Stops at `cap` URLs, after `stable_rounds` scrolls that add nothing, or
/// after `max_scroll_rounds` scrolls, whichever comes first. A driver error
/// ends the scan with whatever was collected so far.
pub async fn collect_post_urls<R: PageReader>(
    reader: &mut R,
    cap: usize,
    config: &CrawlConfig,
) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut urls: Vec<Url> = Vec::new();
    let stable_limit = config.stable_rounds.max(1);
    let mut stable = 0u32;
    let mut rounds = 0u32;

    loop {
        let hrefs = match reader.find_links(selectors::THUMBNAIL_LINKS).await {
            Ok(hrefs) => hrefs,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "reading grid failed; keeping collected posts");
                break;
            }
        };

        let before = urls.len();
        for href in hrefs {
            if let Some(url) = canonical_post_url(&href, &config.base_url) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
        tracing::debug!(round = rounds, found = urls.len(), "grid scan");

        if urls.len() >= cap {
            break;
        }
        if rounds > 0 {
            if urls.len() == before {
                stable += 1;
                if stable >= stable_limit {
                    break;
                }
            } else {
                stable = 0;
            }
        }
        if rounds >= config.max_scroll_rounds {
            tracing::warn!(
                rounds,
                found = urls.len(),
                "scroll ceiling reached before the grid settled"
            );
            break;
        }

        if let Err(e) = reader.scroll().await {
            tracing::warn!(error = %format!("{e:#}"), "scroll failed; keeping collected posts");
            break;
        }
        config.scroll_pacing.wait("scroll").await;
        rounds += 1;
    }

    urls.truncate(cap);
    urls
}

/// Crawl one profile into records, in grid order, at most `max_posts` of them.
///
/// Profile-level problems (missing, private, login wall, empty grid) give an
/// empty result. Individual posts that fail to load are skipped.
pub async fn crawl_profile<R: PageReader>(
    reader: &mut R,
    handle: &str,
    max_posts: usize,
    config: &CrawlConfig,
    progress: Option<&Progress>,
) -> anyhow::Result<Vec<PostRecord>> {
    let handle = normalize_handle(handle)?;
    let url = profile_url(&config.base_url, &handle)?;

    if let Some(p) = progress {
        p.set_stage(format!("@{handle}: opening profile"));
    }
    tracing::info!(profile = %handle, %url, "opening profile");
    if let Err(e) = reader.navigate(&url).await {
        tracing::warn!(profile = %handle, error = %format!("{e:#}"), "profile page failed to load");
        return Ok(Vec::new());
    }

    let has_grid = match reader
        .wait_for(selectors::THUMBNAIL_LINKS, config.page_timeout)
        .await
    {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "grid check failed");
            false
        }
    };
    if !has_grid {
        let reason = unavailable_reason(&*reader).await.unwrap_or("no posts visible");
        tracing::warn!(profile = %handle, reason, "no posts to crawl");
        return Ok(Vec::new());
    }

    if let Some(p) = progress {
        p.set_stage(format!("@{handle}: scrolling grid"));
    }
    let post_urls = collect_post_urls(reader, max_posts, config).await;
    tracing::info!(profile = %handle, posts = post_urls.len(), "collected post links");

    if let Some(p) = progress {
        p.set_posts_total(post_urls.len());
        p.set_stage(format!("@{handle}: reading posts"));
    }

    let mut records = Vec::with_capacity(post_urls.len());
    for (i, post_url) in post_urls.iter().enumerate() {
        if i > 0 {
            config.post_pacing.wait("post").await;
        }
        match extract_post(reader, post_url, config.page_timeout).await {
            Ok(record) => {
                tracing::debug!(
                    %post_url,
                    likes = record.likes,
                    comments = record.comments_count,
                    is_video = record.is_video,
                    "post read"
                );
                records.push(record);
                if let Some(p) = progress {
                    p.post_done(post_url.as_str(), false);
                }
            }
            Err(e) => {
                tracing::warn!(%post_url, error = %format!("{e:#}"), "post skipped");
                if let Some(p) = progress {
                    p.post_done(post_url.as_str(), true);
                }
            }
        }
    }

    Ok(records)
}

/// Crawl `handle` and write its records to `<output_dir>/<handle>_posts.csv`.
///
/// Returns the written path, or `None` when nothing was extracted (in which
/// case no file is written).
pub async fn process_profile<R: PageReader>(
    reader: &mut R,
    handle: &str,
    max_posts: usize,
    output_dir: &Path,
    config: &CrawlConfig,
) -> anyhow::Result<Option<PathBuf>> {
    process_profile_with_progress(reader, handle, max_posts, output_dir, config, None).await
}

pub(crate) async fn process_profile_with_progress<R: PageReader>(
    reader: &mut R,
    handle: &str,
    max_posts: usize,
    output_dir: &Path,
    config: &CrawlConfig,
    progress: Option<&Progress>,
) -> anyhow::Result<Option<PathBuf>> {
    let handle = normalize_handle(handle)?;
    let records = crawl_profile(reader, &handle, max_posts, config, progress).await?;
    if records.is_empty() {
        tracing::info!(profile = %handle, "no posts extracted; nothing written");
        return Ok(None);
    }

    if let Some(p) = progress {
        p.set_stage(format!("@{handle}: writing csv"));
    }
    let path = output_path(output_dir, &handle);
    write_records(&path, &records)?;
    tracing::info!(profile = %handle, rows = records.len(), path = %path.display(), "wrote posts");
    Ok(Some(path))
}

async fn unavailable_reason<R: PageReader>(reader: &R) -> Option<&'static str> {
    if let Ok(Some(url)) = reader.current_url().await {
        if url.path().starts_with("/accounts/login") {
            return Some("login required");
        }
    }
    let body = reader
        .read_text(selectors::PAGE_BODY)
        .await
        .ok()
        .flatten()?
        .to_lowercase();
    if body.contains("this page isn't available") || body.contains("this page isn’t available")
    {
        Some("profile not found")
    } else if body.contains("this account is private") {
        Some("profile is private")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    #[derive(Default, Clone)]
    struct FakePost {
        text: HashMap<&'static str, String>,
        attrs: HashMap<String, String>,
        counts: HashMap<&'static str, usize>,
    }

    fn attr_key(selector: &str, attr: &str) -> String {
        format!("{selector}@{attr}")
    }

    impl FakePost {
        fn with_og(likes: u64, comments: u64) -> Self {
            let mut post = FakePost::default();
            post.attrs.insert(
                attr_key(selectors::OG_DESCRIPTION, "content"),
                format!("{likes} likes, {comments} comments - samplebrand on March 1, 2024"),
            );
            post.attrs.insert(
                attr_key(selectors::POST_TIME, "datetime"),
                "2024-03-01T10:00:00.000Z".to_string(),
            );
            post.counts.insert(selectors::POST_READY, 1);
            post
        }
    }

    /// In-memory profile: a grid that reveals `per_scroll` more thumbnails per
    /// scroll, plus post pages keyed by path.
    struct ScriptedPage {
        base: Url,
        grid: Vec<String>,
        visible: usize,
        per_scroll: usize,
        endless: bool,
        posts: HashMap<String, FakePost>,
        broken: HashSet<String>,
        current: Option<Url>,
        scrolls: u32,
        missing_profile: bool,
    }

    impl ScriptedPage {
        fn new(total: usize, visible: usize, per_scroll: usize) -> Self {
            let grid: Vec<String> = (0..total).map(|i| format!("/p/C{i:03}/")).collect();
            let posts = grid
                .iter()
                .map(|href| (href.clone(), FakePost::with_og(100, 5)))
                .collect();
            Self {
                base: Url::parse(DEFAULT_BASE_URL).unwrap(),
                grid,
                visible,
                per_scroll,
                endless: false,
                posts,
                broken: HashSet::new(),
                current: None,
                scrolls: 0,
                missing_profile: false,
            }
        }

        fn on_profile(&self) -> bool {
            self.current
                .as_ref()
                .is_some_and(|u| !u.path().starts_with("/p/") && !u.path().starts_with("/reel/"))
        }

        fn post(&self) -> Option<&FakePost> {
            let url = self.current.as_ref()?;
            self.posts.get(url.path())
        }
    }

    impl PageReader for ScriptedPage {
        async fn navigate(&mut self, url: &Url) -> anyhow::Result<()> {
            if self.broken.contains(url.path()) {
                self.current = None;
                anyhow::bail!("GET {url} failed with status 404 Not Found");
            }
            self.current = Some(url.clone());
            Ok(())
        }

        async fn current_url(&self) -> anyhow::Result<Option<Url>> {
            Ok(self.current.clone())
        }

        async fn find_links(&self, selector: &str) -> anyhow::Result<Vec<String>> {
            assert_eq!(selector, selectors::THUMBNAIL_LINKS);
            if !self.on_profile() || self.missing_profile {
                return Ok(Vec::new());
            }
            let shown = self.visible.min(self.grid.len());
            Ok(self.grid[..shown]
                .iter()
                .map(|h| self.base.join(h).unwrap().to_string())
                .collect())
        }

        async fn wait_for(&self, selector: &str, _timeout: Duration) -> anyhow::Result<bool> {
            if selector == selectors::THUMBNAIL_LINKS {
                return Ok(!self.find_links(selector).await?.is_empty());
            }
            Ok(self.count(selector).await? > 0)
        }

        async fn read_text(&self, selector: &str) -> anyhow::Result<Option<String>> {
            if selector == selectors::PAGE_BODY && self.missing_profile {
                return Ok(Some("Sorry, this page isn't available.".to_string()));
            }
            Ok(self.post().and_then(|p| p.text.get(selector).cloned()))
        }

        async fn read_attr(&self, selector: &str, attr: &str) -> anyhow::Result<Option<String>> {
            Ok(self
                .post()
                .and_then(|p| p.attrs.get(&attr_key(selector, attr)).cloned()))
        }

        async fn count(&self, selector: &str) -> anyhow::Result<usize> {
            Ok(self
                .post()
                .and_then(|p| p.counts.get(selector).copied())
                .unwrap_or(0))
        }

        async fn scroll(&mut self) -> anyhow::Result<()> {
            self.scrolls += 1;
            if self.endless {
                let href = format!("/p/GEN{}/", self.scrolls);
                self.posts.insert(href.clone(), FakePost::with_og(1, 1));
                self.grid.push(href);
            }
            self.visible = (self.visible + self.per_scroll).min(self.grid.len());
            Ok(())
        }
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            scroll_pacing: Pacing::none(),
            post_pacing: Pacing::none(),
            page_timeout: Duration::from_millis(10),
            max_scroll_rounds: 10,
            stable_rounds: 3,
            ..CrawlConfig::default()
        }
    }

    async fn open_profile(page: &mut ScriptedPage) {
        let url = profile_url(&page.base.clone(), "samplebrand").unwrap();
        page.navigate(&url).await.unwrap();
    }

    #[test]
    fn handles_are_normalized() {
        assert_eq!(normalize_handle(" @sample.brand_1 ").unwrap(), "sample.brand_1");
        assert!(normalize_handle("").is_err());
        assert!(normalize_handle("@").is_err());
        assert!(normalize_handle("../etc").is_err());
        assert!(normalize_handle("has space").is_err());
        assert!(normalize_handle(".").is_err());
        assert!(normalize_handle("..").is_err());
        assert!(normalize_handle("@...").is_err());
        assert!(normalize_handle("a..b").is_err());
        assert_eq!(normalize_handle("a.b.c").unwrap(), "a.b.c");
        assert!(normalize_handle(&"a".repeat(30)).is_ok());
        assert!(normalize_handle(&"a".repeat(31)).is_err());
    }

    #[test]
    fn profile_url_joins_under_base_path() {
        let base = Url::parse("http://127.0.0.1:9000/mirror").unwrap();
        assert_eq!(
            profile_url(&base, "samplebrand").unwrap().as_str(),
            "http://127.0.0.1:9000/mirror/samplebrand/"
        );
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            profile_url(&base, "samplebrand").unwrap().as_str(),
            "https://www.instagram.com/samplebrand/"
        );
    }

    #[test]
    fn post_hrefs_are_canonicalized() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let canon = |h: &str| canonical_post_url(h, &base).map(|u| u.to_string());
        assert_eq!(
            canon("/p/ABC123/?img_index=2").as_deref(),
            Some("https://www.instagram.com/p/ABC123/")
        );
        assert_eq!(
            canon("https://www.instagram.com/samplebrand/reel/XYZ/#c").as_deref(),
            Some("https://www.instagram.com/reel/XYZ/")
        );
        assert_eq!(canon("/p/").as_deref(), None);
        assert_eq!(canon("/explore/tags/p/").as_deref(), None);
        assert_eq!(canon("/samplebrand/tagged/").as_deref(), None);
    }

    #[tokio::test]
    async fn grid_scan_stops_once_nothing_new_loads() {
        let mut page = ScriptedPage::new(30, 12, 12);
        open_profile(&mut page).await;

        let urls = collect_post_urls(&mut page, 100, &config()).await;
        assert_eq!(urls.len(), 30);
        assert_eq!(urls[0].as_str(), "https://www.instagram.com/p/C000/");
        assert_eq!(urls[29].as_str(), "https://www.instagram.com/p/C029/");
        // 2 scrolls that grew the grid, then 3 that did not.
        assert_eq!(page.scrolls, 5);
    }

    #[tokio::test]
    async fn grid_scan_stops_at_cap_without_scrolling() {
        let mut page = ScriptedPage::new(30, 12, 12);
        open_profile(&mut page).await;

        let urls = collect_post_urls(&mut page, 5, &config()).await;
        assert_eq!(urls.len(), 5);
        assert_eq!(page.scrolls, 0);
    }

    #[tokio::test]
    async fn endless_grid_is_bounded_by_scroll_ceiling() {
        let mut page = ScriptedPage::new(3, 3, 1);
        page.endless = true;
        open_profile(&mut page).await;

        let cfg = CrawlConfig {
            max_scroll_rounds: 4,
            ..config()
        };
        let urls = collect_post_urls(&mut page, 10_000, &cfg).await;
        assert_eq!(page.scrolls, 4);
        assert_eq!(urls.len(), 3 + 4);
    }

    #[tokio::test]
    async fn repeated_thumbnails_are_deduplicated() {
        let mut page = ScriptedPage::new(4, 4, 0);
        page.grid.push("/p/C001/?img_index=1".to_string());
        page.grid.push("/p/C002/".to_string());
        page.visible = page.grid.len();
        open_profile(&mut page).await;

        let urls = collect_post_urls(&mut page, 100, &config()).await;
        assert_eq!(urls.len(), 4);
    }

    #[tokio::test]
    async fn crawl_returns_at_most_cap_records() {
        let mut page = ScriptedPage::new(20, 6, 6);
        let records = crawl_profile(&mut page, "samplebrand", 10, &config(), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.likes == 100 && r.comments_count == 5));
        assert!(records.iter().all(|r| r.date.is_some() && !r.is_video));
    }

    #[tokio::test]
    async fn unresolvable_fields_default_instead_of_dropping_the_post() {
        let mut page = ScriptedPage::new(3, 3, 0);
        page.posts.insert("/p/C001/".to_string(), FakePost::default());

        let records = crawl_profile(&mut page, "samplebrand", 10, &config(), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        let bare = &records[1];
        assert_eq!(bare.post_url, "https://www.instagram.com/p/C001/");
        assert_eq!(bare.likes, 0);
        assert_eq!(bare.comments_count, 0);
        assert_eq!(bare.date, None);
        assert!(!bare.is_video);
    }

    #[tokio::test]
    async fn like_text_and_comment_items_are_used_before_defaults() {
        let mut page = ScriptedPage::new(1, 1, 0);
        let mut post = FakePost::default();
        post.text
            .insert(selectors::LIKE_COUNT_TEXT[0], "1,234".to_string());
        post.counts.insert(selectors::COMMENT_ITEMS[0], 7);
        post.counts.insert("video", 1);
        page.posts.insert("/p/C000/".to_string(), post);

        let records = crawl_profile(&mut page, "samplebrand", 10, &config(), None)
            .await
            .unwrap();
        assert_eq!(records[0].likes, 1234);
        assert_eq!(records[0].comments_count, 7);
        assert!(records[0].is_video);
    }

    #[tokio::test]
    async fn one_failing_post_does_not_halt_the_batch() {
        let mut page = ScriptedPage::new(5, 5, 0);
        page.broken.insert("/p/C002/".to_string());

        let records = crawl_profile(&mut page, "samplebrand", 10, &config(), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| !r.post_url.ends_with("/C002/")));
    }

    #[tokio::test]
    async fn empty_profile_yields_none_and_no_file() {
        let tmp = tempdir().unwrap();
        let mut page = ScriptedPage::new(0, 0, 0);
        page.missing_profile = true;

        let out = process_profile(&mut page, "samplebrand", 10, tmp.path(), &config())
            .await
            .unwrap();
        assert_eq!(out, None);
        assert!(!output_path(tmp.path(), "samplebrand").exists());
        assert_eq!(page.scrolls, 0);
    }

    #[tokio::test]
    async fn file_rows_match_returned_records() {
        let tmp = tempdir().unwrap();
        let mut page = ScriptedPage::new(8, 4, 4);

        let out = process_profile(&mut page, "@samplebrand", 6, tmp.path(), &config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out, tmp.path().join("samplebrand_posts.csv"));
        let mut rdr = csv::Reader::from_path(&out).unwrap();
        assert_eq!(rdr.records().count(), 6);
    }

    #[tokio::test]
    async fn invalid_handle_is_an_error() {
        let tmp = tempdir().unwrap();
        let mut page = ScriptedPage::new(1, 1, 0);
        let res = process_profile(&mut page, "  ", 10, tmp.path(), &config()).await;
        assert!(res.is_err());
    }
}
