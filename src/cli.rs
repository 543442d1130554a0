use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    /// Chromium over CDP, bound to a persistent user-data directory.
    Chrome,
    /// Plain HTTP fetches parsed as static HTML (no scripts, no scrolling).
    Http,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProgressMode {
    /// Enable progress UI when stderr is a TTY.
    Auto,
    /// Always enable progress UI (even when piped).
    Always,
    /// Never show progress UI.
    Never,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// One or more profile handles to crawl, in order (a leading `@` is ignored).
    #[arg(required = true)]
    pub profiles: Vec<String>,

    /// Maximum number of posts collected per profile.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_posts: u32,

    /// Output directory. Each profile is written to `<out>/<handle>_posts.csv`.
    #[arg(long, default_value = "output")]
    pub out: PathBuf,

    /// Page driver: `chrome` or `http`.
    #[arg(long, value_enum, default_value = "chrome")]
    pub driver: Driver,

    /// Browser user-data directory holding an existing login session.
    #[arg(long)]
    pub user_data_dir: Option<PathBuf>,

    /// Path to the Chromium/Chrome binary. Auto-detected when omitted.
    #[arg(long)]
    pub chrome_executable: Option<PathBuf>,

    /// Run the browser without a visible window.
    #[arg(long)]
    pub headless: bool,

    /// Site root used to build profile URLs.
    #[arg(long, default_value = "https://www.instagram.com/")]
    pub base_url: Url,

    /// Base wait after each scroll of the post grid.
    #[arg(long, default_value_t = 2000)]
    pub scroll_delay_ms: u64,

    /// Random extra wait (0..=N ms) added to each scroll wait.
    #[arg(long, default_value_t = 1000)]
    pub scroll_jitter_ms: u64,

    /// Base wait between post pages.
    #[arg(long, default_value_t = 3000)]
    pub post_delay_ms: u64,

    /// Random extra wait (0..=N ms) added to each post wait.
    #[arg(long, default_value_t = 2000)]
    pub post_jitter_ms: u64,

    /// How long to wait for a page to render its content.
    #[arg(long, default_value_t = 15)]
    pub page_timeout_secs: u64,

    /// Hard ceiling on grid scrolls per profile.
    #[arg(long, default_value_t = 50)]
    pub max_scroll_rounds: u32,

    /// Stop scrolling after this many consecutive scrolls that reveal no new posts.
    #[arg(long, default_value_t = 3)]
    pub stable_rounds: u32,

    /// HTTP User-Agent for the `http` driver and the browser.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Progress display: `auto`, `always`, or `never`.
    #[arg(long, value_enum, default_value = "auto")]
    pub progress: ProgressMode,
}
