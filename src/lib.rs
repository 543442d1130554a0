#[cfg(feature = "chrome")]
mod chrome;
mod cli;
mod crawler;
mod extract;
mod fetcher;
mod http_page;
mod output;
mod pacing;
mod page;
mod progress;
mod record;
pub mod selectors;

use std::path::PathBuf;

use cli::Args;
use progress::Progress;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeOptions, ChromePage};
pub use cli::{Args as CliArgs, Driver, ProgressMode};
pub use crawler::{
    CrawlConfig, DEFAULT_BASE_URL, canonical_post_url, collect_post_urls, crawl_profile,
    normalize_handle, process_profile, profile_url,
};
pub use extract::{extract_post, parse_count, parse_timestamp};
pub use fetcher::Fetcher;
pub use http_page::HttpPage;
pub use output::{output_path, write_records};
pub use pacing::Pacing;
pub use page::PageReader;
pub use record::{Field, PostRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOutcome {
    pub handle: String,
    /// Written CSV, or `None` when the profile yielded nothing.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub profiles: Vec<ProfileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.profiles.iter().filter(|p| p.output.is_some()).count()
    }
}

/// Crawl every profile in `args` with one page session.
///
/// Only session setup (browser launch, HTTP client) and invalid handles are
/// errors; per-profile failures are reported as `None` outputs.
pub async fn run(args: Args) -> anyhow::Result<BatchReport> {
    use std::io::IsTerminal as _;

    let handles = args
        .profiles
        .iter()
        .map(|h| crawler::normalize_handle(h))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let progress_enabled = match args.progress {
        ProgressMode::Always => true,
        ProgressMode::Never => false,
        ProgressMode::Auto => std::io::stderr().is_terminal(),
    };
    let progress = Progress::new(progress_enabled);
    progress.set_profiles_total(handles.len());

    let config = CrawlConfig::from_args(&args);

    let res = match args.driver {
        Driver::Http => {
            let fetcher = Fetcher::new(args.user_agent.as_deref(), config.page_timeout)?;
            let mut page = HttpPage::new(fetcher);
            Ok(run_batch(&mut page, &handles, &args, &config, &progress).await)
        }
        Driver::Chrome => run_chrome(&handles, &args, &config, &progress).await,
    };
    progress.finish();
    let report = res?;

    tracing::info!(
        succeeded = report.succeeded(),
        total = report.profiles.len(),
        "batch finished"
    );
    for outcome in &report.profiles {
        match &outcome.output {
            Some(path) => {
                tracing::info!(profile = %outcome.handle, path = %path.display(), "ok")
            }
            None => tracing::info!(profile = %outcome.handle, "no data"),
        }
    }
    Ok(report)
}

#[cfg(feature = "chrome")]
async fn run_chrome(
    handles: &[String],
    args: &Args,
    config: &CrawlConfig,
    progress: &Progress,
) -> anyhow::Result<BatchReport> {
    progress.set_stage("launching browser");
    let opts = ChromeOptions {
        user_data_dir: args.user_data_dir.clone(),
        executable: args.chrome_executable.clone(),
        headless: args.headless,
        user_agent: args.user_agent.clone(),
        request_timeout: config.page_timeout.max(std::time::Duration::from_secs(30)),
    };
    let mut page = ChromePage::launch(&opts).await?;
    let report = run_batch(&mut page, handles, args, config, progress).await;
    if let Err(e) = page.close().await {
        tracing::warn!(error = %format!("{e:#}"), "browser did not close cleanly");
    }
    Ok(report)
}

#[cfg(not(feature = "chrome"))]
async fn run_chrome(
    _handles: &[String],
    _args: &Args,
    _config: &CrawlConfig,
    _progress: &Progress,
) -> anyhow::Result<BatchReport> {
    anyhow::bail!("built without the `chrome` feature; use --driver http")
}

async fn run_batch<R: PageReader>(
    page: &mut R,
    handles: &[String],
    args: &Args,
    config: &CrawlConfig,
    progress: &Progress,
) -> BatchReport {
    let mut report = BatchReport::default();
    for handle in handles {
        progress.profile_started(handle);
        let output = match crawler::process_profile_with_progress(
            page,
            handle,
            args.max_posts as usize,
            &args.out,
            config,
            Some(progress),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(profile = %handle, error = %format!("{e:#}"), "profile failed");
                None
            }
        };
        report.profiles.push(ProfileOutcome {
            handle: handle.clone(),
            output,
        });
        progress.profile_done();
    }
    report
}
