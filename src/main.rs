use clap::Parser as _;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = ig_profile_crawl::CliArgs::parse();
    let report = ig_profile_crawl::run(args).await?;
    if report.succeeded() == 0 {
        anyhow::bail!("no profile produced any posts");
    }
    Ok(())
}
