use clap::Parser;
use merged_scrape::{MergedScrape, RunStatus, ScrapeError, WebDriverSession};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    match run(&args).await {
        Ok(RunStatus::Aborted) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            ::log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<RunStatus, ScrapeError> {
    let cancel = CancellationToken::new();
    let scrape = args
        .apply(MergedScrape::from_file(&args.config)?)
        .with_cancellation(cancel.clone());

    // Configuration problems are reported before a browser is touched
    scrape.validate()?;

    let config = scrape.config();
    ::log::info!("Connecting to WebDriver at {}", config.webdriver_url);
    let session =
        WebDriverSession::connect(&config.webdriver_url, config.debugger_address.as_deref())
            .await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupted, stopping after the current item");
            cancel.cancel();
        }
    });

    let start_time = std::time::Instant::now();
    let (document, session) = scrape.run(session).await?;

    let stats = &document.metadata.statistics;
    ::log::info!(
        "Scrape {:?} - {} records ({} ok, {} failed, {} skipped) from {} pages in {:.2} seconds",
        document.metadata.status,
        document.data.len(),
        stats.successful_details,
        stats.failed_details,
        stats.skipped_details,
        stats.pages_visited,
        start_time.elapsed().as_secs_f64()
    );
    if let Some(error) = &document.metadata.error {
        ::log::error!("Run ended early: {}", error);
    }

    if let Err(e) = session.close().await {
        ::log::warn!("Failed to close WebDriver session: {}", e);
    }
    Ok(document.metadata.status)
}
