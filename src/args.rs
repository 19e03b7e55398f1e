use clap::Parser;
use merged_scrape::MergedScrape;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "merged-scrape")]
#[command(about = "Scrapes a paginated listing and merges each item with its detail page")]
#[command(version)]
pub struct Args {
    /// JSON configuration file
    pub config: PathBuf,

    /// Start from the page the browser already shows instead of listConfig.url
    #[arg(long)]
    pub current_page: bool,

    /// Output file (overrides output.path)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Maximum listing pages to scan, 0 for no limit
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Retries per detail page after the first attempt
    #[arg(long)]
    pub max_detail_retries: Option<u32>,

    /// WebDriver server URL (overrides WEBDRIVER_URL and the config file)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Attach to a running Chrome, e.g. 127.0.0.1:9222
    #[arg(long)]
    pub debugger_address: Option<String>,
}

impl Args {
    /// Applies the command-line overrides to `scrape`
    pub fn apply(&self, mut scrape: MergedScrape) -> MergedScrape {
        if self.current_page {
            scrape = scrape.from_current_page();
        }
        if let Some(path) = &self.output {
            scrape = scrape.with_output(path.clone());
        }
        if let Some(value) = self.max_pages {
            scrape = scrape.with_max_pages(value);
        }
        if let Some(value) = self.max_detail_retries {
            scrape = scrape.with_max_detail_retries(value);
        }

        // Override the WebDriver URL with an environment variable if provided
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                scrape = scrape.with_webdriver_url(webdriver_url);
            }
        }
        if let Some(url) = &self.webdriver_url {
            scrape = scrape.with_webdriver_url(url.clone());
        }
        if let Some(address) = &self.debugger_address {
            scrape = scrape.with_debugger_address(address.clone());
        }
        scrape
    }
}
