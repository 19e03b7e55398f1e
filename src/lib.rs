// Re-export modules
pub mod config;
pub mod crawlers;
pub mod error;
pub mod parsers;
pub mod resolve;
pub mod results;
pub mod retry;
pub mod sink;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::ScrapeConfig;
pub use crawlers::{Orchestrator, RunOutcome, Session, StartPoint, WebDriverSession};
pub use error::{ScrapeError, SessionError};
pub use results::{MergedRecord, OutputDocument, RunStatistics, RunStatus};
pub use sink::{JsonFilePersistence, ResultSink};

use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Main builder for a list-detail run
pub struct MergedScrape {
    config: ScrapeConfig,
    from_current_page: bool,
    cancel: CancellationToken,
}

impl MergedScrape {
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config,
            from_current_page: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScrapeError> {
        Ok(Self::new(ScrapeConfig::from_file(path)?))
    }

    /// Apply configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ScrapeError> {
        Ok(Self::new(ScrapeConfig::from_json(json)?))
    }

    /// Start from the page the session already shows instead of `listConfig.url`
    pub fn from_current_page(mut self) -> Self {
        self.from_current_page = true;
        self
    }

    pub fn with_max_pages(mut self, value: u32) -> Self {
        self.config.list_config.max_pages = value;
        self
    }

    pub fn with_max_detail_retries(mut self, value: u32) -> Self {
        self.config.detail_config.max_detail_retries = value;
        self
    }

    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.config.output.path = path.into();
        self
    }

    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    pub fn with_debugger_address(mut self, address: impl Into<String>) -> Self {
        self.config.debugger_address = Some(address.into());
        self
    }

    /// Cancelling `token` stops the run at the next item or page boundary
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Checks everything that can be checked before a session exists
    pub fn validate(&self) -> Result<StartPoint, ScrapeError> {
        self.config.validate()?;
        self.start_point()
    }

    fn start_point(&self) -> Result<StartPoint, ScrapeError> {
        if self.from_current_page {
            return Ok(StartPoint::CurrentPage);
        }
        match &self.config.list_config.url {
            Some(url) => Ok(StartPoint::Navigate(url.clone())),
            None => Err(ScrapeError::Configuration(
                "listConfig.url is required unless starting from the current page".to_string(),
            )),
        }
    }

    /// Runs the scrape on `session` and writes the output document.
    ///
    /// Aborted and cancelled runs still produce a document; check
    /// `metadata.status`. The session is handed back for cleanup.
    pub async fn run<S: Session>(self, session: S) -> Result<(OutputDocument, S), ScrapeError> {
        let start = self.validate()?;
        let sink = ResultSink::from_config(JsonFilePersistence, &self.config);

        let mut orchestrator = Orchestrator::new(session, &self.config)?
            .with_cancellation(self.cancel)
            .with_observer(sink.clone());

        let outcome = orchestrator.run(start).await?;
        let document = sink.finish(&outcome)?;
        Ok((document, orchestrator.into_session()))
    }
}
