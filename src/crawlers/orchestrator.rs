//! The list-detail walk.
//!
//! For every listing page, every item is handled in page order: resolve its
//! link, fetch the detail through the shared session, return to the list,
//! emit one merged record. Positions come from the loop counters, never from
//! what the page currently shows, so a detail can only ever be merged into
//! the item whose link produced it.

use crate::config::{PageRange, ScrapeConfig};
use crate::crawlers::detail::DetailFetcher;
use crate::crawlers::paginator::Paginator;
use crate::crawlers::session::Session;
use crate::error::{ScrapeError, SessionError};
use crate::resolve::UrlResolver;
use crate::results::{
    DetailResult, DetailStatus, ListItem, MergedRecord, PositionKey, RunStatistics, RunStatus,
};
use crate::retry::{Backoff, RetryPolicy};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where a run begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPoint {
    /// Open this listing URL first
    Navigate(String),
    /// Use whatever page the session is on
    CurrentPage,
}

/// States of the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScanningList,
    FetchingDetail,
    ReturningToList,
    Done,
    Cancelled,
    Aborted,
}

/// Called after each listing page has been fully processed
pub trait PageObserver: Send {
    fn on_page_complete(&mut self, page: u32, records: &[MergedRecord], stats: &RunStatistics);
}

/// Everything a run produced, including partial output of an aborted run
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<MergedRecord>,
    pub statistics: RunStatistics,
    pub status: RunStatus,
    pub error: Option<ScrapeError>,
    pub warnings: Vec<String>,
}

enum Flow {
    Finished,
    Cancelled,
}

/// Drives one session through a list-detail run.
///
/// Owns the session for its whole lifetime and lends it to the paginator and
/// detail fetcher one call at a time.
pub struct Orchestrator<S: Session> {
    session: S,
    paginator: Paginator,
    fetcher: DetailFetcher,
    resolver: UrlResolver,
    retry: RetryPolicy,
    continue_on_error: bool,
    skip_invalid_urls: bool,
    verify_list_page_state: bool,
    back_wait: Duration,
    list_wait: Duration,
    per_page_delay: Duration,
    max_pages: u32,
    page_range: Option<PageRange>,
    records: Vec<MergedRecord>,
    stats: RunStatistics,
    stats_tx: watch::Sender<RunStatistics>,
    observers: Vec<Box<dyn PageObserver>>,
    cancel: CancellationToken,
    phase: Phase,
    warnings: Vec<String>,
}

impl<S: Session> Orchestrator<S> {
    /// Validates `config` and builds the run. Nothing is navigated yet.
    pub fn new(session: S, config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        config.validate()?;
        let list = &config.list_config;
        let detail = &config.detail_config;

        let retry = RetryPolicy {
            max_retries: detail.max_detail_retries,
            delay: detail.retry_delay(),
            backoff: if detail.exponential_backoff {
                Backoff::Exponential
            } else {
                Backoff::Fixed
            },
        };
        let (stats_tx, _) = watch::channel(RunStatistics::default());

        Ok(Self {
            session,
            paginator: Paginator::new(list, detail)?,
            fetcher: DetailFetcher::new(detail)?,
            resolver: UrlResolver::new(detail.resolve_relative_urls),
            retry,
            continue_on_error: detail.continue_on_error,
            skip_invalid_urls: detail.skip_invalid_urls,
            verify_list_page_state: detail.verify_list_page_state,
            back_wait: detail.back_wait_time(),
            list_wait: list.wait_timeout(),
            per_page_delay: list.per_page_delay(),
            max_pages: list.max_pages,
            page_range: list.page_range,
            records: Vec::new(),
            stats: RunStatistics::default(),
            stats_tx,
            observers: Vec::new(),
            cancel: CancellationToken::new(),
            phase: Phase::Idle,
            warnings: Vec::new(),
        })
    }

    pub fn with_observer(mut self, observer: impl PageObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Use an externally controlled token for cooperative cancellation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshots of the statistics, updated after every change
    pub fn statistics(&self) -> watch::Receiver<RunStatistics> {
        self.stats_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Walks the listing from `start` and returns every record produced.
    ///
    /// `Err` is only returned for problems detected before the first
    /// navigation. Failures during the walk end the run with
    /// [`RunStatus::Aborted`] and keep the records produced so far.
    pub async fn run(&mut self, start: StartPoint) -> Result<RunOutcome, ScrapeError> {
        if let StartPoint::Navigate(url) = &start {
            Url::parse(url).map_err(|e| {
                ScrapeError::Configuration(format!("invalid start URL '{url}': {e}"))
            })?;
        }

        self.records.clear();
        self.warnings.clear();
        self.stats = RunStatistics {
            start_time: Some(Utc::now()),
            ..RunStatistics::default()
        };
        self.publish();

        let result = self.walk(start).await;

        self.stats.end_time = Some(Utc::now());
        self.publish();

        let (status, error) = match result {
            Ok(Flow::Finished) => {
                self.enter(Phase::Done);
                (RunStatus::Completed, None)
            }
            Ok(Flow::Cancelled) => {
                self.enter(Phase::Cancelled);
                ::log::warn!("Run cancelled after {} records", self.records.len());
                (RunStatus::Cancelled, None)
            }
            Err(e) => {
                self.enter(Phase::Aborted);
                ::log::error!("Run aborted after {} records: {}", self.records.len(), e);
                (RunStatus::Aborted, Some(e))
            }
        };

        ::log::info!(
            "List items: {}, details ok: {}, failed: {}, skipped: {} ({:.1}% success)",
            self.stats.total_list_items,
            self.stats.successful_details,
            self.stats.failed_details,
            self.stats.skipped_details,
            self.stats.success_rate()
        );

        Ok(RunOutcome {
            records: std::mem::take(&mut self.records),
            statistics: self.stats.clone(),
            status,
            error,
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    async fn walk(&mut self, start: StartPoint) -> Result<Flow, ScrapeError> {
        self.enter(Phase::ScanningList);
        match start {
            StartPoint::Navigate(url) => {
                ::log::info!("Opening list page: {}", url);
                self.session.navigate(&url).await?;
            }
            StartPoint::CurrentPage => {
                let url = self.session.current_url().await?;
                ::log::info!("Starting from current page: {}", url);
            }
        }
        self.session.wait_stable(self.per_page_delay).await?;

        if let Some(range) = self.page_range {
            if !self.paginator.seek(&mut self.session, range.start).await? {
                self.warn(format!("could not reach page {} of the page range", range.start));
                return Ok(Flow::Finished);
            }
        }

        let mut pages_scanned = 0u32;
        loop {
            self.enter(Phase::ScanningList);
            let page = self.paginator.current_page();
            let list_url = self.session.current_url().await?;
            ::log::info!("Scanning list page {}: {}", page, list_url);

            let items = self.paginator.current_items(&mut self.session).await?;
            pages_scanned += 1;
            self.stats.pages_visited += 1;
            self.publish();

            if items.is_empty() {
                let selector = self.paginator.container_selector().to_string();
                if self.stats.total_list_items == 0 && pages_scanned == 1 {
                    return Err(ScrapeError::Configuration(format!(
                        "no list items matched '{selector}' on {list_url}"
                    )));
                }
                self.warn(format!("page {page}: no list items matched '{selector}', skipped"));
            } else {
                ::log::info!("Found {} list items on page {}", items.len(), page);
                if let Flow::Cancelled = self.process_page(page, &list_url, items).await? {
                    return Ok(Flow::Cancelled);
                }
            }

            self.notify_page_complete(page);

            if self.max_pages > 0 && pages_scanned >= self.max_pages {
                ::log::info!("Reached max pages: {}", self.max_pages);
                break;
            }
            if self.page_range.is_some_and(|range| page >= range.end) {
                ::log::info!("Reached end of page range: {}", page);
                break;
            }
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            match self.paginator.advance(&mut self.session).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.warn(format!("pagination ended after page {page}: {e}"));
                    break;
                }
            }
        }

        Ok(Flow::Finished)
    }

    async fn process_page(
        &mut self,
        page: u32,
        list_url: &Url,
        mut items: Vec<ListItem>,
    ) -> Result<Flow, ScrapeError> {
        let expected = items.len();
        // Set when the last return to the list could not be verified
        let mut list_lost: Option<String> = None;

        for index in 0..expected {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            if self.session.is_closed() {
                return Err(SessionError::Closed.into());
            }
            let position = PositionKey::new(page, index);

            if let Some(reason) = list_lost.take() {
                self.enter(Phase::ScanningList);
                match self.rescan(list_url, expected).await {
                    Ok(fresh) => items = fresh,
                    Err(problem) => {
                        let message = format!("{reason}; {problem}");
                        let record = MergedRecord::merge(
                            position,
                            &items[index],
                            None,
                            DetailResult::failed(message.clone(), 0),
                        );
                        self.emit(record);
                        if !self.continue_on_error {
                            return Err(ScrapeError::ListLost { position, message });
                        }
                        list_lost = Some(reason);
                        continue;
                    }
                }
            }

            let item = &items[index];
            let url = match self
                .resolver
                .resolve(item.detail_url_raw.as_deref(), list_url)
            {
                Ok(url) => url,
                Err(e) => {
                    ::log::warn!("Skipping {}: {}", position, e);
                    self.emit(MergedRecord::skipped(position, item, e.to_string()));
                    if !self.skip_invalid_urls {
                        return Err(ScrapeError::Configuration(format!(
                            "invalid detail URL at {position}: {e}"
                        )));
                    }
                    continue;
                }
            };

            self.enter(Phase::FetchingDetail);
            let detail = self
                .fetcher
                .fetch_with_retry(&mut self.session, &url, &self.retry)
                .await;
            let record = MergedRecord::merge(position, item, Some(url.clone()), detail);

            if record.status == DetailStatus::Failed && !self.continue_on_error {
                let message = record.error_message.clone().unwrap_or_default();
                self.emit(record);
                return Err(ScrapeError::DetailFailed {
                    position,
                    url,
                    message,
                });
            }

            self.enter(Phase::ReturningToList);
            if let Err(reason) = self.return_to_list(list_url, record.attempts).await {
                self.warn(format!("{position}: {reason}"));
                list_lost = Some(reason);
            }

            self.emit(record);
        }

        Ok(Flow::Finished)
    }

    /// Brings the session back to the list and checks it is really there.
    ///
    /// Every attempt that loaded a page left one history entry, so up to
    /// `attempts` steps back are taken before the list is reopened directly.
    async fn return_to_list(&mut self, list_url: &Url, attempts: u32) -> Result<(), String> {
        let mut steps = 0;
        loop {
            let here = self
                .session
                .current_url()
                .await
                .map_err(|e| format!("cannot read URL while returning: {e}"))?;
            if here == *list_url {
                break;
            }
            if steps >= attempts.max(1) {
                self.warn(format!("history led to {here}, reopening {list_url}"));
                self.reopen_list(list_url).await?;
                break;
            }
            if let Err(e) = self.session.go_back().await {
                self.warn(format!("going back failed ({e}), reopening {list_url}"));
                self.reopen_list(list_url).await?;
                break;
            }
            steps += 1;
        }
        self.session
            .wait_stable(self.back_wait)
            .await
            .map_err(|e| format!("list did not settle after return: {e}"))?;

        if !self.verify_list_page_state {
            return Ok(());
        }

        let container = self.paginator.container_selector().to_string();
        match self.session.wait_for(&container, self.list_wait).await {
            Ok(true) => {}
            Ok(false) => return Err(format!("list container '{container}' missing after return")),
            Err(e) => return Err(format!("list verification failed: {e}")),
        }

        match self.session.current_url().await {
            Ok(url) if url == *list_url => Ok(()),
            Ok(url) => Err(format!("returned to {url}, expected {list_url}")),
            Err(e) => Err(format!("list verification failed: {e}")),
        }
    }

    /// Re-derives the page's items after an unverified return, reopening the
    /// list first if the session is somewhere else
    async fn rescan(&mut self, list_url: &Url, expected: usize) -> Result<Vec<ListItem>, String> {
        let here = self
            .session
            .current_url()
            .await
            .map_err(|e| format!("re-scan failed: {e}"))?;
        if here != *list_url {
            self.reopen_list(list_url).await?;
        }

        let items = self
            .paginator
            .current_items(&mut self.session)
            .await
            .map_err(|e| format!("re-scan failed: {e}"))?;

        if items.len() != expected {
            return Err(format!(
                "re-scan found {} items, expected {}",
                items.len(),
                expected
            ));
        }
        ::log::info!("Re-scanned list page, {} items", items.len());
        Ok(items)
    }

    async fn reopen_list(&mut self, list_url: &Url) -> Result<(), String> {
        ::log::info!("Reopening list page {}", list_url);
        self.session
            .navigate(list_url.as_str())
            .await
            .map_err(|e| format!("reopening list failed: {e}"))?;
        self.session
            .wait_stable(self.per_page_delay)
            .await
            .map_err(|e| format!("list did not settle after reopening: {e}"))
    }

    fn emit(&mut self, record: MergedRecord) {
        self.stats.record(record.status);
        ::log::info!(
            "{} -> {:?}{}",
            record.position,
            record.status,
            record
                .error_message
                .as_deref()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
        self.records.push(record);
        self.publish();
    }

    fn notify_page_complete(&mut self, page: u32) {
        for observer in self.observers.iter_mut() {
            observer.on_page_complete(page, &self.records, &self.stats);
        }
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats.clone());
    }

    fn warn(&mut self, message: String) {
        ::log::warn!("{}", message);
        self.warnings.push(message);
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            ::log::debug!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
