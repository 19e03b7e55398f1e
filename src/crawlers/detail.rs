use crate::config::DetailConfig;
use crate::crawlers::session::Session;
use crate::error::{ScrapeError, SessionError};
use crate::parsers::{self, FieldSet};
use crate::results::{DetailResult, FieldMap};
use crate::retry::{Attempt, RetryPolicy};
use crate::utils::truncate;
use async_trait::async_trait;
use scraper::Selector;
use std::time::Duration;
use tokio::time::timeout;

/// Fetches and extracts one detail page through a borrowed session.
///
/// Failures never escape as errors: they come back as a `Failed`
/// [`DetailResult`] and the caller decides whether to retry or abort.
#[derive(Debug, Clone)]
pub struct DetailFetcher {
    container_css: String,
    container: Selector,
    fields: FieldSet,
    page_wait: Duration,
    container_timeout: Duration,
    navigation_timeout: Duration,
}

impl DetailFetcher {
    pub fn new(config: &DetailConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            container_css: config.container_selector.clone(),
            container: parsers::compile_selector(&config.container_selector)?,
            fields: FieldSet::compile(&config.field_selectors)?,
            page_wait: config.detail_page_wait_time(),
            container_timeout: config.detail_timeout(),
            navigation_timeout: config.navigation_timeout(),
        })
    }

    /// Single attempt
    pub async fn fetch<S: Session>(&self, session: &mut S, url: &str) -> DetailResult {
        match self.try_fetch(session, url).await {
            Ok(fields) => DetailResult::success(fields, 1),
            Err(e) => DetailResult::failed(e.to_string(), 1),
        }
    }

    /// Fetches `url`, retrying failed attempts under `policy`
    pub async fn fetch_with_retry<S: Session>(
        &self,
        session: &mut S,
        url: &str,
        policy: &RetryPolicy,
    ) -> DetailResult {
        let mut attempt = DetailAttempt {
            fetcher: self,
            session,
            url,
        };
        let retried = policy.run(&mut attempt).await;

        match retried.outcome {
            Ok(fields) => {
                ::log::info!("Detail fetched: {} (attempt {})", url, retried.attempts);
                DetailResult::success(fields, retried.attempts)
            }
            Err(e) => {
                let message = e.to_string();
                ::log::error!(
                    "Detail failed after {} attempt(s): {}: {}",
                    retried.attempts,
                    url,
                    truncate(&message, 100)
                );
                DetailResult::failed(message, retried.attempts)
            }
        }
    }

    async fn try_fetch<S: Session>(&self, session: &mut S, url: &str) -> Result<FieldMap, SessionError> {
        ::log::debug!("DETAIL: {}", url);

        match timeout(self.navigation_timeout, session.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SessionError::Timeout {
                    context: format!("navigating to {url}"),
                    after: self.navigation_timeout,
                });
            }
        }

        if !session
            .wait_for(&self.container_css, self.container_timeout)
            .await?
        {
            return Err(SessionError::MissingContainer {
                selector: self.container_css.clone(),
                url: url.to_string(),
            });
        }

        session.wait_stable(self.page_wait).await?;

        let html = session.source().await?;
        parsers::extract_detail(&html, &self.container, &self.fields).ok_or_else(|| {
            SessionError::MissingContainer {
                selector: self.container_css.clone(),
                url: url.to_string(),
            }
        })
    }
}

struct DetailAttempt<'a, S> {
    fetcher: &'a DetailFetcher,
    session: &'a mut S,
    url: &'a str,
}

#[async_trait]
impl<S: Session> Attempt for DetailAttempt<'_, S> {
    type Output = FieldMap;
    type Error = SessionError;

    async fn attempt(&mut self, number: u32) -> Result<FieldMap, SessionError> {
        if number > 1 {
            ::log::info!("Retrying detail {} (attempt {})", self.url, number);
        }
        self.fetcher.try_fetch(self.session, self.url).await
    }
}
