use crate::config::{DetailConfig, ListConfig};
use crate::crawlers::session::Session;
use crate::error::{ScrapeError, SessionError};
use crate::parsers::{self, FieldSet, LinkSource};
use crate::results::ListItem;
use scraper::Selector;
use std::time::Duration;

/// How the next listing page is reached. One strategy per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStrategy {
    /// Listing has a single page
    Single,
    /// Click a "next" control
    NextControl { selector: String },
    /// Navigate to a computed URL; `{page}` is replaced with the page number
    UrlTemplate { template: String },
}

impl PageStrategy {
    pub fn from_config(config: &ListConfig) -> Self {
        match (&config.next_control_selector, &config.page_url_template) {
            (Some(selector), _) => PageStrategy::NextControl {
                selector: selector.clone(),
            },
            (None, Some(template)) => PageStrategy::UrlTemplate {
                template: template.clone(),
            },
            (None, None) => PageStrategy::Single,
        }
    }
}

/// Reads list items from the current page and moves between pages.
///
/// Holds no session; the orchestrator lends it one per call.
#[derive(Debug, Clone)]
pub struct Paginator {
    strategy: PageStrategy,
    container_css: String,
    container: Selector,
    fields: FieldSet,
    link: LinkSource,
    per_page_delay: Duration,
    wait_timeout: Duration,
    current_page: u32,
}

impl Paginator {
    pub fn new(list: &ListConfig, detail: &DetailConfig) -> Result<Self, ScrapeError> {
        let fields = FieldSet::compile(&list.field_selectors)?;
        let link = LinkSource::for_field(
            &fields,
            &detail.detail_url_field,
            &detail.detail_url_attribute,
        )?;
        Ok(Self {
            strategy: PageStrategy::from_config(list),
            container_css: list.container_selector.clone(),
            container: parsers::compile_selector(&list.container_selector)?,
            fields,
            link,
            per_page_delay: list.per_page_delay(),
            wait_timeout: list.wait_timeout(),
            current_page: 1,
        })
    }

    /// 1-based number of the page the session is on
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn strategy(&self) -> &PageStrategy {
        &self.strategy
    }

    pub fn container_selector(&self) -> &str {
        &self.container_css
    }

    /// URL of `page` for the template strategy
    pub fn page_url(&self, page: u32) -> Option<String> {
        match &self.strategy {
            PageStrategy::UrlTemplate { template } => {
                Some(template.replace("{page}", &page.to_string()))
            }
            _ => None,
        }
    }

    /// Scans the current page. Always re-reads the document; nothing is cached.
    /// An empty result means the item container never appeared.
    pub async fn current_items<S: Session>(
        &self,
        session: &mut S,
    ) -> Result<Vec<ListItem>, SessionError> {
        if !session
            .wait_for(&self.container_css, self.wait_timeout)
            .await?
        {
            ::log::debug!("Container {} not present", self.container_css);
            return Ok(Vec::new());
        }

        let html = session.source().await?;
        Ok(parsers::extract_list_items(
            &html,
            &self.container,
            &self.fields,
            &self.link,
        ))
    }

    /// Moves to the next page. `Ok(false)` once the listing is exhausted.
    pub async fn advance<S: Session>(&mut self, session: &mut S) -> Result<bool, SessionError> {
        let next = self.current_page + 1;
        match self.strategy.clone() {
            PageStrategy::Single => Ok(false),
            PageStrategy::NextControl { selector } => {
                if !session.activate(&selector).await? {
                    ::log::info!("No usable next control after page {}", self.current_page);
                    return Ok(false);
                }
                session.wait_stable(self.per_page_delay).await?;
                self.current_page = next;
                Ok(true)
            }
            PageStrategy::UrlTemplate { .. } => {
                if self.goto_page(session, next).await? {
                    Ok(true)
                } else {
                    ::log::info!("Page {} has no items, listing exhausted", next);
                    Ok(false)
                }
            }
        }
    }

    /// Moves to `target` (the first page of a page range). With the next
    /// control this clicks through the intervening pages without scanning them.
    pub async fn seek<S: Session>(&mut self, session: &mut S, target: u32) -> Result<bool, SessionError> {
        if target <= self.current_page {
            return Ok(true);
        }
        match self.strategy {
            PageStrategy::Single => Ok(false),
            PageStrategy::NextControl { .. } => {
                while self.current_page < target {
                    if !self.advance(session).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PageStrategy::UrlTemplate { .. } => self.goto_page(session, target).await,
        }
    }

    async fn goto_page<S: Session>(&mut self, session: &mut S, page: u32) -> Result<bool, SessionError> {
        let Some(url) = self.page_url(page) else {
            return Ok(false);
        };
        ::log::debug!("Opening listing page {}: {}", page, url);
        session.navigate(&url).await?;
        session.wait_stable(self.per_page_delay).await?;

        if self.current_items(session).await?.is_empty() {
            return Ok(false);
        }
        self.current_page = page;
        Ok(true)
    }
}
