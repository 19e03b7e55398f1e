use crate::error::ScrapeError;
use crate::parsers::{FieldSet, compile_selector};
use crate::utils::secs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How to extract one named field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Key of the field in the output
    pub name: String,

    /// CSS selector, relative to the item or detail container
    pub selector: String,

    /// Attribute to read instead of the text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Collect every match instead of the first one
    #[serde(default)]
    pub multiple: bool,
}

impl FieldSpec {
    /// Text field shorthand
    pub fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            attribute: None,
            multiple: false,
        }
    }

    /// Attribute field shorthand
    pub fn attr(name: &str, selector: &str, attribute: &str) -> Self {
        Self {
            attribute: Some(attribute.to_string()),
            ..Self::text(name, selector)
        }
    }
}

/// Inclusive range of listing pages to visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

/// Configuration for the listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConfig {
    /// Listing URL to open when the run does not start on the current page
    #[serde(default)]
    pub url: Option<String>,

    /// Fields extracted from each item container
    pub field_selectors: Vec<FieldSpec>,

    /// Selector matching one element per list item
    pub container_selector: String,

    /// "Next" control to click for the following page
    #[serde(default)]
    pub next_control_selector: Option<String>,

    /// URL of page N, with `{page}` standing for N
    #[serde(default)]
    pub page_url_template: Option<String>,

    #[serde(default)]
    pub page_range: Option<PageRange>,

    /// Maximum number of pages to scan (0 = unlimited)
    #[serde(default)]
    pub max_pages: u32,

    /// Seconds to wait after opening or advancing a listing page
    #[serde(default = "default_per_page_delay")]
    pub per_page_delay: f64,

    /// Seconds to wait for the item containers to appear
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: f64,
}

/// Configuration for the detail pages and per-item policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailConfig {
    /// Fields extracted inside the detail container
    pub field_selectors: Vec<FieldSpec>,

    /// Selector that marks a loaded detail page
    pub container_selector: String,

    /// List field holding the link to the detail page
    pub detail_url_field: String,

    /// Attribute of the link element holding the URL
    #[serde(default = "default_detail_url_attribute")]
    pub detail_url_attribute: String,

    #[serde(default = "default_max_detail_retries")]
    pub max_detail_retries: u32,

    /// Seconds between detail attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Double the retry delay after every failed attempt
    #[serde(default)]
    pub exponential_backoff: bool,

    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    #[serde(default = "default_true")]
    pub skip_invalid_urls: bool,

    /// Follow relative links such as `item/5` against the listing URL
    #[serde(default)]
    pub resolve_relative_urls: bool,

    /// Check the list container (and URL) after every return
    #[serde(default = "default_true")]
    pub verify_list_page_state: bool,

    #[serde(default = "default_back_wait_time")]
    pub back_wait_time: f64,

    #[serde(default = "default_detail_page_wait_time")]
    pub detail_page_wait_time: f64,

    /// Seconds to wait for the detail container
    #[serde(default = "default_detail_timeout")]
    pub detail_timeout: f64,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: f64,
}

/// Where results go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,

    #[serde(default = "default_partial_path")]
    pub partial_path: String,

    /// Rewrite the partial file after every completed page
    #[serde(default = "default_true")]
    pub save_partial_results: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            partial_path: default_partial_path(),
            save_partial_results: true,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeConfig {
    pub list_config: ListConfig,

    pub detail_config: DetailConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// `host:port` of an already running Chrome to attach to
    #[serde(default)]
    pub debugger_address: Option<String>,
}

impl ScrapeConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScrapeError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ScrapeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ScrapeError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Checks everything that can be checked before touching the browser
    pub fn validate(&self) -> Result<(), ScrapeError> {
        let list = &self.list_config;
        let detail = &self.detail_config;

        require("listConfig.containerSelector", &list.container_selector)?;
        require("detailConfig.containerSelector", &detail.container_selector)?;
        require("detailConfig.detailUrlField", &detail.detail_url_field)?;
        require("detailConfig.detailUrlAttribute", &detail.detail_url_attribute)?;

        if list.field_selectors.is_empty() {
            return Err(config_error("listConfig.fieldSelectors must not be empty"));
        }
        if detail.field_selectors.is_empty() {
            return Err(config_error("detailConfig.fieldSelectors must not be empty"));
        }
        if !list
            .field_selectors
            .iter()
            .any(|f| f.name == detail.detail_url_field)
        {
            return Err(config_error(format!(
                "detailUrlField '{}' must be one of listConfig.fieldSelectors",
                detail.detail_url_field
            )));
        }

        FieldSet::compile(&list.field_selectors)?;
        FieldSet::compile(&detail.field_selectors)?;
        compile_selector(&list.container_selector)?;
        compile_selector(&detail.container_selector)?;

        match (&list.next_control_selector, &list.page_url_template) {
            (Some(_), Some(_)) => {
                return Err(config_error(
                    "nextControlSelector and pageUrlTemplate are mutually exclusive",
                ));
            }
            (Some(next), None) => {
                compile_selector(next)?;
            }
            (None, Some(template)) if !template.contains("{page}") => {
                return Err(config_error(format!(
                    "pageUrlTemplate '{template}' has no {{page}} placeholder"
                )));
            }
            _ => {}
        }

        if let Some(range) = list.page_range {
            if range.start == 0 || range.start > range.end {
                return Err(config_error(format!(
                    "invalid pageRange {}..{}",
                    range.start, range.end
                )));
            }
        }

        for (name, value) in [
            ("listConfig.perPageDelay", list.per_page_delay),
            ("listConfig.waitTimeout", list.wait_timeout),
            ("detailConfig.retryDelay", detail.retry_delay),
            ("detailConfig.backWaitTime", detail.back_wait_time),
            ("detailConfig.detailPageWaitTime", detail.detail_page_wait_time),
            ("detailConfig.detailTimeout", detail.detail_timeout),
            ("detailConfig.navigationTimeout", detail.navigation_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error(format!("{name} must be a non-negative number")));
            }
        }

        if let Some(url) = &list.url {
            url::Url::parse(url)
                .map_err(|e| config_error(format!("listConfig.url '{url}': {e}")))?;
        }

        Ok(())
    }
}

impl ListConfig {
    pub fn per_page_delay(&self) -> Duration {
        secs(self.per_page_delay)
    }

    pub fn wait_timeout(&self) -> Duration {
        secs(self.wait_timeout)
    }
}

impl DetailConfig {
    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }

    pub fn back_wait_time(&self) -> Duration {
        secs(self.back_wait_time)
    }

    pub fn detail_page_wait_time(&self) -> Duration {
        secs(self.detail_page_wait_time)
    }

    pub fn detail_timeout(&self) -> Duration {
        secs(self.detail_timeout)
    }

    pub fn navigation_timeout(&self) -> Duration {
        secs(self.navigation_timeout)
    }
}

fn require(name: &str, value: &str) -> Result<(), ScrapeError> {
    if value.trim().is_empty() {
        return Err(config_error(format!("{name} is required")));
    }
    Ok(())
}

fn config_error(message: impl Into<String>) -> ScrapeError {
    ScrapeError::Configuration(message.into())
}

fn default_true() -> bool {
    true
}

fn default_per_page_delay() -> f64 {
    3.0
}

fn default_wait_timeout() -> f64 {
    10.0
}

fn default_detail_url_attribute() -> String {
    "href".to_string()
}

fn default_max_detail_retries() -> u32 {
    2
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_back_wait_time() -> f64 {
    2.0
}

fn default_detail_page_wait_time() -> f64 {
    2.0
}

fn default_detail_timeout() -> f64 {
    15.0
}

fn default_navigation_timeout() -> f64 {
    30.0
}

fn default_output_path() -> String {
    "merged_data.json".to_string()
}

fn default_partial_path() -> String {
    "partial_merged_data.json".to_string()
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "listConfig": {
            "url": "https://example.com/list",
            "fieldSelectors": [
                {"name": "title", "selector": "h3 a"},
                {"name": "link", "selector": "h3 a", "attribute": "href"}
            ],
            "containerSelector": ".item"
        },
        "detailConfig": {
            "fieldSelectors": [{"name": "body", "selector": ".body"}],
            "containerSelector": "article",
            "detailUrlField": "link"
        }
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.validate().unwrap();

        let detail = &config.detail_config;
        assert_eq!(detail.detail_url_attribute, "href");
        assert_eq!(detail.max_detail_retries, 2);
        assert!(detail.continue_on_error);
        assert!(detail.skip_invalid_urls);
        assert!(!detail.resolve_relative_urls);
        assert_eq!(detail.back_wait_time(), Duration::from_secs(2));
        assert_eq!(config.list_config.max_pages, 0);
        assert_eq!(config.output.path, "merged_data.json");
        assert!(config.output.save_partial_results);
        assert_eq!(config.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn test_detail_url_field_must_be_a_list_field() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.detail_config.detail_url_field = "href".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
        assert!(err.to_string().contains("detailUrlField"));
    }

    #[test]
    fn test_rejects_both_pagination_strategies() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.list_config.next_control_selector = Some("a.next".to_string());
        config.list_config.page_url_template = Some("https://example.com/list?p={page}".to_string());
        assert!(matches!(
            config.validate(),
            Err(ScrapeError::Configuration(_))
        ));
    }

    #[test]
    fn test_template_needs_placeholder() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.list_config.page_url_template = Some("https://example.com/list".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_page_range() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.list_config.page_range = Some(PageRange { start: 3, end: 2 });
        assert!(config.validate().is_err());

        config.list_config.page_range = Some(PageRange { start: 0, end: 2 });
        assert!(config.validate().is_err());

        config.list_config.page_range = Some(PageRange { start: 2, end: 2 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_selector_and_missing_container() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.detail_config.field_selectors[0].selector = "[[".to_string();
        assert!(config.validate().is_err());

        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.list_config.container_selector = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_delay() {
        let mut config = ScrapeConfig::from_json(MINIMAL).unwrap();
        config.detail_config.back_wait_time = -1.0;
        assert!(config.validate().is_err());
    }
}
