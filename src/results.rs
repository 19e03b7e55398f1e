use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single extracted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// First match of a single-valued field
    Text(String),
    /// All matches of a multi-valued field, in document order
    List(Vec<String>),
    /// No match (serialized as `null`)
    Missing,
}

impl FieldValue {
    /// Returns the text of a single-valued field, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

/// Field name to extracted value
pub type FieldMap = BTreeMap<String, FieldValue>;

/// One row extracted from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Values of the configured list fields
    pub fields: FieldMap,

    /// Unresolved value of the detail-link field
    pub detail_url_raw: Option<String>,
}

/// Correlation identity of a list item and its detail.
///
/// Only the orchestrator can mint one; it is bound to iteration order, never
/// to page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionKey {
    page_number: u32,
    item_index: usize,
}

impl PositionKey {
    pub(crate) fn new(page_number: u32, item_index: usize) -> Self {
        Self {
            page_number,
            item_index,
        }
    }

    /// 1-based listing page number
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// 0-based index within the page
    pub fn item_index(&self) -> usize {
        self.item_index
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} item {}", self.page_number, self.item_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of fetching one detail page, including retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailResult {
    pub status: DetailStatus,
    pub fields: Option<FieldMap>,
    pub error_message: Option<String>,
    pub attempts: u32,
}

impl DetailResult {
    pub fn success(fields: FieldMap, attempts: u32) -> Self {
        Self {
            status: DetailStatus::Success,
            fields: Some(fields),
            error_message: None,
            attempts,
        }
    }

    pub fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: DetailStatus::Failed,
            fields: None,
            error_message: Some(message.into()),
            attempts,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: DetailStatus::Skipped,
            fields: None,
            error_message: None,
            attempts: 0,
        }
    }
}

/// The unit of output: list data and detail data for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRecord {
    pub list_data: FieldMap,
    pub detail_data: FieldMap,
    pub position: PositionKey,
    pub resolved_detail_url: Option<String>,
    pub status: DetailStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub scraped_at: DateTime<Utc>,
}

impl MergedRecord {
    /// Merges a list item with the result of its detail fetch
    pub fn merge(
        position: PositionKey,
        item: &ListItem,
        resolved_detail_url: Option<String>,
        detail: DetailResult,
    ) -> Self {
        Self {
            list_data: item.fields.clone(),
            detail_data: detail.fields.unwrap_or_default(),
            position,
            resolved_detail_url,
            status: detail.status,
            error_message: detail.error_message,
            attempts: detail.attempts,
            scraped_at: Utc::now(),
        }
    }

    /// A record for an item whose detail link was never followed
    pub fn skipped(position: PositionKey, item: &ListItem, reason: impl Into<String>) -> Self {
        let mut record = Self::merge(position, item, None, DetailResult::skipped());
        record.error_message = Some(reason.into());
        record
    }
}

/// Counters describing a run. Counts only ever go up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total_list_items: usize,
    pub successful_details: usize,
    pub failed_details: usize,
    pub skipped_details: usize,
    pub pages_visited: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunStatistics {
    pub(crate) fn record(&mut self, status: DetailStatus) {
        self.total_list_items += 1;
        match status {
            DetailStatus::Success => self.successful_details += 1,
            DetailStatus::Failed => self.failed_details += 1,
            DetailStatus::Skipped => self.skipped_details += 1,
        }
    }

    /// Share of list items whose detail was fetched, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_list_items == 0 {
            return 0.0;
        }
        self.successful_details as f64 / self.total_list_items as f64 * 100.0
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Partial output of a run that is still going
    InProgress,
    Completed,
    Cancelled,
    Aborted,
}

/// Configuration echoed into the output metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEcho {
    pub list_url: Option<String>,
    pub list_fields: Vec<String>,
    pub detail_fields: Vec<String>,
    pub detail_url_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub total_items: usize,
    pub status: RunStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub statistics: RunStatistics,
    pub config: ConfigEcho,
}

/// The JSON document written for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub metadata: OutputMetadata,
    pub data: Vec<MergedRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> ListItem {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::Text(title.to_string()));
        ListItem {
            fields,
            detail_url_raw: Some("/a".to_string()),
        }
    }

    #[test]
    fn test_failed_record_has_empty_detail_data() {
        let record = MergedRecord::merge(
            PositionKey::new(1, 0),
            &item("A"),
            Some("https://example.com/a".to_string()),
            DetailResult::failed("boom", 2),
        );
        assert!(record.detail_data.is_empty());
        assert_eq!(record.status, DetailStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = MergedRecord::skipped(PositionKey::new(2, 3), &item("B"), "no link");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["position"]["pageNumber"], 2);
        assert_eq!(json["position"]["itemIndex"], 3);
        assert_eq!(json["status"], "Skipped");
        assert_eq!(json["resolvedDetailUrl"], serde_json::Value::Null);
        assert_eq!(json["listData"]["title"], "B");
    }

    #[test]
    fn test_field_values_serialize_untagged() {
        assert_eq!(
            serde_json::to_value(FieldValue::Missing).unwrap(),
            serde_json::Value::Null
        );
        assert_eq!(
            serde_json::to_value(FieldValue::List(vec!["a".into(), "b".into()])).unwrap(),
            serde_json::json!(["a", "b"])
        );
    }

    #[test]
    fn test_statistics_count_by_status() {
        let mut stats = RunStatistics::default();
        stats.record(DetailStatus::Success);
        stats.record(DetailStatus::Failed);
        stats.record(DetailStatus::Skipped);
        stats.record(DetailStatus::Success);
        assert_eq!(stats.total_list_items, 4);
        assert_eq!(stats.successful_details, 2);
        assert_eq!(stats.failed_details, 1);
        assert_eq!(stats.skipped_details, 1);
        assert_eq!(stats.success_rate(), 50.0);
    }

    #[test]
    fn test_positions_order_by_page_then_index() {
        let mut keys = vec![
            PositionKey::new(2, 0),
            PositionKey::new(1, 1),
            PositionKey::new(1, 0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PositionKey::new(1, 0),
                PositionKey::new(1, 1),
                PositionKey::new(2, 0)
            ]
        );
    }
}
