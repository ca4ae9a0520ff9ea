use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Search criteria handed to the listing source as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub keywords: String,
    pub location: Option<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
}

impl SearchParams {
    /// Non-empty criteria as query pairs, in the names listing feeds expect.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if !self.keywords.trim().is_empty() {
            pairs.push(("query", self.keywords.trim()));
        }
        for (name, value) in [
            ("city", &self.location),
            ("experience", &self.experience),
            ("degree", &self.education),
        ] {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((name, v));
            }
        }
        pairs
    }
}

/// One listing entry, either a summary row from a page or a full detail.
/// `data` is the source's own document; it is only interpreted on conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    pub source_id: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl RawItem {
    /// Best-effort label for logs and error records.
    pub fn label(&self) -> String {
        self.source_id
            .clone()
            .or_else(|| self.data.get("name").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingPage {
    pub items: Vec<RawItem>,
    /// Cursor for the following page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing source returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unreadable listing payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid listing item: {0}")]
    Invalid(String),

    #[error("Listing source unavailable: {0}")]
    Unavailable(String),
}

/// The system that physically serves resume listings.
///
/// Calls are not retried here; the collection stage's breaker decides when
/// to give up on a failing source.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Label stored as `CandidateRecord::source`.
    fn name(&self) -> &str;

    /// Fetches the page at `cursor` (`None` for the first page).
    async fn next_page(
        &self,
        search: &SearchParams,
        cursor: Option<&str>,
    ) -> Result<ListingPage, SourceError>;

    async fn extract_detail(&self, item: &RawItem) -> Result<RawItem, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_skip_blank_criteria() {
        let params = SearchParams {
            keywords: " rust ".to_string(),
            location: Some("Shanghai".to_string()),
            experience: Some("  ".to_string()),
            education: None,
        };
        assert_eq!(params.query_pairs(), vec![("query", "rust"), ("city", "Shanghai")]);
    }

    #[test]
    fn test_item_label_falls_back_to_name() {
        let item = RawItem {
            source_id: None,
            url: None,
            data: serde_json::json!({"name": "Wang Fang"}),
        };
        assert_eq!(item.label(), "Wang Fang");
        assert_eq!(RawItem::default().label(), "unknown");
    }
}
