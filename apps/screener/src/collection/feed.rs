use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use super::source::{ListingPage, ListingSource, RawItem, SearchParams, SourceError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// `ListingSource` backed by a JSON listing feed.
///
/// `GET {base}/listings?query=..&cursor=..` returns a `ListingPage`;
/// `GET {base}/listings/{source_id}` (or the item's own `url`) returns the
/// detail as a `RawItem`.
#[derive(Clone)]
pub struct FeedListingSource {
    client: Client,
    base_url: String,
    name: String,
}

impl FeedListingSource {
    pub fn new(base_url: &str, name: String) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            name,
        })
    }

    fn detail_url(&self, item: &RawItem) -> Result<String, SourceError> {
        if let Some(url) = item.url.as_deref().filter(|u| u.starts_with("http")) {
            return Ok(url.to_string());
        }
        match item.source_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(format!("{}/listings/{}", self.base_url, id.trim())),
            _ => Err(SourceError::Invalid(
                "item has neither a detail url nor a source id".to_string(),
            )),
        }
    }
}

async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ListingSource for FeedListingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_page(
        &self,
        search: &SearchParams,
        cursor: Option<&str>,
    ) -> Result<ListingPage, SourceError> {
        let mut query = search.query_pairs();
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let response = self
            .client
            .get(format!("{}/listings", self.base_url))
            .query(&query)
            .send()
            .await?;
        let page: ListingPage = check_status(response).await?.json().await?;

        debug!(
            "Listing feed returned {} items (next cursor: {:?})",
            page.items.len(),
            page.next_cursor
        );
        Ok(page)
    }

    async fn extract_detail(&self, item: &RawItem) -> Result<RawItem, SourceError> {
        let url = self.detail_url(item)?;
        let response = self.client.get(&url).send().await?;
        let mut detail: RawItem = check_status(response).await?.json().await?;

        // Keep the identity from the listing row if the detail omits it.
        if detail.source_id.is_none() {
            detail.source_id = item.source_id.clone();
        }
        if detail.url.is_none() {
            detail.url = Some(url);
        }
        Ok(detail)
    }
}
