use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::fields::{key_of, FIELD_CANDIDATE_ID, FIELD_JOB_ID};
use super::table::{RecordFields, RecordKey, TableError, TableRecord, TabularStore};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
/// Batch create/update accept at most this many rows per call.
pub const MAX_BATCH_SIZE: usize = 500;
const SEARCH_PAGE_SIZE: usize = 500;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<RawRecord>,
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    #[serde(default)]
    records: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    record_id: String,
    #[serde(default)]
    fields: RecordFields,
}

#[derive(Debug, Serialize)]
struct NewRow<'a> {
    fields: &'a RecordFields,
}

#[derive(Debug, Serialize)]
struct UpdateRow<'a> {
    record_id: &'a str,
    fields: &'a RecordFields,
}

/// Text cells come back from search either as plain strings or as a list of
/// rich-text segments. Collapse the latter to a string.
fn flatten_text(value: Value) -> Value {
    match value {
        Value::Array(segments)
            if segments.iter().all(|s| s.get("text").is_some()) && !segments.is_empty() =>
        {
            let text: String = segments
                .iter()
                .filter_map(|s| s.get("text").and_then(Value::as_str))
                .collect();
            Value::String(text)
        }
        other => other,
    }
}

impl From<RawRecord> for TableRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            record_id: raw.record_id,
            fields: raw
                .fields
                .into_iter()
                .map(|(name, value)| (name, flatten_text(value)))
                .collect(),
        }
    }
}

fn is_condition(field: &str, value: String) -> Value {
    json!({ "field_name": field, "operator": "is", "value": [value] })
}

/// `TabularStore` backed by a Feishu/Lark Bitable table.
#[derive(Clone)]
pub struct BitableStore {
    client: Client,
    records_url: String,
    access_token: String,
}

impl BitableStore {
    pub fn new(
        base_url: &str,
        app_token: &str,
        table_id: &str,
        access_token: String,
    ) -> Result<Self, TableError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            records_url: format!(
                "{}/open-apis/bitable/v1/apps/{}/tables/{}/records",
                base_url.trim_end_matches('/'),
                app_token,
                table_id
            ),
            access_token,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Value,
    ) -> Result<T, TableError> {
        let response = self
            .client
            .post(format!("{}/{}", self.records_url, path))
            .bearer_auth(&self.access_token)
            .query(query)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TableError::Api {
                    code: i64::from(status.as_u16()),
                    message: text,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if envelope.code != 0 {
            return Err(TableError::Api {
                code: envelope.code,
                message: envelope.msg,
            });
        }
        envelope.data.ok_or_else(|| TableError::Api {
            code: envelope.code,
            message: "response carried no data".to_string(),
        })
    }

    /// Every row matching `conditions`, following `page_token` until exhausted.
    async fn search(&self, conditions: Vec<Value>) -> Result<Vec<TableRecord>, TableError> {
        let body = json!({
            "filter": { "conjunction": "and", "conditions": conditions },
            "automatic_fields": false,
        });

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("page_size", SEARCH_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: SearchData = self.post("search", &query, body.clone()).await?;
            records.extend(page.items.into_iter().map(TableRecord::from));

            match page.page_token {
                Some(token) if page.has_more => page_token = Some(token),
                _ => break,
            }
        }
        Ok(records)
    }

    fn check_batch(size: usize) -> Result<(), TableError> {
        if size > MAX_BATCH_SIZE {
            return Err(TableError::BatchTooLarge {
                size,
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TabularStore for BitableStore {
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<TableRecord>, TableError> {
        let found = self
            .search(vec![
                is_condition(FIELD_CANDIDATE_ID, key.candidate_id.to_string()),
                is_condition(FIELD_JOB_ID, key.job_id.to_string()),
            ])
            .await?;
        if found.len() > 1 {
            warn!("{} rows share key {}, using the first", found.len(), key);
        }
        Ok(found.into_iter().next())
    }

    /// One search per distinct job instead of one per key.
    async fn find_many(
        &self,
        keys: &[RecordKey],
    ) -> Result<HashMap<RecordKey, String>, TableError> {
        let wanted: HashSet<RecordKey> = keys.iter().copied().collect();
        let jobs: HashSet<_> = keys.iter().map(|k| k.job_id).collect();

        let mut found = HashMap::new();
        for job_id in jobs {
            let rows = self
                .search(vec![is_condition(FIELD_JOB_ID, job_id.to_string())])
                .await?;
            debug!("Table holds {} rows for job {}", rows.len(), job_id);
            for row in rows {
                if let Some(key) = key_of(&row.fields).filter(|k| wanted.contains(k)) {
                    found.entry(key).or_insert(row.record_id);
                }
            }
        }
        Ok(found)
    }

    async fn batch_create(&self, rows: Vec<RecordFields>) -> Result<Vec<String>, TableError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Self::check_batch(rows.len())?;

        let records: Vec<NewRow> = rows.iter().map(|fields| NewRow { fields }).collect();
        let data: BatchData = self
            .post("batch_create", &[], json!({ "records": records }))
            .await?;
        Ok(data.records.into_iter().map(|r| r.record_id).collect())
    }

    async fn batch_update(
        &self,
        rows: Vec<(String, RecordFields)>,
    ) -> Result<Vec<String>, TableError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Self::check_batch(rows.len())?;

        let records: Vec<UpdateRow> = rows
            .iter()
            .map(|(record_id, fields)| UpdateRow { record_id, fields })
            .collect();
        let data: BatchData = self
            .post("batch_update", &[], json!({ "records": records }))
            .await?;
        Ok(data.records.into_iter().map(|r| r.record_id).collect())
    }
}
