//! Client for the Paperless-ngx REST API. Token authentication, full
//! pagination on every listing, bounded retries for transient failures, and
//! a hard distinction between not-found (an expected outcome) and everything
//! else. The token is never logged.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::RemoteError;
use crate::services::tags::{self, TagDiff};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub field: i64,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDocument {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedResource {
    id: i64,
    name: String,
}

/// The API does substring matching on name filters; only an exact hit counts.
fn exact_match(results: &[NamedResource], name: &str) -> Option<i64> {
    results.iter().find(|r| r.name == name).map(|r| r.id)
}

pub struct PaperlessClient {
    base_url: String,
    token: String,
    http: Client,
    page_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PaperlessClient {
    pub fn new(settings: &Settings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        PaperlessClient {
            base_url: settings.paperless_base_url.trim_end_matches('/').to_string(),
            token: settings.paperless_token.clone(),
            http,
            page_size: settings.batch_size,
            max_retries: settings.max_retries,
            retry_backoff: settings.retry_backoff,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            debug!(%method, path, attempt, "remote request");
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("Authorization", format!("Token {}", self.token))
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(RemoteError::NotFound);
                    }
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        RemoteError::Transient(format!("HTTP {status}"))
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RemoteError::Rejected {
                            status: status.as_u16(),
                            body,
                        });
                    }
                }
                Err(e) => RemoteError::from(e),
            };

            if attempt >= self.max_retries || !err.is_retryable() {
                return Err(err);
            }
            attempt += 1;
            warn!(path, attempt, error = %err, "transient remote error, retrying");
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, RemoteError> {
        let response = self.send(Method::POST, path, &[], Some(&body)).await?;
        Ok(response.json().await?)
    }

    async fn patch_document(
        &self,
        doc_id: i64,
        body: serde_json::Value,
    ) -> Result<(), RemoteError> {
        let path = format!("/api/documents/{doc_id}/");
        self.send(Method::PATCH, &path, &[], Some(&body)).await?;
        Ok(())
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        extra_query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let mut all = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut query = vec![
                ("page_size", self.page_size.to_string()),
                ("page", page.to_string()),
            ];
            query.extend(extra_query.iter().cloned());
            let response: Page<T> = self.get_json(path, &query).await?;
            let done = response.next.is_none();
            all.extend(response.results);
            if done {
                return Ok(all);
            }
            page += 1;
        }
    }

    /// All documents, newest-modified first, optionally restricted to those
    /// modified since the given instant. Always walks every page.
    pub async fn list_documents(
        &self,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        let mut query = vec![("ordering", "-modified".to_string())];
        if let Some(since) = modified_since {
            query.push(("modified__gte", since.to_rfc3339()));
        }
        let documents = self.paginate("/api/documents/", &query).await?;
        info!(count = documents.len(), "fetched documents from remote");
        Ok(documents)
    }

    pub async fn get_document(&self, doc_id: i64) -> Result<RemoteDocument, RemoteError> {
        self.get_json(&format!("/api/documents/{doc_id}/"), &[]).await
    }

    /// OCR text content for a document; an empty string when the remote has
    /// no text for it.
    pub async fn get_document_content(&self, doc_id: i64) -> Result<String, RemoteError> {
        let doc = self.get_document(doc_id).await?;
        Ok(doc.content.unwrap_or_default())
    }

    pub async fn all_tags(&self) -> Result<HashMap<i64, String>, RemoteError> {
        let tags: Vec<NamedResource> = self.paginate("/api/tags/", &[]).await?;
        Ok(tags.into_iter().map(|t| (t.id, t.name)).collect())
    }

    pub async fn get_or_create_tag(&self, name: &str) -> Result<i64, RemoteError> {
        let page: Page<NamedResource> = self
            .get_json("/api/tags/", &[("name", name.to_string())])
            .await?;
        if let Some(id) = exact_match(&page.results, name) {
            return Ok(id);
        }
        let created: NamedResource = self.post_json("/api/tags/", json!({ "name": name })).await?;
        info!(tag = name, id = created.id, "created tag");
        Ok(created.id)
    }

    /// Take the document's anomaly-owned tags to exactly `desired`, leaving
    /// every other tag untouched. Returns the applied diff; an empty diff
    /// means no remote write happened at all.
    pub async fn replace_anomaly_tags(
        &self,
        doc_id: i64,
        desired: &BTreeSet<String>,
    ) -> Result<TagDiff, RemoteError> {
        let doc = self.get_document(doc_id).await?;
        let tag_names = self.all_tags().await?;
        let remote_names: Vec<&str> = doc
            .tags
            .iter()
            .filter_map(|id| tag_names.get(id).map(|n| n.as_str()))
            .collect();

        let diff = tags::diff_tags(remote_names.iter().copied(), desired);
        if diff.is_empty() {
            debug!(doc_id, "tags already converged");
            return Ok(diff);
        }

        // Tag ids without a resolvable name cannot be ours; keep them.
        let mut final_ids: Vec<i64> = doc
            .tags
            .iter()
            .filter(|id| {
                tag_names
                    .get(id)
                    .map(|name| !diff.to_remove.contains(name))
                    .unwrap_or(true)
            })
            .copied()
            .collect();
        for name in &diff.to_add {
            let id = self.get_or_create_tag(name).await?;
            if !final_ids.contains(&id) {
                final_ids.push(id);
            }
        }

        self.patch_document(doc_id, json!({ "tags": final_ids })).await?;
        info!(
            doc_id,
            removed = diff.to_remove.len(),
            added = diff.to_add.len(),
            "replaced anomaly tags"
        );
        Ok(diff)
    }

    pub async fn get_or_create_document_type(&self, name: &str) -> Result<i64, RemoteError> {
        let types: Vec<NamedResource> = self.paginate("/api/document_types/", &[]).await?;
        if let Some(id) = exact_match(&types, name) {
            return Ok(id);
        }
        let created: NamedResource = self
            .post_json(
                "/api/document_types/",
                json!({ "name": name, "match": "", "matching_algorithm": 0 }),
            )
            .await?;
        info!(document_type = name, id = created.id, "created document type");
        Ok(created.id)
    }

    pub async fn set_document_type(&self, doc_id: i64, name: &str) -> Result<(), RemoteError> {
        let type_id = self.get_or_create_document_type(name).await?;
        self.patch_document(doc_id, json!({ "document_type": type_id }))
            .await
    }

    pub async fn get_or_create_custom_field(
        &self,
        name: &str,
        data_type: &str,
    ) -> Result<i64, RemoteError> {
        let page: Page<NamedResource> = self
            .get_json("/api/custom_fields/", &[("name", name.to_string())])
            .await?;
        if let Some(id) = exact_match(&page.results, name) {
            return Ok(id);
        }
        let created: NamedResource = self
            .post_json(
                "/api/custom_fields/",
                json!({ "name": name, "data_type": data_type }),
            )
            .await?;
        info!(field = name, id = created.id, "created custom field");
        Ok(created.id)
    }

    /// Upsert one custom field value on a document, preserving the others.
    pub async fn set_custom_field(
        &self,
        doc_id: i64,
        name: &str,
        value: serde_json::Value,
        data_type: &str,
    ) -> Result<(), RemoteError> {
        let field_id = self.get_or_create_custom_field(name, data_type).await?;
        let doc = self.get_document(doc_id).await?;

        let mut fields = doc.custom_fields;
        match fields.iter_mut().find(|f| f.field == field_id) {
            Some(existing) => existing.value = value,
            None => fields.push(CustomFieldValue {
                field: field_id,
                value,
            }),
        }

        self.patch_document(doc_id, json!({ "custom_fields": fields }))
            .await
    }
}
