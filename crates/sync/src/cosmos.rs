//! Azure Cosmos DB backend over the REST API.
//!
//! One container partitioned by document `kind`; upserts are keyed by
//! document id, last writer wins. Requests are signed with the account's
//! master key (HMAC-SHA256 over verb, resource type, resource link and
//! date).

use agent_mem_core::MemoryDocument;
use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::backend::{SyncBackend, TargetDescriptor};

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2018-12-31";

/// Remote backend for the `azure-cosmos` provider.
pub struct CosmosBackend {
    client: reqwest::Client,
    endpoint: String,
    key: Vec<u8>,
    database: String,
    container: String,
    label: String,
    fingerprint: String,
}

impl CosmosBackend {
    /// Creates a backend for the given account. The key is the base64
    /// master key from the account's connection settings.
    pub fn new(
        endpoint: impl Into<String>,
        account_key: &str,
        database: impl Into<String>,
        container: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_owned();
        let database = database.into();
        let container = container.into();
        let key = BASE64.decode(account_key).context("account key is not valid base64")?;
        let descriptor = TargetDescriptor {
            provider: "azure-cosmos".to_owned(),
            endpoint: endpoint.clone(),
            database: database.clone(),
            container: container.clone(),
        };
        let fingerprint = descriptor.fingerprint()?;
        let label = format!("azure-cosmos/{database}/{container}");
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            key,
            database,
            container,
            label,
            fingerprint,
        })
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn documents_url(&self) -> String {
        format!("{}/{}/docs", self.endpoint, self.collection_link())
    }

    /// Master-key authorization header plus the matching `x-ms-date` value.
    fn auth_headers(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<(String, String)> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type,
            resource_link,
            date.to_lowercase()
        );
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| anyhow!("invalid account key length: {e}"))?;
        mac.update(payload.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok((urlencoding::encode(&token).into_owned(), date))
    }

    async fn ensure_database(&self) -> Result<()> {
        let (auth, date) = self.auth_headers("POST", "dbs", "")?;
        let response = self
            .client
            .post(format!("{}/dbs", self.endpoint))
            .header("authorization", auth)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .json(&serde_json::json!({ "id": self.database }))
            .send()
            .await?;
        ensure_success_or_conflict("create database", response).await
    }

    async fn ensure_container(&self) -> Result<()> {
        let resource_link = format!("dbs/{}", self.database);
        let (auth, date) = self.auth_headers("POST", "colls", &resource_link)?;
        let response = self
            .client
            .post(format!("{}/{resource_link}/colls", self.endpoint))
            .header("authorization", auth)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .json(&serde_json::json!({
                "id": self.container,
                "partitionKey": { "paths": ["/kind"], "kind": "Hash" }
            }))
            .send()
            .await?;
        ensure_success_or_conflict("create container", response).await
    }
}

#[async_trait]
impl SyncBackend for CosmosBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn target_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn initialize(&self) -> Result<()> {
        self.ensure_database().await?;
        self.ensure_container().await?;
        tracing::info!(backend = self.label, "cosmos target ready");
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[MemoryDocument]) -> Result<()> {
        let resource_link = self.collection_link();
        for doc in docs {
            let (auth, date) = self.auth_headers("POST", "docs", &resource_link)?;
            let partition_key = format!("[\"{}\"]", doc.kind().as_str());
            let response = self
                .client
                .post(self.documents_url())
                .header("authorization", auth)
                .header("x-ms-date", date)
                .header("x-ms-version", API_VERSION)
                .header("x-ms-documentdb-is-upsert", "true")
                .header("x-ms-documentdb-partitionkey", partition_key)
                .json(doc)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("cosmos upsert failed for {}: {status} {}", doc.id, truncate(&body));
            }
        }
        Ok(())
    }

    async fn fetch_documents_updated_since(&self, epoch: i64) -> Result<Vec<MemoryDocument>> {
        let resource_link = self.collection_link();
        let query = serde_json::json!({
            "query": "SELECT * FROM c WHERE c.updatedAtEpoch > @since ORDER BY c.updatedAtEpoch ASC",
            "parameters": [{ "name": "@since", "value": epoch }]
        });

        let mut docs = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let (auth, date) = self.auth_headers("POST", "docs", &resource_link)?;
            let mut request = self
                .client
                .post(self.documents_url())
                .header("authorization", auth)
                .header("x-ms-date", date)
                .header("x-ms-version", API_VERSION)
                .header("content-type", "application/query+json")
                .header("x-ms-documentdb-isquery", "true")
                .header("x-ms-documentdb-query-enablecrosspartition", "true");
            if let Some(token) = &continuation {
                request = request.header("x-ms-continuation", token);
            }
            let response = request.body(query.to_string()).send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("cosmos query failed: {status} {}", truncate(&body));
            }
            continuation = response
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let page: QueryPage = response.json().await?;
            for raw in page.documents {
                match parse_document(raw) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed remote document"),
                }
            }

            if continuation.is_none() {
                break;
            }
        }
        Ok(docs)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents", default)]
    documents: Vec<serde_json::Value>,
}

/// Cosmos system properties (`_rid`, `_etag`, ...) are not part of the wire
/// contract; strip them before decoding.
fn parse_document(mut raw: serde_json::Value) -> Result<MemoryDocument> {
    if let Some(map) = raw.as_object_mut() {
        map.retain(|key, _| !key.starts_with('_'));
    }
    Ok(serde_json::from_value(raw)?)
}

async fn ensure_success_or_conflict(op: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() || status == reqwest::StatusCode::CONFLICT {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    bail!("cosmos {op} failed: {status} {}", truncate(&body))
}

fn truncate(body: &str) -> &str {
    body.get(..500).unwrap_or(body)
}
