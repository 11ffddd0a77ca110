
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{FailureKind, StoreClient, StoreError, StoredObject};
use crate::config::{AwsCredentials, Config, StoreConfig};
use crate::schema::CollectionDef;

const AUTHORIZATION_HEADER: &str = "Authorization";
const AWS_ACCESS_KEY_HEADER: &str = "X-AWS-Access-Key";
const AWS_SECRET_KEY_HEADER: &str = "X-AWS-Secret-Key";
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Blocking REST client for a Weaviate instance.
///
/// The client never retries on its own. Each failure is classified into a
/// [`FailureKind`] and the upload pipeline decides what deserves another
/// attempt.
#[derive(Clone)]
pub struct WeaviateClient {
    base_url: Url,
    agent: ureq::Agent,
    headers: Vec<(&'static str, String)>,
}

impl fmt::Debug for WeaviateClient {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<&str> = self.headers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("WeaviateClient")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &headers)
            .finish_non_exhaustive()
    }
}

/// Status and body of a completed HTTP exchange.
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_success(self) -> Result<String, StoreError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(status_error(self.status, &self.body))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(default)]
    classes: Vec<ClassSummary>,
}

#[derive(Debug, Deserialize)]
struct ClassSummary {
    class: String,
    #[serde(default)]
    properties: Vec<PropertySummary>,
}

#[derive(Debug, Deserialize)]
struct PropertySummary {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    id: Uuid,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<MessageEntry>,
}

#[derive(Debug, Deserialize)]
struct MessageEntry {
    message: String,
}

impl WeaviateClient {
    #[inline]
    pub fn new(store: &StoreConfig) -> Result<Self> {
        let base_url = store
            .url()
            .context("Failed to generate Weaviate URL from config")?;

        let client = Self {
            base_url,
            agent: build_agent(store.timeout()),
            headers: Vec::new(),
        };

        Ok(match &store.api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        })
    }

    /// Client for the configured store, forwarding AWS credentials when
    /// they were provided.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Self::new(&config.store)?;
        Ok(match &config.credentials {
            Some(credentials) => client.with_aws_credentials(credentials),
            None => client,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.set_header(AUTHORIZATION_HEADER, format!("Bearer {api_key}"));
        self
    }

    #[inline]
    pub fn with_aws_credentials(mut self, credentials: &AwsCredentials) -> Self {
        self.set_header(AWS_ACCESS_KEY_HEADER, credentials.access_key_id.clone());
        self.set_header(AWS_SECRET_KEY_HEADER, credentials.secret_access_key.clone());
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn set_header(&mut self, name: &'static str, value: String) {
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value));
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url.join(path).map_err(|e| {
            StoreError::new(FailureKind::Client, format!("Invalid endpoint '{path}': {e}"))
        })
    }

    fn authorize<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(*name, value.as_str());
        }
        request
    }

    fn get(&self, url: &Url) -> Result<Reply, StoreError> {
        debug!("GET {}", url);
        read_reply(self.authorize(self.agent.get(url.as_str())).call())
    }

    fn delete(&self, url: &Url) -> Result<Reply, StoreError> {
        debug!("DELETE {}", url);
        read_reply(self.authorize(self.agent.delete(url.as_str())).call())
    }

    fn post_json(&self, url: &Url, body: &Value) -> Result<Reply, StoreError> {
        debug!("POST {}", url);
        let payload = serde_json::to_string(body)
            .map_err(|e| StoreError::decode(format!("Failed to serialize request: {e}")))?;
        read_reply(
            self.authorize(self.agent.post(url.as_str()))
                .header("Content-Type", "application/json")
                .send(&payload),
        )
    }

    fn graphql(&self, query: &str) -> Result<Value, StoreError> {
        let url = self.endpoint("v1/graphql")?;
        let body = self.post_json(&url, &json!({ "query": query }))?.into_success()?;
        parse_graphql(&body)
    }

    /// Names of the properties stored in `collection`, used to build
    /// selection sets.
    fn property_names(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let url = self.endpoint(&format!("v1/schema/{collection}"))?;
        let body = self.get(&url)?.into_success()?;
        let class: ClassSummary = serde_json::from_str(&body)
            .map_err(|e| StoreError::decode(format!("Failed to parse class '{collection}': {e}")))?;
        Ok(class.properties.into_iter().map(|p| p.name).collect())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn read_reply(
    response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<Reply, StoreError> {
    let mut response = response.map_err(|e| classify(&e))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| classify(&e))?;
    Ok(Reply { status, body })
}

/// Map a transport failure onto a [`FailureKind`].
#[inline]
pub fn classify(error: &ureq::Error) -> StoreError {
    let failure = match error {
        ureq::Error::Timeout(_) => StoreError::timeout(error.to_string()),
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            StoreError::timeout(error.to_string())
        }
        ureq::Error::StatusCode(status) => status_error(*status, ""),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound | ureq::Error::Io(_) => {
            StoreError::connection(error.to_string())
        }
        _ => StoreError::connection(error.to_string()),
    };
    warn!("Store request failed: {}", failure);
    failure
}

/// Classify a non-success HTTP status, using the response body for the
/// message when it has one.
#[inline]
pub fn status_error(status: u16, body: &str) -> StoreError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    let kind = if status == 408 || status == 504 || mentions_timeout(&message) {
        FailureKind::Timeout
    } else if status >= 500 {
        FailureKind::Server
    } else {
        FailureKind::Client
    };
    StoreError::new(kind, message).with_status(status)
}

/// Pull a readable message out of an error body. Weaviate answers with
/// `{"error":[{"message":..}]}` or `{"message":..}`.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed).ok().and_then(|value| {
        let listed: Vec<&str> = value
            .get("error")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if listed.is_empty() {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            Some(listed.join("; "))
        }
    });

    Some(from_json.unwrap_or_else(|| trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()))
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["timeout", "timed out", "deadline exceeded"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Check the per-object results of a batch write. A batch call can succeed
/// at the HTTP level while the object itself was refused.
#[inline]
pub fn parse_batch_result(body: &str) -> Result<(), StoreError> {
    let results: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| StoreError::decode(format!("Failed to parse batch response: {e}")))?;

    let messages: Vec<String> = results
        .iter()
        .filter_map(|entry| entry.pointer("/result/errors/error").and_then(Value::as_array))
        .flatten()
        .filter_map(|error| error.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    if messages.is_empty() {
        return Ok(());
    }

    let message = messages.join("; ");
    if mentions_timeout(&message) {
        Err(StoreError::timeout(message))
    } else {
        Err(StoreError::rejected(message))
    }
}

/// Check a GraphQL response and return its `data` member.
#[inline]
pub fn parse_graphql(body: &str) -> Result<Value, StoreError> {
    let response: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| StoreError::decode(format!("Failed to parse GraphQL response: {e}")))?;

    if !response.errors.is_empty() {
        let message = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(if mentions_timeout(&message) {
            StoreError::timeout(message)
        } else {
            StoreError::rejected(message)
        });
    }

    response
        .data
        .ok_or_else(|| StoreError::decode("GraphQL response has no data"))
}

/// Build the similarity query for `collection`. The query text is embedded
/// as a JSON string literal, which GraphQL accepts unchanged.
#[inline]
pub fn near_text_query(collection: &str, properties: &[String], query: &str, limit: usize) -> String {
    let concept = Value::String(query.to_string());
    format!(
        "{{ Get {{ {collection}(nearText: {{concepts: [{concept}]}}, limit: {limit}) {{ {} _additional {{ id distance }} }} }} }}",
        properties.join(" ")
    )
}

#[inline]
pub fn count_query(collection: &str) -> String {
    format!("{{ Aggregate {{ {collection} {{ meta {{ count }} }} }} }}")
}

/// Objects of a `Get` result, with the `_additional` block turned into
/// identifier and distance.
#[inline]
pub fn parse_get_objects(data: &Value, collection: &str) -> Result<Vec<StoredObject>, StoreError> {
    let Some(items) = data.pointer(&format!("/Get/{collection}")) else {
        return Err(StoreError::decode(format!(
            "GraphQL response has no results for '{collection}'"
        )));
    };

    let items = match items {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => {
            return Err(StoreError::decode(format!(
                "Results for '{collection}' are not a list"
            )));
        }
    };

    items
        .iter()
        .map(|item| {
            let mut properties = item
                .as_object()
                .cloned()
                .ok_or_else(|| StoreError::decode("Result entry is not an object"))?;
            let additional = properties.remove("_additional").unwrap_or(Value::Null);

            let id = additional
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| Uuid::parse_str(id).ok())
                .ok_or_else(|| StoreError::decode("Result entry has no valid id"))?;
            let distance = additional
                .get("distance")
                .and_then(Value::as_f64)
                .map(|d| d as f32);

            properties.retain(|_, value| !value.is_null());

            Ok(StoredObject {
                id,
                properties,
                distance,
            })
        })
        .collect()
}

/// Object count from an `Aggregate` result.
#[inline]
pub fn parse_count(data: &Value, collection: &str) -> Result<u64, StoreError> {
    data.pointer(&format!("/Aggregate/{collection}/0/meta/count"))
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::decode(format!("No count returned for '{collection}'")))
}

impl StoreClient for WeaviateClient {
    #[inline]
    fn ready(&self) -> Result<(), StoreError> {
        let url = self.endpoint("v1/.well-known/ready")?;
        self.get(&url)?.into_success().map(|_| ())
    }

    #[inline]
    fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        let url = self.endpoint(&format!("v1/schema/{collection}"))?;
        let reply = self.get(&url)?;
        if reply.status == 404 {
            return Ok(false);
        }
        reply.into_success().map(|_| true)
    }

    #[inline]
    fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &Map<String, Value>,
    ) -> Result<Uuid, StoreError> {
        let url = self.endpoint("v1/batch/objects")?;
        let body = json!({
            "objects": [{
                "class": collection,
                "id": id,
                "properties": properties,
            }]
        });

        let response = self.post_json(&url, &body)?.into_success()?;
        parse_batch_result(&response)?;
        debug!("Stored {} in {}", id, collection);
        Ok(id)
    }

    #[inline]
    fn fetch_by_query(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let properties = self.property_names(collection)?;
        let data = self.graphql(&near_text_query(collection, &properties, query, limit))?;
        parse_get_objects(&data, collection)
    }

    #[inline]
    fn count_all(&self, collection: &str) -> Result<u64, StoreError> {
        let data = self.graphql(&count_query(collection))?;
        parse_count(&data, collection)
    }

    #[inline]
    fn fetch_objects(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let mut url = self.endpoint("v1/objects")?;
        url.query_pairs_mut()
            .append_pair("class", collection)
            .append_pair("limit", &limit.to_string());

        let body = self.get(&url)?.into_success()?;
        let response: ObjectsResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::decode(format!("Failed to parse objects: {e}")))?;

        Ok(response
            .objects
            .into_iter()
            .map(|entry| StoredObject {
                id: entry.id,
                properties: entry.properties,
                distance: None,
            })
            .collect())
    }

    #[inline]
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let url = self.endpoint("v1/schema")?;
        let body = self.get(&url)?.into_success()?;
        let schema: SchemaResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::decode(format!("Failed to parse schema: {e}")))?;
        Ok(schema.classes.into_iter().map(|c| c.class).collect())
    }

    #[inline]
    fn create_collection(&self, definition: &CollectionDef) -> Result<(), StoreError> {
        let url = self.endpoint("v1/schema")?;
        self.post_json(&url, &definition.to_store_class())?
            .into_success()?;
        debug!("Created collection {}", definition.name);
        Ok(())
    }

    #[inline]
    fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&format!("v1/schema/{collection}"))?;
        let reply = self.delete(&url)?;
        if reply.status == 404 {
            return Ok(());
        }
        reply.into_success().map(|_| ())
    }

    #[inline]
    fn delete_object(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let url = self.endpoint(&format!("v1/objects/{collection}/{id}"))?;
        let reply = self.delete(&url)?;
        if reply.status == 404 {
            return Ok(());
        }
        reply.into_success().map(|_| ())
    }
}
