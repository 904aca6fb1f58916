/// HTTP record store client.
///
/// Talks to a generic REST record API:
///   GET    {base}/collections/{c}/records?field=value  -> list
///   GET    {base}/collections/{c}/records/{id}         -> one record
///   POST   {base}/collections/{c}/records              -> create
///   PATCH  {base}/collections/{c}/records/{id}         -> partial update
///   DELETE {base}/collections/{c}/records/{id}         -> delete
use async_trait::async_trait;
use funnel_core::storage::{Collection, Filter, RemoteStore, StorageError};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn records_url(&self, collection: Collection) -> String {
        format!("{}/collections/{}/records", self.base_url, collection)
    }

    fn record_url(&self, collection: Collection, id: &str) -> String {
        format!(
            "{}/{}",
            self.records_url(collection),
            utf8_percent_encode(id, NON_ALPHANUMERIC)
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        builder
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }
}

/// Query string for a filter; empty when it has no clauses.
fn query_string(filter: &Filter) -> String {
    let pairs: Vec<String> = filter
        .clauses()
        .iter()
        .map(|(field, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                utf8_percent_encode(field, NON_ALPHANUMERIC),
                utf8_percent_encode(&value, NON_ALPHANUMERIC)
            )
        })
        .collect();
    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

/// Turn a non-success response into `Rejected`.
async fn check(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn body_json(response: Response) -> Result<Value, StorageError> {
    let text = response
        .text()
        .await
        .map_err(|e| StorageError::Transport(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Lists come back either bare or wrapped as `{"items": [...]}`.
fn list_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items").or_else(|| map.remove("records")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, StorageError> {
        let url = format!("{}{}", self.records_url(collection), query_string(filter));
        let response = check(self.send(self.request(Method::GET, url)).await?).await?;
        Ok(list_items(body_json(response).await?))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        let response = self
            .send(self.request(Method::GET, self.record_url(collection, id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = body_json(check(response).await?).await?;
        Ok(Some(body).filter(|v| !v.is_null()))
    }

    async fn create(&self, collection: Collection, record: Value) -> Result<Value, StorageError> {
        let builder = self
            .request(Method::POST, self.records_url(collection))
            .json(&record);
        let response = check(self.send(builder).await?).await?;
        match body_json(response).await? {
            Value::Null => Ok(record),
            stored => Ok(stored),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let builder = self
            .request(Method::PATCH, self.record_url(collection, id))
            .json(&fields);
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        check(response).await.map(|_| ())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        let response = self
            .send(self.request(Method::DELETE, self.record_url(collection, id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        check(response).await.map(|_| ())
    }
}
