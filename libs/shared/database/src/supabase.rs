use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Classified PostgREST failure. Carried inside the `anyhow::Error`
/// returned by [`SupabaseClient`] so callers can downcast when the class
/// matters (e.g. retrying a unique-constraint conflict).
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl DatabaseError {
    fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => DatabaseError::Auth(body),
            404 => DatabaseError::NotFound(body),
            409 => DatabaseError::Conflict(body),
            code => DatabaseError::Api { status: code, message: body },
        }
    }
}

/// True when `err` is a unique/foreign-key conflict reported by the store.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<DatabaseError>(), Some(DatabaseError::Conflict(_)))
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, prefer: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_str(prefer)?);
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth_token, prefer)?;

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| DatabaseError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);
            return Err(DatabaseError::from_status(status, error_text).into());
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_prefer(method, path, auth_token, body, None).await
    }

    /// Same as [`request`](Self::request) with a PostgREST `Prefer` header,
    /// e.g. `return=representation` to get inserted rows back.
    pub async fn request_with_prefer<T>(&self, method: Method, path: &str,
                                        auth_token: Option<&str>, body: Option<Value>,
                                        prefer: Option<&str>)
                                        -> Result<T>
    where T: DeserializeOwned {
        let response = self.send(method, path, auth_token, body, prefer).await?;
        let data = response
            .json::<T>()
            .await
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        Ok(data)
    }

    /// Fire a request whose response body is irrelevant (PATCH/DELETE with
    /// `return=minimal`).
    pub async fn execute(&self, method: Method, path: &str,
                         auth_token: Option<&str>, body: Option<Value>)
                         -> Result<()> {
        self.send(method, path, auth_token, body, Some("return=minimal")).await?;
        Ok(())
    }

    /// Insert one row into `table` and return the stored representation.
    pub async fn insert_returning<T>(&self, table: &str, row: Value, auth_token: &str) -> Result<T>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/{}", table);
        let mut rows: Vec<T> = self.request_with_prefer(
            Method::POST,
            &path,
            Some(auth_token),
            Some(Value::Array(vec![row])),
            Some("return=representation"),
        ).await?;

        if rows.is_empty() {
            return Err(anyhow!(DatabaseError::Decode(format!("insert into {} returned no rows", table))));
        }

        Ok(rows.swap_remove(0))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }
}
