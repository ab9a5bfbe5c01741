//! `SchoolBackend` over the school console's REST API.

pub mod util;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use url::Url;

use shule_core::backend::{ArrearsCampaign, SchoolBackend};
use shule_core::error::BackendError;
use shule_core::policy::{Identity, Role};
use shule_core::resource::{ResourceKind, record_id};

pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpBackend {
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(api_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: util::client(),
            base,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::Transport(format!("invalid url for {path}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%method, %url, "school api request");
        Ok(self.http.request(method, url).bearer_auth(&self.token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => return Err(BackendError::Decode(e.to_string())),
            }
        };

        if status.is_success() {
            Ok(body)
        } else {
            let message = error_detail(&body, status);
            tracing::warn!(status = status.as_u16(), %message, "school api error");
            Err(BackendError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Whether the API answers at all. Any HTTP status counts as reachable.
    pub async fn ping(&self) -> Result<u16, BackendError> {
        let response = self
            .http
            .get(self.base.clone())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Best human-readable error from a failed response body: `detail`, then
/// `message`, then `error`, then the first field error.
pub fn error_detail(body: &Value, status: StatusCode) -> String {
    let text = |value: &Value| -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Array(items) => items.iter().find_map(|item| item.as_str().map(str::to_string)),
            _ => None,
        }
    };

    if let Value::Object(map) = body {
        for key in ["detail", "message", "error"] {
            if let Some(message) = map.get(key).and_then(text) {
                return message;
            }
        }
        if let Some((field, message)) = map
            .iter()
            .find_map(|(field, value)| text(value).map(|message| (field, message)))
        {
            return format!("{field}: {message}");
        }
    }
    if let Value::String(s) = body {
        let s = s.trim();
        if !s.is_empty() && s.len() <= 200 && !s.starts_with('<') {
            return s.to_string();
        }
    }
    format!("request failed with status {}", status.as_u16())
}

/// Accept both a bare array and a paginated `{results: [...]}` page.
pub fn unwrap_list(body: Value) -> Result<Vec<Value>, BackendError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(BackendError::Decode("expected a list of records".to_string())),
        },
        _ => Err(BackendError::Decode("expected a list of records".to_string())),
    }
}

/// Identity from `/api/auth/me/`.
pub fn identity_from(body: &Value) -> Result<Identity, BackendError> {
    let id = record_id(body).ok_or_else(|| BackendError::Decode("identity has no id".to_string()))?;
    let field = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let full_name = [field("first_name"), field("last_name")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let display_name = if full_name.is_empty() {
        field("username").unwrap_or_default().to_string()
    } else {
        full_name
    };
    let role = field("role")
        .and_then(|role| role.parse::<Role>().ok())
        .unwrap_or_default();
    let flag = |key: &str| body.get(key).and_then(Value::as_bool).unwrap_or(false);
    Ok(Identity {
        id,
        display_name,
        role,
        is_staff: flag("is_staff"),
        is_superuser: flag("is_superuser"),
    })
}

#[async_trait]
impl SchoolBackend for HttpBackend {
    async fn current_identity(&self) -> Result<Identity, BackendError> {
        let body = self.send(self.request(Method::GET, "api/auth/me/")?).await?;
        identity_from(&body)
    }

    async fn query(
        &self,
        kind: ResourceKind,
        search: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let mut request = self.request(Method::GET, &format!("api/{}/", kind.collection()))?;
        if let Some(q) = search.map(str::trim).filter(|q| !q.is_empty()) {
            request = request.query(&[("search", q)]);
        }
        unwrap_list(self.send(request).await?)
    }

    async fn create(&self, kind: ResourceKind, body: &Value) -> Result<Value, BackendError> {
        let request = self
            .request(Method::POST, &format!("api/{}/", kind.collection()))?
            .json(body);
        self.send(request).await
    }

    async fn delete(&self, kind: ResourceKind, id: u64) -> Result<(), BackendError> {
        let request = self.request(Method::DELETE, &format!("api/{}/{id}/", kind.collection()))?;
        self.send(request).await.map(|_| ())
    }

    async fn publish_exam(&self, id: u64) -> Result<(), BackendError> {
        let request = self.request(Method::POST, &format!("api/exams/{id}/publish/"))?;
        self.send(request).await.map(|_| ())
    }

    async fn create_campaign(&self, campaign: &ArrearsCampaign) -> Result<u64, BackendError> {
        let request = self
            .request(Method::POST, "api/finance/arrears-campaigns/")?
            .json(campaign);
        let body = self.send(request).await?;
        record_id(&body).ok_or_else(|| BackendError::Decode("campaign response has no id".to_string()))
    }

    async fn send_campaign(&self, id: u64) -> Result<Value, BackendError> {
        let request = self.request(Method::POST, &format!("api/finance/arrears-campaigns/{id}/send/"))?;
        self.send(request).await
    }
}
