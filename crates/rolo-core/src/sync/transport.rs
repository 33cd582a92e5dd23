//! HTTP transport for the sync layer.
//!
//! The queue and the reconciler talk to the server through the
//! [`SyncTransport`] trait so they can be exercised with scripted fakes;
//! [`HttpTransport`] is the real implementation over `reqwest`.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::HttpMethod;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Server endpoints consumed by this layer
pub mod endpoints {
    pub const CONTACTS: &str = "/contacts";
    pub const COMPANIES: &str = "/companies";
    pub const CONTACTS_UPSERT: &str = "/contacts/upsert";
    pub const COMPANIES_UPSERT: &str = "/companies/upsert";
    pub const MERGE_HISTORY: &str = "/merge-history";
}

/// Server wire shape for a contact.
///
/// The server keys rows by an internal numeric id alongside the public
/// canonical id; the client merges on the canonical id only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContact {
    /// Database-internal row id, never used as a merge key
    #[serde(default)]
    pub id: Option<i64>,
    /// Public canonical identifier (UUID)
    pub contact_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Server wire shape for a company
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCompany {
    #[serde(default)]
    pub id: Option<i64>,
    /// Public canonical identifier (UUID)
    pub company_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Seam between the sync layer and the server
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    /// Replay a queued mutation verbatim
    async fn send(&self, method: HttpMethod, endpoint: &str, payload: &serde_json::Value)
        -> Result<()>;

    /// Fetch the server's view of all contacts
    async fn fetch_contacts(&self) -> Result<Vec<RemoteContact>>;

    /// Fetch the server's view of all companies
    async fn fetch_companies(&self) -> Result<Vec<RemoteCompany>>;

    /// Cheap connectivity probe used by the auto-drain triggers
    async fn is_online(&self) -> bool;
}

/// `reqwest` implementation of [`SyncTransport`]
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            auth_token: normalize_text_option(auth_token),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn request(&self, method: HttpMethod, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{endpoint}", self.base_url);
        let builder = match method {
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(format!("{}{endpoint}", self.base_url));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl SyncTransport for HttpTransport {
    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let response = self.request(method, endpoint).json(payload).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<RemoteContact>> {
        let response = self.get(endpoints::CONTACTS).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch_companies(&self) -> Result<Vec<RemoteCompany>> {
        let response = self.get(endpoints::COMPANIES).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn is_online(&self) -> bool {
        // Any response counts as connectivity; only a transport-level
        // failure counts as offline.
        self.client.head(&self.base_url).send().await.is_ok()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let status = reqwest::StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(
            parse_api_error(status, r#"{"message":"boom"}"#),
            "boom (500)"
        );
        assert_eq!(parse_api_error(status, ""), "HTTP 500");
        assert_eq!(parse_api_error(status, "  plain text "), "plain text (500)");
    }

    #[test]
    fn remote_contact_parses_camel_case() {
        let json = r#"{"id": 42, "contactId": "0192c7a4-7b67-7f10-8c9e-0a1b2c3d4e5f",
                       "name": "Ada", "companyId": null}"#;
        let remote: RemoteContact = serde_json::from_str(json).unwrap();
        assert_eq!(remote.id, Some(42));
        assert_eq!(remote.name.as_deref(), Some("Ada"));
        assert!(remote.company_id.is_none());
    }
}
