//! Runtime configuration, resolved from the environment.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_URL: &str = "ROLO_API_URL";
pub const ENV_AUTH_TOKEN: &str = "ROLO_AUTH_TOKEN";
pub const ENV_USER_ID: &str = "ROLO_USER_ID";
pub const ENV_DB_PATH: &str = "ROLO_DB_PATH";

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server base URL, scheme included, no trailing slash
    pub api_base_url: String,
    /// Bearer token attached to every request when present
    pub auth_token: Option<String>,
    /// User scoping the per-user migration flag
    pub user_id: String,
    /// Explicit database location; the caller picks a default when unset
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Build from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = normalize_text_option(lookup(ENV_API_URL))
            .ok_or_else(|| Error::InvalidInput(format!("{ENV_API_URL} is not set")))?;
        if !is_http_url(&api_base_url) {
            return Err(Error::InvalidInput(format!(
                "{ENV_API_URL} must include http:// or https://"
            )));
        }

        let user_id = normalize_text_option(lookup(ENV_USER_ID))
            .ok_or_else(|| Error::InvalidInput(format!("{ENV_USER_ID} is not set")))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(lookup(ENV_AUTH_TOKEN)),
            user_id,
            db_path: normalize_text_option(lookup(ENV_DB_PATH)).map(PathBuf::from),
        })
    }
}
