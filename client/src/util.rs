use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TOKEN_ENV: &str = "SHULE_API_TOKEN";

#[derive(Debug, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub api_url: String,
    pub access_token: String,
    pub saved_at: DateTime<Utc>,
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn config_path() -> std::path::PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("shule");
    config_dir.join("config.json")
}

pub fn load_credentials() -> Option<StoredCredentials> {
    let path = config_path();
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_credentials(creds: &StoredCredentials) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(creds)?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

/// Token for `api_url`: `SHULE_API_TOKEN` first, then stored credentials
/// saved for the same API.
pub fn resolve_token(api_url: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    if let Some(creds) = load_credentials() {
        if same_api(&creds.api_url, api_url) {
            return Ok(creds.access_token);
        }
        return Err(format!(
            "Stored credentials are for {}. Run `shule login --api-url {api_url}` or set {TOKEN_ENV}.",
            creds.api_url
        )
        .into());
    }

    Err(format!("No credentials found. Run `shule login` or set {TOKEN_ENV}.").into())
}

fn same_api(a: &str, b: &str) -> bool {
    a.trim_end_matches('/').eq_ignore_ascii_case(b.trim_end_matches('/'))
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lives_under_shule() {
        let path = config_path();
        assert!(path.ends_with("shule/config.json"));
    }

    #[test]
    fn api_urls_compare_without_trailing_slash() {
        assert!(same_api("https://school.example/", "https://school.example"));
        assert!(!same_api("https://a.example", "https://b.example"));
    }
}
