use chrono::Utc;
use serde_json::json;

use shule_client::util::{StoredCredentials, config_path, save_credentials};

use crate::util::{EXIT_OK, EXIT_USAGE, print_json, report_error};

pub fn run(api_url: &str, token: &str) -> i32 {
    let token = token.trim();
    if token.is_empty() {
        return report_error("cli_error", "Token must not be empty.", None, EXIT_USAGE);
    }

    let creds = StoredCredentials {
        api_url: api_url.trim_end_matches('/').to_string(),
        access_token: token.to_string(),
        saved_at: Utc::now(),
    };
    if let Err(e) = save_credentials(&creds) {
        return report_error("cli_error", &format!("Failed to save credentials: {e}"), None, EXIT_USAGE);
    }

    print_json(&json!({
        "status": "saved",
        "api_url": creds.api_url,
        "config_path": config_path().display().to_string(),
    }));
    EXIT_OK
}
