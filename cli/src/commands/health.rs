use serde_json::json;

use shule_client::HttpBackend;

use crate::util::{EXIT_OK, EXIT_USAGE, print_json, report_backend_error, report_error};

pub async fn run(api_url: &str) -> i32 {
    let backend = match HttpBackend::new(api_url, "") {
        Ok(backend) => backend,
        Err(e) => {
            return report_error("cli_error", &format!("Invalid API URL '{api_url}': {e}"), None, EXIT_USAGE);
        }
    };

    match backend.ping().await {
        Ok(status) => {
            print_json(&json!({
                "status": "reachable",
                "api_url": backend.base_url(),
                "http_status": status,
            }));
            EXIT_OK
        }
        Err(e) => report_backend_error(&e),
    }
}
