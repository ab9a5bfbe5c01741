use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

use shule_client::HttpBackend;
use shule_client::util::resolve_token;
use shule_core::BackendError;
use shule_core::DialogSession;
use shule_core::phrases::{FixedPhrases, VariedPhrases};

/// Exit codes: 0=success, 1=usage or validation error, 3=connection error
pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_CONNECTION: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phrasing {
    Fixed,
    Varied,
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

/// Print a structured error on stderr and hand back the exit code.
pub fn report_error(kind: &str, message: &str, docs_hint: Option<&str>, code: i32) -> i32 {
    let mut err = json!({"error": kind, "message": message});
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    code
}

pub fn report_backend_error(err: &BackendError) -> i32 {
    match err {
        BackendError::Transport(_) => report_error(
            "connection_error",
            &err.user_message(),
            Some("Is the school API running? Check SHULE_API_URL."),
            EXIT_CONNECTION,
        ),
        BackendError::Http { status: 401 | 403, .. } => report_error(
            "auth_error",
            &err.user_message(),
            Some("Run `shule login --token <token>` or set SHULE_API_TOKEN."),
            EXIT_USAGE,
        ),
        _ => report_error("api_error", &err.user_message(), None, EXIT_USAGE),
    }
}

/// Sign in to the school API and start a dialog session for that user.
pub async fn open_session(api_url: &str, phrasing: Phrasing) -> Result<DialogSession, i32> {
    let token = resolve_token(api_url)
        .map_err(|e| report_error("auth_error", &e.to_string(), None, EXIT_USAGE))?;
    let backend = HttpBackend::new(api_url, token).map_err(|e| {
        report_error(
            "cli_error",
            &format!("Invalid API URL '{api_url}': {e}"),
            None,
            EXIT_USAGE,
        )
    })?;

    let session = DialogSession::connect(Arc::new(backend))
        .await
        .map_err(|e| report_backend_error(&e))?;

    Ok(match phrasing {
        Phrasing::Fixed => session.with_phrases(FixedPhrases),
        Phrasing::Varied => session.with_phrases(VariedPhrases),
    })
}
