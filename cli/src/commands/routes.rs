use serde_json::{Value, json};

use shule_core::policy::{Identity, Role, can_access};
use shule_core::routes::{MAX_SUGGESTIONS, ROUTES, Resolution, resolve, suggest};

use crate::util::{EXIT_OK, EXIT_USAGE, print_json, report_error};

fn registry(identity: &Identity) -> Value {
    let entries: Vec<Value> = ROUTES
        .iter()
        .map(|entry| {
            json!({
                "key": entry.key,
                "path": entry.path,
                "allowed": can_access(identity, entry.path),
            })
        })
        .collect();
    json!({"role": identity.role, "routes": entries})
}

fn resolution(target: &str, identity: &Identity) -> Value {
    let outcome = match resolve(target, identity) {
        Resolution::Resolved(entry) => json!({"outcome": "resolved", "key": entry.key, "path": entry.path}),
        Resolution::Denied(entry) => json!({"outcome": "denied", "key": entry.key, "path": entry.path}),
        Resolution::Suggestions(suggestions) => json!({"outcome": "suggestions", "suggestions": suggestions}),
    };
    let mut ranking = suggest(target, identity);
    ranking.truncate(MAX_SUGGESTIONS);
    json!({
        "target": target,
        "role": identity.role,
        "resolution": outcome,
        "ranking": ranking,
    })
}

pub fn run(role: &str, target: &str) -> i32 {
    let role: Role = match role.parse() {
        Ok(role) => role,
        Err(message) => return report_error("cli_error", &message, None, EXIT_USAGE),
    };
    let identity = Identity::with_role(role);

    if target.trim().is_empty() {
        print_json(&registry(&identity));
    } else {
        print_json(&resolution(target, &identity));
    }
    EXIT_OK
}
