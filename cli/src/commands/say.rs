use serde_json::json;

use crate::util::{EXIT_OK, Phrasing, open_session, print_json};

/// Run `turns` in one session and print what was said, plus any form left open.
pub async fn run(api_url: &str, phrasing: Phrasing, turns: &[String]) -> i32 {
    let mut session = match open_session(api_url, phrasing).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    let mut statuses = Vec::with_capacity(turns.len());
    for turn in turns {
        let reply = session.submit_turn(turn).await;
        statuses.push(reply.status);
    }

    print_json(&json!({
        "identity": session.identity(),
        "transcript": session.transcript(),
        "statuses": statuses,
        "flow": session.active_flow(),
    }));
    EXIT_OK
}
