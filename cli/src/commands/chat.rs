use tokio::io::{AsyncBufReadExt, BufReader};

use shule_core::{DialogSession, Navigation, Reply};

use crate::util::{EXIT_OK, EXIT_USAGE, Phrasing, open_session, report_error};

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Empty,
    Quit,
    Submit,
    Cancel,
    Field { key: &'a str, value: &'a str },
    Turn(&'a str),
    Invalid(&'static str),
}

fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Line::Turn(line);
    };
    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Line::Quit,
        "submit" => Line::Submit,
        "cancel" => Line::Cancel,
        "field" => match rest.trim().split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Line::Field {
                key: key.trim(),
                value: value.trim(),
            },
            _ => Line::Invalid("usage: /field key=value"),
        },
        _ => Line::Invalid("commands: /field key=value, /submit, /cancel, /quit"),
    }
}

fn render(reply: &Reply) -> String {
    let mut out = format!("shule> {}", reply.message.text);
    if !reply.message.suggestions.is_empty() {
        let chips: Vec<String> = reply
            .message
            .suggestions
            .iter()
            .map(|chip| format!("[{}]", chip.label))
            .collect();
        out.push('\n');
        out.push_str(&chips.join(" "));
    }
    match &reply.navigation {
        Some(Navigation::To { path }) => out.push_str(&format!("\n→ {path}")),
        Some(Navigation::Back) => out.push_str("\n← back"),
        None => {}
    }
    out
}

async fn handle(session: &mut DialogSession, line: Line<'_>) -> Option<String> {
    let reply = match line {
        Line::Empty | Line::Quit => return None,
        Line::Invalid(usage) => return Some(usage.to_string()),
        Line::Turn(text) => Ok(session.submit_turn(text).await),
        Line::Submit => session.submit_flow_now().await,
        Line::Cancel => session.cancel_flow(),
        Line::Field { key, value } => {
            return Some(match session.submit_flow_field(key, value) {
                Ok(()) => match session.active_flow() {
                    Some(flow) => format!("{key} set. {}", flow.summary()),
                    None => format!("{key} set."),
                },
                Err(e) => e.to_string(),
            });
        }
    };
    Some(match reply {
        Ok(reply) => render(&reply),
        Err(e) => e.to_string(),
    })
}

pub async fn run(api_url: &str, phrasing: Phrasing) -> i32 {
    let mut session = match open_session(api_url, phrasing).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    println!(
        "Signed in as {} ({}). Type \"help\" for ideas, /quit to leave.",
        session.identity().display_name,
        session.identity().role
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                return report_error("cli_error", &format!("Failed to read stdin: {e}"), None, EXIT_USAGE);
            }
        };
        let parsed = parse_line(&line);
        if parsed == Line::Quit {
            break;
        }
        if let Some(output) = handle(&mut session, parsed).await {
            println!("{output}");
        }
    }
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use shule_core::{Chip, Message, TurnStatus};

    #[test]
    fn slash_commands_map_to_flow_operations() {
        assert_eq!(parse_line("  "), Line::Empty);
        assert_eq!(parse_line("/quit"), Line::Quit);
        assert_eq!(parse_line("/submit"), Line::Submit);
        assert_eq!(parse_line("/cancel"), Line::Cancel);
        assert_eq!(
            parse_line("/field date = 2025-03-10"),
            Line::Field { key: "date", value: "2025-03-10" }
        );
        assert!(matches!(parse_line("/field date"), Line::Invalid(_)));
        assert!(matches!(parse_line("/dance"), Line::Invalid(_)));
        assert_eq!(parse_line("open fees"), Line::Turn("open fees"));
    }

    #[test]
    fn replies_show_chips_and_navigation() {
        let reply = Reply {
            status: TurnStatus::Ok,
            message: Message::assistant("Opening fees.", vec![Chip::new("fee reminders")]),
            navigation: Some(Navigation::To { path: "/finance/fees".to_string() }),
            flow: None,
        };
        assert_eq!(render(&reply), "shule> Opening fees.\n[fee reminders]\n→ /finance/fees");
    }
}
