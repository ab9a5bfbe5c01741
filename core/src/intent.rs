//! Intent grammar and the ordered classification cascade.
//!
//! Rules run from the most structural (anchored patterns) to the least
//! specific (fuzzy verb guess); the first rule that matches wins. New rules
//! are added by inserting them at the right precedence in [`structured`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::fuzzy::{LOOSE_THRESHOLD, best_fuzzy};
use crate::normalize::{GREETINGS, NormalizedInput, normalize};
use crate::resource::ResourceKind;
use crate::slots::{self, Channels};

pub const SMALL_TALK: &[&str] = &[
    "how are you",
    "how are you doing",
    "how is it going",
    "what's up",
    "whats up",
    "thanks",
    "thank you",
    "thank you so much",
    "good job",
    "nice one",
];

pub const HELP_PHRASES: &[&str] = &[
    "help",
    "what can you do",
    "what can i do",
    "what can i say",
    "how does this work",
    "how do i use this",
    "show commands",
    "commands",
    "menu",
    "options",
];

pub const BACK_PHRASES: &[&str] = &["back", "go back", "previous", "prev"];

/// First-token vocabulary for the misspelling fallback.
pub const FUZZY_VERBS: &[&str] = &[
    "open", "goto", "go", "navigate", "publish", "delete", "search", "find", "create", "add",
];

const SEND_VERBS: &[&str] = &[
    "send", "notify", "remind", "text", "sms", "email", "message", "alert",
];
const FEE_WORDS: &[&str] = &[
    "fee",
    "fees",
    "arrears",
    "balance",
    "balances",
    "owing",
    "outstanding",
    "debt",
    "debts",
];
const NOTICE_WORDS: &[&str] = &[
    "notice",
    "notices",
    "notification",
    "notifications",
    "reminder",
    "reminders",
    "alert",
    "alerts",
];
const PARENT_WORDS: &[&str] = &["parent", "parents", "guardian", "guardians"];
const SEARCH_FILLERS: &[&str] = &[
    "for", "named", "called", "all", "a", "an", "the", "with", "name",
];

static OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:open|go to|goto|navigate to)\s+(?:the\s+)?(.+)$").expect("valid open regex")
});
static ADD_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:add|create)\s+(?:(?:a|an|new)\s+)*(student|class|teacher|subject)(?:es|s)?\b")
        .expect("valid add-noun regex")
});
static FEE_BALANCE_PARENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfee\s+balances?\b.*\bparents?\b").expect("valid fee balance regex")
});
static CREATE_EXAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:add|create)\s+(?:(?:a|an|new|the)\s+)*exams?\b")
        .expect("valid create exam regex")
});
static PUBLISH_EXAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^publish\s+(?:(?:the|an?)\s+)*exams?\b").expect("valid publish exam regex")
});
static EXAM_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:add|create|publish)\s+(?:(?:a|an|new|the)\s+)*exams?\b")
        .expect("valid exam verb regex")
});
static LEADING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?(\d+)\b").expect("valid leading id regex"));
static DELETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:delete|remove)\s+(?:(?:the|a)\s+)?(student|exam|teacher|class|result)(?:es|s)?\s+#?(\d+)\b",
    )
    .expect("valid delete regex")
});

/// A classified utterance. Exactly one variant per classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Greet,
    Help,
    Back,
    Open {
        target: String,
    },
    PublishExam {
        id: Option<u64>,
        name: Option<String>,
        klass: Option<String>,
    },
    Delete {
        resource: ResourceKind,
        id: u64,
    },
    Search {
        scope: ResourceKind,
        q: String,
    },
    CreateExam {
        name: Option<String>,
        klass: Option<String>,
        date: Option<String>,
    },
    AddStudent,
    SendArrears {
        min_balance: f64,
        klass: Option<String>,
        channels: Channels,
        message: Option<String>,
    },
    Unknown {
        raw: String,
    },
    None,
}

/// Intent tag, used for the recent-intent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Greet,
    Help,
    Back,
    Open,
    PublishExam,
    Delete,
    Search,
    CreateExam,
    AddStudent,
    SendArrears,
    Unknown,
    None,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::Greet => "greet",
            IntentKind::Help => "help",
            IntentKind::Back => "back",
            IntentKind::Open => "open",
            IntentKind::PublishExam => "publish_exam",
            IntentKind::Delete => "delete",
            IntentKind::Search => "search",
            IntentKind::CreateExam => "create_exam",
            IntentKind::AddStudent => "add_student",
            IntentKind::SendArrears => "send_arrears",
            IntentKind::Unknown => "unknown",
            IntentKind::None => "none",
        }
    }
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Greet => IntentKind::Greet,
            Intent::Help => IntentKind::Help,
            Intent::Back => IntentKind::Back,
            Intent::Open { .. } => IntentKind::Open,
            Intent::PublishExam { .. } => IntentKind::PublishExam,
            Intent::Delete { .. } => IntentKind::Delete,
            Intent::Search { .. } => IntentKind::Search,
            Intent::CreateExam { .. } => IntentKind::CreateExam,
            Intent::AddStudent => IntentKind::AddStudent,
            Intent::SendArrears { .. } => IntentKind::SendArrears,
            Intent::Unknown { .. } => IntentKind::Unknown,
            Intent::None => IntentKind::None,
        }
    }
}

/// Classify one raw utterance.
pub fn classify(raw: &str) -> Intent {
    classify_normalized(raw, &normalize(raw))
}

/// Classify an already-normalized utterance. `raw` is used for slot values
/// that keep their original casing (names, messages).
pub fn classify_normalized(raw: &str, input: &NormalizedInput) -> Intent {
    let text = input.text.as_str();
    if text.is_empty() {
        return if input.greeted {
            Intent::Greet
        } else {
            Intent::None
        };
    }
    if matches_phrase_start(text, GREETINGS) || matches_phrase_start(text, SMALL_TALK) {
        return Intent::Greet;
    }
    if HELP_PHRASES
        .iter()
        .any(|phrase| contains_phrase(text, phrase))
    {
        return Intent::Help;
    }
    if BACK_PHRASES.contains(&text) {
        return Intent::Back;
    }
    if let Some(intent) = structured(text, raw) {
        return intent;
    }
    if let Some(intent) = fuzzy_fallback(text) {
        tracing::debug!(text, intent = intent.kind().as_str(), "fuzzy verb fallback matched");
        return intent;
    }
    Intent::Unknown {
        raw: raw.trim().to_string(),
    }
}

/// Whole-string match, or a leading match followed by a space.
fn matches_phrase_start(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| {
        text.strip_prefix(phrase)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

/// Word-aligned containment of a (possibly multi-word) phrase.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    let words: Vec<&str> = text.split(' ').collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Rules 5 to 12. `text` is normalized; `source` is where cased slot values are read from.
fn structured(text: &str, source: &str) -> Option<Intent> {
    if let Some(caps) = OPEN_RE.captures(text) {
        let target = caps.get(1)?.as_str().trim().to_string();
        return Some(Intent::Open { target });
    }

    if let Some(caps) = ADD_NOUN_RE.captures(text) {
        return Some(match caps.get(1)?.as_str() {
            "student" => Intent::AddStudent,
            "class" => Intent::Open {
                target: "classes".to_string(),
            },
            noun => Intent::Open {
                target: format!("{noun}s"),
            },
        });
    }

    if text == "settings" {
        return Some(Intent::Open {
            target: "settings".to_string(),
        });
    }

    if is_arrears_request(text) {
        let (body, message) = slots::split_message(source);
        return Some(Intent::SendArrears {
            min_balance: slots::min_balance(body).unwrap_or(1.0),
            klass: slots::arrears_class(body),
            channels: slots::channels(body),
            message,
        });
    }

    if CREATE_EXAM_RE.is_match(text) {
        let tail = exam_tail(source);
        return Some(Intent::CreateExam {
            name: slots::exam_name_from_tail(tail),
            klass: slots::exam_class(tail),
            date: slots::iso_date(tail),
        });
    }

    if PUBLISH_EXAM_RE.is_match(text) {
        let tail = exam_tail(source);
        if let Some(id) = LEADING_ID_RE
            .captures(tail)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            return Some(Intent::PublishExam {
                id: Some(id),
                name: None,
                klass: None,
            });
        }
        return Some(Intent::PublishExam {
            id: None,
            name: slots::exam_name_from_tail(tail),
            klass: slots::exam_class(tail),
        });
    }

    if let Some(caps) = DELETE_RE.captures(text) {
        let resource = ResourceKind::from_word(caps.get(1)?.as_str())?;
        let id = caps.get(2)?.as_str().parse().ok()?;
        return Some(Intent::Delete { resource, id });
    }

    if slots::has_word(text, &["search", "find"]) {
        return Some(search_intent(text));
    }

    None
}

fn is_arrears_request(text: &str) -> bool {
    let send = slots::has_word(text, SEND_VERBS);
    let fee = slots::has_word(text, FEE_WORDS);
    let notice = slots::has_word(text, NOTICE_WORDS);
    let parent = slots::has_word(text, PARENT_WORDS);
    (send && fee) || (fee && notice) || (send && parent && fee) || FEE_BALANCE_PARENTS_RE.is_match(text)
}

/// Text after "create exam" / "publish exam" in the cased source, or all of it.
fn exam_tail(source: &str) -> &str {
    match EXAM_VERB_RE.find(source) {
        Some(m) => &source[m.end()..],
        None => source,
    }
}

fn search_intent(text: &str) -> Intent {
    let tokens: Vec<&str> = text.split(' ').collect();
    let verb_at = tokens
        .iter()
        .position(|t| *t == "search" || *t == "find")
        .unwrap_or(0);
    let mut rest: Vec<&str> = tokens[verb_at + 1..].to_vec();

    let plural_scope = tokens
        .iter()
        .find_map(|t| ResourceKind::ALL.into_iter().find(|k| k.plural() == *t));
    let leading_scope = rest
        .iter()
        .find(|t| !SEARCH_FILLERS.contains(t))
        .and_then(|t| ResourceKind::from_word(t));
    let scope = plural_scope
        .or(leading_scope)
        .unwrap_or(ResourceKind::Student);

    let mut i = 0;
    while i + 1 < rest.len() {
        if rest[i] == "in" && ResourceKind::from_word(rest[i + 1]).is_some() {
            rest.drain(i..i + 2);
        } else {
            i += 1;
        }
    }
    while let Some(first) = rest.first() {
        if SEARCH_FILLERS.contains(first) || ResourceKind::from_word(first).is_some() {
            rest.remove(0);
        } else {
            break;
        }
    }

    Intent::Search {
        scope,
        q: rest.join(" "),
    }
}

/// Rule 13: guess the verb from a misspelled first token, rewrite the
/// utterance with the canonical words and run the structured rules again.
fn fuzzy_fallback(text: &str) -> Option<Intent> {
    let mut tokens = text.split(' ');
    let first = tokens.next()?;
    let verb = best_fuzzy(first, FUZZY_VERBS.iter().copied(), LOOSE_THRESHOLD)?.candidate;
    let rest: Vec<&str> = tokens.collect();

    let rewritten = match verb {
        "open" | "goto" | "go" | "navigate" => {
            let rest = match rest.split_first() {
                Some((&"to", tail)) => tail,
                _ => rest.as_slice(),
            };
            format!("open {}", rest.join(" "))
        }
        "publish" => {
            let (object, tail) = rest.split_first()?;
            best_fuzzy(object, ["exam", "exams"], LOOSE_THRESHOLD)?;
            format!("publish exam {}", tail.join(" "))
        }
        "delete" => {
            let (object, tail) = rest.split_first()?;
            let noun = guess_noun(object, &["student", "exam", "teacher", "class", "result"])?;
            format!("delete {noun} {}", tail.join(" "))
        }
        "create" | "add" => {
            let (object, tail) = rest.split_first()?;
            let noun = guess_noun(object, &["student", "class", "teacher", "subject", "exam"])?;
            format!("{verb} {noun} {}", tail.join(" "))
        }
        _ => format!("{verb} {}", rest.join(" ")),
    };

    let rewritten = rewritten.trim();
    structured(rewritten, rewritten)
}

/// Fuzzy-match an object noun against singular and plural forms, returning the singular.
fn guess_noun(word: &str, nouns: &[&'static str]) -> Option<&'static str> {
    let forms: Vec<(String, &'static str)> = nouns
        .iter()
        .flat_map(|noun| {
            let plural = if *noun == "class" {
                "classes".to_string()
            } else {
                format!("{noun}s")
            };
            [(noun.to_string(), *noun), (plural, *noun)]
        })
        .collect();
    let hit = best_fuzzy(word, forms.iter().map(|(form, _)| form.as_str()), LOOSE_THRESHOLD)?;
    forms
        .iter()
        .find(|(form, _)| form == hit.candidate)
        .map(|(_, noun)| *noun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(target: &str) -> Intent {
        Intent::Open {
            target: target.to_string(),
        }
    }

    #[test]
    fn empty_and_greeting_inputs() {
        assert_eq!(classify(""), Intent::None);
        assert_eq!(classify("  ?! "), Intent::None);
        assert_eq!(classify("Hello!"), Intent::Greet);
        assert_eq!(classify("how are you?"), Intent::Greet);
        assert_eq!(classify("thanks"), Intent::Greet);
    }

    #[test]
    fn help_and_back() {
        assert_eq!(classify("help"), Intent::Help);
        assert_eq!(classify("What can you do?"), Intent::Help);
        assert_eq!(classify("I need help with exams"), Intent::Help);
        assert_eq!(classify("go back"), Intent::Back);
        assert_eq!(classify("prev"), Intent::Back);
    }

    #[test]
    fn open_strips_politeness() {
        assert_eq!(classify("please open exams"), open("exams"));
        assert_eq!(classify("Go to the fee structure"), open("fee structure"));
        assert_eq!(classify("navigate to my classes"), open("my classes"));
        assert_eq!(classify("settings"), open("settings"));
    }

    #[test]
    fn add_nouns() {
        assert_eq!(classify("add student"), Intent::AddStudent);
        assert_eq!(classify("add a new student John Doe"), Intent::AddStudent);
        assert_eq!(classify("create class"), open("classes"));
        assert_eq!(classify("add teacher"), open("teachers"));
        assert_eq!(classify("create subjects"), open("subjects"));
    }

    #[test]
    fn arrears_campaign_slots() {
        let intent = classify(
            "Send fee reminders to parents of class 7B with balance over KES 2,500 via sms and email. Message: Kindly clear by Friday",
        );
        assert_eq!(
            intent,
            Intent::SendArrears {
                min_balance: 2500.0,
                klass: Some("7B".to_string()),
                channels: Channels {
                    sms: true,
                    email: true,
                    inapp: false
                },
                message: Some("Kindly clear by Friday".to_string()),
            }
        );
    }

    #[test]
    fn arrears_patterns_and_defaults() {
        let Intent::SendArrears {
            min_balance,
            klass,
            channels,
            message,
        } = classify("fee balance reminders for parents")
        else {
            panic!("expected send_arrears");
        };
        assert_eq!(min_balance, 1.0);
        assert_eq!(klass, None);
        assert!(channels.inapp);
        assert_eq!(message, None);

        assert!(matches!(
            classify("notify parents about outstanding fees"),
            Intent::SendArrears { .. }
        ));
        assert!(matches!(
            classify("arrears notices"),
            Intent::SendArrears { .. }
        ));
        assert!(!matches!(
            classify("search students with fee balance"),
            Intent::SendArrears { .. }
        ));
    }

    #[test]
    fn create_exam_slots_keep_case() {
        assert_eq!(
            classify("Create exam Mid Term for Grade 7 East on 2025-10-20"),
            Intent::CreateExam {
                name: Some("Mid Term".to_string()),
                klass: Some("Grade 7 East".to_string()),
                date: Some("2025-10-20".to_string()),
            }
        );
        assert_eq!(
            classify("add an exam"),
            Intent::CreateExam {
                name: None,
                klass: None,
                date: None
            }
        );
    }

    #[test]
    fn publish_by_id_or_name() {
        assert_eq!(
            classify("publish exam 42"),
            Intent::PublishExam {
                id: Some(42),
                name: None,
                klass: None
            }
        );
        assert_eq!(
            classify("Publish the exam End Term for Form 2"),
            Intent::PublishExam {
                id: None,
                name: Some("End Term".to_string()),
                klass: Some("Form 2".to_string()),
            }
        );
    }

    #[test]
    fn delete_with_numeric_id() {
        assert_eq!(
            classify("delete student 123"),
            Intent::Delete {
                resource: ResourceKind::Student,
                id: 123
            }
        );
        assert_eq!(
            classify("remove the class #9"),
            Intent::Delete {
                resource: ResourceKind::Class,
                id: 9
            }
        );
        assert!(matches!(classify("delete student john"), Intent::Unknown { .. }));
    }

    #[test]
    fn search_scope_and_query() {
        let cases = [
            ("search students john", ResourceKind::Student, "john"),
            ("find john in students", ResourceKind::Student, "john"),
            ("search for mid term in exams", ResourceKind::Exam, "mid term"),
            ("find teachers named omondi", ResourceKind::Teacher, "omondi"),
            ("find exam cat 1", ResourceKind::Exam, "cat 1"),
            ("search wanjiru", ResourceKind::Student, "wanjiru"),
        ];
        for (input, scope, q) in cases {
            assert_eq!(
                classify(input),
                Intent::Search {
                    scope,
                    q: q.to_string()
                },
                "input: {input}"
            );
        }
    }

    #[test]
    fn fuzzy_verbs_are_corrected() {
        assert_eq!(classify("opn exams"), open("exams"));
        assert_eq!(classify("goo to settings"), open("settings"));
        assert_eq!(
            classify("pubish exam 42"),
            Intent::PublishExam {
                id: Some(42),
                name: None,
                klass: None
            }
        );
        assert_eq!(
            classify("delet studnt 12"),
            Intent::Delete {
                resource: ResourceKind::Student,
                id: 12
            }
        );
        assert_eq!(classify("ad studnt"), Intent::AddStudent);
        assert_eq!(
            classify("serch exams"),
            Intent::Search {
                scope: ResourceKind::Exam,
                q: String::new()
            }
        );
    }

    #[test]
    fn unknown_keeps_original_text() {
        assert_eq!(
            classify("  Publish it "),
            Intent::Unknown {
                raw: "Publish it".to_string()
            }
        );
        assert_eq!(
            classify("what is the weather"),
            Intent::Unknown {
                raw: "what is the weather".to_string()
            }
        );
    }

    #[test]
    fn intent_serializes_with_type_tag() {
        let value = serde_json::to_value(classify("delete exam 3")).expect("serializable");
        assert_eq!(value["type"], "delete");
        assert_eq!(value["resource"], "exam");
        assert_eq!(value["id"], 3);
    }
}
