//! Input normalization: lowercasing, punctuation cleanup, politeness and greeting stripping.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Politeness prefixes stripped from the start of an utterance.
/// When several apply, the longest one wins.
pub const POLITE_PREFIXES: &[&str] = &[
    "please",
    "pls",
    "plz",
    "kindly",
    "could you please",
    "can you please",
    "would you please",
    "could you",
    "can you",
    "would you",
    "will you",
    "i want to",
    "i would like to",
    "i'd like to",
    "i need to",
    "help me",
    "let's",
    "lets",
];

/// Greeting phrases. An utterance made only of these is a greeting.
pub const GREETINGS: &[&str] = &[
    "hi",
    "hi there",
    "hello",
    "hello there",
    "hey",
    "hey there",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    "howdy",
    "hiya",
    "yo",
    "jambo",
    "habari",
];

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[!,.?]+").expect("valid punctuation regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedInput {
    pub text: String,
    pub greeted: bool,
}

/// Normalize one raw utterance. Total: every input, including "", yields a value.
///
/// Prefix and greeting stripping repeats until nothing more applies, so the
/// returned `text` normalizes to itself.
pub fn normalize(raw: &str) -> NormalizedInput {
    let lowered = raw.to_lowercase();
    let spaced = PUNCTUATION_RE.replace_all(&lowered, " ");
    let mut text = collapse_whitespace(&spaced);
    let mut greeted = false;

    loop {
        let before = text.len();
        if let Some(rest) = strip_leading_phrase(&text, POLITE_PREFIXES, false) {
            text = rest;
        }
        if let Some(rest) = strip_leading_phrase(&text, GREETINGS, true) {
            text = rest;
            greeted = true;
        }
        if text.len() == before {
            break;
        }
    }

    NormalizedInput { text, greeted }
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip the longest phrase that starts `text` and is followed by a space
/// (or, with `whole`, that makes up all of `text`).
fn strip_leading_phrase(text: &str, phrases: &[&str], whole: bool) -> Option<String> {
    phrases
        .iter()
        .filter(|phrase| {
            text.strip_prefix(**phrase)
                .is_some_and(|rest| rest.starts_with(' ') || (whole && rest.is_empty()))
        })
        .max_by_key(|phrase| phrase.len())
        .map(|phrase| text[phrase.len()..].trim_start().to_string())
}
