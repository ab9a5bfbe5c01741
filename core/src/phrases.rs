//! Reply wording. Only cosmetic: which variant is picked never changes
//! what a turn does.

use rand::seq::SliceRandom;

pub trait PhrasePicker: Send + Sync {
    /// Pick one of `options`. `options` is never empty.
    fn pick<'a>(&self, options: &[&'a str]) -> &'a str;
}

/// Always the first variant. Deterministic; the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPhrases;

impl PhrasePicker for FixedPhrases {
    fn pick<'a>(&self, options: &[&'a str]) -> &'a str {
        options.first().copied().unwrap_or_default()
    }
}

/// A random variant per reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariedPhrases;

impl PhrasePicker for VariedPhrases {
    fn pick<'a>(&self, options: &[&'a str]) -> &'a str {
        options
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default()
    }
}

pub const GREETING: &[&str] = &[
    "Hi {name}! What would you like to do?",
    "Hello {name}, how can I help?",
    "Hey {name}. Ready when you are.",
];
pub const OPENING: &[&str] = &["Opening {page}.", "Taking you to {page}.", "Here is {page}."];
pub const GOING_BACK: &[&str] = &["Going back.", "Back we go."];
pub const DECLINED: &[&str] = &["Okay, I won't do that.", "No problem, nothing was changed."];
pub const CANCELLED: &[&str] = &["Cancelled. Nothing was saved.", "Okay, I've dropped that form."];
pub const NOT_UNDERSTOOD: &[&str] = &[
    "Sorry, I didn't catch that.",
    "I'm not sure what you mean.",
];

/// Fill `{key}` placeholders in a picked template.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}
