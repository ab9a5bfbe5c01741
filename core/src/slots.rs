//! Slot extraction rules. Each function reads one slot out of free text and
//! returns `None` when the text does not mention it.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid iso date regex"));
static NAME_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s+)for\s+|\s*,|\s+on\s+|\b\d{4}-\d{2}-\d{2}\b")
        .expect("valid name boundary regex")
});
static FOR_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|\s)for\s+(.+?)(?:\s+on\b|,|\s+\d{4}-\d{2}-\d{2}|\s+(?:total|out\s+of|term|year)\b|$)",
    )
    .expect("valid for-class regex")
});
static TOTAL_MARKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:total(?:\s+marks)?|out\s+of)\s*(?:of\s*)?[:=]?\s*(\d{1,4})\b")
        .expect("valid total marks regex")
});
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\byear\s*[:=]?\s*(\d{4})\b").expect("valid year regex")
});
static TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bterm\s*[:=]?\s*([123])\b").expect("valid term regex"));
static NAMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:name\s+is|named|called)\s+([A-Za-z][A-Za-z' -]*)")
        .expect("valid named regex")
});
static LEADING_ALPHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z' -]*)").expect("valid leading alpha regex"));
static STUDENT_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(class|grade|form)\s+([A-Za-z0-9][A-Za-z0-9 ]*)")
        .expect("valid student class regex")
});
static ADMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\badm(?:ission)?(?:\s*(?:no|number|num))?\s*[.:#]?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    )
    .expect("valid admission regex")
});
static MIN_BALANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:min(?:imum)?|over|above|greater\s+than|more\s+than)\s*(?:balance\s*(?:of\s*)?)?(?:kes|kshs|ksh)?\.?\s*(\d[\d,]*(?:\.\d+)?)",
    )
    .expect("valid min balance regex")
});
static ARREARS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(class|grade)\s+([^,\s]+)").expect("valid arrears class regex")
});
static SMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:sms|texts?)\b").expect("valid sms regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\be-?mails?\b").expect("valid email regex"));
static IN_APP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in[- ]?app|app|portal|notifications?)\b").expect("valid in-app regex")
});
static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:message|note)\s*:\s*").expect("valid message regex"));

/// Words that end a free-text student name or class name.
const STUDENT_STOP_WORDS: &[&str] = &[
    "class",
    "grade",
    "form",
    "adm",
    "admission",
    "born",
    "dob",
    "male",
    "female",
    "boy",
    "girl",
    "gender",
    "m",
    "f",
    "and",
    "with",
    "his",
    "her",
    "their",
    "the",
    "a",
    "an",
    "new",
    "student",
    "name",
    "add",
    "create",
    "submit",
    "done",
    "save",
];

/// Connector words that never make an exam name on their own.
const EXAM_NAME_FILLERS: &[&str] = &[
    "on", "date", "dated", "due", "at", "by", "is", "the", "exam", "name", "and",
];

/// Delivery channels for a fee-arrears campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Channels {
    pub sms: bool,
    pub email: bool,
    pub inapp: bool,
}

fn clean(value: &str) -> Option<String> {
    let value = value.trim().trim_matches(|c: char| c == ',' || c == '.' || c == ':');
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_valid_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// First calendar-valid `YYYY-MM-DD` in the text.
pub fn iso_date(text: &str) -> Option<String> {
    ISO_DATE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|candidate| is_valid_date(candidate))
        .map(str::to_string)
}

/// Text preceding the first `for`, comma, `on` or date, when one of them is present.
pub fn exam_name(text: &str) -> Option<String> {
    let boundary = NAME_BOUNDARY_RE.find(text)?;
    exam_name_prefix(&text[..boundary.start()])
}

fn exam_name_prefix(prefix: &str) -> Option<String> {
    let name = clean(prefix)?;
    let only_fillers = name
        .split_whitespace()
        .all(|word| EXAM_NAME_FILLERS.iter().any(|f| word.eq_ignore_ascii_case(f)));
    (!only_fillers).then_some(name)
}

/// Exam name from the text that follows "create exam": like [`exam_name`], but
/// an undelimited remainder is the name as a whole.
pub fn exam_name_from_tail(tail: &str) -> Option<String> {
    match NAME_BOUNDARY_RE.find(tail) {
        Some(boundary) => exam_name_prefix(&tail[..boundary.start()]),
        None => exam_name_prefix(tail),
    }
}

/// Text after `for`, up to `on`, a comma, a date or the next keyword.
pub fn exam_class(text: &str) -> Option<String> {
    let caps = FOR_CLASS_RE.captures(text)?;
    clean(caps.get(1)?.as_str())
}

/// `total <n>` / `total marks <n>` / `out of <n>`.
pub fn total_marks(text: &str) -> Option<String> {
    let caps = TOTAL_MARKS_RE.captures(text)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    (value > 0).then(|| value.to_string())
}

pub fn year(text: &str) -> Option<String> {
    Some(YEAR_RE.captures(text)?.get(1)?.as_str().to_string())
}

pub fn term(text: &str) -> Option<String> {
    Some(TERM_RE.captures(text)?.get(1)?.as_str().to_string())
}

fn take_until_stop_word(run: &str) -> Option<String> {
    let words: Vec<&str> = run
        .split_whitespace()
        .take_while(|word| !STUDENT_STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .collect();
    let name = words.join(" ");
    let name = name.trim_matches(|c: char| c == '-' || c == '\'' || c.is_whitespace());
    (name.chars().filter(|c| c.is_alphabetic()).count() >= 3).then(|| name.to_string())
}

/// "name is X" / "named X", else the leading alphabetic run (at least 3 letters).
pub fn student_name(text: &str) -> Option<String> {
    if let Some(caps) = NAMED_RE.captures(text) {
        if let Some(name) = caps.get(1).and_then(|m| take_until_stop_word(m.as_str())) {
            return Some(name);
        }
    }
    let caps = LEADING_ALPHA_RE.captures(text)?;
    take_until_stop_word(caps.get(1)?.as_str())
}

/// `class <x>` gives `x`; `grade <x>` and `form <x>` keep their keyword,
/// since that is how those classes are named.
pub fn student_class(text: &str) -> Option<String> {
    let caps = STUDENT_CLASS_RE.captures(text)?;
    let keyword = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    let words: Vec<&str> = rest
        .split_whitespace()
        .take_while(|word| {
            let lower = word.to_lowercase();
            !matches!(
                lower.as_str(),
                "adm" | "admission" | "born" | "dob" | "male" | "female" | "boy" | "girl"
                    | "gender" | "and" | "with" | "m" | "f"
            )
        })
        .collect();
    if words.is_empty() {
        return None;
    }
    if keyword.eq_ignore_ascii_case("class") {
        clean(&words.join(" "))
    } else {
        clean(&format!("{keyword} {}", words.join(" ")))
    }
}

/// `adm 1234`, `admission no: A-102`, `adm no. 2024/015`. Must contain a digit.
pub fn admission_no(text: &str) -> Option<String> {
    let caps = ADMISSION_RE.captures(text)?;
    let value = caps.get(1)?.as_str().trim_end_matches(['-', '/']);
    value
        .chars()
        .any(|c| c.is_ascii_digit())
        .then(|| value.to_uppercase())
}

/// male/female from male, female, boy, girl, m, f tokens.
/// Full words (male, female, boy, girl) win over a lone `m` / `f` initial.
pub fn gender(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .map(str::to_lowercase)
        .collect();
    let word = |token: &String| match token.as_str() {
        "male" | "boy" => Some("male".to_string()),
        "female" | "girl" => Some("female".to_string()),
        _ => None,
    };
    let initial = |token: &String| match token.as_str() {
        "m" => Some("male".to_string()),
        "f" => Some("female".to_string()),
        _ => None,
    };
    tokens
        .iter()
        .find_map(word)
        .or_else(|| tokens.iter().find_map(initial))
}

/// Whole-word check for any of `words`.
pub fn has_word(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|token| words.iter().any(|w| token.eq_ignore_ascii_case(w)))
}

/// Split off a `message:` / `note:` suffix. Returns (text before, message).
pub fn split_message(text: &str) -> (&str, Option<String>) {
    match MESSAGE_RE.find(text) {
        Some(m) => (&text[..m.start()], clean(&text[m.end()..])),
        None => (text, None),
    }
}

/// Minimum balance threshold, `None` when not mentioned.
pub fn min_balance(text: &str) -> Option<f64> {
    let caps = MIN_BALANCE_RE.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// `class 7B` gives `7B`; `grade 7` keeps its keyword (`Grade 7` as written).
pub fn arrears_class(text: &str) -> Option<String> {
    let caps = ARREARS_CLASS_RE.captures(text)?;
    let keyword = caps.get(1)?.as_str();
    let name = caps.get(2)?.as_str();
    if keyword.eq_ignore_ascii_case("class") {
        clean(name)
    } else {
        clean(&format!("{keyword} {name}"))
    }
}

/// Channel flags from keyword presence; in-app when nothing is named.
pub fn channels(text: &str) -> Channels {
    let sms = SMS_RE.is_match(text);
    let email = EMAIL_RE.is_match(text);
    let inapp = IN_APP_RE.is_match(text);
    Channels {
        sms,
        email,
        inapp: inapp || (!sms && !email),
    }
}

/// First standalone integer in the text.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date_skips_impossible_dates() {
        assert_eq!(iso_date("on 2025-10-20").as_deref(), Some("2025-10-20"));
        assert_eq!(iso_date("2025-13-40 or 2025-02-03").as_deref(), Some("2025-02-03"));
        assert_eq!(iso_date("next tuesday"), None);
    }

    #[test]
    fn exam_slots_from_one_sentence() {
        let text = "Mid Term for Grade 7 East on 2025-10-20";
        assert_eq!(exam_name(text).as_deref(), Some("Mid Term"));
        assert_eq!(exam_class(text).as_deref(), Some("Grade 7 East"));
        assert_eq!(iso_date(text).as_deref(), Some("2025-10-20"));
    }

    #[test]
    fn exam_name_needs_a_delimiter() {
        assert_eq!(exam_name("Opener, Form 2").as_deref(), Some("Opener"));
        assert_eq!(exam_name("submit"), None);
        assert_eq!(exam_name("for Grade 7"), None);
        assert_eq!(exam_name("2025-10-20"), None);
        assert_eq!(exam_name("on 2025-10-20"), None);
        assert_eq!(exam_name("date 2025-10-20"), None);
        assert_eq!(exam_name("due on 2025-10-20"), None);
        assert_eq!(exam_name("Opener 2025-10-20").as_deref(), Some("Opener"));
    }

    #[test]
    fn exam_name_from_tail_takes_undelimited_text() {
        assert_eq!(exam_name_from_tail(" End Term ").as_deref(), Some("End Term"));
        assert_eq!(
            exam_name_from_tail("CAT 1 for Form 3").as_deref(),
            Some("CAT 1")
        );
        assert_eq!(exam_name_from_tail(""), None);
    }

    #[test]
    fn exam_class_stops_at_keywords() {
        assert_eq!(exam_class("for Form 3, total 50").as_deref(), Some("Form 3"));
        assert_eq!(exam_class("for Grade 8 total 100").as_deref(), Some("Grade 8"));
        assert_eq!(exam_class("for grade 6 west").as_deref(), Some("grade 6 west"));
        assert_eq!(exam_class("Mid Term"), None);
    }

    #[test]
    fn marks_year_and_term() {
        assert_eq!(total_marks("out of 50").as_deref(), Some("50"));
        assert_eq!(total_marks("total marks: 100").as_deref(), Some("100"));
        assert_eq!(total_marks("total 0"), None);
        assert_eq!(year("year 2025").as_deref(), Some("2025"));
        assert_eq!(year("2025-10-20"), None);
        assert_eq!(term("term 2").as_deref(), Some("2"));
        assert_eq!(term("term 5"), None);
    }

    #[test]
    fn student_name_rules() {
        assert_eq!(
            student_name("John Doe, class 7B, adm 1234").as_deref(),
            Some("John Doe")
        );
        assert_eq!(student_name("Amina Otieno class 4").as_deref(), Some("Amina Otieno"));
        assert_eq!(student_name("her name is Wanjiku Kamau").as_deref(), Some("Wanjiku Kamau"));
        assert_eq!(student_name("Al"), None);
        assert_eq!(student_name("male"), None);
        assert_eq!(student_name("done"), None);
        assert_eq!(student_name("2010-05-01"), None);
    }

    #[test]
    fn student_class_rules() {
        assert_eq!(student_class("class 7B adm 12").as_deref(), Some("7B"));
        assert_eq!(student_class("in grade 4 east, female").as_deref(), Some("grade 4 east"));
        assert_eq!(student_class("Form 2 male").as_deref(), Some("Form 2"));
        assert_eq!(student_class("adm 44, male"), None);
    }

    #[test]
    fn admission_number_patterns() {
        assert_eq!(admission_no("adm 1234").as_deref(), Some("1234"));
        assert_eq!(admission_no("admission no: a-102").as_deref(), Some("A-102"));
        assert_eq!(admission_no("Adm No. 2024/015").as_deref(), Some("2024/015"));
        assert_eq!(admission_no("admin panel"), None);
    }

    #[test]
    fn gender_tokens() {
        assert_eq!(gender("she is a girl").as_deref(), Some("female"));
        assert_eq!(gender("M").as_deref(), Some("male"));
        assert_eq!(gender("Male, born 2010-01-01").as_deref(), Some("male"));
        assert_eq!(gender("formal"), None);
        assert_eq!(gender("Jane M Otieno, female").as_deref(), Some("female"));
        assert_eq!(gender("Brian K, f").as_deref(), Some("female"));
    }

    #[test]
    fn arrears_slots() {
        let (body, message) =
            split_message("send fee reminders over KES 5,000 to class 7B by sms message: Pay by Friday.");
        assert_eq!(message.as_deref(), Some("Pay by Friday"));
        assert_eq!(min_balance(body), Some(5000.0));
        assert_eq!(arrears_class(body).as_deref(), Some("7B"));
        assert_eq!(
            channels(body),
            Channels {
                sms: true,
                email: false,
                inapp: false
            }
        );
    }

    #[test]
    fn arrears_defaults() {
        assert_eq!(min_balance("send fee reminders"), None);
        assert_eq!(arrears_class("remind Grade 6, please").as_deref(), Some("Grade 6"));
        assert_eq!(arrears_class("all classes"), None);
        assert_eq!(
            channels("notify parents"),
            Channels {
                sms: false,
                email: false,
                inapp: true
            }
        );
        assert_eq!(min_balance("more than 1500.50").map(|v| v * 100.0), Some(150050.0));
    }

    #[test]
    fn whole_word_checks() {
        assert!(has_word("ok, submit now", &["submit"]));
        assert!(!has_word("submitted", &["submit"]));
        assert!(has_word("Save", &["save"]));
    }
}
