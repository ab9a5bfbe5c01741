//! Multi-turn slot filling for the create-exam and add-student forms.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

use crate::backend::SchoolBackend;
use crate::error::{AssistantError, BackendError};
use crate::fuzzy::{LOOSE_THRESHOLD, best_fuzzy};
use crate::intent::{Intent, classify, contains_phrase};
use crate::resource::{ResourceKind, record_id};
use crate::slots;

pub const CANCEL_WORDS: &[&str] = &["cancel", "stop", "abort", "quit", "never mind", "exit"];
const DEFAULT_TOTAL_MARKS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    CreateExam,
    AddStudent,
}

/// One named slot of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub key: &'static str,
    pub label: &'static str,
    /// Free-text slots accept a bare answer to their prompt.
    pub free_text: bool,
}

const fn slot(key: &'static str, label: &'static str, free_text: bool) -> SlotSpec {
    SlotSpec {
        key,
        label,
        free_text,
    }
}

const CREATE_EXAM_SLOTS: &[SlotSpec] = &[
    slot("name", "exam name", true),
    slot("class_name", "class", true),
    slot("date", "date (YYYY-MM-DD)", false),
    slot("total_marks", "total marks", false),
    slot("year", "year", false),
    slot("term", "term", false),
];

const ADD_STUDENT_SLOTS: &[SlotSpec] = &[
    slot("name", "full name", true),
    slot("class_name", "class", true),
    slot("admission_no", "admission number", false),
    slot("dob", "date of birth (YYYY-MM-DD)", false),
    slot("gender", "gender", false),
];

impl FlowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::CreateExam => "create_exam",
            FlowKind::AddStudent => "add_student",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FlowKind::CreateExam => "new exam",
            FlowKind::AddStudent => "new student",
        }
    }

    pub fn slots(self) -> &'static [SlotSpec] {
        match self {
            FlowKind::CreateExam => CREATE_EXAM_SLOTS,
            FlowKind::AddStudent => ADD_STUDENT_SLOTS,
        }
    }

    pub fn required(self) -> &'static [&'static str] {
        match self {
            FlowKind::CreateExam => &["name", "class_name", "date"],
            FlowKind::AddStudent => &["name", "admission_no", "dob", "gender"],
        }
    }

    fn triggers(self) -> &'static [&'static str] {
        match self {
            FlowKind::CreateExam => &["create", "submit", "done", "save"],
            FlowKind::AddStudent => &["add", "create", "submit", "done", "save"],
        }
    }

    pub fn resource(self) -> ResourceKind {
        match self {
            FlowKind::CreateExam => ResourceKind::Exam,
            FlowKind::AddStudent => ResourceKind::Student,
        }
    }

    fn slot(self, key: &str) -> Option<&'static SlotSpec> {
        self.slots().iter().find(|spec| spec.key == key)
    }
}

/// Best-effort slot values found in one turn of free text, in slot order.
pub fn extract(kind: FlowKind, text: &str) -> Vec<(&'static str, String)> {
    let found = match kind {
        FlowKind::CreateExam => [
            ("name", slots::exam_name(text)),
            ("class_name", slots::exam_class(text)),
            ("date", slots::iso_date(text)),
            ("total_marks", slots::total_marks(text)),
            ("year", slots::year(text)),
            ("term", slots::term(text)),
        ]
        .to_vec(),
        FlowKind::AddStudent => [
            ("name", slots::student_name(text)),
            ("class_name", slots::student_class(text)),
            ("admission_no", slots::admission_no(text)),
            ("dob", slots::iso_date(text)),
            ("gender", slots::gender(text)),
        ]
        .to_vec(),
    };
    found
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
}

/// What a turn of free text means to an active flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowTurn {
    Cancel,
    /// Slots newly filled by this turn (possibly none).
    Absorbed(Vec<&'static str>),
    Submit(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    #[error("still missing: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("no class matches '{0}'")]
    UnresolvedClass(String),
    #[error(transparent)]
    Remote(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FlowState {
    pub kind: FlowKind,
    pub fields: BTreeMap<String, String>,
}

impl FlowState {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Start a flow pre-filled from `(key, value)` pairs; unknown keys are ignored.
    pub fn seeded<I>(kind: FlowKind, seeds: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Option<String>)>,
    {
        let mut state = Self::new(kind);
        for (key, value) in seeds {
            if let Some(value) = value {
                state.fill(key, value);
            }
        }
        state
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Direct edit: last write wins. Rejects keys the flow does not declare.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), AssistantError> {
        let spec = self
            .kind
            .slot(key)
            .ok_or_else(|| AssistantError::UnknownFlowField {
                flow: self.kind.as_str(),
                key: key.to_string(),
            })?;
        let value = value.trim();
        if value.is_empty() {
            self.fields.remove(spec.key);
        } else {
            self.fields.insert(spec.key.to_string(), value.to_string());
        }
        Ok(())
    }

    /// Text extraction: first write wins.
    fn fill(&mut self, key: &'static str, value: String) -> bool {
        if self.kind.slot(key).is_none() || self.fields.contains_key(key) {
            return false;
        }
        self.fields.insert(key.to_string(), value);
        true
    }

    /// Fold one turn of text into the flow. `normalized` is the normalizer's
    /// output for the same turn, used for control words.
    pub fn absorb(&mut self, raw: &str, normalized: &str) -> FlowTurn {
        if CANCEL_WORDS
            .iter()
            .any(|word| contains_phrase(normalized, word))
        {
            return FlowTurn::Cancel;
        }

        let submit = slots::has_word(normalized, self.kind.triggers());
        let asked = self.prompt_slot();
        let extracted = extract(self.kind, raw);
        let extracted_any = !extracted.is_empty();
        let mut filled: Vec<&'static str> = extracted
            .into_iter()
            .filter_map(|(key, value)| self.fill(key, value).then_some(key))
            .collect();

        if !extracted_any && !submit {
            if let Some(spec) = asked.filter(|spec| spec.free_text) {
                if let Some(answer) = bare_answer(raw).filter(|_| is_unknown(raw)) {
                    if self.fill(spec.key, answer) {
                        filled.push(spec.key);
                    }
                }
            }
        }

        if submit {
            FlowTurn::Submit(filled)
        } else {
            FlowTurn::Absorbed(filled)
        }
    }

    /// Human names of required slots still empty, in slot order.
    pub fn missing(&self) -> Vec<&'static str> {
        self.kind
            .slots()
            .iter()
            .filter(|spec| self.kind.required().contains(&spec.key) && !self.fields.contains_key(spec.key))
            .map(|spec| spec.label)
            .collect()
    }

    /// The slot the flow is currently asking for.
    pub fn prompt_slot(&self) -> Option<&'static SlotSpec> {
        self.kind
            .slots()
            .iter()
            .find(|spec| self.kind.required().contains(&spec.key) && !self.fields.contains_key(spec.key))
    }

    /// "exam name: Mid Term, class: Grade 7 East", in slot order.
    pub fn summary(&self) -> String {
        self.kind
            .slots()
            .iter()
            .filter_map(|spec| Some(format!("{}: {}", spec.label, self.get(spec.key)?)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validate, resolve the class against the live list, and create the record.
    pub async fn submit(&self, backend: &dyn SchoolBackend) -> Result<Value, FlowError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(FlowError::MissingFields(missing));
        }

        let class_id = match (self.kind, self.get("class_name")) {
            (_, Some(name)) => Some(resolve_class(backend, name).await?),
            (FlowKind::CreateExam, None) => {
                return Err(FlowError::MissingFields(vec!["class"]));
            }
            (FlowKind::AddStudent, None) => None,
        };

        let payload = self.payload(class_id);
        let created = backend.create(self.kind.resource(), &payload).await?;
        tracing::info!(
            flow = self.kind.as_str(),
            id = ?record_id(&created),
            "flow submitted"
        );
        Ok(created)
    }

    fn payload(&self, class_id: Option<u64>) -> Value {
        let mut body = Map::new();
        match self.kind {
            FlowKind::CreateExam => {
                let date = self.get("date").unwrap_or_default();
                let year = self
                    .get("year")
                    .and_then(|y| y.parse::<i32>().ok())
                    .or_else(|| {
                        chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                            .ok()
                            .map(|d| d.year())
                    });
                let total_marks = self
                    .get("total_marks")
                    .and_then(|t| t.parse::<u32>().ok())
                    .unwrap_or(DEFAULT_TOTAL_MARKS);
                body.insert("name".into(), json!(self.get("name")));
                body.insert("klass".into(), json!(class_id));
                body.insert("date".into(), json!(date));
                body.insert("total_marks".into(), json!(total_marks));
                if let Some(year) = year {
                    body.insert("year".into(), json!(year));
                }
                if let Some(term) = self.get("term").and_then(|t| t.parse::<u8>().ok()) {
                    body.insert("term".into(), json!(term));
                }
            }
            FlowKind::AddStudent => {
                let name = self.get("name").unwrap_or_default();
                let (first, last) = name.split_once(' ').unwrap_or((name, ""));
                body.insert("first_name".into(), json!(first));
                body.insert("last_name".into(), json!(last.trim()));
                body.insert("admission_no".into(), json!(self.get("admission_no")));
                body.insert("date_of_birth".into(), json!(self.get("dob")));
                body.insert("gender".into(), json!(self.get("gender")));
                if let Some(class_id) = class_id {
                    body.insert("klass".into(), json!(class_id));
                }
            }
        }
        Value::Object(body)
    }
}

/// Commands typed mid-flow ("open exams") are not answers.
fn is_unknown(raw: &str) -> bool {
    matches!(classify(raw), Intent::Unknown { .. })
}

/// A turn that is only an answer, e.g. "Mid Term" after "What is the exam name?".
fn bare_answer(raw: &str) -> Option<String> {
    let answer = raw
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim();
    let words = answer.split_whitespace().count();
    (answer.chars().any(char::is_alphabetic) && (1..=6).contains(&words)).then(|| answer.to_string())
}

/// Fuzzy-match a class name against the live class list.
pub async fn resolve_class(backend: &dyn SchoolBackend, name: &str) -> Result<u64, FlowError> {
    let classes = backend.query(ResourceKind::Class, None).await?;
    let names: Vec<(u64, String)> = classes
        .iter()
        .filter_map(|record| {
            let id = record_id(record)?;
            let name = record.get("name").and_then(Value::as_str)?;
            Some((id, name.to_string()))
        })
        .collect();
    let hit = best_fuzzy(name, names.iter().map(|(_, n)| n.as_str()), LOOSE_THRESHOLD)
        .ok_or_else(|| FlowError::UnresolvedClass(name.to_string()))?;
    let id = names
        .iter()
        .find(|(_, n)| n == hit.candidate)
        .map(|(id, _)| *id)
        .ok_or_else(|| FlowError::UnresolvedClass(name.to_string()))?;
    tracing::debug!(
        class = name,
        matched = hit.candidate,
        score = hit.score,
        "class name resolved"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::normalize::normalize;
    use crate::policy::Role;

    fn turn(state: &mut FlowState, raw: &str) -> FlowTurn {
        state.absorb(raw, &normalize(raw).text)
    }

    fn classes() -> Vec<Value> {
        vec![
            json!({"id": 9, "name": "Grade 7 East"}),
            json!({"id": 10, "name": "Grade 7 West"}),
            json!({"id": 11, "name": "Form 2"}),
        ]
    }

    #[test]
    fn create_exam_collects_slots_across_turns() {
        let mut state = FlowState::new(FlowKind::CreateExam);
        assert_eq!(
            turn(&mut state, "Mid Term for Grade 7 East on 2025-10-20"),
            FlowTurn::Absorbed(vec!["name", "class_name", "date"])
        );
        assert_eq!(turn(&mut state, "submit"), FlowTurn::Submit(vec![]));
        assert_eq!(state.get("name"), Some("Mid Term"));
        assert_eq!(state.get("class_name"), Some("Grade 7 East"));
        assert_eq!(state.get("date"), Some("2025-10-20"));
        assert!(state.missing().is_empty());
    }

    #[test]
    fn text_extraction_never_overwrites() {
        let mut state = FlowState::new(FlowKind::CreateExam);
        turn(&mut state, "Mid Term for Grade 7 East on 2025-10-20");
        turn(&mut state, "End Term for Form 2 on 2025-11-01");
        assert_eq!(state.get("name"), Some("Mid Term"));
        assert_eq!(state.get("date"), Some("2025-10-20"));

        state.set_field("name", "End Term").expect("known field");
        assert_eq!(state.get("name"), Some("End Term"));
    }

    #[test]
    fn unknown_direct_field_is_rejected() {
        let mut state = FlowState::new(FlowKind::AddStudent);
        assert_eq!(
            state.set_field("salary", "1"),
            Err(AssistantError::UnknownFlowField {
                flow: "add_student",
                key: "salary".to_string()
            })
        );
    }

    #[test]
    fn bare_answer_fills_the_asked_slot() {
        let mut state = FlowState::new(FlowKind::CreateExam);
        assert_eq!(state.prompt_slot().map(|s| s.key), Some("name"));
        assert_eq!(turn(&mut state, "open exams"), FlowTurn::Absorbed(vec![]));
        assert_eq!(turn(&mut state, "Mid Term"), FlowTurn::Absorbed(vec!["name"]));
        assert_eq!(state.prompt_slot().map(|s| s.key), Some("class_name"));
        assert_eq!(turn(&mut state, "Grade 7 West"), FlowTurn::Absorbed(vec!["class_name"]));
        assert_eq!(state.prompt_slot().map(|s| s.key), Some("date"));
        assert_eq!(turn(&mut state, "next week"), FlowTurn::Absorbed(vec![]));
    }

    #[test]
    fn date_only_turn_leaves_the_name_open() {
        let mut state = FlowState::new(FlowKind::CreateExam);
        assert_eq!(turn(&mut state, "on 2025-10-20"), FlowTurn::Absorbed(vec!["date"]));
        assert_eq!(state.get("name"), None);
        assert_eq!(turn(&mut state, "date 2025-10-21"), FlowTurn::Absorbed(vec![]));
        assert_eq!(state.get("name"), None);

        assert_eq!(turn(&mut state, "Mid Term"), FlowTurn::Absorbed(vec!["name"]));
        assert_eq!(state.get("name"), Some("Mid Term"));
        assert_eq!(state.get("class_name"), None);
        assert_eq!(state.get("date"), Some("2025-10-20"));
    }

    #[test]
    fn add_student_extraction_and_missing_labels() {
        let mut state = FlowState::new(FlowKind::AddStudent);
        turn(&mut state, "John Doe, class 7B, adm 1234");
        assert_eq!(state.get("name"), Some("John Doe"));
        assert_eq!(state.get("class_name"), Some("7B"));
        assert_eq!(state.get("admission_no"), Some("1234"));
        assert_eq!(state.missing(), vec!["date of birth (YYYY-MM-DD)", "gender"]);

        assert_eq!(
            turn(&mut state, "girl born 2012-03-04, save"),
            FlowTurn::Submit(vec!["dob", "gender"])
        );
        assert!(state.missing().is_empty());
    }

    #[test]
    fn cancel_words_end_the_flow() {
        let mut state = FlowState::new(FlowKind::AddStudent);
        assert_eq!(turn(&mut state, "never mind"), FlowTurn::Cancel);
        assert_eq!(turn(&mut state, "Stop!"), FlowTurn::Cancel);
    }

    #[tokio::test]
    async fn submit_reports_missing_fields_without_calling_backend() {
        let backend = FakeBackend::new(Role::Admin);
        let state = FlowState::seeded(FlowKind::CreateExam, [("name", Some("CAT 1".to_string()))]);
        let err = state.submit(&backend).await.expect_err("incomplete");
        assert_eq!(
            err,
            FlowError::MissingFields(vec!["class", "date (YYYY-MM-DD)"])
        );
        assert_eq!(err.to_string(), "still missing: class, date (YYYY-MM-DD)");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn submit_resolves_class_before_creating() {
        let backend = FakeBackend::new(Role::Admin).with_records(ResourceKind::Class, classes());
        let mut state = FlowState::new(FlowKind::CreateExam);
        turn(&mut state, "Mid Term for grade 7 east on 2025-10-20, out of 50");
        state.submit(&backend).await.expect("created");

        let calls = backend.calls();
        assert_eq!(calls[0], Call::Query(ResourceKind::Class, None));
        let Call::Create(ResourceKind::Exam, body) = &calls[1] else {
            panic!("expected exam creation, got {calls:?}");
        };
        assert_eq!(body["klass"], 9);
        assert_eq!(body["total_marks"], 50);
        assert_eq!(body["year"], 2025);
    }

    #[tokio::test]
    async fn unresolved_class_is_a_local_error() {
        let backend = FakeBackend::new(Role::Admin).with_records(ResourceKind::Class, classes());
        let mut state = FlowState::new(FlowKind::CreateExam);
        turn(&mut state, "Mid Term for Standard Nine on 2025-10-20");
        let err = state.submit(&backend).await.expect_err("unknown class");
        assert_eq!(err, FlowError::UnresolvedClass("Standard Nine".to_string()));
        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn add_student_without_class_skips_resolution() {
        let backend = FakeBackend::new(Role::Admin);
        let mut state = FlowState::new(FlowKind::AddStudent);
        turn(&mut state, "Amina Otieno adm 2024/015 female born 2011-02-03");
        state.submit(&backend).await.expect("created");
        let Call::Create(ResourceKind::Student, body) = &backend.calls()[0] else {
            panic!("expected student creation");
        };
        assert_eq!(body["first_name"], "Amina");
        assert_eq!(body["last_name"], "Otieno");
        assert_eq!(body["admission_no"], "2024/015");
        assert!(body.get("klass").is_none());
    }
}
