use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Resource families the assistant can search, delete or create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Student,
    Exam,
    Teacher,
    Class,
    Result,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Student,
        ResourceKind::Exam,
        ResourceKind::Teacher,
        ResourceKind::Class,
        ResourceKind::Result,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Student => "student",
            ResourceKind::Exam => "exam",
            ResourceKind::Teacher => "teacher",
            ResourceKind::Class => "class",
            ResourceKind::Result => "result",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Student => "students",
            ResourceKind::Exam => "exams",
            ResourceKind::Teacher => "teachers",
            ResourceKind::Class => "classes",
            ResourceKind::Result => "results",
        }
    }

    /// Collection name on the school REST API.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Result => "exam_results",
            other => other.plural(),
        }
    }

    /// Singular or plural noun to kind.
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| word == kind.as_str() || word == kind.plural() || word == kind.collection())
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete resource the conversation has touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: u64,
}

/// A search hit remembered for follow-up turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResultRef {
    pub kind: ResourceKind,
    pub id: u64,
    pub label: String,
}

/// Record id, accepting numbers and numeric strings.
pub fn record_id(record: &Value) -> Option<u64> {
    match record.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn person_name(record: &Value) -> Option<String> {
    if let Some(full) = text_field(record, &["full_name", "name"]) {
        return Some(full.to_string());
    }
    let parts: Vec<&str> = ["first_name", "last_name"]
        .iter()
        .filter_map(|key| text_field(record, &[key]))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Class name of an exam or student record. The API returns it either flat
/// (`class_name`) or nested (`klass: {name}`).
pub fn record_class_name(record: &Value) -> Option<String> {
    if let Some(name) = text_field(record, &["class_name", "klass_name"]) {
        return Some(name.to_string());
    }
    match record.get("klass") {
        Some(Value::Object(_)) => record
            .get("klass")
            .and_then(|k| text_field(k, &["name"]))
            .map(str::to_string),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Short human label for a record of the given kind.
pub fn record_label(kind: ResourceKind, record: &Value) -> String {
    let id = record_id(record)
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "?".to_string());
    match kind {
        ResourceKind::Student => {
            let name = person_name(record).unwrap_or_else(|| format!("Student {id}"));
            match text_field(record, &["admission_no", "admission_number"]) {
                Some(adm) => format!("{name} (adm {adm})"),
                None => format!("{name} ({id})"),
            }
        }
        ResourceKind::Teacher => {
            let name = person_name(record).unwrap_or_else(|| format!("Teacher {id}"));
            format!("{name} ({id})")
        }
        ResourceKind::Exam => {
            let name = text_field(record, &["name", "title"]).unwrap_or("Exam");
            match record_class_name(record) {
                Some(class_name) => format!("{name} - {class_name} ({id})"),
                None => format!("{name} ({id})"),
            }
        }
        ResourceKind::Class => {
            let name = text_field(record, &["name"]).unwrap_or("Class");
            format!("{name} ({id})")
        }
        ResourceKind::Result => {
            let student = text_field(record, &["student_name"]).unwrap_or("Student");
            let exam = text_field(record, &["exam_name"]).unwrap_or("exam");
            match record.get("marks").or_else(|| record.get("score")) {
                Some(marks) if !marks.is_null() => format!("{student} - {exam}: {marks} ({id})"),
                _ => format!("{student} - {exam} ({id})"),
            }
        }
    }
}

pub fn result_ref(kind: ResourceKind, record: &Value) -> Option<ResultRef> {
    Some(ResultRef {
        kind,
        id: record_id(record)?,
        label: record_label(kind, record),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_word_accepts_singular_plural_and_collection() {
        assert_eq!(ResourceKind::from_word("Students"), Some(ResourceKind::Student));
        assert_eq!(ResourceKind::from_word("class"), Some(ResourceKind::Class));
        assert_eq!(ResourceKind::from_word("classes"), Some(ResourceKind::Class));
        assert_eq!(ResourceKind::from_word("exam_results"), Some(ResourceKind::Result));
        assert_eq!(ResourceKind::from_word("parents"), None);
    }

    #[test]
    fn record_id_accepts_numeric_strings() {
        assert_eq!(record_id(&json!({"id": 7})), Some(7));
        assert_eq!(record_id(&json!({"id": "12"})), Some(12));
        assert_eq!(record_id(&json!({"id": "x"})), None);
        assert_eq!(record_id(&json!({})), None);
    }

    #[test]
    fn labels_use_the_most_specific_fields() {
        let student = json!({"id": 3, "first_name": "Amina", "last_name": "Otieno", "admission_no": "A-102"});
        assert_eq!(
            record_label(ResourceKind::Student, &student),
            "Amina Otieno (adm A-102)"
        );

        let exam = json!({"id": 42, "name": "Mid Term", "klass": {"id": 9, "name": "Grade 7 East"}});
        assert_eq!(record_label(ResourceKind::Exam, &exam), "Mid Term - Grade 7 East (#42)");

        let result = json!({"id": 5, "student_name": "Amina", "exam_name": "Mid Term", "marks": 81});
        assert_eq!(record_label(ResourceKind::Result, &result), "Amina - Mid Term: 81 (#5)");
    }

    #[test]
    fn class_name_reads_flat_and_nested_shapes() {
        assert_eq!(
            record_class_name(&json!({"class_name": "Form 2"})).as_deref(),
            Some("Form 2")
        );
        assert_eq!(
            record_class_name(&json!({"klass": {"name": "Grade 4"}})).as_deref(),
            Some("Grade 4")
        );
        assert_eq!(record_class_name(&json!({"klass": 4})), None);
    }
}
