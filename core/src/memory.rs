//! Bounded conversational memory and its merge operation.
//!
//! Memory is never mutated in place: every change is expressed as a
//! [`MemoryUpdate`] and applied with [`ConversationMemory::merge`], which
//! consumes the previous state and returns the next one.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::intent::IntentKind;
use crate::resource::{ResourceKind, ResourceRef, ResultRef};

pub const HISTORY_CAPACITY: usize = 3;

/// A mutating action waiting for a yes/no answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    PublishExam {
        id: u64,
        label: String,
    },
    Delete {
        resource: ResourceKind,
        id: u64,
        label: String,
    },
}

impl PendingAction {
    pub fn describe(&self) -> String {
        match self {
            PendingAction::PublishExam { label, .. } => format!("publish exam {label}"),
            PendingAction::Delete {
                resource, label, ..
            } => format!("delete {resource} {label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSearch {
    pub scope: ResourceKind,
    pub q: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentIntent {
    pub kind: IntentKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationMemory {
    last_exam_id: Option<u64>,
    last_resource: Option<ResourceRef>,
    pending_confirm: Option<PendingAction>,
    last_class_name: Option<String>,
    last_exam_name: Option<String>,
    last_route: Option<String>,
    last_search: Option<LastSearch>,
    history: VecDeque<RecentIntent>,
    last_results: Vec<ResultRef>,
}

/// Partial update. `None` leaves a field as it is; `pending_confirm` is
/// doubly optional so it can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPatch {
    pub last_exam_id: Option<u64>,
    pub last_resource: Option<ResourceRef>,
    pub pending_confirm: Option<Option<PendingAction>>,
    pub last_class_name: Option<String>,
    pub last_exam_name: Option<String>,
    pub last_route: Option<String>,
    pub last_search: Option<LastSearch>,
    pub last_results: Option<Vec<ResultRef>>,
    pub push_intent: Option<IntentKind>,
}

type MemoryFn = Box<dyn FnOnce(ConversationMemory) -> ConversationMemory + Send>;

pub enum MemoryUpdate {
    Patch(MemoryPatch),
    With(MemoryFn),
    Replace(ConversationMemory),
}

impl MemoryUpdate {
    pub fn with(f: impl FnOnce(ConversationMemory) -> ConversationMemory + Send + 'static) -> Self {
        MemoryUpdate::With(Box::new(f))
    }
}

impl std::fmt::Debug for MemoryUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryUpdate::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
            MemoryUpdate::With(_) => f.write_str("With(..)"),
            MemoryUpdate::Replace(memory) => f.debug_tuple("Replace").field(memory).finish(),
        }
    }
}

impl From<MemoryPatch> for MemoryUpdate {
    fn from(patch: MemoryPatch) -> Self {
        MemoryUpdate::Patch(patch)
    }
}

impl ConversationMemory {
    pub fn last_exam_id(&self) -> Option<u64> {
        self.last_exam_id
    }

    pub fn last_resource(&self) -> Option<&ResourceRef> {
        self.last_resource.as_ref()
    }

    pub fn pending_confirm(&self) -> Option<&PendingAction> {
        self.pending_confirm.as_ref()
    }

    pub fn last_class_name(&self) -> Option<&str> {
        self.last_class_name.as_deref()
    }

    pub fn last_exam_name(&self) -> Option<&str> {
        self.last_exam_name.as_deref()
    }

    pub fn last_route(&self) -> Option<&str> {
        self.last_route.as_deref()
    }

    pub fn last_search(&self) -> Option<&LastSearch> {
        self.last_search.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &RecentIntent> {
        self.history.iter()
    }

    pub fn last_results(&self) -> &[ResultRef] {
        &self.last_results
    }

    /// Apply one update and return the next state.
    pub fn merge(self, update: impl Into<MemoryUpdate>) -> Self {
        let next = match update.into() {
            MemoryUpdate::Patch(patch) => self.apply(patch),
            MemoryUpdate::With(f) => f(self),
            MemoryUpdate::Replace(next) => next,
        };
        next.bounded()
    }

    fn apply(mut self, patch: MemoryPatch) -> Self {
        if let Some(id) = patch.last_exam_id {
            self.last_exam_id = Some(id);
        }
        if let Some(resource) = patch.last_resource {
            self.last_resource = Some(resource);
        }
        if let Some(pending) = patch.pending_confirm {
            self.pending_confirm = pending;
        }
        if let Some(class_name) = patch.last_class_name {
            self.last_class_name = Some(class_name);
        }
        if let Some(exam_name) = patch.last_exam_name {
            self.last_exam_name = Some(exam_name);
        }
        if let Some(route) = patch.last_route {
            self.last_route = Some(route);
        }
        if let Some(search) = patch.last_search {
            self.last_search = Some(search);
        }
        if let Some(results) = patch.last_results {
            self.last_results = results;
        }
        if let Some(kind) = patch.push_intent {
            self.history.push_back(RecentIntent {
                kind,
                at: Utc::now(),
            });
        }
        self
    }

    fn bounded(mut self) -> Self {
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self
    }
}

impl MemoryPatch {
    pub fn intent(kind: IntentKind) -> Self {
        Self {
            push_intent: Some(kind),
            ..Self::default()
        }
    }

    pub fn clear_pending() -> Self {
        Self {
            pending_confirm: Some(None),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_the_three_most_recent() {
        let kinds = [
            IntentKind::Greet,
            IntentKind::Open,
            IntentKind::Search,
            IntentKind::Delete,
            IntentKind::Help,
        ];
        let memory = kinds
            .into_iter()
            .fold(ConversationMemory::default(), |memory, kind| {
                memory.merge(MemoryPatch::intent(kind))
            });
        let kept: Vec<IntentKind> = memory.history().map(|entry| entry.kind).collect();
        assert_eq!(
            kept,
            vec![IntentKind::Search, IntentKind::Delete, IntentKind::Help]
        );
    }

    #[test]
    fn replace_and_function_updates_are_bounded_too() {
        let memory = ConversationMemory::default().merge(MemoryUpdate::with(|mut memory| {
            for _ in 0..10 {
                memory.history.push_back(RecentIntent {
                    kind: IntentKind::Unknown,
                    at: Utc::now(),
                });
            }
            memory
        }));
        assert_eq!(memory.history().count(), HISTORY_CAPACITY);

        let replaced = memory.clone().merge(MemoryUpdate::Replace(ConversationMemory::default()));
        assert_eq!(replaced, ConversationMemory::default());
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let memory = ConversationMemory::default().merge(MemoryPatch {
            last_exam_id: Some(42),
            last_resource: Some(ResourceRef {
                kind: ResourceKind::Exam,
                id: 42,
            }),
            ..MemoryPatch::default()
        });
        let memory = memory.merge(MemoryPatch {
            last_route: Some("/admin/exams".to_string()),
            ..MemoryPatch::default()
        });
        assert_eq!(memory.last_exam_id(), Some(42));
        assert_eq!(memory.last_route(), Some("/admin/exams"));
        assert_eq!(memory.last_resource().map(|r| r.id), Some(42));
    }

    #[test]
    fn pending_confirmation_can_be_set_and_cleared() {
        let pending = PendingAction::Delete {
            resource: ResourceKind::Student,
            id: 7,
            label: "Amina (#7)".to_string(),
        };
        let memory = ConversationMemory::default().merge(MemoryPatch {
            pending_confirm: Some(Some(pending.clone())),
            ..MemoryPatch::default()
        });
        assert_eq!(memory.pending_confirm(), Some(&pending));
        assert_eq!(pending.describe(), "delete student Amina (#7)");

        let memory = memory.merge(MemoryPatch::clear_pending());
        assert_eq!(memory.pending_confirm(), None);
    }
}
