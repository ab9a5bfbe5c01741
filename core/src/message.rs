//! Transcript and reply types shared with hosts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::flow::FlowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// A suggestion chip: `label` is shown, `send` is submitted as the next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Chip {
    pub label: String,
    pub send: String,
}

impl Chip {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            label: text.clone(),
            send: text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: Speaker,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Chip>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, suggestions: Vec<Chip>) -> Self {
        Self {
            role: Speaker::Assistant,
            text: text.into(),
            suggestions,
        }
    }
}

/// View transition requested by a reply. The host performs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Navigation {
    To { path: String },
    Back,
}

/// How a turn ended. Every status leaves the session ready for the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Ok,
    ClassificationMiss,
    ResolutionFailure,
    ValidationFailure,
    PolicyDenied,
    RemoteFailure,
    AwaitingConfirmation,
}

/// Result of one host operation: the assistant's message plus side effects.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Reply {
    pub status: TurnStatus,
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    /// The form still being filled after this turn, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowState>,
}
