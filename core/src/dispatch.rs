//! Turns classified intents, confirmations and completed flows into actions
//! against the school services.
//!
//! The dispatcher never touches session state. It returns an [`Outcome`]
//! describing the reply, the memory update and what happens to the active
//! flow; the session applies all of it in one step.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::backend::{ArrearsCampaign, SchoolBackend};
use crate::flow::{self, FlowError, FlowKind, FlowState};
use crate::intent::{Intent, IntentKind};
use crate::memory::{ConversationMemory, LastSearch, MemoryPatch, MemoryUpdate, PendingAction};
use crate::message::{Chip, Navigation, TurnStatus};
use crate::normalize::normalize;
use crate::phrases::{self, PhrasePicker, render};
use crate::policy::{Identity, can_send_arrears};
use crate::resource::{
    ResourceKind, ResourceRef, record_class_name, record_id, record_label, result_ref,
};
use crate::routes::{self, Resolution};
use crate::slots::Channels;

pub const MAX_LISTED_RESULTS: usize = 5;
pub const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "confirm", "proceed", "go ahead", "do it",
];
pub const NEGATIVE: &[&str] = &[
    "no", "n", "nope", "cancel", "stop", "abort", "never mind", "dont", "don't",
];
const DEFAULT_ARREARS_MESSAGE: &str = "Dear parent, our records show an outstanding fee balance for your child. Kindly clear it at your earliest convenience.";
const ARREARS_EMAIL_SUBJECT: &str = "Fee balance reminder";

static PUBLISH_IT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpublish\b.*\bit\b").expect("valid publish-it regex"));
static DELETE_IT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:delete|remove)\b.*\bit\b").expect("valid delete-it regex"));
static STUDENT_TAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstudents?\b[\s,:-]*(.*)$").expect("valid student tail regex")
});

/// What happens to the active flow after a turn.
#[derive(Debug, Default)]
pub enum FlowCommand {
    #[default]
    Keep,
    Start(FlowState),
    Clear,
}

/// Everything a turn produced. Applied atomically by the session.
#[derive(Debug)]
pub struct Outcome {
    pub status: TurnStatus,
    pub text: String,
    pub chips: Vec<Chip>,
    pub navigation: Option<Navigation>,
    pub memory: Option<MemoryUpdate>,
    pub flow: FlowCommand,
}

impl Outcome {
    fn new(status: TurnStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            chips: Vec::new(),
            navigation: None,
            memory: None,
            flow: FlowCommand::Keep,
        }
    }

    fn ok(text: impl Into<String>) -> Self {
        Self::new(TurnStatus::Ok, text)
    }

    fn chips<I, S>(mut self, chips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chips = chips.into_iter().map(|chip| Chip::new(chip)).collect();
        self
    }

    fn remember(mut self, patch: MemoryPatch) -> Self {
        self.memory = Some(patch.into());
        self
    }

    fn navigate(mut self, navigation: Navigation) -> Self {
        self.navigation = Some(navigation);
        self
    }

    fn flow(mut self, command: FlowCommand) -> Self {
        self.flow = command;
        self
    }
}

/// Whole-reply yes/no detection, tolerating a trailing "please" or "thanks".
pub fn confirmation_answer(normalized: &str) -> Option<bool> {
    let answer = ["please", "thanks", "thank you"]
        .iter()
        .find_map(|tail| normalized.strip_suffix(tail).map(str::trim_end))
        .unwrap_or(normalized);
    if AFFIRMATIVE.contains(&answer) {
        Some(true)
    } else if NEGATIVE.contains(&answer) {
        Some(false)
    } else {
        None
    }
}

pub struct Dispatcher<'a> {
    backend: &'a dyn SchoolBackend,
    identity: &'a Identity,
    phrases: &'a dyn PhrasePicker,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        backend: &'a dyn SchoolBackend,
        identity: &'a Identity,
        phrases: &'a dyn PhrasePicker,
    ) -> Self {
        Self {
            backend,
            identity,
            phrases,
        }
    }

    pub async fn dispatch(&self, intent: Intent, raw: &str, memory: &ConversationMemory) -> Outcome {
        let kind = intent.kind();
        tracing::debug!(intent = kind.as_str(), "dispatching");
        match intent {
            Intent::None => Outcome::new(
                TurnStatus::ClassificationMiss,
                "Type a request such as \"open exams\", or \"help\" to see what I can do.",
            ),
            Intent::Greet => {
                let template = self.phrases.pick(phrases::GREETING);
                Outcome::ok(render(template, &[("name", self.identity.first_name())]))
                    .chips(["help"])
                    .remember(MemoryPatch::intent(kind))
            }
            Intent::Help => self.help().remember(MemoryPatch::intent(kind)),
            Intent::Back => Outcome::ok(self.phrases.pick(phrases::GOING_BACK))
                .navigate(Navigation::Back)
                .remember(MemoryPatch::intent(kind)),
            Intent::Open { target } => self.open(&target),
            Intent::PublishExam { id, name, klass } => {
                self.publish_exam(id, name.as_deref(), klass.as_deref(), memory)
                    .await
            }
            Intent::Delete { resource, id } => self.ask_delete(resource, id, memory),
            Intent::Search { scope, q } => self.search(scope, &q).await,
            Intent::CreateExam { name, klass, date } => self.start_flow(FlowState::seeded(
                FlowKind::CreateExam,
                [("name", name), ("class_name", klass), ("date", date)],
            )),
            Intent::AddStudent => {
                let tail = STUDENT_TAIL_RE
                    .captures(raw)
                    .and_then(|caps| caps.get(1))
                    .map_or("", |m| m.as_str());
                let seeds = flow::extract(FlowKind::AddStudent, tail)
                    .into_iter()
                    .map(|(key, value)| (key, Some(value)));
                self.start_flow(FlowState::seeded(FlowKind::AddStudent, seeds))
            }
            Intent::SendArrears {
                min_balance,
                klass,
                channels,
                message,
            } => self.send_arrears(min_balance, klass, channels, message).await,
            Intent::Unknown { raw } => self.unknown(&raw, memory).await,
        }
    }

    fn help(&self) -> Outcome {
        let text = [
            "Here is what I can do:",
            "- open a page: \"open exams\", \"go to fee structure\"",
            "- find records: \"find john in students\", \"search exams mid term\"",
            "- create an exam: \"create exam Mid Term for Grade 7 East on 2025-10-20\"",
            "- add a student: \"add student John Doe, class 7B, adm 1234\"",
            "- publish an exam: \"publish exam 42\"",
            "- delete a record: \"delete student 123\"",
            "- remind parents about fees: \"send fee reminders to class 7B over 5000 by sms\"",
        ]
        .join("\n");
        Outcome::ok(text).chips(
            routes::featured(self.identity, 4)
                .into_iter()
                .map(|entry| format!("open {}", entry.key)),
        )
    }

    fn open(&self, target: &str) -> Outcome {
        match routes::resolve(target, self.identity) {
            Resolution::Resolved(entry) => {
                let template = self.phrases.pick(phrases::OPENING);
                Outcome::ok(render(template, &[("page", entry.key)]))
                    .navigate(Navigation::To {
                        path: entry.path.to_string(),
                    })
                    .remember(MemoryPatch {
                        last_route: Some(entry.path.to_string()),
                        push_intent: Some(IntentKind::Open),
                        ..MemoryPatch::default()
                    })
            }
            Resolution::Denied(entry) => Outcome::new(
                TurnStatus::PolicyDenied,
                format!("Sorry, your account does not have access to {}.", entry.key),
            ),
            Resolution::Suggestions(suggestions) if suggestions.is_empty() => Outcome::new(
                TurnStatus::ResolutionFailure,
                format!("I couldn't find a page called \"{target}\". Say \"help\" to see where I can take you."),
            )
            .chips(["help"]),
            Resolution::Suggestions(suggestions) => Outcome::new(
                TurnStatus::ResolutionFailure,
                format!("I'm not sure which page \"{target}\" is. Did you mean one of these?"),
            )
            .chips(suggestions.into_iter().map(|s| format!("open {}", s.key))),
        }
    }

    async fn publish_exam(
        &self,
        id: Option<u64>,
        name: Option<&str>,
        klass: Option<&str>,
        memory: &ConversationMemory,
    ) -> Outcome {
        let (id, label) = match id {
            Some(id) => (id, self.known_label(ResourceKind::Exam, id, memory)),
            None if name.is_none() && klass.is_none() => {
                return Outcome::new(
                    TurnStatus::ResolutionFailure,
                    "Which exam should I publish? Give me its id or name, e.g. \"publish exam 42\".",
                );
            }
            None => match self.find_exam(name, klass).await {
                Ok(Some(found)) => found,
                Ok(None) => {
                    let wanted = [name, klass.map(|k| format!("for {k}")).as_deref()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                    return Outcome::new(
                        TurnStatus::ResolutionFailure,
                        format!(
                            "I couldn't find an exam matching \"{wanted}\". Tell me the exam id, e.g. \"publish exam 42\"."
                        ),
                    );
                }
                Err(error) => return self.remote_failure("look up that exam", &error.user_message()),
            },
        };

        let pending = PendingAction::PublishExam { id, label };
        self.ask_confirmation(pending, IntentKind::PublishExam)
    }

    /// Exam by name and class hint: the first match, or the first whose class contains the hint.
    async fn find_exam(
        &self,
        name: Option<&str>,
        klass: Option<&str>,
    ) -> Result<Option<(u64, String)>, crate::error::BackendError> {
        let exams = self.backend.query(ResourceKind::Exam, name.or(klass)).await?;
        let hint = klass.map(str::to_lowercase);
        let chosen = match &hint {
            Some(hint) => exams.iter().find(|exam| {
                record_class_name(exam).is_some_and(|class| class.to_lowercase().contains(hint.as_str()))
            }),
            None => exams.first(),
        };
        Ok(chosen.and_then(|exam| Some((record_id(exam)?, record_label(ResourceKind::Exam, exam)))))
    }

    /// Best label for a record we only know by id.
    fn known_label(&self, kind: ResourceKind, id: u64, memory: &ConversationMemory) -> String {
        if let Some(hit) = memory
            .last_results()
            .iter()
            .find(|r| r.kind == kind && r.id == id)
        {
            return hit.label.clone();
        }
        match memory.last_exam_name() {
            Some(name) if kind == ResourceKind::Exam && memory.last_exam_id() == Some(id) => {
                format!("{name} (#{id})")
            }
            _ => format!("#{id}"),
        }
    }

    fn ask_delete(&self, resource: ResourceKind, id: u64, memory: &ConversationMemory) -> Outcome {
        let label = self.known_label(resource, id, memory);
        self.ask_confirmation(
            PendingAction::Delete {
                resource,
                id,
                label,
            },
            IntentKind::Delete,
        )
    }

    fn ask_confirmation(&self, pending: PendingAction, kind: IntentKind) -> Outcome {
        let question = match &pending {
            PendingAction::PublishExam { label, .. } => {
                format!("Publish exam {label}? Students and parents will see its results.")
            }
            PendingAction::Delete {
                resource, label, ..
            } => format!("Delete {resource} {label}? This cannot be undone."),
        };
        Outcome::new(TurnStatus::AwaitingConfirmation, question)
            .chips(["yes", "no"])
            .remember(MemoryPatch {
                pending_confirm: Some(Some(pending)),
                push_intent: Some(kind),
                ..MemoryPatch::default()
            })
    }

    /// The user said yes to a pending action.
    pub async fn confirm(&self, pending: PendingAction, memory: &ConversationMemory) -> Outcome {
        match pending {
            PendingAction::PublishExam { id, label } => {
                match self.backend.publish_exam(id).await {
                    Ok(()) => {
                        tracing::info!(exam_id = id, "exam published");
                        Outcome::ok(format!("Published exam {label}.")).remember(MemoryPatch {
                            pending_confirm: Some(None),
                            last_exam_id: Some(id),
                            last_resource: Some(ResourceRef {
                                kind: ResourceKind::Exam,
                                id,
                            }),
                            ..MemoryPatch::default()
                        })
                    }
                    Err(error) => self
                        .remote_failure(&format!("publish exam {label}"), &error.user_message())
                        .remember(MemoryPatch::clear_pending()),
                }
            }
            PendingAction::Delete {
                resource,
                id,
                label,
            } => match self.backend.delete(resource, id).await {
                Ok(()) => {
                    tracing::info!(resource = resource.as_str(), id, "record deleted");
                    let remaining = memory
                        .last_results()
                        .iter()
                        .filter(|r| !(r.kind == resource && r.id == id))
                        .cloned()
                        .collect();
                    Outcome::ok(format!("Deleted {resource} {label}.")).remember(MemoryPatch {
                        pending_confirm: Some(None),
                        last_resource: Some(ResourceRef { kind: resource, id }),
                        last_results: Some(remaining),
                        ..MemoryPatch::default()
                    })
                }
                Err(error) => self
                    .remote_failure(&format!("delete {resource} {label}"), &error.user_message())
                    .remember(MemoryPatch::clear_pending()),
            },
        }
    }

    /// The user said no to a pending action. Only the pending slot is cleared.
    pub fn decline(&self) -> Outcome {
        Outcome::ok(self.phrases.pick(phrases::DECLINED)).remember(MemoryPatch::clear_pending())
    }

    async fn search(&self, scope: ResourceKind, q: &str) -> Outcome {
        if q.trim().is_empty() {
            return Outcome::new(
                TurnStatus::ResolutionFailure,
                format!("What should I look for in {}? For example \"find john in students\".", scope.plural()),
            );
        }
        let records = match self.backend.query(scope, Some(q)).await {
            Ok(records) => records,
            Err(error) => return self.remote_failure(&format!("search {}", scope.plural()), &error.user_message()),
        };

        let results: Vec<_> = records
            .iter()
            .filter_map(|record| result_ref(scope, record))
            .take(MAX_LISTED_RESULTS)
            .collect();
        let mut patch = MemoryPatch {
            last_search: Some(LastSearch {
                scope,
                q: q.to_string(),
            }),
            last_results: Some(results.clone()),
            push_intent: Some(IntentKind::Search),
            ..MemoryPatch::default()
        };

        if results.is_empty() {
            return Outcome::ok(format!("No {} match \"{q}\".", scope.plural())).remember(patch);
        }

        let mut chips = Vec::new();
        if let [only] = records.as_slice() {
            if let Some(id) = record_id(only) {
                patch.last_resource = Some(ResourceRef { kind: scope, id });
                if scope == ResourceKind::Exam {
                    patch.last_exam_id = Some(id);
                    patch.last_exam_name = only
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    patch.last_class_name = record_class_name(only);
                    chips.push("publish it".to_string());
                }
            }
        }

        let mut lines = vec![if records.len() > results.len() {
            format!(
                "Found {} {} matching \"{q}\", showing the first {}:",
                records.len(),
                scope.plural(),
                results.len()
            )
        } else {
            format!("Found {} matching \"{q}\":", count_noun(results.len(), scope))
        }];
        lines.extend(
            results
                .iter()
                .enumerate()
                .map(|(i, hit)| format!("{}. {}", i + 1, hit.label)),
        );
        Outcome::ok(lines.join("\n")).chips(chips).remember(patch)
    }

    fn start_flow(&self, state: FlowState) -> Outcome {
        let kind = state.kind;
        let text = flow_prompt(&state, &format!("Let's add a {}.", kind.title()));
        let intent = match kind {
            FlowKind::CreateExam => IntentKind::CreateExam,
            FlowKind::AddStudent => IntentKind::AddStudent,
        };
        Outcome::ok(text)
            .chips(["cancel"])
            .flow(FlowCommand::Start(state))
            .remember(MemoryPatch::intent(intent))
    }

    /// Reply after a flow turn that did not submit.
    pub fn continue_flow(&self, state: &FlowState, filled: &[&'static str]) -> Outcome {
        let lead = if filled.is_empty() {
            "I didn't pick up any new details."
        } else {
            "Got it."
        };
        Outcome::ok(flow_prompt(state, lead)).chips(["submit", "cancel"])
    }

    pub fn cancel_flow(&self) -> Outcome {
        Outcome::ok(self.phrases.pick(phrases::CANCELLED)).flow(FlowCommand::Clear)
    }

    /// Validate and create the flow's record. Failures keep the flow active.
    pub async fn submit_flow(&self, state: &FlowState) -> Outcome {
        match state.submit(self.backend).await {
            Ok(created) => {
                let id = record_id(&created);
                let label = record_label(state.kind.resource(), &created);
                let mut patch = MemoryPatch::intent(match state.kind {
                    FlowKind::CreateExam => IntentKind::CreateExam,
                    FlowKind::AddStudent => IntentKind::AddStudent,
                });
                if let Some(id) = id {
                    patch.last_resource = Some(ResourceRef {
                        kind: state.kind.resource(),
                        id,
                    });
                }
                if state.kind == FlowKind::CreateExam {
                    patch.last_exam_id = id;
                    patch.last_exam_name = state.get("name").map(str::to_string);
                    patch.last_class_name = state.get("class_name").map(str::to_string);
                }
                let chips: &[&str] = match state.kind {
                    FlowKind::CreateExam => &["publish it"],
                    FlowKind::AddStudent => &[],
                };
                Outcome::ok(format!("Created {} {label}.", state.kind.resource()))
                    .chips(chips.iter().copied())
                    .flow(FlowCommand::Clear)
                    .remember(patch)
            }
            Err(FlowError::MissingFields(missing)) => Outcome::new(
                TurnStatus::ValidationFailure,
                format!("I still need the {} before I can save this.", missing.join(", ")),
            ),
            Err(FlowError::UnresolvedClass(name)) => Outcome::new(
                TurnStatus::ValidationFailure,
                format!("I couldn't find a class called \"{name}\". Check the class name and try again."),
            ),
            Err(FlowError::Remote(error)) => self.remote_failure(
                &format!("save the {}", state.kind.title()),
                &format!("{}. Your answers are kept; say \"submit\" to try again", error.user_message()),
            ),
        }
    }

    async fn send_arrears(
        &self,
        min_balance: f64,
        klass: Option<String>,
        channels: Channels,
        message: Option<String>,
    ) -> Outcome {
        if !can_send_arrears(self.identity) {
            return Outcome::new(
                TurnStatus::PolicyDenied,
                "Only admin or finance staff can send fee reminders.",
            );
        }

        let campaign = ArrearsCampaign {
            message: message.unwrap_or_else(|| DEFAULT_ARREARS_MESSAGE.to_string()),
            klass,
            min_balance,
            send_in_app: channels.inapp,
            send_sms: channels.sms,
            send_email: channels.email,
            email_subject: ARREARS_EMAIL_SUBJECT.to_string(),
        };
        let id = match self.backend.create_campaign(&campaign).await {
            Ok(id) => id,
            Err(error) => return self.remote_failure("create the fee reminder campaign", &error.user_message()),
        };
        let sent = match self.backend.send_campaign(id).await {
            Ok(sent) => sent,
            Err(error) => {
                return self.remote_failure(
                    &format!("send campaign #{id}"),
                    &format!("{}. The campaign was created; you can send it from the arrears page", error.user_message()),
                );
            }
        };
        tracing::info!(campaign_id = id, "fee arrears campaign sent");

        let audience = match &campaign.klass {
            Some(klass) => format!("parents in {klass}"),
            None => "parents".to_string(),
        };
        let text = match sent.get("recipients").and_then(Value::as_u64) {
            Some(count) => format!(
                "Fee reminders are on their way to {count} {audience} with balances of at least {min_balance}."
            ),
            None => format!("Fee reminder campaign #{id} was sent to {audience} with balances of at least {min_balance}."),
        };
        Outcome::ok(text).remember(MemoryPatch::intent(IntentKind::SendArrears))
    }

    async fn unknown(&self, raw: &str, memory: &ConversationMemory) -> Outcome {
        let text = normalize(raw).text;
        if PUBLISH_IT_RE.is_match(&text) {
            return match memory.last_exam_id() {
                Some(id) => self.publish_exam(Some(id), None, None, memory).await,
                None => Outcome::new(
                    TurnStatus::ResolutionFailure,
                    "I'm not sure which exam you mean. Try \"publish exam 42\".",
                ),
            };
        }
        if DELETE_IT_RE.is_match(&text) {
            return match memory.last_resource() {
                Some(resource) => self.ask_delete(resource.kind, resource.id, memory),
                None => Outcome::new(
                    TurnStatus::ResolutionFailure,
                    "I'm not sure what \"it\" refers to. Try \"delete student 123\".",
                ),
            };
        }

        let lead = self.phrases.pick(phrases::NOT_UNDERSTOOD);
        Outcome::new(
            TurnStatus::ClassificationMiss,
            format!("{lead} Try \"open exams\", \"find john in students\" or \"publish exam 42\"."),
        )
        .chips(["help"])
        .remember(MemoryPatch::intent(IntentKind::Unknown))
    }

    fn remote_failure(&self, action: &str, detail: &str) -> Outcome {
        tracing::warn!(action, detail, "school service call failed");
        Outcome::new(
            TurnStatus::RemoteFailure,
            format!("I couldn't {action}: {detail}."),
        )
    }
}

fn count_noun(count: usize, kind: ResourceKind) -> String {
    if count == 1 {
        format!("1 {}", kind.as_str())
    } else {
        format!("{count} {}", kind.plural())
    }
}

/// "<lead> So far: ... What is the <slot>?" or a ready-to-submit prompt.
fn flow_prompt(state: &FlowState, lead: &str) -> String {
    let mut text = lead.to_string();
    let summary = state.summary();
    if !summary.is_empty() {
        text.push_str(&format!(" So far: {summary}."));
    }
    match state.prompt_slot() {
        Some(slot) => text.push_str(&format!(" What is the {}?", slot.label)),
        None => text.push_str(" I have everything I need. Say \"submit\" to save, or change any field."),
    }
    text
}
