//! Collaborator seam to the school services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::BackendError;
use crate::policy::Identity;
use crate::resource::ResourceKind;

/// Body of a fee-arrears notification campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArrearsCampaign {
    pub message: String,
    pub klass: Option<String>,
    pub min_balance: f64,
    pub send_in_app: bool,
    pub send_sms: bool,
    pub send_email: bool,
    pub email_subject: String,
}

/// Query, mutation, campaign and identity services used by the dialog engine.
///
/// Every method is a suspension point; nothing else in a turn awaits.
#[async_trait]
pub trait SchoolBackend: Send + Sync {
    async fn current_identity(&self) -> Result<Identity, BackendError>;

    /// List records of `kind`, optionally narrowed by a free-text search.
    async fn query(&self, kind: ResourceKind, search: Option<&str>)
    -> Result<Vec<Value>, BackendError>;

    async fn create(&self, kind: ResourceKind, body: &Value) -> Result<Value, BackendError>;

    async fn delete(&self, kind: ResourceKind, id: u64) -> Result<(), BackendError>;

    async fn publish_exam(&self, id: u64) -> Result<(), BackendError>;

    /// Create a campaign and return its id.
    async fn create_campaign(&self, campaign: &ArrearsCampaign) -> Result<u64, BackendError>;

    async fn send_campaign(&self, id: u64) -> Result<Value, BackendError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::policy::Role;
    use crate::resource::record_id;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Identity,
        Query(ResourceKind, Option<String>),
        Create(ResourceKind, Value),
        Delete(ResourceKind, u64),
        Publish(u64),
        CreateCampaign(ArrearsCampaign),
        SendCampaign(u64),
    }

    impl Call {
        pub fn is_mutation(&self) -> bool {
            !matches!(self, Call::Identity | Call::Query(..))
        }
    }

    /// In-memory backend that records every call.
    pub struct FakeBackend {
        pub identity: Identity,
        records: HashMap<ResourceKind, Vec<Value>>,
        calls: Mutex<Vec<Call>>,
        fail_mutations: Option<BackendError>,
    }

    impl FakeBackend {
        pub fn new(role: Role) -> Self {
            Self {
                identity: Identity {
                    id: 1,
                    display_name: "Grace Wanjiru".to_string(),
                    role,
                    is_staff: false,
                    is_superuser: false,
                },
                records: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                fail_mutations: None,
            }
        }

        pub fn with_records(mut self, kind: ResourceKind, records: Vec<Value>) -> Self {
            self.records.insert(kind, records);
            self
        }

        pub fn failing_mutations(mut self, error: BackendError) -> Self {
            self.fail_mutations = Some(error);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub fn mutations(&self) -> Vec<Call> {
            self.calls().into_iter().filter(Call::is_mutation).collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn mutation(&self, call: Call) -> Result<(), BackendError> {
            self.record(call);
            match &self.fail_mutations {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    fn matches_search(record: &Value, q: &str) -> bool {
        let q = q.to_lowercase();
        match record {
            Value::Object(map) => map.values().any(|value| match value {
                Value::String(s) => s.to_lowercase().contains(&q),
                Value::Object(_) => matches_search(value, &q),
                _ => false,
            }),
            _ => false,
        }
    }

    #[async_trait]
    impl SchoolBackend for FakeBackend {
        async fn current_identity(&self) -> Result<Identity, BackendError> {
            self.record(Call::Identity);
            Ok(self.identity.clone())
        }

        async fn query(
            &self,
            kind: ResourceKind,
            search: Option<&str>,
        ) -> Result<Vec<Value>, BackendError> {
            self.record(Call::Query(kind, search.map(str::to_string)));
            let records = self.records.get(&kind).cloned().unwrap_or_default();
            Ok(match search {
                Some(q) if !q.trim().is_empty() => records
                    .into_iter()
                    .filter(|record| matches_search(record, q.trim()))
                    .collect(),
                _ => records,
            })
        }

        async fn create(&self, kind: ResourceKind, body: &Value) -> Result<Value, BackendError> {
            self.mutation(Call::Create(kind, body.clone()))?;
            let mut created = body.clone();
            let next_id = self
                .records
                .get(&kind)
                .map(|records| records.iter().filter_map(record_id).max().unwrap_or(0) + 1)
                .unwrap_or(100);
            created["id"] = Value::from(next_id);
            Ok(created)
        }

        async fn delete(&self, kind: ResourceKind, id: u64) -> Result<(), BackendError> {
            self.mutation(Call::Delete(kind, id))
        }

        async fn publish_exam(&self, id: u64) -> Result<(), BackendError> {
            self.mutation(Call::Publish(id))
        }

        async fn create_campaign(&self, campaign: &ArrearsCampaign) -> Result<u64, BackendError> {
            self.mutation(Call::CreateCampaign(campaign.clone()))?;
            Ok(77)
        }

        async fn send_campaign(&self, id: u64) -> Result<Value, BackendError> {
            self.mutation(Call::SendCampaign(id))?;
            Ok(serde_json::json!({"queued": true, "recipients": 12}))
        }
    }
}
