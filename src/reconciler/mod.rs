//! Reconciliation of one definition against the live cluster.
//!
//! Every resource kind goes through the same sequence: parse, validate,
//! fetch remote state, cross-validate, build actions, diff, then execute
//! (unless nothing changed or this is a dry run). The per-kind logic lives
//! behind [`Reconcile`]; [`run_reconcile`] drives the sequence and
//! assembles the [`ApplyResult`] once at the end.

use crate::actions::{Action, ActionPlan};
use crate::cluster::{ApiKey, ClusterAdmin, ConfigResource};
use crate::config_ops::{build_config_ops, check_deletions_allowed, config_values, has_effective_changes};
use crate::diff::definition_diff;
use crate::models::{
    ConfigEntry, ConfigSource, DefinitionHeader, DocumentFormat, ResourceDefinition, ResourceKind,
    KNOWN_API_VERSIONS,
};
use crate::options::{ApplyOptions, ConfigAlterMode};
use crate::reassignment::PollClock;
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

// Module declarations
mod acl;
mod broker;
mod topic;

// Re-exports
pub use acl::{AclReconciler, AclRemote};
pub use broker::{BrokerReconciler, BrokerRemote, BrokerTarget};
pub use topic::{TopicReconciler, TopicRemote};

/// A serialized definition and its format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    pub text: &'a str,
    pub format: DocumentFormat,
}

impl<'a> Document<'a> {
    pub fn yaml(text: &'a str) -> Self {
        Self {
            text,
            format: DocumentFormat::Yaml,
        }
    }

    pub fn json(text: &'a str) -> Self {
        Self {
            text,
            format: DocumentFormat::Json,
        }
    }
}

/// What every reconciler needs from its caller
pub struct ReconcileContext<'a, A: ?Sized> {
    pub admin: &'a A,
    pub options: &'a ApplyOptions,
    pub clock: &'a dyn PollClock,
}

impl<A: ?Sized> Clone for ReconcileContext<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized> Copy for ReconcileContext<'_, A> {}

impl<'a, A: ?Sized> ReconcileContext<'a, A> {
    pub fn new(admin: &'a A, options: &'a ApplyOptions, clock: &'a dyn PollClock) -> Self {
        Self {
            admin,
            options,
            clock,
        }
    }
}

/// Per-kind hooks of the reconciliation sequence
#[async_trait]
pub trait Reconcile: Send + Sync {
    type Spec: DeserializeOwned + Serialize + Send + Sync;
    type Remote: Send + Sync;

    fn kind(&self) -> ResourceKind;

    fn document(&self) -> Document<'_>;

    fn options(&self) -> &ApplyOptions;

    /// Field-level checks of the definition alone
    fn validate(&self, definition: &ResourceDefinition<Self::Spec>) -> Result<()>;

    /// Remote state of exactly the defined resource
    async fn fetch(&self, definition: &ResourceDefinition<Self::Spec>) -> Result<Self::Remote>;

    /// Checks of the definition against the fetched cluster state
    fn cross_validate(&self, definition: &ResourceDefinition<Self::Spec>, remote: &Self::Remote) -> Result<()>;

    /// Actions that converge the cluster; empty when nothing would change
    fn build_ops(&self, definition: &ResourceDefinition<Self::Spec>, remote: &Self::Remote) -> Result<ActionPlan>;

    /// `(remote, local)` views to diff, restricted to what the definition
    /// or a pending action refers to
    fn views(
        &self,
        definition: &ResourceDefinition<Self::Spec>,
        remote: &Self::Remote,
        plan: &ActionPlan,
    ) -> (Value, Value);

    /// Run the actions; returns kind-specific data for the result
    async fn execute_ops(
        &self,
        definition: &ResourceDefinition<Self::Spec>,
        remote: &Self::Remote,
        plan: &ActionPlan,
    ) -> Result<Value>;
}

/// Outcome of reconciling one definition
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub kind: String,
    pub name: String,
    pub local: Value,
    pub remote: Value,
    pub diff: String,
    pub actions: Vec<String>,
    pub error: Option<String>,
    pub applied: bool,
    pub data: Value,
    #[serde(skip)]
    pub failure: Option<ReconcileError>,
}

impl ApplyResult {
    /// A definition rejected before any reconciler was chosen
    pub fn rejected(kind: &str, name: &str, error: ReconcileError) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            local: Value::Null,
            remote: Value::Null,
            diff: String::new(),
            actions: Vec::new(),
            error: Some(error.to_string()),
            applied: false,
            data: Value::Null,
            failure: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn has_changes(&self) -> bool {
        !self.diff.is_empty()
    }
}

struct Views {
    local: Value,
    remote: Value,
    diff: String,
    actions: Vec<String>,
}

struct Completed {
    name: String,
    views: Views,
    applied: bool,
    data: Value,
}

struct Failed {
    error: ReconcileError,
    views: Option<Views>,
}

impl From<ReconcileError> for Failed {
    fn from(error: ReconcileError) -> Self {
        Self { error, views: None }
    }
}

fn check_header<S>(definition: &ResourceDefinition<S>, expected: ResourceKind) -> Result<()> {
    if definition.kind != expected {
        return Err(ReconcileError::Parse(format!(
            "expected a {} definition, got {}",
            expected, definition.kind
        )));
    }
    let known = KNOWN_API_VERSIONS
        .iter()
        .any(|(kind, version)| *kind == definition.kind && *version == definition.api_version);
    if !known {
        return Err(ReconcileError::UnknownApiVersion {
            kind: definition.kind.to_string(),
            api_version: definition.api_version.clone(),
        });
    }
    if definition.name().trim().is_empty() {
        return Err(ReconcileError::Validation("metadata.name must not be empty".to_string()));
    }
    Ok(())
}

async fn drive<R: Reconcile + ?Sized>(reconciler: &R) -> std::result::Result<Completed, Failed> {
    let kind = reconciler.kind();
    let document = reconciler.document();

    let definition: ResourceDefinition<R::Spec> = ResourceDefinition::parse(document.text, document.format)?;
    check_header(&definition, kind)?;
    let name = definition.name().to_string();
    debug!(kind = %kind, name = %name, "Definition parsed");

    reconciler.validate(&definition)?;
    let remote = reconciler.fetch(&definition).await?;
    debug!(kind = %kind, name = %name, "Remote state fetched");
    reconciler.cross_validate(&definition, &remote)?;

    let plan = reconciler.build_ops(&definition, &remote)?;
    let (remote_view, local_view) = reconciler.views(&definition, &remote, &plan);
    let diff = definition_diff(&remote_view, &local_view);
    let views = Views {
        local: local_view,
        remote: remote_view,
        diff,
        actions: plan.actions.iter().map(Action::description).collect(),
    };
    debug!(kind = %kind, name = %name, actions = plan.actions.len(), "Actions built");

    if views.diff.is_empty() != plan.is_empty() {
        let error = ReconcileError::Consistency(format!(
            "{} {} has {} pending actions but {} diff",
            kind,
            name,
            plan.actions.len(),
            if views.diff.is_empty() { "an empty" } else { "a non-empty" }
        ));
        return Err(Failed {
            error,
            views: Some(views),
        });
    }

    if plan.is_empty() {
        info!(kind = %kind, name = %name, "No changes");
        return Ok(Completed {
            name,
            views,
            applied: false,
            data: Value::Null,
        });
    }
    if reconciler.options().dry_run {
        info!(kind = %kind, name = %name, summary = %plan.summary(), "Dry run, not applying");
        return Ok(Completed {
            name,
            views,
            applied: false,
            data: Value::Null,
        });
    }

    match reconciler.execute_ops(&definition, &remote, &plan).await {
        Ok(data) => {
            info!(kind = %kind, name = %name, summary = %plan.summary(), "Applied");
            Ok(Completed {
                name,
                views,
                applied: true,
                data,
            })
        }
        Err(error) => Err(Failed {
            error,
            views: Some(views),
        }),
    }
}

/// Reconcile one definition; failures are reported in the result
pub async fn run_reconcile<R: Reconcile + ?Sized>(reconciler: &R) -> ApplyResult {
    let kind = reconciler.kind();
    match drive(reconciler).await {
        Ok(done) => ApplyResult {
            kind: kind.to_string(),
            name: done.name,
            local: done.views.local,
            remote: done.views.remote,
            diff: done.views.diff,
            actions: done.views.actions,
            error: None,
            applied: done.applied,
            data: done.data,
            failure: None,
        },
        Err(failed) => {
            let document = reconciler.document();
            let name = DefinitionHeader::parse(document.text, document.format)
                .map(|header| header.metadata.name)
                .unwrap_or_default();
            let views = failed.views.unwrap_or(Views {
                local: Value::Null,
                remote: Value::Null,
                diff: String::new(),
                actions: Vec::new(),
            });
            ApplyResult {
                kind: kind.to_string(),
                name,
                local: views.local,
                remote: views.remote,
                diff: views.diff,
                actions: views.actions,
                error: Some(failed.error.to_string()),
                applied: false,
                data: Value::Null,
                failure: Some(failed.error),
            }
        }
    }
}

/// Whether config alterations go out incrementally
pub(crate) async fn resolve_incremental<A: ClusterAdmin + ?Sized>(
    admin: &A,
    mode: ConfigAlterMode,
) -> Result<bool> {
    if mode == ConfigAlterMode::NonIncremental {
        return Ok(false);
    }
    let supported = admin
        .probe_support(ApiKey::IncrementalAlterConfigs)
        .await
        .map_err(ReconcileError::fetch("supported API versions"))?;
    if mode == ConfigAlterMode::Incremental && !supported {
        return Err(ReconcileError::UnsupportedApi(format!(
            "{} is required but not supported by the cluster",
            ApiKey::IncrementalAlterConfigs
        )));
    }
    Ok(supported)
}

/// Send every action of `plan` in order, stopping at the first failure
pub(crate) async fn execute_plan<A: ClusterAdmin + ?Sized>(
    admin: &A,
    plan: &ActionPlan,
    validate_only: bool,
) -> Result<()> {
    for action in &plan.actions {
        info!(action = %action.description(), validate_only, "Executing");
        match action {
            Action::CreateTopic(request) => admin
                .create_topic(request, validate_only)
                .await
                .map_err(ReconcileError::execution(format!("create topic {}", request.name)))?,
            Action::AlterConfigs {
                resource,
                ops,
                incremental,
            } => admin
                .alter_configs(resource, ops, *incremental, validate_only)
                .await
                .map_err(ReconcileError::execution(format!("alter configs of {}", resource)))?,
            Action::CreatePartitions {
                topic,
                count,
                new_assignments,
            } => admin
                .create_partitions(topic, *count, new_assignments, validate_only)
                .await
                .map_err(ReconcileError::execution(format!("add partitions to topic {}", topic)))?,
            // no validate-only flavour exists for the remaining calls
            _ if validate_only => debug!(action = %action.description(), "Skipped in validate-only mode"),
            Action::AlterAssignments { topic, rows, .. } => admin
                .alter_partition_assignments(topic, rows)
                .await
                .map_err(ReconcileError::execution(format!("reassign partitions of topic {}", topic)))?,
            Action::CreateAcls { resource, entries } => admin
                .create_acls(resource, entries)
                .await
                .map_err(ReconcileError::execution(format!("create ACLs on {}", resource.name)))?,
            Action::DeleteAcls { resource, entries } => admin
                .delete_acls(resource, entries)
                .await
                .map_err(ReconcileError::execution(format!("delete ACLs on {}", resource.name)))?,
        }
    }
    Ok(())
}

/// Config alteration for `resource`, or `None` when nothing effective
/// would change. Only entries from `own_source` are candidates for
/// deletion.
pub(crate) fn plan_config_changes(
    resource: ConfigResource,
    local: &BTreeMap<String, Option<String>>,
    entries: &[ConfigEntry],
    own_source: ConfigSource,
    delete_undefined: bool,
    incremental: bool,
) -> Result<Option<Action>> {
    let remote_values = config_values(entries);
    let own: Vec<ConfigEntry> = entries
        .iter()
        .filter(|entry| entry.source == own_source)
        .cloned()
        .collect();
    let ops = build_config_ops(local, &remote_values, &own, delete_undefined, !incremental);
    if !has_effective_changes(&ops, &remote_values) {
        return Ok(None);
    }
    check_deletions_allowed(&ops, local, delete_undefined)?;
    Ok(Some(Action::AlterConfigs {
        resource,
        ops,
        incremental,
    }))
}

/// Reject local values for keys the cluster reports as read-only
pub(crate) fn check_read_only(
    local: &BTreeMap<String, Option<String>>,
    entries: &[ConfigEntry],
) -> Result<()> {
    let blocked: Vec<&str> = entries
        .iter()
        .filter(|entry| entry.read_only)
        .filter(|entry| matches!(local.get(&entry.name), Some(Some(value)) if entry.value.as_ref() != Some(value)))
        .map(|entry| entry.name.as_str())
        .collect();
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::CrossValidation(format!(
            "read-only configs cannot be set: {}",
            blocked.join(", ")
        )))
    }
}

/// Keys the plan deletes, shown in the remote view
pub(crate) fn pending_deletions(plan: &ActionPlan) -> Vec<&str> {
    plan.actions
        .iter()
        .filter_map(|action| match action {
            Action::AlterConfigs { ops, .. } => Some(ops),
            _ => None,
        })
        .flatten()
        .filter(|op| op.is_delete())
        .map(|op| op.name.as_str())
        .collect()
}

/// Closed set of reconcilers, chosen once from the definition header
pub enum ResourceReconciler<'a, A: ?Sized> {
    Topic(TopicReconciler<'a, A>),
    Broker(BrokerReconciler<'a, A>),
    Brokers(BrokerReconciler<'a, A>),
    Acl(AclReconciler<'a, A>),
}

impl<'a, A: ClusterAdmin + ?Sized> ResourceReconciler<'a, A> {
    /// Pick the reconciler for `document`, rejecting unknown kinds and
    /// api versions before any remote call
    pub fn for_document(context: ReconcileContext<'a, A>, document: Document<'a>) -> Result<Self> {
        let header = DefinitionHeader::parse(document.text, document.format)?;
        Ok(match header.resource_kind()? {
            ResourceKind::Topic => ResourceReconciler::Topic(TopicReconciler::new(context, document)),
            ResourceKind::Broker => {
                ResourceReconciler::Broker(BrokerReconciler::new(context, document, BrokerTarget::Single))
            }
            ResourceKind::Brokers => ResourceReconciler::Brokers(BrokerReconciler::new(
                context,
                document,
                BrokerTarget::ClusterDefault,
            )),
            ResourceKind::Acl => ResourceReconciler::Acl(AclReconciler::new(context, document)),
        })
    }

    pub async fn execute(&self) -> ApplyResult {
        match self {
            ResourceReconciler::Topic(reconciler) => run_reconcile(reconciler).await,
            ResourceReconciler::Broker(reconciler) | ResourceReconciler::Brokers(reconciler) => {
                run_reconcile(reconciler).await
            }
            ResourceReconciler::Acl(reconciler) => run_reconcile(reconciler).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::reassignment::ManualClock;

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_api_version() {
        let cluster = MockCluster::with_brokers(1);
        let options = ApplyOptions::default();
        let clock = ManualClock::new();
        let context = ReconcileContext::new(&cluster, &options, &clock);
        let yaml = "apiVersion: v2\nkind: topic\nmetadata:\n  name: events\nspec:\n  partitions: 1\n  replicationFactor: 1\n";
        let result = ResourceReconciler::for_document(context, Document::yaml(yaml));
        assert!(matches!(result, Err(ReconcileError::UnknownApiVersion { .. })));
        assert!(cluster.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_parse_error() {
        let cluster = MockCluster::with_brokers(1);
        let options = ApplyOptions::default();
        let clock = ManualClock::new();
        let context = ReconcileContext::new(&cluster, &options, &clock);
        let yaml = "apiVersion: v1\nkind: broker\nmetadata:\n  name: events\nspec:\n  partitions: 1\n  replicationFactor: 1\n";
        let result = run_reconcile(&TopicReconciler::new(context, Document::yaml(yaml))).await;
        assert!(matches!(result.failure, Some(ReconcileError::Parse(_))));
        assert_eq!(result.name, "events");
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let cluster = MockCluster::with_brokers(1);
        let options = ApplyOptions::default();
        let clock = ManualClock::new();
        let context = ReconcileContext::new(&cluster, &options, &clock);
        let yaml = "apiVersion: v1\nkind: topic\nmetadata:\n  name: \"\"\nspec:\n  partitions: 1\n  replicationFactor: 1\n";
        let result = run_reconcile(&TopicReconciler::new(context, Document::yaml(yaml))).await;
        assert!(matches!(result.failure, Some(ReconcileError::Validation(_))));
        assert!(cluster.calls().await.is_empty());
    }
}
