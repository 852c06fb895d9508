use super::{execute_plan, Document, Reconcile, ReconcileContext};
use crate::acl_algebra::{diff_patch_intersection, explode, merge_groups};
use crate::actions::{Action, ActionPlan};
use crate::cluster::ClusterAdmin;
use crate::models::*;
use crate::options::ApplyOptions;
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AclRemote {
    pub groups: Vec<AclEntryGroup>,
}

pub struct AclReconciler<'a, A: ?Sized> {
    context: ReconcileContext<'a, A>,
    document: Document<'a>,
}

impl<'a, A: ClusterAdmin + ?Sized> AclReconciler<'a, A> {
    pub fn new(context: ReconcileContext<'a, A>, document: Document<'a>) -> Self {
        Self { context, document }
    }
}

/// Sorted atomic entries, compacted for display
fn grouped(mut entries: Vec<AclEntry>) -> Vec<AclEntryGroup> {
    entries.sort();
    let atomic: Vec<AclEntryGroup> = entries.into_iter().map(AclEntryGroup::from).collect();
    merge_groups(&atomic)
}

fn acl_view(spec: &AclSpec, entries: Vec<AclEntry>) -> Value {
    json!({
        "resourceType": spec.resource_type,
        "patternType": spec.pattern_type,
        "acls": grouped(entries),
    })
}

fn pending_deletes(plan: &ActionPlan) -> Vec<AclEntry> {
    plan.actions
        .iter()
        .filter_map(|action| match action {
            Action::DeleteAcls { entries, .. } => Some(entries.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[async_trait]
impl<'a, A: ClusterAdmin + ?Sized> Reconcile for AclReconciler<'a, A> {
    type Spec = AclSpec;
    type Remote = AclRemote;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Acl
    }

    fn document(&self) -> Document<'_> {
        self.document
    }

    fn options(&self) -> &ApplyOptions {
        self.context.options
    }

    fn validate(&self, definition: &ResourceDefinition<AclSpec>) -> Result<()> {
        definition.spec.validate()
    }

    async fn fetch(&self, definition: &ResourceDefinition<AclSpec>) -> Result<AclRemote> {
        let resource = definition.spec.resource(definition.name());
        let groups = self
            .context
            .admin
            .describe_acls(&resource)
            .await
            .map_err(ReconcileError::fetch(format!(
                "ACLs of {} {}",
                resource.resource_type, resource.name
            )))?;
        Ok(AclRemote { groups })
    }

    fn cross_validate(&self, _definition: &ResourceDefinition<AclSpec>, _remote: &AclRemote) -> Result<()> {
        Ok(())
    }

    fn build_ops(&self, definition: &ResourceDefinition<AclSpec>, remote: &AclRemote) -> Result<ActionPlan> {
        let spec = &definition.spec;
        let resource = spec.resource(definition.name());
        let (missing, _) = diff_patch_intersection(&spec.acls, &remote.groups);
        let (extra, _) = diff_patch_intersection(&remote.groups, &spec.acls);

        let mut plan = ActionPlan::default();
        if !missing.is_empty() {
            plan.push(Action::CreateAcls {
                resource: resource.clone(),
                entries: missing,
            });
        }
        if extra.is_empty() {
            return Ok(plan);
        }
        if spec.delete_undefined_acls {
            plan.push(Action::DeleteAcls {
                resource,
                entries: extra,
            });
        } else {
            warn!(
                resource = %resource.name,
                count = extra.len(),
                "ACL entries not in the definition are left in place; set deleteUndefinedAcls to remove them"
            );
        }
        Ok(plan)
    }

    fn views(&self, definition: &ResourceDefinition<AclSpec>, remote: &AclRemote, plan: &ActionPlan) -> (Value, Value) {
        let spec = &definition.spec;
        let (_, mut shown) = diff_patch_intersection(&remote.groups, &spec.acls);
        shown.extend(pending_deletes(plan));
        (acl_view(spec, shown), acl_view(spec, explode(&spec.acls)))
    }

    async fn execute_ops(
        &self,
        _definition: &ResourceDefinition<AclSpec>,
        _remote: &AclRemote,
        plan: &ActionPlan,
    ) -> Result<Value> {
        execute_plan(self.context.admin, plan, self.context.options.validate_only).await?;
        Ok(Value::Null)
    }
}
