use super::{
    check_read_only, execute_plan, pending_deletions, plan_config_changes, resolve_incremental,
    Document, Reconcile, ReconcileContext,
};
use crate::actions::ActionPlan;
use crate::cluster::{ClusterAdmin, ConfigResource};
use crate::diff::config_view;
use crate::models::*;
use crate::options::ApplyOptions;
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Which broker config resource a definition targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerTarget {
    /// One broker, named by its id
    Single,
    /// The dynamic default shared by every broker
    ClusterDefault,
}

#[derive(Debug, Clone)]
pub struct BrokerRemote {
    pub brokers: Vec<ClusterBroker>,
    pub configs: Vec<ConfigEntry>,
    pub incremental: bool,
}

pub struct BrokerReconciler<'a, A: ?Sized> {
    context: ReconcileContext<'a, A>,
    document: Document<'a>,
    target: BrokerTarget,
}

impl<'a, A: ClusterAdmin + ?Sized> BrokerReconciler<'a, A> {
    pub fn new(context: ReconcileContext<'a, A>, document: Document<'a>, target: BrokerTarget) -> Self {
        Self {
            context,
            document,
            target,
        }
    }

    fn resource(&self, name: &str) -> Result<ConfigResource> {
        match self.target {
            BrokerTarget::ClusterDefault => Ok(ConfigResource::broker_default()),
            BrokerTarget::Single => name
                .trim()
                .parse::<BrokerId>()
                .map(ConfigResource::broker)
                .map_err(|_| ReconcileError::Validation(format!("broker name '{}' is not a broker id", name))),
        }
    }

    fn own_source(&self) -> ConfigSource {
        match self.target {
            BrokerTarget::Single => ConfigSource::DynamicBrokerConfig,
            BrokerTarget::ClusterDefault => ConfigSource::DynamicDefaultBrokerConfig,
        }
    }
}

#[async_trait]
impl<'a, A: ClusterAdmin + ?Sized> Reconcile for BrokerReconciler<'a, A> {
    type Spec = BrokerSpec;
    type Remote = BrokerRemote;

    fn kind(&self) -> ResourceKind {
        match self.target {
            BrokerTarget::Single => ResourceKind::Broker,
            BrokerTarget::ClusterDefault => ResourceKind::Brokers,
        }
    }

    fn document(&self) -> Document<'_> {
        self.document
    }

    fn options(&self) -> &ApplyOptions {
        self.context.options
    }

    fn validate(&self, definition: &ResourceDefinition<BrokerSpec>) -> Result<()> {
        self.resource(definition.name())?;
        definition.spec.validate()
    }

    async fn fetch(&self, definition: &ResourceDefinition<BrokerSpec>) -> Result<BrokerRemote> {
        let admin = self.context.admin;
        let resource = self.resource(definition.name())?;
        let metadata = admin
            .describe_metadata(Some(&[] as &[String]), false)
            .await
            .map_err(ReconcileError::fetch("cluster brokers"))?;

        let exists = resource.is_broker_default()
            || metadata.brokers.iter().any(|b| b.id.to_string() == resource.name);
        let mut remote = BrokerRemote {
            brokers: metadata.brokers,
            configs: Vec::new(),
            incremental: true,
        };
        if !exists {
            return Ok(remote);
        }

        remote.configs = admin
            .describe_configs(&resource)
            .await
            .map_err(ReconcileError::fetch(format!("configs of {}", resource)))?;
        remote.incremental = resolve_incremental(admin, self.context.options.config_alter_mode).await?;
        Ok(remote)
    }

    fn cross_validate(&self, definition: &ResourceDefinition<BrokerSpec>, remote: &BrokerRemote) -> Result<()> {
        let resource = self.resource(definition.name())?;
        if !resource.is_broker_default() && !remote.brokers.iter().any(|b| b.id.to_string() == resource.name) {
            return Err(ReconcileError::CrossValidation(format!(
                "broker {} is not part of the cluster",
                resource.name
            )));
        }
        check_read_only(&definition.spec.configs, &remote.configs)
    }

    fn build_ops(&self, definition: &ResourceDefinition<BrokerSpec>, remote: &BrokerRemote) -> Result<ActionPlan> {
        let spec = &definition.spec;
        let action = plan_config_changes(
            self.resource(definition.name())?,
            &spec.configs,
            &remote.configs,
            self.own_source(),
            spec.delete_undefined_configs,
            remote.incremental,
        )?;
        Ok(ActionPlan::new(action.into_iter().collect()))
    }

    fn views(
        &self,
        definition: &ResourceDefinition<BrokerSpec>,
        remote: &BrokerRemote,
        plan: &ActionPlan,
    ) -> (Value, Value) {
        let local_configs = definition.spec.set_configs();
        let keys = local_configs
            .keys()
            .map(String::as_str)
            .chain(pending_deletions(plan));
        let shown = json!({ "configs": config_view(&remote.configs, keys) });
        (shown, json!({ "configs": local_configs }))
    }

    async fn execute_ops(
        &self,
        _definition: &ResourceDefinition<BrokerSpec>,
        _remote: &BrokerRemote,
        plan: &ActionPlan,
    ) -> Result<Value> {
        execute_plan(self.context.admin, plan, self.context.options.validate_only).await?;
        Ok(Value::Null)
    }
}
