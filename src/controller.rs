use crate::acl_algebra::{explode, merge_groups};
use crate::cluster::{ClusterAdmin, ConfigResource};
use crate::models::*;
use crate::options::ApplyOptions;
use crate::reassignment::PollClock;
use crate::reconciler::{ApplyResult, Document, ReconcileContext, ResourceReconciler};
use crate::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One input file or stream of definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub label: String,
    pub text: String,
    pub format: DocumentFormat,
}

impl DocumentSource {
    pub fn new(label: impl Into<String>, text: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            format,
        }
    }

    pub fn yaml(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(label, text, DocumentFormat::Yaml)
    }

    /// Read a definition file; the format follows the file extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::Parse(format!("cannot read definition file {}: {}", path.display(), e))
        })?;
        let format = DocumentFormat::from_extension(path.extension().and_then(|ext| ext.to_str()));
        Ok(Self::new(path.display().to_string(), text, format))
    }

    /// Individual definitions; YAML streams are split on `---`
    pub fn documents(&self) -> Result<Vec<String>> {
        match self.format {
            DocumentFormat::Json => Ok(vec![self.text.clone()]),
            DocumentFormat::Yaml => {
                let mut documents = Vec::new();
                for document in serde_yaml::Deserializer::from_str(&self.text) {
                    let value = serde_yaml::Value::deserialize(document).map_err(|e| {
                        ReconcileError::Parse(format!("invalid YAML in {}: {}", self.label, e))
                    })?;
                    if value.is_null() {
                        continue;
                    }
                    let text = serde_yaml::to_string(&value).map_err(|e| {
                        ReconcileError::Parse(format!("invalid YAML in {}: {}", self.label, e))
                    })?;
                    documents.push(text);
                }
                Ok(documents)
            }
        }
    }
}

/// Results of one apply run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ApplyResult>,
}

impl ApplyReport {
    pub fn success(&self) -> bool {
        self.results.iter().all(ApplyResult::is_success)
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.applied).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Applies definitions one at a time, in input order
pub struct ApplyController<'a, A: ?Sized> {
    context: ReconcileContext<'a, A>,
}

impl<'a, A: ClusterAdmin + ?Sized> ApplyController<'a, A> {
    pub fn new(admin: &'a A, options: &'a ApplyOptions, clock: &'a dyn PollClock) -> Self {
        Self {
            context: ReconcileContext::new(admin, options, clock),
        }
    }

    /// Reconcile every definition of `sources`. Unless `continue_on_error`
    /// is set, the first failure stops the run.
    pub async fn apply(&self, sources: &[DocumentSource]) -> ApplyReport {
        let started_at = Utc::now();
        let mut results = Vec::new();

        'sources: for source in sources {
            let documents = match source.documents() {
                Ok(documents) => documents,
                Err(error) => {
                    results.push(ApplyResult::rejected("", &source.label, error));
                    if self.context.options.continue_on_error {
                        continue;
                    }
                    break;
                }
            };
            debug!(source = %source.label, definitions = documents.len(), "Definitions loaded");

            for text in &documents {
                let result = self.apply_one(text, source.format).await;
                let failed = !result.is_success();
                if failed {
                    warn!(
                        source = %source.label,
                        kind = %result.kind,
                        name = %result.name,
                        error = result.error.as_deref().unwrap_or_default(),
                        "Definition failed"
                    );
                }
                results.push(result);
                if failed && !self.context.options.continue_on_error {
                    break 'sources;
                }
            }
        }

        let report = ApplyReport {
            started_at,
            finished_at: Utc::now(),
            results,
        };
        info!(
            definitions = report.results.len(),
            applied = report.applied(),
            failed = report.failed(),
            "Apply finished"
        );
        report
    }

    async fn apply_one(&self, text: &str, format: DocumentFormat) -> ApplyResult {
        let document = Document { text, format };
        match ResourceReconciler::for_document(self.context, document) {
            Ok(reconciler) => reconciler.execute().await,
            Err(error) => {
                let header = DefinitionHeader::parse(text, format).ok();
                let kind = header.as_ref().map(|h| h.kind.as_str()).unwrap_or_default();
                let name = header.as_ref().map(|h| h.metadata.name.as_str()).unwrap_or_default();
                ApplyResult::rejected(kind, name, error)
            }
        }
    }
}

/// Renders live cluster state as definitions
pub struct ExportController<'a, A: ?Sized> {
    admin: &'a A,
    include_assignments: bool,
}

impl<'a, A: ClusterAdmin + ?Sized> ExportController<'a, A> {
    pub fn new(admin: &'a A) -> Self {
        Self {
            admin,
            include_assignments: false,
        }
    }

    pub fn with_assignments(mut self, include: bool) -> Self {
        self.include_assignments = include;
        self
    }

    /// Dynamic configs from `source`; sensitive values cannot be read back
    /// and are left out
    async fn dynamic_configs(
        &self,
        resource: &ConfigResource,
        source: ConfigSource,
    ) -> Result<BTreeMap<String, Option<String>>> {
        let entries = self
            .admin
            .describe_configs(resource)
            .await
            .map_err(ReconcileError::fetch(format!("configs of {}", resource)))?;
        let mut configs = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| e.source == source) {
            if entry.is_sensitive {
                warn!(resource = %resource, config = %entry.name, "Sensitive config not exported");
                continue;
            }
            configs.insert(entry.name, entry.value);
        }
        Ok(configs)
    }

    /// Topic definitions for `names`, or every topic
    pub async fn export_topics(&self, names: Option<&[String]>) -> Result<Vec<ResourceDefinition<TopicSpec>>> {
        let metadata = self
            .admin
            .describe_metadata(names, names.is_some())
            .await
            .map_err(ReconcileError::fetch("topic metadata"))?;

        let mut definitions = Vec::new();
        for (name, topic) in metadata.topics.iter().filter(|(_, t)| t.exists) {
            let mut spec = TopicSpec::new(topic.partitions.len(), replication_factor(&topic.partitions));
            spec.configs = self
                .dynamic_configs(&ConfigResource::topic(name), ConfigSource::DynamicTopicConfig)
                .await?;
            if self.include_assignments {
                spec.assignments = Some(topic.partitions.clone());
            }
            definitions.push(ResourceDefinition::new(ResourceKind::Topic, name.as_str(), spec));
        }
        debug!(topics = definitions.len(), "Topics exported");
        Ok(definitions)
    }

    pub async fn export_broker(&self, id: BrokerId) -> Result<ResourceDefinition<BrokerSpec>> {
        let configs = self
            .dynamic_configs(&ConfigResource::broker(id), ConfigSource::DynamicBrokerConfig)
            .await?;
        let spec = BrokerSpec {
            configs,
            ..Default::default()
        };
        Ok(ResourceDefinition::new(ResourceKind::Broker, id.to_string(), spec))
    }

    /// The cluster-wide dynamic broker default
    pub async fn export_brokers(&self) -> Result<ResourceDefinition<BrokersSpec>> {
        let configs = self
            .dynamic_configs(&ConfigResource::broker_default(), ConfigSource::DynamicDefaultBrokerConfig)
            .await?;
        let spec = BrokersSpec {
            configs,
            ..Default::default()
        };
        Ok(ResourceDefinition::new(ResourceKind::Brokers, "cluster", spec))
    }

    /// One definition per resource carrying ACLs, compacted into groups
    pub async fn export_acls(&self, resource_type: AclResourceType) -> Result<Vec<ResourceDefinition<AclSpec>>> {
        let listed = self
            .admin
            .describe_all_acls(resource_type)
            .await
            .map_err(ReconcileError::fetch(format!("{} ACLs", resource_type)))?;

        Ok(listed
            .into_iter()
            .map(|acls| {
                let mut entries = explode(&acls.groups);
                entries.sort();
                let atomic: Vec<AclEntryGroup> = entries.into_iter().map(AclEntryGroup::from).collect();
                let spec = AclSpec {
                    acls: merge_groups(&atomic),
                    delete_undefined_acls: false,
                    resource_type: acls.resource.resource_type,
                    pattern_type: acls.resource.pattern_type,
                };
                ResourceDefinition::new(ResourceKind::Acl, acls.resource.name, spec)
            })
            .collect())
    }
}

/// Render definitions as one YAML stream
pub fn to_yaml<S: Serialize>(definitions: &[ResourceDefinition<S>]) -> serde_yaml::Result<String> {
    let mut out = String::new();
    for definition in definitions {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(definition)?);
    }
    Ok(out)
}
