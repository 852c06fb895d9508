// Kafka Resource Reconciler Library
// Declarative topics, broker configs and ACLs with rack-aware replica placement

pub mod models;
pub mod planner;
pub mod config_ops;
pub mod acl_algebra;
pub mod actions;
pub mod cluster;
pub mod mock;
pub mod diff;
pub mod reassignment;
pub mod reconciler;
pub mod controller;
pub mod options;

pub use actions::{Action, ActionPlan, ConfigOpType, ConfigOperation, PlanSummary};
pub use cluster::{ApiKey, ClusterAdmin, ClusterError, ConfigResource};
pub use controller::{ApplyController, ApplyReport, DocumentSource, ExportController};
pub use mock::MockCluster;
pub use options::{ApplyOptions, ConfigAlterMode};
pub use reassignment::{AwaitOutcome, ManualClock, PollClock, ReassignmentProgress, TokioClock};
pub use reconciler::{ApplyResult, ResourceReconciler};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown apiVersion '{api_version}' for kind '{kind}'")]
    UnknownApiVersion { kind: String, api_version: String },

    #[error("Invalid definition: {0}")]
    Validation(String),

    #[error("Failed to fetch {context}: {source}")]
    RemoteFetch {
        context: String,
        #[source]
        source: ClusterError,
    },

    #[error("Unsupported API: {0}")]
    UnsupportedApi(String),

    #[error("Definition does not fit the cluster: {0}")]
    CrossValidation(String),

    #[error("Refusing to apply: {0}")]
    Refusal(String),

    #[error("Internal consistency check failed: {0}")]
    Consistency(String),

    #[error("Failed to {context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: ClusterError,
    },
}

impl ReconcileError {
    pub(crate) fn fetch(context: impl Into<String>) -> impl FnOnce(ClusterError) -> Self {
        let context = context.into();
        move |source| ReconcileError::RemoteFetch { context, source }
    }

    pub(crate) fn execution(context: impl Into<String>) -> impl FnOnce(ClusterError) -> Self {
        let context = context.into();
        move |source| ReconcileError::Execution { context, source }
    }

    /// The cluster error behind a remote failure, if any
    pub fn cluster_error(&self) -> Option<&ClusterError> {
        match self {
            ReconcileError::RemoteFetch { source, .. } | ReconcileError::Execution { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
