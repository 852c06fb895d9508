use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclOperation {
    All,
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    ClusterAction,
    DescribeConfigs,
    AlterConfigs,
    IdempotentWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AclResourceType {
    #[default]
    Topic,
    Group,
    Cluster,
    TransactionalId,
}

impl fmt::Display for AclResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclResourceType::Topic => write!(f, "topic"),
            AclResourceType::Group => write!(f, "group"),
            AclResourceType::Cluster => write!(f, "cluster"),
            AclResourceType::TransactionalId => write!(f, "transactionalId"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternType {
    #[default]
    Literal,
    Prefixed,
}

/// The resource an ACL binding is attached to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclResource {
    pub name: String,
    pub resource_type: AclResourceType,
    pub pattern_type: PatternType,
}

/// A single principal × host × operation binding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclEntry {
    pub principal: String,
    pub host: String,
    pub operation: AclOperation,
    pub permission_type: PermissionType,
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} from {} to {:?}",
            self.permission_type, self.principal, self.host, self.operation
        )
    }
}

/// Compact encoding of the cross-product of principals, hosts and operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AclEntryGroup {
    pub principals: Vec<String>,
    pub hosts: Vec<String>,
    pub operations: Vec<AclOperation>,
    pub permission_type: PermissionType,
}

impl AclEntryGroup {
    pub fn is_atomic(&self) -> bool {
        self.principals.len() == 1 && self.hosts.len() == 1 && self.operations.len() == 1
    }

    fn validate(&self) -> Result<()> {
        if self.principals.is_empty() || self.hosts.is_empty() || self.operations.is_empty() {
            return Err(ReconcileError::Validation(
                "ACL entries need at least one principal, host and operation".to_string(),
            ));
        }
        if let Some(bad) = self
            .principals
            .iter()
            .find(|p| !matches!(p.split_once(':'), Some((t, n)) if !t.is_empty() && !n.is_empty()))
        {
            return Err(ReconcileError::Validation(format!(
                "principal '{}' must have the form Type:name",
                bad
            )));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ReconcileError::Validation(
                "ACL hosts must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<AclEntry> for AclEntryGroup {
    fn from(entry: AclEntry) -> Self {
        Self {
            principals: vec![entry.principal],
            hosts: vec![entry.host],
            operations: vec![entry.operation],
            permission_type: entry.permission_type,
        }
    }
}

/// Desired ACL bindings for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AclSpec {
    #[serde(default)]
    pub acls: Vec<AclEntryGroup>,
    #[serde(default)]
    pub delete_undefined_acls: bool,
    #[serde(default)]
    pub resource_type: AclResourceType,
    #[serde(default)]
    pub pattern_type: PatternType,
}

impl AclSpec {
    pub fn validate(&self) -> Result<()> {
        self.acls.iter().try_for_each(AclEntryGroup::validate)
    }

    pub fn resource(&self, name: &str) -> AclResource {
        AclResource {
            name: name.to_string(),
            resource_type: self.resource_type,
            pattern_type: self.pattern_type,
        }
    }
}

/// ACL groups attached to one resource, as returned by a cluster-wide listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAcls {
    pub resource: AclResource,
    pub groups: Vec<AclEntryGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_acl_spec() {
        let yaml = r#"
resourceType: group
acls:
  - principals: ["User:alice", "User:bob"]
    hosts: ["*"]
    operations: [READ, DESCRIBE]
    permissionType: ALLOW
"#;
        let spec: AclSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.resource_type, AclResourceType::Group);
        assert_eq!(spec.pattern_type, PatternType::Literal);
        assert_eq!(spec.acls[0].operations, vec![AclOperation::Read, AclOperation::Describe]);
        assert!(!spec.acls[0].is_atomic());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_principal_form_checked() {
        let spec = AclSpec {
            acls: vec![AclEntryGroup {
                principals: vec!["alice".to_string()],
                hosts: vec!["*".to_string()],
                operations: vec![AclOperation::Read],
                permission_type: PermissionType::Allow,
            }],
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_empty_group_rejected() {
        let spec = AclSpec {
            acls: vec![AclEntryGroup {
                principals: vec!["User:alice".to_string()],
                hosts: vec![],
                operations: vec![AclOperation::Read],
                permission_type: PermissionType::Deny,
            }],
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }
}
