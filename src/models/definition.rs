use crate::{ReconcileError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of administrative resource a definition manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Topic,
    Broker,
    Brokers,
    Acl,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Topic => "topic",
            ResourceKind::Broker => "broker",
            ResourceKind::Brokers => "brokers",
            ResourceKind::Acl => "acl",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topic" => Ok(ResourceKind::Topic),
            "broker" => Ok(ResourceKind::Broker),
            "brokers" => Ok(ResourceKind::Brokers),
            "acl" => Ok(ResourceKind::Acl),
            other => Err(ReconcileError::Parse(format!("unknown kind '{}'", other))),
        }
    }
}

/// Every (kind, apiVersion) pair a definition may declare
pub const KNOWN_API_VERSIONS: &[(ResourceKind, &str)] = &[
    (ResourceKind::Topic, "v1"),
    (ResourceKind::Topic, "v1beta1"),
    (ResourceKind::Broker, "v1"),
    (ResourceKind::Brokers, "v1"),
    (ResourceKind::Acl, "v1"),
    (ResourceKind::Acl, "v1beta1"),
];

/// Serialization format of a definition document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Guess the format from a file extension, defaulting to YAML
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        match self {
            DocumentFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|e| ReconcileError::Parse(format!("invalid YAML definition: {}", e))),
            DocumentFormat::Json => serde_json::from_str(text)
                .map_err(|e| ReconcileError::Parse(format!("invalid JSON definition: {}", e))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// A desired-state document: `{apiVersion, kind, metadata, spec}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition<S> {
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: S,
}

impl<S> ResourceDefinition<S> {
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: S) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind,
            metadata: Metadata::named(name),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl<S: DeserializeOwned> ResourceDefinition<S> {
    /// Decode a typed definition from its serialized document
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        format.decode(text)
    }
}

/// The kind-independent part of a definition, used to dispatch before the
/// spec is decoded
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionHeader {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DefinitionHeader {
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        format.decode(text)
    }

    /// Resolve the kind and reject unknown `kind`/`apiVersion` pairs
    pub fn resource_kind(&self) -> Result<ResourceKind> {
        let kind: ResourceKind = self.kind.parse()?;
        let known = KNOWN_API_VERSIONS
            .iter()
            .any(|(k, v)| *k == kind && *v == self.api_version);
        if !known {
            return Err(ReconcileError::UnknownApiVersion {
                kind: kind.to_string(),
                api_version: self.api_version.clone(),
            });
        }
        Ok(kind)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<ScalarValue> for String {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::Str(s) => s,
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Bool(b) => b.to_string(),
        }
    }
}

/// Config maps accept unquoted numbers and booleans; `null` is kept as `None`
pub(crate) fn deserialize_configs<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<ScalarValue>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.map(String::from)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_dispatch() {
        let yaml = "apiVersion: v1\nkind: topic\nmetadata:\n  name: events\nspec: {}\n";
        let header = DefinitionHeader::parse(yaml, DocumentFormat::Yaml).unwrap();
        assert_eq!(header.resource_kind().unwrap(), ResourceKind::Topic);
        assert_eq!(header.metadata.name, "events");
    }

    #[test]
    fn test_unknown_api_version_rejected() {
        let yaml = "apiVersion: v9\nkind: broker\nmetadata:\n  name: '1'\n";
        let header = DefinitionHeader::parse(yaml, DocumentFormat::Yaml).unwrap();
        let err = header.resource_kind().unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownApiVersion { .. }));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"apiVersion":"v1","kind":"schema","metadata":{"name":"x"}}"#;
        let header = DefinitionHeader::parse(json, DocumentFormat::Json).unwrap();
        assert!(matches!(
            header.resource_kind(),
            Err(ReconcileError::Parse(_))
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension(Some("json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_extension(Some("yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_extension(None), DocumentFormat::Yaml);
    }
}
