//! Shape-only description of a template model, used for editor tooling

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::messaging::model::{ModelMap, ModelValue, TemplateModel};

/// Kind of a model tree node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelTreeKind {
    /// Scalar leaf
    Primitive,

    /// Member container
    Complex,

    /// Sequence; never expanded
    Collection,

    /// The model itself
    Root,
}

/// A node of the model tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTreeNode {
    /// Member name
    pub name: String,

    /// Node kind
    pub kind: ModelTreeKind,

    /// Members of complex nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ModelTreeNode>,
}

impl ModelTreeNode {
    fn leaf(name: &str, kind: ModelTreeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            children: Vec::new(),
        }
    }

    /// Canonical JSON of the tree
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// SHA-256 hex digest of the canonical JSON
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        Ok(fingerprint_json(&self.to_json()?))
    }
}

/// SHA-256 hex digest of a stored tree
pub fn fingerprint_json(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Builds model trees
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelTreeBuilder;

impl ModelTreeBuilder {
    /// Builds the tree of a model. Hidden parts are left out.
    pub fn build(&self, model: &TemplateModel) -> ModelTreeNode {
        ModelTreeNode {
            name: "Model".to_string(),
            kind: ModelTreeKind::Root,
            children: model
                .parts()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| node(name, value))
                .collect(),
        }
    }

    /// Returns the JSON of the tree when it differs from the stored one
    pub fn changed_tree(
        &self,
        model: &TemplateModel,
        last_tree: Option<&str>,
    ) -> Result<Option<String>, serde_json::Error> {
        let json = self.build(model).to_json()?;

        let unchanged = last_tree
            .map(fingerprint_json)
            .is_some_and(|last| last == fingerprint_json(&json));

        Ok((!unchanged).then_some(json))
    }
}

fn node(name: &str, value: &ModelValue) -> ModelTreeNode {
    match value {
        ModelValue::List(_) => ModelTreeNode::leaf(name, ModelTreeKind::Collection),
        ModelValue::Map(members) => ModelTreeNode {
            name: name.to_string(),
            kind: ModelTreeKind::Complex,
            children: members
                .iter()
                .map(|(name, value)| node(name, value))
                .collect(),
        },
        ModelValue::Bag(members) => ModelTreeNode {
            name: name.to_string(),
            kind: ModelTreeKind::Complex,
            children: member_names(members),
        },
        _ => ModelTreeNode::leaf(name, ModelTreeKind::Primitive),
    }
}

fn member_names(members: &ModelMap) -> Vec<ModelTreeNode> {
    members
        .keys()
        .map(|name| ModelTreeNode::leaf(name, ModelTreeKind::Primitive))
        .collect()
}
