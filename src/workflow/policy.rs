//! Declarative field-level rules for document patches.
//!
//! A [`FieldRule`] is attached to a step for one role and lists which
//! attributes of the stage's linked document that role may set while the
//! process sits on that step.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};

/// A set of attribute names, expressed as a whitelist or a blacklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSet {
    /// Every attribute is mutable.
    #[default]
    Any,
    /// Only the listed attributes are mutable.
    Only(BTreeSet<String>),
    /// Every attribute except the listed ones is mutable.
    Except(BTreeSet<String>),
}

impl FieldSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn except<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Except(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            FieldSet::Any => true,
            FieldSet::Only(names) => names.contains(name),
            FieldSet::Except(names) => !names.contains(name),
        }
    }
}

/// Mutable attributes for one (stage, step, role) combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Top-level attributes of the document.
    #[serde(default)]
    pub fields: FieldSet,
    /// Per-collection rules for arrays of nested records (e.g. test rows).
    #[serde(default)]
    pub nested: BTreeMap<String, FieldSet>,
}

impl FieldRule {
    /// Check a document patch against this rule.
    ///
    /// Nested collections are only inspected when they appear in `nested`;
    /// each element must be an object whose keys pass the nested set.
    pub fn check(&self, patch: &Map<String, Value>) -> Result<()> {
        for (key, value) in patch {
            if !self.fields.allows(key) {
                return Err(WorkflowError::FieldNotAllowed(key.clone()));
            }
            let Some(nested) = self.nested.get(key) else {
                continue;
            };
            let items: &[Value] = match value {
                Value::Array(items) => items.as_slice(),
                Value::Null => &[],
                _ => return Err(WorkflowError::FieldNotAllowed(key.clone())),
            };
            for item in items {
                let Value::Object(record) = item else {
                    return Err(WorkflowError::FieldNotAllowed(key.clone()));
                };
                if let Some(bad) = record.keys().find(|k| !nested.allows(k)) {
                    return Err(WorkflowError::FieldNotAllowed(format!("{key}.{bad}")));
                }
            }
        }
        Ok(())
    }
}
