//! Static structure of the steps of an execution.

use serde::{Deserialize, Serialize};

/// One node of the step structure. Nodes with children are groups, the rest are
/// leaf ("container") steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// A failure of an optional step never fails its parent.
    #[serde(default)]
    pub optional: bool,
    /// A negative group is expected to fail.
    #[serde(default)]
    pub negative: bool,
    #[serde(default)]
    pub children: Vec<Signature>,
}

impl Signature {
    pub fn leaf(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Default::default()
        }
    }

    pub fn group(reference: impl Into<String>, children: Vec<Signature>) -> Self {
        Self {
            reference: reference.into(),
            children,
            ..Default::default()
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }
}
