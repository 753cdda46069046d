//! Join definitions.

use serde::{Deserialize, Serialize};

/// Relationship cardinality. Informational only; it does not change the
/// generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// A declared join from a model's fact relation to another model.
///
/// `on` is a SQL predicate over the two aliases, e.g.
/// `v.produto_id = p.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub on: String,
    #[serde(default)]
    pub relationship: Option<Relationship>,
}

impl Join {
    pub fn new(name: &str, model: &str, on: &str) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            alias: None,
            on: on.into(),
            relationship: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    /// The SQL alias for the joined relation (explicit alias or join name).
    pub fn sql_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}
