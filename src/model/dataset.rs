//! Dataset definitions: where a model's rows physically live.

use serde::{Deserialize, Serialize};

use crate::sql::query::RelationRef;

/// Physical source of a dataset: a named relation in the engine's catalog,
/// or a set of parquet files read through the multi-file table function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetSource {
    Relation {
        relation: String,
        #[serde(default)]
        schema: Option<String>,
    },
    Files {
        files: Vec<String>,
    },
}

/// A dataset looked up by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(flatten)]
    pub source: DatasetSource,
}

impl Dataset {
    pub fn relation(name: &str, relation: &str) -> Self {
        Self {
            name: name.into(),
            source: DatasetSource::Relation {
                relation: relation.into(),
                schema: None,
            },
        }
    }

    pub fn files(name: &str, files: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source: DatasetSource::Files { files },
        }
    }

    /// The FROM-clause reference for this dataset, without alias.
    pub fn relation_ref(&self) -> RelationRef {
        match &self.source {
            DatasetSource::Relation { relation, schema } => {
                let mut r = RelationRef::table(relation);
                if let Some(schema) = schema {
                    r = r.with_schema(schema);
                }
                r
            }
            DatasetSource::Files { files } => RelationRef::files(files.clone()),
        }
    }
}
