//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{DataNode, PathArg, Predicate};
use crate::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaNodeKind {
    Container,
    List,
    Leaf,
    LeafList,
}

// Schema node, identified by its schema path (e.g. `/interfaces/interface`).
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SchemaNode {
    pub path: String,
    pub kind: SchemaNodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

// Resolves data nodes to their schema definitions.
pub trait SchemaProvider: Send + Sync + std::fmt::Debug {
    // Looks up the child of `parent` (or a top-level node when `parent` is
    // `None`) with the given name.
    fn find_child(
        &self,
        parent: Option<&SchemaNode>,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<SchemaNode>;

    fn find_path(&self, path: &[PathArg]) -> Option<SchemaNode> {
        path.iter().try_fold(None, |parent: Option<SchemaNode>, arg| {
            self.find_child(parent.as_ref(), arg.namespace.as_deref(), &arg.name)
                .map(Some)
        })?
    }
}

// In-memory schema, keyed by schema path.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
#[serde(from = "Vec<SchemaNode>", into = "Vec<SchemaNode>")]
pub struct StaticSchema {
    nodes: BTreeMap<String, SchemaNode>,
}

#[derive(Debug, Default)]
pub struct StaticSchemaBuilder {
    nodes: Vec<SchemaNode>,
}

// ===== impl SchemaNode =====

impl SchemaNode {
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.kind == SchemaNodeKind::List && self.keys.iter().any(|key| key == name)
    }

    // Builds the path argument identifying the given data node.
    pub fn path_arg(&self, dnode: &DataNode) -> Result<PathArg, Error> {
        let mut arg = PathArg::new(&dnode.name);
        arg.namespace = dnode.namespace.clone();
        match self.kind {
            SchemaNodeKind::Container | SchemaNodeKind::Leaf => (),
            SchemaNodeKind::List => {
                let keys = self
                    .keys
                    .iter()
                    .map(|key| {
                        dnode
                            .child(key)
                            .and_then(|child| child.value.clone())
                            .map(|value| (key.clone(), value))
                            .ok_or_else(|| {
                                Error::MissingListKey(
                                    self.path.clone(),
                                    key.clone(),
                                )
                            })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                if !keys.is_empty() {
                    arg.predicate = Predicate::Keys(keys);
                }
            }
            SchemaNodeKind::LeafList => {
                if let Some(value) = &dnode.value {
                    arg.predicate = Predicate::Value(value.clone());
                }
            }
        }
        Ok(arg)
    }
}

// ===== impl StaticSchema =====

impl StaticSchema {
    pub fn builder() -> StaticSchemaBuilder {
        StaticSchemaBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl SchemaProvider for StaticSchema {
    fn find_child(
        &self,
        parent: Option<&SchemaNode>,
        _namespace: Option<&str>,
        name: &str,
    ) -> Option<SchemaNode> {
        let parent_path = parent.map(|parent| parent.path.as_str()).unwrap_or("");
        let path = format!("{}/{}", parent_path, name);
        self.nodes.get(&path).cloned()
    }
}

impl From<Vec<SchemaNode>> for StaticSchema {
    fn from(nodes: Vec<SchemaNode>) -> StaticSchema {
        StaticSchema {
            nodes: nodes
                .into_iter()
                .map(|snode| (snode.path.clone(), snode))
                .collect(),
        }
    }
}

impl From<StaticSchema> for Vec<SchemaNode> {
    fn from(schema: StaticSchema) -> Vec<SchemaNode> {
        schema.nodes.into_values().collect()
    }
}

// ===== impl StaticSchemaBuilder =====

impl StaticSchemaBuilder {
    #[must_use]
    pub fn container(self, path: &str) -> Self {
        self.node(path, SchemaNodeKind::Container, &[])
    }

    #[must_use]
    pub fn list(self, path: &str, keys: &[&str]) -> Self {
        self.node(path, SchemaNodeKind::List, keys)
    }

    #[must_use]
    pub fn leaf(self, path: &str) -> Self {
        self.node(path, SchemaNodeKind::Leaf, &[])
    }

    #[must_use]
    pub fn leaf_list(self, path: &str) -> Self {
        self.node(path, SchemaNodeKind::LeafList, &[])
    }

    pub fn build(self) -> StaticSchema {
        StaticSchema::from(self.nodes)
    }

    fn node(mut self, path: &str, kind: SchemaNodeKind, keys: &[&str]) -> Self {
        self.nodes.push(SchemaNode {
            path: path.to_owned(),
            kind,
            keys: keys.iter().map(|key| key.to_string()).collect(),
        });
        self
    }
}
