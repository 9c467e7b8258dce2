//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::SchemaProvider;

// Name of the attribute carrying the edit-config operation of a node.
pub const OPERATION_ATTR: &str = "operation";

// Per-node edit-config operation (RFC 6241, section 7.2).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    None,
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

// One step of an instance path.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PathArg {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub predicate: Predicate,
}

// Identifies an entry of a list or leaf-list.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    #[default]
    None,
    Keys(Vec<(String, String)>),
    Value(String),
}

// Ordered sequence of path arguments, starting at the datastore root.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct InstancePath(Vec<PathArg>);

// Generic configuration data node, as produced by the XML decoder.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DataNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DataNode>,
}

// Forest of top-level data nodes (e.g. the contents of a datastore).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct DataTree {
    pub nodes: Vec<DataNode>,
}

// ===== impl EditOperation =====

impl EditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::None => "none",
            EditOperation::Merge => "merge",
            EditOperation::Replace => "replace",
            EditOperation::Create => "create",
            EditOperation::Delete => "delete",
            EditOperation::Remove => "remove",
        }
    }

    // Returns whether the operation results in data being written.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            EditOperation::Merge
                | EditOperation::Replace
                | EditOperation::Create
        )
    }
}

impl std::fmt::Display for EditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EditOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<EditOperation, Error> {
        match s {
            "none" => Ok(EditOperation::None),
            "merge" => Ok(EditOperation::Merge),
            "replace" => Ok(EditOperation::Replace),
            "create" => Ok(EditOperation::Create),
            "delete" => Ok(EditOperation::Delete),
            "remove" => Ok(EditOperation::Remove),
            _ => Err(Error::UnknownOperation(s.to_owned())),
        }
    }
}

// ===== impl PathArg =====

impl PathArg {
    pub fn new(name: impl Into<String>) -> PathArg {
        PathArg {
            name: name.into(),
            namespace: None,
            predicate: Predicate::None,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_key(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let entry = (key.into(), value.into());
        match &mut self.predicate {
            Predicate::Keys(keys) => keys.push(entry),
            predicate => *predicate = Predicate::Keys(vec![entry]),
        }
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.predicate = Predicate::Value(value.into());
        self
    }
}

impl std::fmt::Display for PathArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        match &self.predicate {
            Predicate::None => Ok(()),
            Predicate::Keys(keys) => {
                for (key, value) in keys {
                    write!(f, "[{}='{}']", key, value)?;
                }
                Ok(())
            }
            Predicate::Value(value) => write!(f, "[.='{}']", value),
        }
    }
}

// ===== impl InstancePath =====

impl InstancePath {
    pub fn new(args: Vec<PathArg>) -> InstancePath {
        InstancePath(args)
    }

    pub fn root() -> InstancePath {
        InstancePath(vec![])
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn args(&self) -> &[PathArg] {
        &self.0
    }

    pub fn last(&self) -> Option<&PathArg> {
        self.0.last()
    }

    pub fn parent(&self) -> Option<InstancePath> {
        let (_, ancestors) = self.0.split_last()?;
        Some(InstancePath(ancestors.to_vec()))
    }

    pub fn child(&self, arg: PathArg) -> InstancePath {
        let mut args = self.0.clone();
        args.push(arg);
        InstancePath(args)
    }

    pub fn is_strict_prefix_of(&self, other: &InstancePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl std::fmt::Display for InstancePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        write!(f, "/{}", self.0.iter().join("/"))
    }
}

impl From<Vec<PathArg>> for InstancePath {
    fn from(args: Vec<PathArg>) -> InstancePath {
        InstancePath(args)
    }
}

impl FromIterator<PathArg> for InstancePath {
    fn from_iter<I: IntoIterator<Item = PathArg>>(iter: I) -> InstancePath {
        InstancePath(iter.into_iter().collect())
    }
}

// Parses paths such as `/interfaces/interface[name='eth0']/mtu`.
impl FromStr for InstancePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<InstancePath, Error> {
        let invalid = || Error::InvalidPath(s.to_owned());

        let mut rest = s.strip_prefix('/').ok_or_else(invalid)?;
        let mut args = vec![];
        while !rest.is_empty() {
            let end = rest.find(['/', '[']).unwrap_or(rest.len());
            let name = &rest[..end];
            if name.is_empty() {
                return Err(invalid());
            }
            let mut arg = PathArg::new(name);
            rest = &rest[end..];

            // Parse predicates.
            while let Some(predicate) = rest.strip_prefix('[') {
                let (key, value) = predicate.split_once('=').ok_or_else(invalid)?;
                let quote = value
                    .chars()
                    .next()
                    .filter(|c| *c == '\'' || *c == '"')
                    .ok_or_else(invalid)?;
                let value = &value[1..];
                let close = value.find(quote).ok_or_else(invalid)?;
                rest = value[close + 1..].strip_prefix(']').ok_or_else(invalid)?;

                let value = &value[..close];
                match (key.trim(), &arg.predicate) {
                    (".", Predicate::None) => arg = arg.with_value(value),
                    (".", _) | (_, Predicate::Value(_)) => {
                        return Err(invalid());
                    }
                    (key, _) => arg = arg.with_key(key, value),
                }
            }
            args.push(arg);

            if let Some(next) = rest.strip_prefix('/') {
                if next.is_empty() {
                    return Err(invalid());
                }
                rest = next;
            } else if !rest.is_empty() {
                return Err(invalid());
            }
        }

        Ok(InstancePath(args))
    }
}

// ===== impl DataNode =====

impl DataNode {
    pub fn container(name: impl Into<String>) -> DataNode {
        DataNode {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> DataNode {
        DataNode {
            name: name.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    // Creates the empty node identified by the given path argument. List
    // entries get their key leaves, leaf-list entries their value.
    pub fn from_path_arg(arg: &PathArg) -> DataNode {
        let mut node = DataNode::container(&arg.name);
        node.namespace = arg.namespace.clone();
        match &arg.predicate {
            Predicate::None => (),
            Predicate::Keys(keys) => {
                node.children = keys
                    .iter()
                    .map(|(key, value)| DataNode::leaf(key, value))
                    .collect();
            }
            Predicate::Value(value) => node.value = Some(value.clone()),
        }
        node
    }

    // Wraps the node inside the structure identified by the given ancestors.
    pub fn wrap(ancestors: &[PathArg], node: DataNode) -> DataNode {
        ancestors.iter().rev().fold(node, |child, arg| {
            DataNode::from_path_arg(arg).with_child(child)
        })
    }

    // Builds the empty node chain leading to the given path. Used both as a
    // subtree filter and as a structural skeleton.
    pub fn skeleton(path: &[PathArg]) -> Option<DataNode> {
        let (last, ancestors) = path.split_last()?;
        Some(DataNode::wrap(ancestors, DataNode::from_path_arg(last)))
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: DataNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: EditOperation) -> Self {
        self.set_operation(operation);
        self
    }

    // Returns the explicit operation attribute of this node, if any.
    pub fn operation(&self) -> Result<Option<EditOperation>, Error> {
        self.attributes
            .get(OPERATION_ATTR)
            .map(|operation| operation.parse())
            .transpose()
    }

    pub fn set_operation(&mut self, operation: EditOperation) {
        self.attributes
            .insert(OPERATION_ATTR.to_owned(), operation.as_str().to_owned());
    }

    // Returns a copy of this subtree without any operation attribute.
    pub fn stripped(&self) -> DataNode {
        let mut node = self.clone();
        node.strip_operations();
        node
    }

    fn strip_operations(&mut self) {
        self.attributes.remove(OPERATION_ATTR);
        for child in &mut self.children {
            child.strip_operations();
        }
    }

    pub fn child(&self, name: &str) -> Option<&DataNode> {
        self.children.iter().find(|child| child.name == name)
    }

    // Checks whether this node is the one identified by the path argument.
    pub fn matches(&self, arg: &PathArg) -> bool {
        if self.name != arg.name {
            return false;
        }
        if let (Some(ns1), Some(ns2)) = (&self.namespace, &arg.namespace)
            && ns1 != ns2
        {
            return false;
        }
        match &arg.predicate {
            Predicate::None => true,
            Predicate::Keys(keys) => keys.iter().all(|(key, value)| {
                self.child(key)
                    .and_then(|child| child.value.as_deref())
                    .is_some_and(|child_value| child_value == value)
            }),
            Predicate::Value(value) => self.value.as_ref() == Some(value),
        }
    }
}

// ===== impl DataTree =====

impl DataTree {
    pub fn new(nodes: Vec<DataNode>) -> DataTree {
        DataTree { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, path: &InstancePath) -> Option<&DataNode> {
        find_node(&self.nodes, path.args())
    }

    pub fn contains(&self, path: &InstancePath) -> bool {
        !path.is_root() && self.find(path).is_some()
    }

    // Removes the node at the given path, returning it.
    pub fn remove_at(&mut self, path: &InstancePath) -> Option<DataNode> {
        let (last, ancestors) = path.args().split_last()?;
        let siblings = self.children_mut(ancestors)?;
        let pos = siblings.iter().position(|node| node.matches(last))?;
        Some(siblings.remove(pos))
    }

    // Stores the node at the given path, overwriting any previous subtree.
    //
    // Returns `false` if the parent node doesn't exist.
    pub fn replace_at(&mut self, path: &InstancePath, node: DataNode) -> bool {
        let Some((last, ancestors)) = path.args().split_last() else {
            return false;
        };
        let Some(siblings) = self.children_mut(ancestors) else {
            return false;
        };
        match siblings.iter_mut().find(|sibling| sibling.matches(last)) {
            Some(sibling) => *sibling = node,
            None => siblings.push(node),
        }
        true
    }

    // Merges the node into the subtree found at the given path. The schema is
    // used to identify list entries among the descendants.
    //
    // Returns `false` if the parent node doesn't exist.
    pub fn merge_at(
        &mut self,
        schema: &dyn SchemaProvider,
        path: &InstancePath,
        node: DataNode,
    ) -> bool {
        let Some((last, ancestors)) = path.args().split_last() else {
            return false;
        };
        let snode = schema.find_path(path.args());
        let Some(siblings) = self.children_mut(ancestors) else {
            return false;
        };
        match siblings.iter_mut().find(|sibling| sibling.matches(last)) {
            Some(sibling) => merge_node(schema, snode.as_ref(), sibling, node),
            None => siblings.push(node),
        }
        true
    }

    fn children_mut(
        &mut self,
        ancestors: &[PathArg],
    ) -> Option<&mut Vec<DataNode>> {
        if ancestors.is_empty() {
            return Some(&mut self.nodes);
        }
        find_node_mut(&mut self.nodes, ancestors).map(|node| &mut node.children)
    }
}

impl From<Vec<DataNode>> for DataTree {
    fn from(nodes: Vec<DataNode>) -> DataTree {
        DataTree { nodes }
    }
}

// ===== helper functions =====

fn find_node<'a>(nodes: &'a [DataNode], args: &[PathArg]) -> Option<&'a DataNode> {
    let (first, rest) = args.split_first()?;
    let node = nodes.iter().find(|node| node.matches(first))?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_node(&node.children, rest)
    }
}

fn find_node_mut<'a>(
    nodes: &'a mut [DataNode],
    args: &[PathArg],
) -> Option<&'a mut DataNode> {
    let (first, rest) = args.split_first()?;
    let node = nodes.iter_mut().find(|node| node.matches(first))?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_node_mut(&mut node.children, rest)
    }
}

fn merge_node(
    schema: &dyn SchemaProvider,
    snode: Option<&crate::schema::SchemaNode>,
    dst: &mut DataNode,
    src: DataNode,
) {
    if src.value.is_some() {
        dst.value = src.value;
    }

    for child in src.children {
        let csnode = snode.and_then(|snode| {
            schema.find_child(Some(snode), child.namespace.as_deref(), &child.name)
        });
        let arg = csnode
            .as_ref()
            .and_then(|csnode| csnode.path_arg(&child).ok())
            .unwrap_or_else(|| PathArg::new(&child.name));
        match dst.children.iter_mut().find(|dchild| dchild.matches(&arg)) {
            Some(dchild) => merge_node(schema, csnode.as_ref(), dchild, child),
            None => dst.children.push(child),
        }
    }
}

#[cfg(test)]
mod test_data {
    use maplit::btreemap;

    use super::*;

    fn interface(name: &str, mtu: &str) -> DataNode {
        DataNode::container("interface")
            .with_child(DataNode::leaf("name", name))
            .with_child(DataNode::leaf("mtu", mtu))
    }

    #[test]
    fn test_path_parse_display() {
        let s = "/interfaces/interface[name='eth0']/address[.='10.0.0.1']";
        let path: InstancePath = s.parse().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(
            path.args()[1].predicate,
            Predicate::Keys(vec![("name".to_owned(), "eth0".to_owned())])
        );
        assert_eq!(
            path.args()[2].predicate,
            Predicate::Value("10.0.0.1".to_owned())
        );
        assert_eq!(path.to_string(), s);
        assert_eq!("/".parse::<InstancePath>().unwrap(), InstancePath::root());
    }

    #[test]
    fn test_path_parse_invalid() {
        for s in ["", "a/b", "/a//b", "/a/", "/a[name=x]", "/a[.='1'][k='2']"] {
            assert!(s.parse::<InstancePath>().is_err(), "{s}");
        }
    }

    #[test]
    fn test_path_prefix() {
        let a: InstancePath = "/a".parse().unwrap();
        let ab: InstancePath = "/a/b".parse().unwrap();
        assert!(a.is_strict_prefix_of(&ab));
        assert!(!ab.is_strict_prefix_of(&a));
        assert!(!a.is_strict_prefix_of(&a));
        assert_eq!(ab.parent(), Some(a));
    }

    #[test]
    fn test_operation_attribute() {
        let mut node = DataNode::container("a");
        assert_eq!(node.operation().unwrap(), None);
        node.set_operation(EditOperation::Delete);
        assert_eq!(node.operation().unwrap(), Some(EditOperation::Delete));
        node.attributes
            .insert(OPERATION_ATTR.to_owned(), "frobnicate".to_owned());
        assert!(matches!(node.operation(), Err(Error::UnknownOperation(_))));
    }

    #[test]
    fn test_stripped() {
        let node = DataNode::container("a")
            .with_operation(EditOperation::Merge)
            .with_child(
                DataNode::leaf("x", "1").with_operation(EditOperation::Create),
            );
        let mut node = node.stripped();
        assert!(node.attributes.is_empty());
        assert!(node.children[0].attributes.is_empty());

        // Other attributes are preserved.
        node.attributes.insert("xmlns:nc".to_owned(), "urn:x".to_owned());
        node.set_operation(EditOperation::Replace);
        assert_eq!(
            node.stripped().attributes,
            btreemap! { "xmlns:nc".to_owned() => "urn:x".to_owned() }
        );
    }

    #[test]
    fn test_skeleton() {
        let path: InstancePath =
            "/interfaces/interface[name='eth0']/mtu".parse().unwrap();
        let skeleton = DataNode::skeleton(path.args()).unwrap();
        assert_eq!(
            skeleton,
            DataNode::container("interfaces").with_child(
                DataNode::container("interface")
                    .with_child(DataNode::leaf("name", "eth0"))
                    .with_child(DataNode::container("mtu"))
            )
        );
        assert!(DataNode::skeleton(&[]).is_none());
    }

    #[test]
    fn test_tree_find_replace_remove() {
        let mut tree = DataTree::new(vec![
            DataNode::container("interfaces")
                .with_child(interface("eth0", "1500"))
                .with_child(interface("eth1", "9000")),
        ]);

        let path: InstancePath =
            "/interfaces/interface[name='eth1']/mtu".parse().unwrap();
        assert_eq!(tree.find(&path).unwrap().value.as_deref(), Some("9000"));

        assert!(tree.replace_at(&path, DataNode::leaf("mtu", "1400")));
        assert_eq!(tree.find(&path).unwrap().value.as_deref(), Some("1400"));

        let missing: InstancePath = "/routing/static".parse().unwrap();
        assert!(!tree.replace_at(&missing, DataNode::container("static")));

        let entry: InstancePath =
            "/interfaces/interface[name='eth0']".parse().unwrap();
        assert!(tree.remove_at(&entry).is_some());
        assert!(!tree.contains(&entry));
        assert!(tree.remove_at(&entry).is_none());
    }
}
