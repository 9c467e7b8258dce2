//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::data::{DataNode, EditOperation, InstancePath};
use crate::error::Error;
use crate::schema::{SchemaNode, SchemaProvider};

// Node-level edit, as derived from an edit intent.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct ChangeRecord {
    pub path: InstancePath,
    pub operation: EditOperation,
    // Absent for DELETE and REMOVE.
    pub payload: Option<DataNode>,
}

// Turns edit intents into ordered lists of change records.
//
// Records are produced in post-order, so a record is always emitted before
// the records of its ancestors. A node yields a record when it's the root of
// the intent or when its effective operation differs from its parent's.
#[derive(Debug)]
pub struct ChangeTracker<'a> {
    schema: &'a dyn SchemaProvider,
    records: Vec<ChangeRecord>,
}

// ===== impl ChangeTracker =====

impl<'a> ChangeTracker<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> ChangeTracker<'a> {
        ChangeTracker {
            schema,
            records: vec![],
        }
    }

    // Walks the intent rooted under `parent`.
    //
    // On error no record of this intent is kept.
    pub fn track(
        &mut self,
        parent: &InstancePath,
        intent: &DataNode,
        default_operation: EditOperation,
    ) -> Result<(), Error> {
        let parent_snode = if parent.is_root() {
            None
        } else {
            let snode = self
                .schema
                .find_path(parent.args())
                .ok_or_else(|| Error::UnknownElement(parent.to_string()))?;
            Some(snode)
        };

        let mut records = vec![];
        self.walk(
            &mut records,
            parent,
            parent_snode.as_ref(),
            intent,
            default_operation,
            true,
        )?;
        self.records.append(&mut records);
        Ok(())
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ChangeRecord> {
        self.records
    }

    // Returns the payload contributed by the node to its parent's payload.
    fn walk(
        &self,
        records: &mut Vec<ChangeRecord>,
        parent: &InstancePath,
        parent_snode: Option<&SchemaNode>,
        dnode: &DataNode,
        inherited: EditOperation,
        is_root: bool,
    ) -> Result<Option<DataNode>, Error> {
        let snode = self
            .schema
            .find_child(parent_snode, dnode.namespace.as_deref(), &dnode.name)
            .ok_or_else(|| {
                if parent.is_root() {
                    Error::UnknownElement(format!("/{}", dnode.name))
                } else {
                    Error::UnknownElement(format!("{}/{}", parent, dnode.name))
                }
            })?;
        let path = parent.child(snode.path_arg(dnode)?);
        let operation = dnode.operation()?.unwrap_or(inherited);

        let mut payload = DataNode {
            name: dnode.name.clone(),
            namespace: dnode.namespace.clone(),
            value: dnode.value.clone(),
            attributes: dnode.attributes.clone(),
            children: vec![],
        };
        payload.attributes.remove(crate::data::OPERATION_ATTR);

        for child in &dnode.children {
            // List keys identify the entry and are part of every payload.
            if snode.is_key(&child.name) {
                // A key can only restate the operation of its entry.
                if let Some(key_operation) = child.operation()?
                    && key_operation != operation
                {
                    return Err(Error::KeyOperation(
                        format!("{}/{}", path, child.name),
                        key_operation,
                    ));
                }
                payload.children.push(child.stripped());
                continue;
            }
            if let Some(child_payload) = self.walk(
                records,
                &path,
                Some(&snode),
                child,
                operation,
                false,
            )? {
                payload.children.push(child_payload);
            }
        }

        if (is_root || operation != inherited)
            && operation != EditOperation::None
        {
            let record_payload =
                operation.is_write().then(|| payload.clone());
            records.push(ChangeRecord::new(path, operation, record_payload));
        }

        Ok(operation.is_write().then_some(payload))
    }
}
