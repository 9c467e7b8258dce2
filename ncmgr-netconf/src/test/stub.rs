//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use ncmgr_utils::UnboundedSender;
use tokio::sync::mpsc;
use tracing::{debug, debug_span};

use crate::capabilities::Capabilities;
use crate::data::{DataNode, DataTree, EditOperation, InstancePath};
use crate::message::{
    Datastore, DefaultOperation, EditConfig, ErrorOption, ErrorTag, ErrorType,
    Message, Notification, Operation, Request, RpcError, RpcReply,
};
use crate::schema::{SchemaNode, SchemaProvider};
use crate::transport::{
    Connector, Transport, TransportError, TransportEvent, TransportSession,
};

// Session ID used for locks held by other management clients.
const EXTERNAL_SESSION_ID: u32 = 0;

// In-memory NETCONF server.
//
// Requests are processed synchronously as soon as the transport receives
// them, and replies are queued on the session's event channel in the same
// order.
#[derive(Clone, Debug)]
pub struct StubDevice {
    inner: Arc<Mutex<StubInner>>,
}

#[derive(Debug)]
struct StubInner {
    schema: Arc<dyn SchemaProvider>,
    capabilities: Capabilities,
    running: DataTree,
    candidate: DataTree,
    locks: BTreeMap<Datastore, u32>,
    faults: Vec<Fault>,
    log: Vec<String>,
    edits: Vec<EditConfig>,
    session_id: u32,
    events_tx: Option<UnboundedSender<TransportEvent>>,
    connect_failures: u32,
    connections: u32,
    silent: bool,
}

// One-shot failure injected into the next matching request.
#[derive(Clone, Debug)]
struct Fault {
    operation: String,
    target: Option<Datastore>,
    tag: ErrorTag,
}

#[derive(Debug)]
struct StubConnector {
    device: StubDevice,
}

#[derive(Debug)]
struct StubTransport {
    device: StubDevice,
    session_id: u32,
}

// ===== impl StubDevice =====

impl StubDevice {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        capabilities: Capabilities,
    ) -> StubDevice {
        let inner = StubInner {
            schema,
            capabilities,
            running: Default::default(),
            candidate: Default::default(),
            locks: Default::default(),
            faults: Default::default(),
            log: Default::default(),
            edits: Default::default(),
            session_id: 0,
            events_tx: None,
            connect_failures: 0,
            connections: 0,
            silent: false,
        };
        StubDevice {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(StubConnector {
            device: self.clone(),
        })
    }

    // Sets the contents of both the running and candidate datastores.
    pub fn set_running(&self, data: DataTree) {
        let mut inner = self.inner.lock().unwrap();
        inner.candidate = data.clone();
        inner.running = data;
    }

    pub fn running(&self) -> DataTree {
        self.inner.lock().unwrap().running.clone()
    }

    pub fn candidate(&self) -> DataTree {
        self.inner.lock().unwrap().candidate.clone()
    }

    // Makes the next request with the given name (and optionally target
    // datastore) fail with the given error tag.
    pub fn fail_next(&self, operation: &str, target: Option<Datastore>, tag: ErrorTag) {
        let fault = Fault {
            operation: operation.to_owned(),
            target,
            tag,
        };
        self.inner.lock().unwrap().faults.push(fault);
    }

    // Makes the next `count` connection attempts fail.
    pub fn fail_connect(&self, count: u32) {
        self.inner.lock().unwrap().connect_failures = count;
    }

    // Simulates a lock held by another management client.
    pub fn lock_externally(&self, datastore: Datastore) {
        let mut inner = self.inner.lock().unwrap();
        inner.locks.insert(datastore, EXTERNAL_SESSION_ID);
    }

    pub fn is_locked(&self, datastore: Datastore) -> bool {
        self.inner.lock().unwrap().locks.contains_key(&datastore)
    }

    // When enabled, requests are still accepted but never answered.
    pub fn set_silent(&self, silent: bool) {
        self.inner.lock().unwrap().silent = silent;
    }

    // Received requests, in the `name(target)` form.
    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    // Received edit-config requests, including the failed ones.
    pub fn edits(&self) -> Vec<EditConfig> {
        self.inner.lock().unwrap().edits.clone()
    }

    pub fn clear_log(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.clear();
        inner.edits.clear();
    }

    // Number of sessions established so far.
    pub fn connections(&self) -> u32 {
        self.inner.lock().unwrap().connections
    }

    // Tears down the current session from the device side.
    pub fn drop_session(&self, reason: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        let session_id = inner.session_id;
        inner.end_session(session_id, reason.map(str::to_owned));
    }

    pub fn notify(&self, data: Vec<DataNode>) {
        let inner = self.inner.lock().unwrap();
        let notification = Notification {
            event_time: Utc::now(),
            data,
        };
        if let Some(events_tx) = &inner.events_tx {
            let message = Message::Notification(notification);
            let _ = events_tx.send(TransportEvent::Message(message));
        }
    }
}

// ===== impl StubInner =====

impl StubInner {
    fn connect(
        &mut self,
        device: &StubDevice,
    ) -> Result<TransportSession, TransportError> {
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(TransportError::Handshake(
                "connection refused".to_owned(),
            ));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        self.session_id += 1;
        self.connections += 1;
        self.events_tx = Some(events_tx);

        Ok(TransportSession {
            transport: Arc::new(StubTransport {
                device: device.clone(),
                session_id: self.session_id,
            }),
            session_id: self.session_id,
            capabilities: self.capabilities.to_uris(),
            events,
        })
    }

    fn end_session(&mut self, session_id: u32, reason: Option<String>) {
        if session_id != self.session_id {
            return;
        }
        self.locks.retain(|_, holder| *holder != session_id);
        if let Some(events_tx) = self.events_tx.take() {
            let _ = events_tx.send(TransportEvent::Down(reason));
        }
    }

    fn process(&mut self, session_id: u32, request: Request) {
        let Request {
            message_id,
            operation,
        } = request;
        self.log.push(operation.to_string());
        if let Operation::EditConfig(edit) = &operation {
            self.edits.push(edit.clone());
        }
        debug_span!("stub").in_scope(|| {
            debug!(%message_id, %operation, "received request");
        });

        let reply = match self.take_fault(&operation) {
            Some(error) => RpcReply::errors(&message_id, vec![error]),
            None => match self.execute(session_id, operation) {
                Ok(data) => match data {
                    Some(data) => RpcReply::data(&message_id, data),
                    None => RpcReply::ok(&message_id),
                },
                Err(error) => RpcReply::errors(&message_id, vec![error]),
            },
        };

        if !self.silent
            && let Some(events_tx) = &self.events_tx
        {
            let message = Message::Reply(reply);
            let _ = events_tx.send(TransportEvent::Message(message));
        }
    }

    fn take_fault(&mut self, operation: &Operation) -> Option<RpcError> {
        let pos = self.faults.iter().position(|fault| {
            fault.operation == operation.name()
                && (fault.target.is_none() || fault.target == operation.datastore())
        })?;
        let fault = self.faults.remove(pos);
        Some(
            RpcError::new(ErrorType::Application, fault.tag)
                .with_message("injected failure"),
        )
    }

    fn execute(
        &mut self,
        session_id: u32,
        operation: Operation,
    ) -> Result<Option<Vec<DataNode>>, RpcError> {
        match operation {
            Operation::Get { filter } => {
                Ok(Some(self.filter(Datastore::Running, filter.as_ref())))
            }
            Operation::GetConfig { source, filter } => {
                self.check_datastore(source)?;
                Ok(Some(self.filter(source, filter.as_ref())))
            }
            Operation::EditConfig(edit) => {
                self.edit_config(session_id, edit)?;
                Ok(None)
            }
            Operation::Lock { target } => {
                self.check_datastore(target)?;
                if self.locks.contains_key(&target) {
                    return Err(RpcError::new(
                        ErrorType::Protocol,
                        ErrorTag::LockDenied,
                    )
                    .with_message(format!("{} is already locked", target)));
                }
                self.locks.insert(target, session_id);
                Ok(None)
            }
            Operation::Unlock { target } => {
                if self.locks.get(&target) != Some(&session_id) {
                    return Err(RpcError::new(
                        ErrorType::Protocol,
                        ErrorTag::OperationFailed,
                    )
                    .with_message(format!("{} is not locked", target)));
                }
                self.locks.remove(&target);
                Ok(None)
            }
            Operation::Commit => {
                self.check_datastore(Datastore::Candidate)?;
                self.check_lock(session_id, Datastore::Running)?;
                self.running = self.candidate.clone();
                Ok(None)
            }
            Operation::DiscardChanges => {
                self.check_datastore(Datastore::Candidate)?;
                self.candidate = self.running.clone();
                Ok(None)
            }
            Operation::CloseSession => {
                self.locks.retain(|_, holder| *holder != session_id);
                Ok(None)
            }
        }
    }

    fn check_datastore(&self, datastore: Datastore) -> Result<(), RpcError> {
        let supported = match datastore {
            Datastore::Running => true,
            Datastore::Candidate => {
                self.capabilities.contains(Capabilities::CANDIDATE)
            }
            Datastore::Startup => {
                self.capabilities.contains(Capabilities::STARTUP)
            }
        };
        if !supported {
            return Err(RpcError::new(
                ErrorType::Protocol,
                ErrorTag::OperationNotSupported,
            )
            .with_message(format!("{} datastore not supported", datastore)));
        }
        Ok(())
    }

    fn check_lock(
        &self,
        session_id: u32,
        datastore: Datastore,
    ) -> Result<(), RpcError> {
        match self.locks.get(&datastore) {
            Some(holder) if *holder != session_id => Err(RpcError::new(
                ErrorType::Protocol,
                ErrorTag::InUse,
            )
            .with_message(format!("{} is locked by another session", datastore))),
            _ => Ok(()),
        }
    }

    fn datastore(&self, datastore: Datastore) -> &DataTree {
        match datastore {
            Datastore::Candidate => &self.candidate,
            Datastore::Running | Datastore::Startup => &self.running,
        }
    }

    fn datastore_mut(&mut self, datastore: Datastore) -> &mut DataTree {
        match datastore {
            Datastore::Candidate => &mut self.candidate,
            Datastore::Running | Datastore::Startup => &mut self.running,
        }
    }

    fn filter(&self, source: Datastore, filter: Option<&DataNode>) -> Vec<DataNode> {
        let tree = self.datastore(source);
        match filter {
            Some(filter) => tree
                .nodes
                .iter()
                .filter_map(|node| filter_node(node, filter))
                .collect(),
            None => tree.nodes.clone(),
        }
    }

    fn edit_config(
        &mut self,
        session_id: u32,
        edit: EditConfig,
    ) -> Result<(), RpcError> {
        match edit.target {
            Datastore::Candidate => self.check_datastore(Datastore::Candidate)?,
            Datastore::Running => {
                if !self.capabilities.contains(Capabilities::WRITABLE_RUNNING) {
                    return Err(RpcError::new(
                        ErrorType::Protocol,
                        ErrorTag::OperationNotSupported,
                    )
                    .with_message("running datastore is not writable"));
                }
            }
            Datastore::Startup => {
                return Err(RpcError::new(
                    ErrorType::Protocol,
                    ErrorTag::OperationNotSupported,
                ));
            }
        }
        self.check_lock(session_id, edit.target)?;

        let inherited = match edit.default_operation.unwrap_or_default() {
            DefaultOperation::Merge => Some(EditOperation::Merge),
            DefaultOperation::Replace => Some(EditOperation::Replace),
            DefaultOperation::None => None,
        };

        let schema = self.schema.clone();
        let mut tree = self.datastore(edit.target).clone();
        let mut result = Ok(());
        for node in &edit.config {
            result = edit_node(
                schema.as_ref(),
                &mut tree,
                &InstancePath::root(),
                None,
                node,
                inherited,
            );
            if result.is_err() {
                break;
            }
        }

        if result.is_ok() || edit.error_option != Some(ErrorOption::RollbackOnError) {
            *self.datastore_mut(edit.target) = tree;
        }
        result
    }
}

// ===== impl StubConnector =====

impl Connector for StubConnector {
    fn connect(
        &self,
    ) -> BoxFuture<'static, Result<TransportSession, TransportError>> {
        let result = self.device.inner.lock().unwrap().connect(&self.device);
        futures::future::ready(result).boxed()
    }
}

// ===== impl StubTransport =====

impl Transport for StubTransport {
    fn send(
        &self,
        request: Request,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let mut inner = self.device.inner.lock().unwrap();
        let result = if inner.session_id == self.session_id
            && inner.events_tx.is_some()
        {
            inner.process(self.session_id, request);
            Ok(())
        } else {
            Err(TransportError::Closed)
        };
        futures::future::ready(result).boxed()
    }

    fn disconnect(&self) {
        let mut inner = self.device.inner.lock().unwrap();
        inner.end_session(self.session_id, None);
    }
}

// ===== helper functions =====

// Applies one node of an edit-config. The first operation found along a
// branch applies to the whole subtree below it.
fn edit_node(
    schema: &dyn SchemaProvider,
    tree: &mut DataTree,
    parent: &InstancePath,
    parent_snode: Option<&SchemaNode>,
    node: &DataNode,
    inherited: Option<EditOperation>,
) -> Result<(), RpcError> {
    let snode = schema
        .find_child(parent_snode, node.namespace.as_deref(), &node.name)
        .ok_or_else(|| {
            RpcError::new(ErrorType::Application, ErrorTag::UnknownElement)
                .with_message(node.name.clone())
        })?;
    let arg = snode.path_arg(node).map_err(|error| {
        RpcError::new(ErrorType::Application, ErrorTag::MissingElement)
            .with_message(error.to_string())
    })?;
    let path = parent.child(arg);
    let explicit = node.operation().map_err(|error| {
        RpcError::new(ErrorType::Protocol, ErrorTag::BadAttribute)
            .with_message(error.to_string())
    })?;
    let operation = explicit.or(inherited).unwrap_or(EditOperation::None);

    let data_exists = || {
        RpcError::new(ErrorType::Application, ErrorTag::DataExists)
            .with_path(path.to_string())
    };
    let data_missing = || {
        RpcError::new(ErrorType::Application, ErrorTag::DataMissing)
            .with_path(path.to_string())
    };

    match operation {
        EditOperation::None => {
            if !tree.contains(&path) {
                return Err(data_missing());
            }
            for child in &node.children {
                if snode.is_key(&child.name) {
                    continue;
                }
                edit_node(schema, tree, &path, Some(&snode), child, None)?;
            }
            Ok(())
        }
        EditOperation::Merge => {
            if !tree.merge_at(schema, &path, node.stripped()) {
                return Err(data_missing());
            }
            Ok(())
        }
        EditOperation::Create if tree.contains(&path) => Err(data_exists()),
        EditOperation::Replace | EditOperation::Create => {
            if !tree.replace_at(&path, node.stripped()) {
                return Err(data_missing());
            }
            Ok(())
        }
        EditOperation::Delete => {
            tree.remove_at(&path).map(|_| ()).ok_or_else(data_missing)
        }
        EditOperation::Remove => {
            tree.remove_at(&path);
            Ok(())
        }
    }
}

// Subtree filtering (RFC 6241, section 6). Leaves with a value are content
// match nodes, empty nodes are selection nodes.
fn filter_node(node: &DataNode, filter: &DataNode) -> Option<DataNode> {
    if node.name != filter.name {
        return None;
    }
    if let Some(value) = &filter.value {
        return (node.value.as_ref() == Some(value)).then(|| node.clone());
    }
    if filter.children.is_empty() {
        return Some(node.clone());
    }

    let (content, others): (Vec<_>, Vec<_>) =
        filter.children.iter().partition(|child| child.value.is_some());
    let mut selected = DataNode {
        name: node.name.clone(),
        namespace: node.namespace.clone(),
        value: node.value.clone(),
        attributes: node.attributes.clone(),
        children: vec![],
    };
    for cfilter in &content {
        let child = node.children.iter().find(|child| {
            child.name == cfilter.name && child.value == cfilter.value
        })?;
        selected.children.push(child.clone());
    }
    if others.is_empty() {
        return Some(node.clone());
    }

    let mut found = false;
    for cfilter in others {
        for child in &node.children {
            if let Some(child) = filter_node(child, cfilter) {
                selected.children.push(child);
                found = true;
            }
        }
    }
    found.then_some(selected)
}
