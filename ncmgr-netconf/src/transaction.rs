//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use derive_new::new;
use ncmgr_utils::task::Task;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capabilities::Capabilities;
use crate::changes::{ChangeRecord, ChangeTracker};
use crate::data::{DataNode, DataTree, EditOperation, InstancePath};
use crate::debug::Debug;
use crate::error::Error;
use crate::message::{
    Datastore, DefaultOperation, EditConfig, ErrorOption, Operation,
};
use crate::schema::SchemaProvider;
use crate::session::Session;

// Datastores written by a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    CandidateOnly,
    RunningOnly,
    Dual,
}

// Write strategy negotiated for a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct Profile {
    pub variant: Variant,
    pub rollback_on_error: bool,
    pub lock: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxState {
    Open,
    Locking,
    Accumulating,
    Committing,
    Discarding,
    Closed,
}

// Logical unit of configuration changes.
//
// Locks are taken on the first write. The transaction ends with `commit` or
// `cancel`, or as soon as any write fails, in which case the changes are
// discarded and every further call fails.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    session: Arc<Session>,
    schema: Arc<dyn SchemaProvider>,
    profile: Profile,
    state: TxState,
    locked: Vec<Datastore>,
    pending: Vec<ChangeRecord>,
    tainted: bool,
}

// ===== impl Profile =====

impl Profile {
    pub fn from_capabilities(
        capabilities: Capabilities,
        lock: bool,
    ) -> Result<Profile, Error> {
        let variant = match (
            capabilities.contains(Capabilities::CANDIDATE),
            capabilities.contains(Capabilities::WRITABLE_RUNNING),
        ) {
            (true, true) => Variant::Dual,
            (true, false) => Variant::CandidateOnly,
            (false, true) => Variant::RunningOnly,
            (false, false) => return Err(Error::NoWritableDatastore),
        };
        let rollback_on_error =
            capabilities.contains(Capabilities::ROLLBACK_ON_ERROR);

        Ok(Profile::new(variant, rollback_on_error, lock))
    }

    // Datastores every edit is sent to, in order.
    pub fn edit_targets(&self) -> &'static [Datastore] {
        match self.variant {
            Variant::CandidateOnly => &[Datastore::Candidate],
            Variant::RunningOnly => &[Datastore::Running],
            Variant::Dual => &[Datastore::Candidate, Datastore::Running],
        }
    }

    // Datastores to lock, in locking order. Unlocking uses the reverse order.
    pub fn lock_targets(&self) -> &'static [Datastore] {
        if !self.lock {
            return &[];
        }
        match self.variant {
            Variant::CandidateOnly => &[Datastore::Candidate],
            Variant::RunningOnly => &[Datastore::Running],
            Variant::Dual => &[Datastore::Running, Datastore::Candidate],
        }
    }

    // Datastore holding the transaction's in-flight view.
    pub fn read_source(&self) -> Datastore {
        match self.variant {
            Variant::RunningOnly => Datastore::Running,
            Variant::CandidateOnly | Variant::Dual => Datastore::Candidate,
        }
    }

    pub fn is_candidate_backed(&self) -> bool {
        self.variant != Variant::RunningOnly
    }

    pub fn error_option(&self) -> Option<ErrorOption> {
        self.rollback_on_error.then_some(ErrorOption::RollbackOnError)
    }
}

// ===== impl Transaction =====

impl Transaction {
    pub fn new(
        session: Arc<Session>,
        schema: Arc<dyn SchemaProvider>,
        profile: Profile,
    ) -> Transaction {
        Transaction {
            id: session.next_tx_id(),
            session,
            schema,
            profile,
            state: TxState::Open,
            locked: vec![],
            pending: vec![],
            tainted: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    // Edits emitted to the device but not committed yet.
    pub fn pending_edits(&self) -> &[ChangeRecord] {
        &self.pending
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    // Replaces the subtree at `path` with `data`.
    pub async fn put(
        &mut self,
        path: &InstancePath,
        data: DataNode,
    ) -> Result<(), Error> {
        self.write_at(path, data, EditOperation::Replace).await
    }

    // Merges `data` into the subtree at `path`.
    pub async fn merge(
        &mut self,
        path: &InstancePath,
        data: DataNode,
    ) -> Result<(), Error> {
        self.write_at(path, data, EditOperation::Merge).await
    }

    // Creates the subtree at `path`, failing if it already exists.
    pub async fn create(
        &mut self,
        path: &InstancePath,
        data: DataNode,
    ) -> Result<(), Error> {
        self.write_at(path, data, EditOperation::Create).await
    }

    // Deletes the subtree at `path`, failing if it doesn't exist.
    pub async fn delete(&mut self, path: &InstancePath) -> Result<(), Error> {
        self.remove_at(path, EditOperation::Delete).await
    }

    // Removes the subtree at `path` if present.
    pub async fn remove(&mut self, path: &InstancePath) -> Result<(), Error> {
        self.remove_at(path, EditOperation::Remove).await
    }

    // Applies an edit intent rooted under `parent`. Nodes of the intent may
    // carry explicit operation attributes, the others inherit the operation
    // of their ancestors or `default_operation`.
    pub async fn edit(
        &mut self,
        parent: &InstancePath,
        intent: &DataNode,
        default_operation: EditOperation,
    ) -> Result<(), Error> {
        self.check_closed()?;

        let mut tracker = ChangeTracker::new(self.schema.as_ref());
        tracker.track(parent, intent, default_operation)?;
        let records = tracker.into_records();
        if records.is_empty() {
            return Ok(());
        }

        if self.state == TxState::Open {
            self.lock().await?;
        }

        // Records of the same intent may create each other's parents, so
        // the preconditions are evaluated before anything is written.
        if let Err(error) = self.check_preconditions(&records).await {
            self.discard().await;
            return Err(error);
        }

        for record in records {
            Debug::ChangeRecord(self.id, &record).log();
            if let Err(error) = self.apply(&record).await {
                self.discard().await;
                return Err(error);
            }
            self.pending.push(record);
        }

        Ok(())
    }

    // Commits the changes and releases the locks.
    pub async fn commit(&mut self) -> Result<(), Error> {
        match self.state {
            TxState::Closed if self.tainted => return Err(Error::Tainted),
            TxState::Closed => return Err(Error::TransactionClosed),
            TxState::Open => {
                self.set_state(TxState::Closed);
                return Ok(());
            }
            _ => (),
        }
        if self.tainted {
            self.discard().await;
            return Err(Error::Tainted);
        }

        self.set_state(TxState::Committing);
        if self.profile.is_candidate_backed()
            && let Err(error) = self.session.rpc_ok(Operation::Commit).await
        {
            self.discard().await;
            return Err(error);
        }
        self.pending.clear();

        // The changes are live at this point.
        let result = self.unlock_all().await;
        self.set_state(TxState::Closed);
        result.map_err(|(datastore, error)| {
            Error::LockLeaked(datastore, Box::new(error))
        })
    }

    // Discards the changes and releases the locks.
    pub async fn cancel(&mut self) -> Result<(), Error> {
        match self.state {
            TxState::Closed => Err(Error::TransactionClosed),
            TxState::Open => {
                self.set_state(TxState::Closed);
                Ok(())
            }
            _ => {
                self.discard().await;
                Ok(())
            }
        }
    }

    async fn write_at(
        &mut self,
        path: &InstancePath,
        mut data: DataNode,
        operation: EditOperation,
    ) -> Result<(), Error> {
        self.check_closed()?;

        let (last, parent) = split_path(path)?;
        if !data.matches(last) {
            return Err(Error::PayloadMismatch(path.clone(), data.name));
        }
        data.set_operation(operation);
        self.edit(&parent, &data, EditOperation::None).await
    }

    async fn remove_at(
        &mut self,
        path: &InstancePath,
        operation: EditOperation,
    ) -> Result<(), Error> {
        self.check_closed()?;

        let (last, parent) = split_path(path)?;
        let data = DataNode::from_path_arg(last).with_operation(operation);
        self.edit(&parent, &data, EditOperation::None).await
    }

    async fn lock(&mut self) -> Result<(), Error> {
        self.set_state(TxState::Locking);
        for &datastore in self.profile.lock_targets() {
            let lock = Operation::Lock { target: datastore };
            if let Err(error) = self.session.rpc_ok(lock).await {
                if let Err((locked, unlock_error)) = self.unlock_all().await {
                    warn!(datastore = %locked, error = %unlock_error, "failed to release lock");
                }
                self.set_state(TxState::Closed);
                return Err(Error::LockFailed(datastore, Box::new(error)));
            }
            self.locked.push(datastore);
        }
        self.set_state(TxState::Accumulating);
        Ok(())
    }

    // Releases all locks held, in reverse locking order. Returns the first
    // failure, if any.
    async fn unlock_all(&mut self) -> Result<(), (Datastore, Error)> {
        let mut result = Ok(());
        while let Some(datastore) = self.locked.pop() {
            let unlock = Operation::Unlock { target: datastore };
            if let Err(error) = self.session.rpc_ok(unlock).await
                && result.is_ok()
            {
                result = Err((datastore, error));
            }
        }
        result
    }

    async fn discard(&mut self) {
        self.set_state(TxState::Discarding);
        if self.profile.is_candidate_backed()
            && let Err(error) =
                self.session.rpc_ok(Operation::DiscardChanges).await
        {
            error.log();
        }
        if let Err((datastore, error)) = self.unlock_all().await {
            warn!(%datastore, %error, "failed to release lock");
        }
        self.pending.clear();
        self.set_state(TxState::Closed);
    }

    async fn apply(&mut self, record: &ChangeRecord) -> Result<(), Error> {
        let path = &record.path;
        match record.operation {
            EditOperation::None => Ok(()),
            EditOperation::Merge => self.emit(self.edit_payload(record)).await,
            EditOperation::Replace | EditOperation::Create => {
                self.materialize_parent(path).await?;
                self.emit(self.edit_payload(record)).await
            }
            EditOperation::Delete => self.emit(self.edit_payload(record)).await,
            EditOperation::Remove => {
                match self.emit(self.edit_payload(record)).await {
                    Err(error) if !self.tainted => {
                        error.log();
                        Ok(())
                    }
                    result => result,
                }
            }
        }
    }

    // Checks the CREATE and DELETE preconditions of an intent against the
    // transaction's in-flight view.
    async fn check_preconditions(
        &self,
        records: &[ChangeRecord],
    ) -> Result<(), Error> {
        for record in records {
            let path = &record.path;
            if !matches!(
                record.operation,
                EditOperation::Create | EditOperation::Delete
            ) {
                continue;
            }
            match (record.operation, self.exists(path).await?) {
                (EditOperation::Create, true) => {
                    return Err(Error::DataExists(path.clone()));
                }
                (EditOperation::Delete, false) => {
                    return Err(Error::DataMissing(path.clone()));
                }
                _ => (),
            }
        }
        Ok(())
    }

    // Sends one edit-config per target datastore.
    async fn emit(&mut self, config: DataNode) -> Result<(), Error> {
        for (idx, &datastore) in self.profile.edit_targets().iter().enumerate()
        {
            let edit = EditConfig {
                target: datastore,
                default_operation: Some(DefaultOperation::None),
                error_option: self.profile.error_option(),
                config: vec![config.clone()],
            };
            if let Err(error) =
                self.session.rpc_ok(Operation::EditConfig(edit)).await
            {
                if idx > 0 {
                    self.tainted = true;
                    Debug::TxTainted(self.id, datastore).log();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    // Builds the edit-config payload of a change record, wrapped in its
    // ancestors.
    fn edit_payload(&self, record: &ChangeRecord) -> DataNode {
        let args = record.path.args();
        let Some((last, ancestors)) = args.split_last() else {
            return DataNode::default();
        };
        let node = record
            .payload
            .clone()
            .unwrap_or_else(|| DataNode::from_path_arg(last));

        match record.operation {
            // Missing ancestors are created along the way.
            EditOperation::Merge => {
                DataNode::wrap(ancestors, node).with_operation(EditOperation::Merge)
            }
            // The device only knows about the final state.
            EditOperation::Create | EditOperation::Replace => DataNode::wrap(
                ancestors,
                node.with_operation(EditOperation::Replace),
            ),
            operation => {
                DataNode::wrap(ancestors, node.with_operation(operation))
            }
        }
    }

    // Checks whether the path has data in the transaction's in-flight view.
    async fn exists(&self, path: &InstancePath) -> Result<bool, Error> {
        let get_config = Operation::GetConfig {
            source: self.profile.read_source(),
            filter: DataNode::skeleton(path.args()),
        };
        let data = self.session.rpc_data(get_config).await?;
        Ok(DataTree::new(data).contains(path))
    }

    // Creates the missing ancestors of `path` by merging an empty skeleton.
    //
    // Failures are only logged, unless they left the datastores diverged.
    async fn materialize_parent(
        &mut self,
        path: &InstancePath,
    ) -> Result<(), Error> {
        if path.len() <= 1 {
            return Ok(());
        }
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match self.exists(&parent).await {
            Ok(true) => return Ok(()),
            Ok(false) => (),
            Err(error) => {
                error.log();
                return Ok(());
            }
        }

        Debug::TxParentMaterialize(self.id, &parent).log();
        let Some(skeleton) = DataNode::skeleton(parent.args()) else {
            return Ok(());
        };
        match self.emit(skeleton.with_operation(EditOperation::Merge)).await {
            Err(error) if !self.tainted => {
                error.log();
                Ok(())
            }
            result => result,
        }
    }

    fn check_closed(&self) -> Result<(), Error> {
        if self.state == TxState::Closed {
            return Err(Error::TransactionClosed);
        }
        Ok(())
    }

    fn set_state(&mut self, state: TxState) {
        if self.state != state {
            Debug::TxStateChange(self.id, self.state, state).log();
            self.state = state;
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if matches!(self.state, TxState::Open | TxState::Closed) {
            return;
        }

        // Release the device resources in the background.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(id = %self.id, "transaction dropped outside of a runtime");
            return;
        };
        let _guard = runtime.enter();
        let session = self.session.clone();
        let candidate_backed = self.profile.is_candidate_backed();
        let mut locked = std::mem::take(&mut self.locked);
        let mut task = Task::spawn(async move {
            if candidate_backed
                && let Err(error) =
                    session.rpc_ok(Operation::DiscardChanges).await
            {
                error.log();
            }
            while let Some(datastore) = locked.pop() {
                let unlock = Operation::Unlock { target: datastore };
                if let Err(error) = session.rpc_ok(unlock).await {
                    warn!(%datastore, %error, "failed to release lock");
                }
            }
        });
        task.detach();
    }
}

// ===== helper functions =====

fn split_path(
    path: &InstancePath,
) -> Result<(&crate::data::PathArg, InstancePath), Error> {
    match (path.last(), path.parent()) {
        (Some(last), Some(parent)) => Ok((last, parent)),
        _ => Err(Error::InvalidPath(path.to_string())),
    }
}
