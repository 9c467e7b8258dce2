//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ncmgr_utils::UnboundedSender;
use ncmgr_utils::task::Task;
use tokio::sync::watch;
use tracing::{Instrument, debug_span, warn};

use crate::capabilities::Capabilities;
use crate::config::DeviceConfig;
use crate::correlator::Correlator;
use crate::data::{DataNode, DataTree, EditOperation, InstancePath};
use crate::debug::Debug;
use crate::error::Error;
use crate::message::{Datastore, Notification, Operation};
use crate::schema::SchemaProvider;
use crate::session::Session;
use crate::transaction::{Profile, Transaction};
use crate::transport::{Connector, TransportEvent, TransportSession};

// Handle to a managed device.
//
// The device keeps a connection task running in the background, which
// (re)establishes the NETCONF session and delivers the transport events to
// it.
#[derive(Debug)]
pub struct Device {
    name: String,
    config: DeviceConfig,
    schema: Arc<dyn SchemaProvider>,
    session: Arc<ArcSwapOption<Session>>,
    up_rx: watch::Receiver<bool>,
    task: Task<()>,
}

// ===== impl Device =====

impl Device {
    // Starts managing a device. Must be called within a tokio runtime.
    pub fn connect(
        name: impl Into<String>,
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        schema: Arc<dyn SchemaProvider>,
        notif_tx: Option<UnboundedSender<Notification>>,
    ) -> Device {
        let name = name.into();
        let session = Arc::new(ArcSwapOption::empty());
        let (up_tx, up_rx) = watch::channel(false);

        let span = debug_span!("device", name = %name);
        let task = Task::spawn(
            connection_task(
                name.clone(),
                config.clone(),
                connector,
                session.clone(),
                up_tx,
                notif_tx,
            )
            .instrument(span),
        );

        Device {
            name,
            config,
            schema,
            session,
            up_rx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_up(&self) -> bool {
        self.session.load().as_ref().is_some_and(|session| session.is_up())
    }

    // Returns the current session.
    pub fn session(&self) -> Result<Arc<Session>, Error> {
        self.session
            .load_full()
            .filter(|session| session.is_up())
            .ok_or(Error::SessionDown(None))
    }

    // Waits until a session is established.
    pub async fn wait_up(&self) -> Result<Arc<Session>, Error> {
        let mut up_rx = self.up_rx.clone();
        up_rx.wait_for(|up| *up).await.map_err(|_| {
            Error::SessionDown(Some("connection task terminated".to_owned()))
        })?;
        self.session()
    }

    pub fn capabilities(&self) -> Result<Capabilities, Error> {
        Ok(self.session()?.capabilities())
    }

    pub fn begin_transaction(&self) -> Result<Transaction, Error> {
        let session = self.session()?;
        let profile = Profile::from_capabilities(
            session.capabilities(),
            self.config.lock_datastore,
        )?;
        Ok(Transaction::new(session, self.schema.clone(), profile))
    }

    pub async fn get(
        &self,
        filter: Option<DataNode>,
    ) -> Result<Vec<DataNode>, Error> {
        let session = self.session()?;
        session.rpc_data(Operation::Get { filter }).await
    }

    pub async fn get_config(
        &self,
        source: Datastore,
        filter: Option<DataNode>,
    ) -> Result<Vec<DataNode>, Error> {
        let session = self.session()?;
        session
            .rpc_data(Operation::GetConfig { source, filter })
            .await
    }

    // Reads the subtree at `path` from the given datastore.
    pub async fn read(
        &self,
        source: Datastore,
        path: &InstancePath,
    ) -> Result<Option<DataNode>, Error> {
        if path.is_root() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let data = self
            .get_config(source, DataNode::skeleton(path.args()))
            .await?;
        Ok(DataTree::new(data).find(path).cloned())
    }

    // Replaces the subtree at `path` in a single transaction.
    pub async fn put(
        &self,
        path: &InstancePath,
        data: DataNode,
    ) -> Result<(), Error> {
        let mut tx = self.begin_transaction()?;
        tx.put(path, data).await?;
        tx.commit().await
    }

    // Merges `data` into the subtree at `path` in a single transaction.
    pub async fn merge(
        &self,
        path: &InstancePath,
        data: DataNode,
    ) -> Result<(), Error> {
        let mut tx = self.begin_transaction()?;
        tx.merge(path, data).await?;
        tx.commit().await
    }

    // Deletes the subtree at `path` in a single transaction.
    pub async fn delete(&self, path: &InstancePath) -> Result<(), Error> {
        let mut tx = self.begin_transaction()?;
        tx.delete(path).await?;
        tx.commit().await
    }

    // Applies an edit intent in a single transaction.
    pub async fn edit(
        &self,
        parent: &InstancePath,
        intent: &DataNode,
        default_operation: EditOperation,
    ) -> Result<(), Error> {
        let mut tx = self.begin_transaction()?;
        tx.edit(parent, intent, default_operation).await?;
        tx.commit().await
    }

    // Stops managing the device.
    //
    // Any in-progress connection attempt is cancelled and the current
    // session, if any, is closed.
    pub async fn close(&self) {
        // The reply is delivered by the connection task, so it has to stay
        // alive until then.
        if let Some(session) = self.session.load_full()
            && session.is_up()
            && let Err(error) = session.rpc_ok(Operation::CloseSession).await
        {
            error.log();
        }

        self.task.abort();
        if let Some(session) = self.session.swap(None) {
            session.close();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(session) = self.session.swap(None) {
            session.close();
        }
    }
}

// ===== helper functions =====

async fn connection_task(
    name: String,
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    slot: Arc<ArcSwapOption<Session>>,
    up_tx: watch::Sender<bool>,
    notif_tx: Option<UnboundedSender<Notification>>,
) {
    let mut backoff = config.reconnect.backoff();

    loop {
        match connector.connect().await {
            Ok(tsession) => {
                backoff.reset();
                run_session(&name, &config, tsession, &slot, &up_tx, &notif_tx)
                    .await;
            }
            Err(error) => {
                Error::Transport(error).log();
            }
        }

        if !config.reconnect.enabled {
            break;
        }
        let Some(delay) = backoff.next_delay() else {
            warn!(attempts = %backoff.attempts(), "giving up reconnecting");
            break;
        };
        Debug::ReconnectWait(&name, delay).log();
        tokio::time::sleep(delay).await;
    }
}

// Runs the event-delivery loop of an established session until it goes down.
async fn run_session(
    name: &str,
    config: &DeviceConfig,
    tsession: TransportSession,
    slot: &ArcSwapOption<Session>,
    up_tx: &watch::Sender<bool>,
    notif_tx: &Option<UnboundedSender<Notification>>,
) {
    let TransportSession {
        transport,
        session_id,
        capabilities,
        mut events,
    } = tsession;

    let correlator = Correlator::new(
        name.to_owned(),
        transport,
        config.max_concurrent_rpcs,
        notif_tx.clone(),
    );
    let session = Arc::new(Session::new(
        name.to_owned(),
        session_id,
        Capabilities::from_uris(&capabilities),
        correlator,
        config.request_timeout(),
    ));
    slot.store(Some(session.clone()));
    up_tx.send_replace(true);
    Debug::SessionUp(name, session_id).log();

    let reason = loop {
        match events.recv().await {
            Some(TransportEvent::Message(message)) => {
                session.correlator().on_message(message)
            }
            Some(TransportEvent::Down(reason)) => break reason,
            None => break None,
        }
    };

    slot.store(None);
    up_tx.send_replace(false);
    session.correlator().on_session_down(reason);
}
