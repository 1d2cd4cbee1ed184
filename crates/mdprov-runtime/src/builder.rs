//! Runtime Builder API
//!
//! Wires a `ProviderEngine` to the TCP transport (or a caller-supplied one),
//! starts the accept loop and, in the API-dispatch model, the dispatch task.
//! The returned `RuntimeHandle` is how applications publish and shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mdprov_core::{
    AckMsg, ChannelTransport, EnumTypeTables, ErrorClient, FieldDictionary, GenericMsg,
    ItemHandle, OperationModel, ProviderClient, ProviderConfig, ProviderEngine, ProviderError,
    RefreshMsg, StatusMsg, TimeSource, UpdateMsg,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

#[cfg(not(feature = "std"))]
use log::{info, warn};
#[cfg(feature = "std")]
use tracing::{info, warn};

use crate::connections::{ConnectionDirectory, TcpChannelTransport};
use crate::dispatcher::{Dispatcher, SharedEngine};
use crate::error::{RuntimeError, RuntimeResult};
use crate::tcp::{TcpAcceptor, TransportEvent, FRAME_HEADER_LEN};

/// Room above the dictionary part buffer for large directory and item messages
const FRAME_OVERHEAD: usize = 64 * 1024;

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

pub struct RuntimeBuilder {
    config: ProviderConfig,
    listen: Option<SocketAddr>,
    transport: Option<Box<dyn ChannelTransport>>,
    client: Option<Box<dyn ProviderClient>>,
    error_client: Option<Box<dyn ErrorClient>>,
    time_source: Option<Arc<dyn TimeSource>>,
    field_dictionary: Option<FieldDictionary>,
    enum_tables: Option<EnumTypeTables>,
}

impl RuntimeBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            listen: None,
            transport: None,
            client: None,
            error_client: None,
            time_source: None,
            field_dictionary: None,
            enum_tables: None,
        }
    }

    /// Accept consumers on `addr`; port 0 picks a free port
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = Some(addr);
        self
    }

    /// Replace the TCP transport, e.g. with an in-memory recorder. Channel
    /// events are then injected through `RuntimeHandle::event_sender`.
    pub fn transport(mut self, transport: Box<dyn ChannelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn client(mut self, client: Box<dyn ProviderClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn error_client(mut self, error_client: Box<dyn ErrorClient>) -> Self {
        self.error_client = Some(error_client);
        self
    }

    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    pub fn field_dictionary(mut self, dictionary: FieldDictionary) -> Self {
        self.field_dictionary = Some(dictionary);
        self
    }

    pub fn enum_tables(mut self, tables: EnumTypeTables) -> Self {
        self.enum_tables = Some(tables);
        self
    }

    /// Build the engine and start the runtime tasks
    pub async fn build_and_start(self) -> RuntimeResult<RuntimeHandle> {
        self.config.validate().map_err(ProviderError::config_error)?;
        if self.listen.is_some() && self.transport.is_some() {
            return Err(RuntimeError::invalid_operation(
                "a listen address requires the built-in TCP transport",
            ));
        }

        let dispatch = self.config.dispatch.clone();
        let max_frame = self.config.dictionary.max_part_buffer + FRAME_OVERHEAD + FRAME_HEADER_LEN;
        let (event_sender, event_receiver) = mpsc::channel(dispatch.event_buffer_size.max(1));
        let connections = Arc::new(ConnectionDirectory::new(dispatch.outbound_buffer_size));

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(TcpChannelTransport::new(connections.clone())),
        };

        let mut builder = ProviderEngine::builder(self.config).transport(transport);
        if let Some(client) = self.client {
            builder = builder.client(client);
        }
        if let Some(error_client) = self.error_client {
            builder = builder.error_client(error_client);
        }
        if let Some(time_source) = self.time_source {
            builder = builder.time_source(time_source);
        }
        if let Some(dictionary) = self.field_dictionary {
            builder = builder.field_dictionary(dictionary);
        }
        if let Some(tables) = self.enum_tables {
            builder = builder.enum_tables(tables);
        }
        let engine: SharedEngine = Arc::new(Mutex::new(builder.build()?));

        let (shutdown, shutdown_receiver) = watch::channel(false);

        let mut local_addr = None;
        let mut acceptor_handle = None;
        if let Some(addr) = self.listen {
            let listener = TcpListener::bind(addr).await?;
            let acceptor = TcpAcceptor::new(
                listener,
                connections.clone(),
                event_sender.clone(),
                max_frame,
            );
            local_addr = Some(acceptor.local_addr()?);
            let shutdown = shutdown_receiver.clone();
            acceptor_handle = Some(tokio::spawn(acceptor.run(shutdown)));
        }

        let dispatcher = Dispatcher::new(engine.clone(), event_receiver, &dispatch);
        let (dispatcher, dispatch_handle) = match dispatch.operation_model {
            OperationModel::ApiDispatch => {
                let handle = tokio::spawn(dispatcher.run(shutdown_receiver));
                (None, Some(handle))
            }
            OperationModel::UserDispatch => (Some(dispatcher), None),
        };

        info!(
            "Provider runtime started ({:?}{})",
            dispatch.operation_model,
            local_addr
                .map(|addr| format!(", listening on {}", addr))
                .unwrap_or_default()
        );

        Ok(RuntimeHandle {
            engine,
            event_sender,
            connections,
            local_addr,
            dispatcher,
            dispatch_handle,
            acceptor_handle,
            shutdown,
            dispatch_timeout: Duration::from_millis(dispatch.dispatch_timeout_ms),
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running provider
pub struct RuntimeHandle {
    engine: SharedEngine,
    event_sender: mpsc::Sender<TransportEvent>,
    connections: Arc<ConnectionDirectory>,
    local_addr: Option<SocketAddr>,
    dispatcher: Option<Dispatcher>,
    dispatch_handle: Option<JoinHandle<RuntimeResult<()>>>,
    acceptor_handle: Option<JoinHandle<RuntimeResult<()>>>,
    shutdown: watch::Sender<bool>,
    dispatch_timeout: Duration,
    running: bool,
}

impl RuntimeHandle {
    /// The engine, behind the lock every publish call takes
    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Bound address when the runtime listens on TCP
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Sender for injecting transport events, used with a custom transport
    pub fn event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.event_sender.clone()
    }

    pub fn connections(&self) -> Arc<ConnectionDirectory> {
        self.connections.clone()
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    /// Process one batch of events in the user-dispatch model
    pub async fn dispatch(&mut self, timeout: Duration) -> RuntimeResult<usize> {
        if !self.running {
            return Err(RuntimeError::Shutdown);
        }
        match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.dispatch(timeout).await,
            None => Err(RuntimeError::invalid_operation(
                "dispatch() is only available in the user-dispatch operation model",
            )),
        }
    }

    pub async fn submit_refresh(&self, refresh: RefreshMsg, handle: ItemHandle) -> RuntimeResult<()> {
        Ok(self.engine.lock().await.submit_refresh(refresh, handle)?)
    }

    pub async fn submit_update(&self, update: UpdateMsg, handle: ItemHandle) -> RuntimeResult<()> {
        Ok(self.engine.lock().await.submit_update(update, handle)?)
    }

    pub async fn submit_status(&self, status: StatusMsg, handle: ItemHandle) -> RuntimeResult<()> {
        Ok(self.engine.lock().await.submit_status(status, handle)?)
    }

    pub async fn submit_generic(&self, generic: GenericMsg, handle: ItemHandle) -> RuntimeResult<()> {
        Ok(self.engine.lock().await.submit_generic(generic, handle)?)
    }

    pub async fn submit_ack(&self, ack: AckMsg, handle: ItemHandle) -> RuntimeResult<()> {
        Ok(self.engine.lock().await.submit_ack(ack, handle)?)
    }

    pub fn is_running(&self) -> bool {
        self.running
            && self
                .dispatch_handle
                .as_ref()
                .map_or(true, |handle| !handle.is_finished())
    }

    /// Stop accepting, stop dispatching and close every channel
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        if !self.running {
            return Ok(());
        }
        info!("Shutting down provider runtime");
        let _ = self.shutdown.send(true);

        if let Some(handle) = self.dispatch_handle.take() {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(result)) => result?,
                Ok(Err(err)) => warn!("Dispatch task panicked: {}", err),
                Err(_) => warn!("Dispatch task did not stop in time"),
            }
        }
        if let Some(handle) = self.acceptor_handle.take() {
            handle.abort();
        }

        let mut engine = self.engine.lock().await;
        for channel in engine.channels() {
            engine.close_channel(channel);
        }
        drop(engine);

        self.running = false;
        info!("Provider runtime shut down");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Start a TCP provider with the given configuration and client
pub async fn create_tcp_runtime(
    config: ProviderConfig,
    addr: SocketAddr,
    client: Box<dyn ProviderClient>,
) -> RuntimeResult<RuntimeHandle> {
    RuntimeBuilder::new(config)
        .listen(addr)
        .client(client)
        .build_and_start()
        .await
}
