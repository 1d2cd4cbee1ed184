//! mdprov Runtime
//!
//! Async shell around the `mdprov-core` engine:
//! - `Dispatcher`: the dispatch loop, driven by the runtime or by the application
//! - `TcpAcceptor` and `TcpChannelTransport`: length-prefixed TCP framing
//! - `ConnectionDirectory`: per-connection outbound queues and connection info
//! - `RuntimeBuilder` / `RuntimeHandle`: startup, publishing and shutdown
//!
//! All engine access goes through one `tokio::sync::Mutex`.

pub mod builder;
pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod tcp;

pub use builder::{create_tcp_runtime, RuntimeBuilder, RuntimeHandle};
pub use connections::{Connection, ConnectionDirectory, Registration, TcpChannelTransport};
pub use dispatcher::{Dispatcher, SharedEngine};
pub use error::{RuntimeError, RuntimeResult};
pub use tcp::{read_frame, write_frame, TcpAcceptor, TransportEvent};

// Re-export core types for convenience
pub use mdprov_core::{
    ChannelId, ItemHandle, OperationModel, ProviderClient, ProviderConfig, ProviderEngine,
    ProviderError, ProviderEvent,
};
