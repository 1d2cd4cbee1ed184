//! mdprov Core Engine
//!
//! Provider-side session and subscription-protocol engine for market-data
//! distribution: per-connection sessions, item lifecycle, the login, directory,
//! dictionary and item domain handlers, and the submission engine that turns an
//! application publish call into one or many sends.
//!
//! The engine performs no I/O. Wire encoding goes through `MessageCodec`, bytes
//! go out through `ChannelTransport`, and the application is reached through
//! `ProviderClient` and `ErrorClient`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod codec;
pub mod config;
pub mod dictionary;
pub mod directory;
pub mod engine;
pub mod errors;
pub mod handles;
pub mod item;
pub mod manager;
pub mod message;
pub mod session;
pub mod timer;
pub mod transport;
pub mod types;

mod handlers;
mod submission;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{ErrorClient, ProviderClient, ProviderEvent};
pub use codec::{BincodeCodec, MessageCodec};
pub use config::{
    AdminControl, ConfigBuilderError, DictionaryConfig, DirectoryConfig, DispatchConfig,
    OperationModel, ProviderConfig, ProviderConfigBuilder, ServiceDefinition, ServiceRef,
    SessionPolicyConfig, SharedProviderConfig,
};
pub use dictionary::{
    DictionaryPart, DictionaryPartEncoder, DictionaryPayload, DictionaryStore, EnumTypeTables,
    FieldDictionary,
};
pub use directory::{
    DirectoryChange, Service, ServiceDirectoryStore, ServiceInfo, ServiceState, ServiceUpdate,
};
pub use engine::{EngineBuilder, EngineStats, HandlerStats, ProviderEngine};
pub use errors::{
    DictionaryError, DirectoryError, ErrorKind, ProviderError, ProviderResult, Result,
    SessionError, TransportError,
};
pub use item::{ItemRecord, ItemState};
pub use manager::SessionManager;
pub use message::{
    AckMsg, CloseMsg, GenericMsg, Message, MsgClass, MsgKey, Payload, PostMsg, RefreshMsg,
    RequestMsg, StatusMsg, UpdateMsg,
};
pub use session::SessionRegistry;
pub use transport::{ChannelInfo, ChannelTransport, SubmitStatus};
pub use types::{
    ChannelId, DataState, DomainType, ItemGroupId, ItemHandle, Qos, ServiceId, State, StatusCode,
    StreamId, StreamState, SystemTimeSource, TimeSource, Timestamp,
};
