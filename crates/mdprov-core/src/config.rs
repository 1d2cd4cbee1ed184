//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures of the provider engine:
//! request admission policy, directory and dictionary administration, and the
//! dispatch model used by the runtime.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::directory::{ServiceInfo, ServiceState};

// ----------------------------------------------------------------------------
// Admin Control
// ----------------------------------------------------------------------------

/// Who answers directory and dictionary requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdminControl {
    /// The engine answers from its own store
    #[default]
    Api,
    /// Requests are delivered to the application, which answers them
    User,
}

/// Service reference by id or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceRef {
    Id(u16),
    Name(String),
}

impl Default for ServiceRef {
    fn default() -> Self {
        ServiceRef::Name(crate::directory::store::DEFAULT_SERVICE_NAME.to_string())
    }
}

// ----------------------------------------------------------------------------
// Session Policy Configuration
// ----------------------------------------------------------------------------

/// Request admission and publish-API policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicyConfig {
    /// Updates are rejected on streams that have not yet had a refresh
    pub refresh_first_required: bool,
    pub accept_message_without_accepting_requests: bool,
    pub accept_dir_message_without_min_filters: bool,
    pub accept_message_without_being_login: bool,
    /// Duplicate-key detection is enabled when this is false
    pub accept_message_same_key_but_diff_stream: bool,
    pub accept_message_that_changes_service: bool,
    pub accept_message_without_qos_in_range: bool,
    /// Acks must answer a previously received post id
    pub enforce_ack_id_validation: bool,
    /// Maximum concurrently accepted channels
    pub max_sessions: usize,
    /// Maximum live item handles across all sessions
    pub max_items: usize,
}

impl Default for SessionPolicyConfig {
    fn default() -> Self {
        Self {
            refresh_first_required: true,
            accept_message_without_accepting_requests: false,
            accept_dir_message_without_min_filters: false,
            accept_message_without_being_login: false,
            accept_message_same_key_but_diff_stream: false,
            accept_message_that_changes_service: false,
            accept_message_without_qos_in_range: false,
            enforce_ack_id_validation: true,
            max_sessions: 1024,
            max_items: 1_000_000,
        }
    }
}

impl SessionPolicyConfig {
    /// Accept everything the protocol allows
    pub fn permissive() -> Self {
        Self {
            refresh_first_required: false,
            accept_message_without_accepting_requests: true,
            accept_dir_message_without_min_filters: true,
            accept_message_without_being_login: true,
            accept_message_same_key_but_diff_stream: true,
            accept_message_that_changes_service: true,
            accept_message_without_qos_in_range: true,
            enforce_ack_id_validation: false,
            ..Self::default()
        }
    }

    /// Default admission rules with tighter resource limits
    pub fn strict() -> Self {
        Self {
            max_sessions: 64,
            max_items: 100_000,
            ..Self::default()
        }
    }

    /// Default rules with small limits so exhaustion is reachable in tests
    pub fn testing() -> Self {
        Self {
            max_sessions: 16,
            max_items: 4096,
            ..Self::default()
        }
    }

    /// Whether a second stream with an equal key is rejected
    pub fn detects_duplicate_keys(&self) -> bool {
        !self.accept_message_same_key_but_diff_stream
    }
}

// ----------------------------------------------------------------------------
// Directory Configuration
// ----------------------------------------------------------------------------

/// A service advertised at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: u16,
    pub info: ServiceInfo,
    pub state: ServiceState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub admin_control: AdminControl,
    /// When empty the default `DIRECT_FEED` service is advertised
    pub services: Vec<ServiceDefinition>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            admin_control: AdminControl::Api,
            services: Vec::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Dictionary Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub admin_control: AdminControl,
    pub field_dictionary_name: String,
    pub enum_dictionary_name: String,
    /// Service both admin dictionaries are provided under
    pub field_dictionary_service: ServiceRef,
    pub enum_dictionary_service: ServiceRef,
    /// Initial buffer size of one field dictionary part, in bytes
    pub field_fragment_size: usize,
    /// Initial buffer size of one enum table part, in bytes
    pub enum_fragment_size: usize,
    /// Upper bound a part buffer may grow to
    pub max_part_buffer: usize,
    /// Delay between consecutive parts of a multi-part dictionary
    pub part_delay_ms: u64,
    pub field_dictionary_path: Option<String>,
    pub enum_dictionary_path: Option<String>,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            admin_control: AdminControl::Api,
            field_dictionary_name: "RWFFld".into(),
            enum_dictionary_name: "RWFEnum".into(),
            field_dictionary_service: ServiceRef::default(),
            enum_dictionary_service: ServiceRef::default(),
            field_fragment_size: 8192,
            enum_fragment_size: 128_000,
            max_part_buffer: 16 * 1024 * 1024,
            part_delay_ms: 500,
            field_dictionary_path: None,
            enum_dictionary_path: None,
        }
    }
}

impl DictionaryConfig {
    /// No pacing between parts
    pub fn testing() -> Self {
        Self {
            part_delay_ms: 0,
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch Configuration
// ----------------------------------------------------------------------------

/// Who drives the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OperationModel {
    /// The runtime spawns its own dispatch task
    #[default]
    ApiDispatch,
    /// The application calls `dispatch(timeout)`
    UserDispatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub operation_model: OperationModel,
    /// Events processed before timers are re-evaluated
    pub max_dispatch_count: usize,
    /// Idle wait of the dispatch loop when no timer is pending
    pub dispatch_timeout_ms: u64,
    /// Capacity of the transport event queue
    pub event_buffer_size: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            operation_model: OperationModel::ApiDispatch,
            max_dispatch_count: 100,
            dispatch_timeout_ms: 100,
            event_buffer_size: 4096,
            outbound_buffer_size: 1024,
        }
    }
}

impl DispatchConfig {
    pub fn testing() -> Self {
        Self {
            max_dispatch_count: 16,
            dispatch_timeout_ms: 10,
            event_buffer_size: 256,
            outbound_buffer_size: 256,
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Provider Configuration
// ----------------------------------------------------------------------------

/// Master configuration of the provider engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub session: SessionPolicyConfig,
    pub directory: DirectoryConfig,
    pub dictionary: DictionaryConfig,
    pub dispatch: DispatchConfig,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::new()
    }

    /// Accept-everything policy
    pub fn permissive() -> Self {
        Self {
            session: SessionPolicyConfig::permissive(),
            ..Self::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            session: SessionPolicyConfig::strict(),
            ..Self::default()
        }
    }

    /// Default policy, small limits, no dictionary pacing
    pub fn testing() -> Self {
        Self {
            session: SessionPolicyConfig::testing(),
            directory: DirectoryConfig::default(),
            dictionary: DictionaryConfig::testing(),
            dispatch: DispatchConfig::testing(),
        }
    }

    pub fn with_session(mut self, session: SessionPolicyConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_directory(mut self, directory: DirectoryConfig) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_dictionary(mut self, dictionary: DictionaryConfig) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.session.max_sessions == 0 {
            return Err("Max sessions cannot be zero".into());
        }
        if self.session.max_items == 0 || self.session.max_items > u32::MAX as usize {
            return Err("Max items must be between 1 and 4294967295".into());
        }

        let dictionary = &self.dictionary;
        if dictionary.field_fragment_size == 0 || dictionary.enum_fragment_size == 0 {
            return Err("Dictionary fragment sizes cannot be zero".into());
        }
        if dictionary.max_part_buffer < dictionary.field_fragment_size
            || dictionary.max_part_buffer < dictionary.enum_fragment_size
        {
            return Err("Max part buffer cannot be smaller than a fragment size".into());
        }
        if dictionary.field_dictionary_name == dictionary.enum_dictionary_name {
            return Err("Field and enum dictionaries must have distinct names".into());
        }
        if dictionary.field_dictionary_service != dictionary.enum_dictionary_service {
            return Err(format!(
                "Field dictionary service {:?} and enum dictionary service {:?} must match",
                dictionary.field_dictionary_service, dictionary.enum_dictionary_service
            ));
        }

        let mut ids = std::collections::HashSet::new();
        let mut names = std::collections::HashSet::new();
        for service in &self.directory.services {
            if !ids.insert(service.id) {
                return Err(format!("Service id {} is configured twice", service.id));
            }
            if !names.insert(service.info.name.as_str()) {
                return Err(format!(
                    "Service name {} is configured twice",
                    service.info.name
                ));
            }
        }

        if self.dispatch.max_dispatch_count == 0 {
            return Err("Max dispatch count cannot be zero".into());
        }
        if self.dispatch.event_buffer_size == 0 || self.dispatch.outbound_buffer_size == 0 {
            return Err("Dispatch buffer sizes cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Arc-wrapped Configuration for Efficient Sharing
// ----------------------------------------------------------------------------

/// Arc-wrapped ProviderConfig shared by the engine and the runtime
pub type SharedProviderConfig = Arc<ProviderConfig>;

impl ProviderConfig {
    /// Convert to Arc-wrapped config for efficient sharing
    pub fn into_shared(self) -> SharedProviderConfig {
        Arc::new(self)
    }

    /// Create a shared testing config
    pub fn shared_testing() -> SharedProviderConfig {
        Arc::new(Self::testing())
    }
}

// ----------------------------------------------------------------------------
// Configuration Builder Pattern
// ----------------------------------------------------------------------------

/// Builder for ProviderConfig with validation
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigBuilder {
    session: Option<SessionPolicyConfig>,
    directory: Option<DirectoryConfig>,
    dictionary: Option<DictionaryConfig>,
    dispatch: Option<DispatchConfig>,
}

/// Error type for configuration building
#[derive(Debug, Clone)]
pub struct ConfigBuilderError {
    pub message: String,
}

impl core::fmt::Display for ConfigBuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Configuration builder error: {}", self.message)
    }
}

impl std::error::Error for ConfigBuilderError {}

impl ProviderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, config: SessionPolicyConfig) -> Self {
        self.session = Some(config);
        self
    }

    pub fn directory(mut self, config: DirectoryConfig) -> Self {
        self.directory = Some(config);
        self
    }

    pub fn dictionary(mut self, config: DictionaryConfig) -> Self {
        self.dictionary = Some(config);
        self
    }

    pub fn dispatch(mut self, config: DispatchConfig) -> Self {
        self.dispatch = Some(config);
        self
    }

    /// Use testing preset as base (can be further customized)
    pub fn testing(self) -> Self {
        Self {
            session: Some(SessionPolicyConfig::testing()),
            directory: Some(DirectoryConfig::default()),
            dictionary: Some(DictionaryConfig::testing()),
            dispatch: Some(DispatchConfig::testing()),
        }
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<ProviderConfig, ConfigBuilderError> {
        let config = self.build_unchecked();
        config
            .validate()
            .map_err(|msg| ConfigBuilderError { message: msg })?;
        Ok(config)
    }

    /// Build the configuration without validation (use with caution)
    pub fn build_unchecked(self) -> ProviderConfig {
        ProviderConfig {
            session: self.session.unwrap_or_default(),
            directory: self.directory.unwrap_or_default(),
            dictionary: self.dictionary.unwrap_or_default(),
            dispatch: self.dispatch.unwrap_or_default(),
        }
    }
}
