//! Core identifiers and protocol value types
//!
//! Channel, stream, service and item identifiers, the domain model, stream and
//! data states, quality-of-service, item groups and the time source abstraction.

use core::fmt;
use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Identity of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Stream identifier, scoped to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StreamId(pub i32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Service identifier as advertised in the source directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub u16);

impl ServiceId {
    /// Convert a wire-width service id, rejecting values above 65535
    pub fn from_wire(id: u64) -> Option<Self> {
        u16::try_from(id).ok().map(ServiceId)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque application-facing item handle
///
/// Encodes a handle-table slot and its generation as
/// `(generation << 32) | (slot + 1)`, so a live handle is never zero and a
/// stale handle never aliases a newer item in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemHandle(u64);

impl ItemHandle {
    /// Handle 0 addresses every subscriber of a broadcast-capable domain
    pub const FANOUT: ItemHandle = ItemHandle(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn from_parts(slot: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (slot as u64 + 1))
    }

    pub(crate) fn slot(&self) -> Option<u32> {
        let low = (self.0 & 0xFFFF_FFFF) as u32;
        low.checked_sub(1)
    }

    pub(crate) fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn is_fanout(&self) -> bool {
        self.0 == 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Domain Types
// ----------------------------------------------------------------------------

/// Message domain (model type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainType(pub u8);

impl DomainType {
    pub const LOGIN: DomainType = DomainType(1);
    pub const SOURCE: DomainType = DomainType(4);
    pub const DICTIONARY: DomainType = DomainType(5);
    pub const MARKET_PRICE: DomainType = DomainType(6);
    pub const MARKET_BY_ORDER: DomainType = DomainType(7);
    pub const MARKET_BY_PRICE: DomainType = DomainType(8);
    pub const MARKET_MAKER: DomainType = DomainType(9);
    pub const SYMBOL_LIST: DomainType = DomainType(10);

    /// Login, directory and dictionary are administrative domains
    pub fn is_admin(&self) -> bool {
        self.0 <= Self::DICTIONARY.0
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "Login",
            4 => "Directory",
            5 => "Dictionary",
            6 => "MarketPrice",
            7 => "MarketByOrder",
            8 => "MarketByPrice",
            9 => "MarketMaker",
            10 => "SymbolList",
            _ => "Custom",
        }
    }
}

impl Default for DomainType {
    fn default() -> Self {
        Self::MARKET_PRICE
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            "Custom" => write!(f, "{}", self.0),
            name => f.write_str(name),
        }
    }
}

// ----------------------------------------------------------------------------
// Stream and Data State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StreamState {
    #[default]
    Unspecified,
    Open,
    NonStreaming,
    ClosedRecover,
    Closed,
    Redirected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataState {
    #[default]
    NoChange,
    Ok,
    Suspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusCode {
    #[default]
    None,
    NotFound,
    Timeout,
    NotEntitled,
    InvalidArgument,
    UsageError,
    Preempted,
    NotOpen,
    QosNotSupported,
    AlreadyOpen,
    SourceUnknown,
    NotAuthorized,
    Full,
}

/// Stream state, data state, status code and text carried by refresh and status messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct State {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: StatusCode,
    pub text: String,
}

impl State {
    pub fn new<T: Into<String>>(
        stream_state: StreamState,
        data_state: DataState,
        code: StatusCode,
        text: T,
    ) -> Self {
        Self {
            stream_state,
            data_state,
            code,
            text: text.into(),
        }
    }

    /// Open stream with good data
    pub fn open_ok<T: Into<String>>(text: T) -> Self {
        Self::new(StreamState::Open, DataState::Ok, StatusCode::None, text)
    }

    /// The state carried by every protocol reject
    pub fn reject<T: Into<String>>(code: StatusCode, text: T) -> Self {
        Self::new(StreamState::ClosedRecover, DataState::Suspect, code, text)
    }

    pub fn is_open_ok(&self) -> bool {
        self.stream_state == StreamState::Open && self.data_state == DataState::Ok
    }

    /// Closed, closed-recover and redirected streams never carry more data
    pub fn is_closed(&self) -> bool {
        matches!(
            self.stream_state,
            StreamState::Closed | StreamState::ClosedRecover | StreamState::Redirected
        )
    }
}

// ----------------------------------------------------------------------------
// Quality of Service
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeliness {
    Realtime,
    Delayed(u16),
    DelayedUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rate {
    TickByTick,
    JitConflated,
    TimeConflated(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qos {
    pub timeliness: Timeliness,
    pub rate: Rate,
}

impl Qos {
    pub const REALTIME_TICK_BY_TICK: Qos = Qos {
        timeliness: Timeliness::Realtime,
        rate: Rate::TickByTick,
    };

    fn timeliness_rank(&self) -> u32 {
        match self.timeliness {
            Timeliness::Realtime => 0,
            Timeliness::Delayed(secs) => secs as u32 + 1,
            Timeliness::DelayedUnknown => u32::MAX,
        }
    }

    fn rate_rank(&self) -> u32 {
        match self.rate {
            Rate::TickByTick => 0,
            Rate::TimeConflated(millis) => millis as u32 + 1,
            Rate::JitConflated => u32::MAX,
        }
    }

    /// True when this QoS is no better than `best` and no worse than `worst`
    pub fn is_in_range(&self, best: &Qos, worst: &Qos) -> bool {
        let t = self.timeliness_rank();
        let r = self.rate_rank();
        best.timeliness_rank() <= t
            && t <= worst.timeliness_rank()
            && best.rate_rank() <= r
            && r <= worst.rate_rank()
    }
}

impl Default for Qos {
    fn default() -> Self {
        Self::REALTIME_TICK_BY_TICK
    }
}

// ----------------------------------------------------------------------------
// Item Groups
// ----------------------------------------------------------------------------

/// Opaque item-group identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ItemGroupId(SmallVec<[u8; 16]>);

impl ItemGroupId {
    pub fn new(bytes: &[u8]) -> Self {
        Self(SmallVec::from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Shorter than two bytes or starting with two zero bytes
    pub fn is_blank(&self) -> bool {
        self.0.len() < 2 || (self.0[0] == 0 && self.0[1] == 0)
    }
}

impl From<&[u8]> for ItemGroupId {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Display for ItemGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps to the engine and its timers
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
