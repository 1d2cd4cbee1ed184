//! Decoded protocol messages
//!
//! The engine works on these structured messages; `MessageCodec` turns them into
//! and out of wire bytes. Outbound messages submitted by the application carry a
//! placeholder stream id that the engine replaces with the stream of the target
//! item.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::dictionary::DictionaryPart;
use crate::directory::ServiceUpdate;
use crate::types::{DomainType, ItemGroupId, Qos, ServiceId, State, StreamId};

// ----------------------------------------------------------------------------
// Directory Filter Bits
// ----------------------------------------------------------------------------

pub mod filter {
    pub const INFO: u32 = 0x01;
    pub const STATE: u32 = 0x02;
    pub const GROUP: u32 = 0x04;
    pub const LOAD: u32 = 0x08;
    pub const DATA: u32 = 0x10;
    pub const LINK: u32 = 0x20;
    pub const SEQ_MCAST: u32 = 0x40;

    /// Minimum filter a consumer must request on the directory domain
    pub const MIN_DIRECTORY: u32 = INFO | STATE;
    pub const ALL: u32 = INFO | STATE | GROUP | LOAD | DATA | LINK | SEQ_MCAST;
}

// ----------------------------------------------------------------------------
// Message Key
// ----------------------------------------------------------------------------

/// Structural identity of a requested item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<ServiceId>,
    pub filter: Option<u32>,
}

impl MsgKey {
    pub fn named<T: Into<String>>(name: T) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn with_filter(mut self, filter: u32) -> Self {
        self.filter = Some(filter);
        self
    }
}

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Blank,
    Int(i64),
    UInt(u64),
    Real(f64),
    Enum(u16),
    Ascii(String),
    Buffer(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub fid: i16,
    pub value: FieldValue,
}

impl FieldEntry {
    pub fn new(fid: i16, value: FieldValue) -> Self {
        Self { fid, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapPayload {
    /// Source directory service entries
    Directory(Vec<ServiceUpdate>),
    Entries(Vec<(Vec<u8>, Payload)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeriesPayload {
    /// One part of a reference dictionary
    Dictionary(DictionaryPart),
    Entries(Vec<Payload>),
}

/// Container carried by a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Payload {
    #[default]
    NoData,
    Opaque(Vec<u8>),
    FieldList(Vec<FieldEntry>),
    ElementList(Vec<ElementEntry>),
    Map(MapPayload),
    Series(SeriesPayload),
}

/// Container type names used in usage-error texts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    NoData,
    Opaque,
    FieldList,
    ElementList,
    Map,
    Series,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::NoData => "NoData",
            DataType::Opaque => "OpaqueEnum",
            DataType::FieldList => "FieldListEnum",
            DataType::ElementList => "ElementListEnum",
            DataType::Map => "MapEnum",
            DataType::Series => "SeriesEnum",
        };
        f.write_str(name)
    }
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Payload::NoData => DataType::NoData,
            Payload::Opaque(_) => DataType::Opaque,
            Payload::FieldList(_) => DataType::FieldList,
            Payload::ElementList(_) => DataType::ElementList,
            Payload::Map(_) => DataType::Map,
            Payload::Series(_) => DataType::Series,
        }
    }

    /// Directory service entries, when this is a directory map
    pub fn directory(&self) -> Option<&[ServiceUpdate]> {
        match self {
            Payload::Map(MapPayload::Directory(updates)) => Some(updates),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Message Classes
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgClass {
    Request,
    Close,
    Refresh,
    Update,
    Status,
    Generic,
    Post,
    Ack,
}

impl fmt::Display for MsgClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgClass::Request => "ReqMsg",
            MsgClass::Close => "CloseMsg",
            MsgClass::Refresh => "RefreshMsg",
            MsgClass::Update => "UpdateMsg",
            MsgClass::Status => "StatusMsg",
            MsgClass::Generic => "GenericMsg",
            MsgClass::Post => "PostMsg",
            MsgClass::Ack => "AckMsg",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    /// Service requested by name instead of id
    pub service_name: Option<String>,
    pub streaming: bool,
    pub private_stream: bool,
    pub qos: Option<Qos>,
    pub worst_qos: Option<Qos>,
    pub payload: Payload,
}

impl RequestMsg {
    pub fn new(stream_id: i32, domain: DomainType, key: MsgKey) -> Self {
        Self {
            stream_id: StreamId(stream_id),
            domain,
            key,
            streaming: true,
            ..Self::default()
        }
    }

    pub fn snapshot(mut self) -> Self {
        self.streaming = false;
        self
    }

    pub fn private_stream(mut self) -> Self {
        self.private_stream = true;
        self
    }

    pub fn qos(mut self, qos: Qos, worst: Option<Qos>) -> Self {
        self.qos = Some(qos);
        self.worst_qos = worst;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CloseMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RefreshMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub state: State,
    pub solicited: bool,
    pub complete: bool,
    pub clear_cache: bool,
    pub private_stream: bool,
    pub group_id: Option<ItemGroupId>,
    pub qos: Option<Qos>,
    pub seq_num: Option<u32>,
    pub payload: Payload,
}

impl RefreshMsg {
    /// A solicited, complete, open/ok refresh
    pub fn new(domain: DomainType) -> Self {
        Self {
            domain,
            state: State::open_ok(""),
            solicited: true,
            complete: true,
            ..Self::default()
        }
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.key.name = Some(name.into());
        self
    }

    pub fn service_id(mut self, service_id: u16) -> Self {
        self.key.service_id = Some(ServiceId(service_id));
        self
    }

    pub fn service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn group(mut self, group: &[u8]) -> Self {
        self.group_id = Some(ItemGroupId::new(group));
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UpdateMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub seq_num: Option<u32>,
    pub payload: Payload,
}

impl UpdateMsg {
    pub fn new(domain: DomainType) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    pub fn service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub state: Option<State>,
    pub private_stream: bool,
    pub group_id: Option<ItemGroupId>,
    pub payload: Payload,
}

impl StatusMsg {
    pub fn new(domain: DomainType, state: State) -> Self {
        Self {
            domain,
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn group(mut self, group: &[u8]) -> Self {
        self.group_id = Some(ItemGroupId::new(group));
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenericMsg {
    pub stream_id: StreamId,
    /// Defaults to the domain of the target item
    pub domain: Option<DomainType>,
    pub key: MsgKey,
    pub complete: bool,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PostMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub post_id: Option<u32>,
    pub seq_num: Option<u32>,
    pub ack_requested: bool,
    pub complete: bool,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AckMsg {
    pub stream_id: StreamId,
    pub domain: DomainType,
    pub key: MsgKey,
    pub ack_id: u32,
    pub nack_code: Option<u8>,
    pub text: Option<String>,
}

impl AckMsg {
    pub fn new(ack_id: u32) -> Self {
        Self {
            ack_id,
            ..Self::default()
        }
    }
}

/// Any protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(RequestMsg),
    Close(CloseMsg),
    Refresh(RefreshMsg),
    Update(UpdateMsg),
    Status(StatusMsg),
    Generic(GenericMsg),
    Post(PostMsg),
    Ack(AckMsg),
}

impl Message {
    pub fn class(&self) -> MsgClass {
        match self {
            Message::Request(_) => MsgClass::Request,
            Message::Close(_) => MsgClass::Close,
            Message::Refresh(_) => MsgClass::Refresh,
            Message::Update(_) => MsgClass::Update,
            Message::Status(_) => MsgClass::Status,
            Message::Generic(_) => MsgClass::Generic,
            Message::Post(_) => MsgClass::Post,
            Message::Ack(_) => MsgClass::Ack,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        match self {
            Message::Request(m) => m.stream_id,
            Message::Close(m) => m.stream_id,
            Message::Refresh(m) => m.stream_id,
            Message::Update(m) => m.stream_id,
            Message::Status(m) => m.stream_id,
            Message::Generic(m) => m.stream_id,
            Message::Post(m) => m.stream_id,
            Message::Ack(m) => m.stream_id,
        }
    }

    /// Domain of the message; generic messages without one report `None`
    pub fn domain(&self) -> Option<DomainType> {
        match self {
            Message::Request(m) => Some(m.domain),
            Message::Close(m) => Some(m.domain),
            Message::Refresh(m) => Some(m.domain),
            Message::Update(m) => Some(m.domain),
            Message::Status(m) => Some(m.domain),
            Message::Generic(m) => m.domain,
            Message::Post(m) => Some(m.domain),
            Message::Ack(m) => Some(m.domain),
        }
    }

    pub fn key(&self) -> Option<&MsgKey> {
        match self {
            Message::Request(m) => Some(&m.key),
            Message::Close(_) => None,
            Message::Refresh(m) => Some(&m.key),
            Message::Update(m) => Some(&m.key),
            Message::Status(m) => Some(&m.key),
            Message::Generic(m) => Some(&m.key),
            Message::Post(m) => Some(&m.key),
            Message::Ack(m) => Some(&m.key),
        }
    }
}
