//! Reference dictionaries: model, multi-part encoding and distribution

pub mod distributor;
pub mod encoder;
pub mod model;

pub use distributor::{DictionaryDistributor, DictionaryListener, PendingDictionary};
pub use encoder::{DictionaryEntries, DictionaryPart, DictionaryPartEncoder, EncodeOutcome};
pub use model::{
    name_hash, DictionaryKey, DictionaryPayload, DictionaryStore, EnumEntry, EnumTable,
    EnumTypeTables, FieldDef, FieldDictionary,
};
