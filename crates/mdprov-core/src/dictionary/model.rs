//! Reference dictionary model
//!
//! Field definitions (`RDMFieldDictionary` format) and enumerated type tables
//! (`enumtype.def` format), plus the store that indexes loaded dictionaries by
//! name and service.

use core::hash::{Hash, Hasher};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::DictionaryError;
use crate::types::ServiceId;

// ----------------------------------------------------------------------------
// Field Dictionary
// ----------------------------------------------------------------------------

/// One field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub fid: i16,
    pub acronym: String,
    pub ddf_acronym: String,
    pub ripple_to: Option<String>,
    pub field_type: String,
    pub length: u16,
    pub rwf_type: String,
    pub rwf_len: u16,
}

impl FieldDef {
    /// A numeric field, mostly useful for building dictionaries in code
    pub fn uint<T: Into<String>>(fid: i16, acronym: T) -> Self {
        let acronym = acronym.into();
        Self {
            fid,
            ddf_acronym: acronym.clone(),
            acronym,
            ripple_to: None,
            field_type: "INTEGER".into(),
            length: 15,
            rwf_type: "UINT64".into(),
            rwf_len: 8,
        }
    }
}

/// Field definitions ordered by field id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldDictionary {
    fields: BTreeMap<i16, FieldDef>,
    version: Option<String>,
}

impl FieldDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I: IntoIterator<Item = FieldDef>>(fields: I) -> Self {
        let mut dictionary = Self::new();
        for field in fields {
            dictionary.insert(field);
        }
        dictionary
    }

    /// Parse the text of an `RDMFieldDictionary` file
    pub fn from_rdm_str(text: &str) -> Result<Self, DictionaryError> {
        let mut dictionary = Self::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix('!') {
                if let Some(version) = comment.trim().strip_prefix("Version:") {
                    dictionary.version = Some(version.trim().to_string());
                }
                continue;
            }

            let tokens = tokenize(trimmed, line)?;
            if tokens.len() < 8 {
                return Err(DictionaryError::Malformed {
                    line,
                    reason: format!("expected 8 columns, found {}", tokens.len()),
                });
            }

            let fid = parse_number::<i16>(&tokens[2], line, "FID")?;
            let ripple_to = match tokens[3].as_str() {
                "NULL" => None,
                other => Some(other.to_string()),
            };
            dictionary.insert(FieldDef {
                fid,
                acronym: tokens[0].clone(),
                ddf_acronym: tokens[1].clone(),
                ripple_to,
                field_type: tokens[4].clone(),
                length: parse_number::<u16>(&tokens[5], line, "LENGTH")?,
                rwf_type: tokens[6].clone(),
                rwf_len: parse_number::<u16>(&tokens[7], line, "RWF LEN")?,
            });
        }

        Ok(dictionary)
    }

    pub fn insert(&mut self, field: FieldDef) -> Option<FieldDef> {
        self.fields.insert(field.fid, field)
    }

    pub fn get(&self, fid: i16) -> Option<&FieldDef> {
        self.fields.get(&fid)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Definitions with `fid >= from`, in field id order
    pub fn range_from(&self, from: i16) -> impl Iterator<Item = &FieldDef> {
        self.fields.range(from..).map(|(_, def)| def)
    }

    pub fn min_fid(&self) -> Option<i16> {
        self.fields.keys().next().copied()
    }

    pub fn max_fid(&self) -> Option<i16> {
        self.fields.keys().next_back().copied()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Enumerated Type Tables
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: u16,
    pub display: String,
    pub meaning: Option<String>,
}

/// One enum table, shared by every field that references it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnumTable {
    pub fields: Vec<(String, i16)>,
    pub entries: Vec<EnumEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumTypeTables {
    tables: Vec<EnumTable>,
}

impl EnumTypeTables {
    pub fn new(tables: Vec<EnumTable>) -> Self {
        Self { tables }
    }

    /// Parse the text of an `enumtype.def` file
    pub fn from_enum_def_str(text: &str) -> Result<Self, DictionaryError> {
        let mut tables = Vec::new();
        let mut current = EnumTable::default();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') {
                continue;
            }

            let tokens = tokenize(trimmed, line)?;
            if tokens.len() < 2 {
                return Err(DictionaryError::Malformed {
                    line,
                    reason: "expected at least 2 columns".into(),
                });
            }

            match tokens[0].parse::<u16>() {
                Ok(value) => {
                    if current.fields.is_empty() {
                        return Err(DictionaryError::Malformed {
                            line,
                            reason: "enum value precedes any field reference".into(),
                        });
                    }
                    current.entries.push(EnumEntry {
                        value,
                        display: tokens[1].clone(),
                        meaning: (tokens.len() > 2).then(|| tokens[2..].join(" ")),
                    });
                }
                Err(_) => {
                    if !current.entries.is_empty() {
                        tables.push(core::mem::take(&mut current));
                    }
                    let fid = parse_number::<i16>(&tokens[1], line, "FID")?;
                    current.fields.push((tokens[0].clone(), fid));
                }
            }
        }

        if !current.fields.is_empty() {
            tables.push(current);
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[EnumTable] {
        &self.tables
    }

    pub fn table_for(&self, fid: i16) -> Option<&EnumTable> {
        self.tables
            .iter()
            .find(|t| t.fields.iter().any(|(_, f)| *f == fid))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Split a definition line on whitespace, keeping quoted strings whole
fn tokenize(line: &str, line_no: usize) -> Result<Vec<String>, DictionaryError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => token.push(ch),
                    None => {
                        return Err(DictionaryError::Malformed {
                            line: line_no,
                            reason: "unterminated quoted string".into(),
                        })
                    }
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }

    Ok(tokens)
}

fn parse_number<T: core::str::FromStr>(
    token: &str,
    line: usize,
    column: &str,
) -> Result<T, DictionaryError> {
    token.parse().map_err(|_| DictionaryError::Malformed {
        line,
        reason: format!("invalid {} value '{}'", column, token),
    })
}

// ----------------------------------------------------------------------------
// Dictionary Store
// ----------------------------------------------------------------------------

/// A loaded dictionary, shared by every stream that requests it
#[derive(Debug, Clone)]
pub enum DictionaryPayload {
    Fields(Arc<FieldDictionary>),
    Enums(Arc<EnumTypeTables>),
}

impl DictionaryPayload {
    pub fn entry_count(&self) -> usize {
        match self {
            DictionaryPayload::Fields(fields) => fields.len(),
            DictionaryPayload::Enums(tables) => tables.len(),
        }
    }
}

/// String hash used for dictionary and service name lookups
pub fn name_hash(name: &str) -> u64 {
    const MAGIC: u64 = 8_388_593;
    name.bytes()
        .fold(0u64, |h, b| ((h % MAGIC) << 8).wrapping_add(b as u64))
}

/// Lookup key of a loaded dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryKey {
    pub name: String,
    pub service: ServiceId,
}

impl Hash for DictionaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(name_hash(&self.name));
        self.service.hash(state);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DictionaryStore {
    entries: HashMap<DictionaryKey, DictionaryPayload>,
}

impl DictionaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Into<String>>(&mut self, name: T, service: ServiceId, payload: DictionaryPayload) {
        self.entries.insert(
            DictionaryKey {
                name: name.into(),
                service,
            },
            payload,
        );
    }

    /// Find a dictionary by name, under a specific service when one is given
    pub fn find(&self, name: &str, service: Option<ServiceId>) -> Option<&DictionaryPayload> {
        match service {
            Some(service) => self.entries.get(&DictionaryKey {
                name: name.to_string(),
                service,
            }),
            None => self
                .entries
                .iter()
                .find(|(key, _)| key.name == name)
                .map(|(_, payload)| payload),
        }
    }

    pub fn has_service(&self, service: ServiceId) -> bool {
        self.entries.keys().any(|key| key.service == service)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
