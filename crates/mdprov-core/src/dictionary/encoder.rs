//! Multi-part dictionary encoder
//!
//! Splits a loaded dictionary into parts that each fit the part buffer. The
//! encoder keeps its cursor (next field id, or next enum table index) between
//! calls so the engine can resume it from a timer.

use serde::{Deserialize, Serialize};

use crate::dictionary::model::{DictionaryPayload, EnumTable, FieldDef};
use crate::errors::DictionaryError;

/// Entries carried by one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictionaryEntries {
    Fields(Vec<FieldDef>),
    Enums(Vec<EnumTable>),
}

impl DictionaryEntries {
    pub fn len(&self) -> usize {
        match self {
            DictionaryEntries::Fields(fields) => fields.len(),
            DictionaryEntries::Enums(tables) => tables.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One encoded part of a dictionary refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryPart {
    pub name: String,
    pub entries: DictionaryEntries,
    /// Field id, or table index, of the first entry
    pub start: i32,
    /// Last part of the dictionary
    pub complete: bool,
    /// First part of a sequence; the consumer drops anything cached before it
    pub clear_cache: bool,
}

impl DictionaryPart {
    /// Status text carried by the refresh holding this part
    pub fn describe(&self) -> String {
        match self.entries {
            DictionaryEntries::Fields(_) => {
                format!("Field Dictionary Refresh (starting fid {})", self.start)
            }
            DictionaryEntries::Enums(_) => {
                format!("Enum Type Dictionary Refresh (starting index {})", self.start)
            }
        }
    }

    /// Encoded size of the part
    pub fn encoded_len(&self) -> Result<usize, DictionaryError> {
        bincode::serialized_size(self)
            .map(|n| n as usize)
            .map_err(|e| DictionaryError::EncodingFailed {
                reason: e.to_string(),
            })
    }
}

/// Result of one encode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// Every remaining entry fit; this is the final part
    Complete(DictionaryPart),
    /// More entries remain after this part
    Continue(DictionaryPart),
}

impl EncodeOutcome {
    pub fn part(&self) -> &DictionaryPart {
        match self {
            EncodeOutcome::Complete(part) | EncodeOutcome::Continue(part) => part,
        }
    }

    pub fn into_part(self) -> DictionaryPart {
        match self {
            EncodeOutcome::Complete(part) | EncodeOutcome::Continue(part) => part,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, EncodeOutcome::Complete(_))
    }
}

// ----------------------------------------------------------------------------
// Part Encoder
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DictionaryPartEncoder {
    name: String,
    payload: DictionaryPayload,
    cursor: i32,
    buffer_size: usize,
    max_buffer: usize,
    parts: u32,
    finished: bool,
}

impl DictionaryPartEncoder {
    pub fn new<T: Into<String>>(
        name: T,
        payload: DictionaryPayload,
        buffer_size: usize,
        max_buffer: usize,
    ) -> Self {
        let cursor = match &payload {
            DictionaryPayload::Fields(fields) => fields.min_fid().map(i32::from).unwrap_or(0),
            DictionaryPayload::Enums(_) => 0,
        };
        Self {
            name: name.into(),
            payload,
            cursor,
            buffer_size: buffer_size.max(1),
            max_buffer: max_buffer.max(buffer_size),
            parts: 0,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn parts_encoded(&self) -> u32 {
        self.parts
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Entry-less part at the cursor, as the next `encode_next` would start it
    pub fn next_header(&self) -> DictionaryPart {
        let entries = match &self.payload {
            DictionaryPayload::Fields(_) => DictionaryEntries::Fields(Vec::new()),
            DictionaryPayload::Enums(_) => DictionaryEntries::Enums(Vec::new()),
        };
        self.empty_part(entries, self.parts == 0)
    }

    /// Encode the next part starting at the cursor.
    ///
    /// `envelope` is the number of bytes the message carrying the part adds
    /// around it; the part and its envelope together stay within the buffer.
    /// When not even one entry fits, the buffer is doubled and the attempt
    /// retried, up to the configured maximum.
    pub fn encode_next(&mut self, envelope: usize) -> Result<EncodeOutcome, DictionaryError> {
        if self.finished {
            return Err(DictionaryError::EncodingFailed {
                reason: format!("dictionary {} is already fully encoded", self.name),
            });
        }

        loop {
            let (part, next_cursor, remaining, first_entry_size) = self.fill(envelope)?;

            if part.entries.is_empty() && remaining {
                let required = envelope + part.encoded_len()? + first_entry_size;
                let doubled = self.buffer_size.saturating_mul(2);
                if doubled > self.max_buffer {
                    return Err(DictionaryError::BufferOverflow {
                        required,
                        limit: self.max_buffer,
                    });
                }
                self.buffer_size = doubled;
                continue;
            }

            self.cursor = next_cursor;
            self.parts += 1;
            if remaining {
                return Ok(EncodeOutcome::Continue(part));
            }
            self.finished = true;
            let mut part = part;
            part.complete = true;
            return Ok(EncodeOutcome::Complete(part));
        }
    }

    /// Pack entries from the cursor until the buffer is full. Returns the
    /// part, the cursor after it, whether entries remain, and the size of the
    /// first entry that did not fit.
    fn fill(&self, envelope: usize) -> Result<(DictionaryPart, i32, bool, usize), DictionaryError> {
        let mut part = self.next_header();
        let mut used = envelope + part.encoded_len()?;
        match &self.payload {
            DictionaryPayload::Fields(fields) => {
                let mut taken = Vec::new();
                let mut next_cursor = self.cursor;
                let mut overflow = None;

                let start = i16::try_from(self.cursor).ok();
                let iter = start.into_iter().flat_map(|s| fields.range_from(s));
                for def in iter {
                    let size = entry_size(def)?;
                    if used + size > self.buffer_size {
                        overflow = Some(size);
                        break;
                    }
                    used += size;
                    next_cursor = def.fid as i32 + 1;
                    taken.push(def.clone());
                }

                part.entries = DictionaryEntries::Fields(taken);
                Ok((part, next_cursor, overflow.is_some(), overflow.unwrap_or(0)))
            }
            DictionaryPayload::Enums(tables) => {
                let mut taken = Vec::new();
                let mut overflow = None;

                for table in tables.tables().iter().skip(self.cursor.max(0) as usize) {
                    let size = entry_size(table)?;
                    if used + size > self.buffer_size {
                        overflow = Some(size);
                        break;
                    }
                    used += size;
                    taken.push(table.clone());
                }

                let next_cursor = self.cursor + taken.len() as i32;
                part.entries = DictionaryEntries::Enums(taken);
                Ok((part, next_cursor, overflow.is_some(), overflow.unwrap_or(0)))
            }
        }
    }

    fn empty_part(&self, entries: DictionaryEntries, clear_cache: bool) -> DictionaryPart {
        DictionaryPart {
            name: self.name.clone(),
            entries,
            start: self.cursor,
            complete: false,
            clear_cache,
        }
    }
}

fn entry_size<T: Serialize>(entry: &T) -> Result<usize, DictionaryError> {
    bincode::serialized_size(entry)
        .map(|n| n as usize)
        .map_err(|e| DictionaryError::EncodingFailed {
            reason: e.to_string(),
        })
}
