//! Reading and writing id store files.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use prost::Message;
use prost::encoding::{decode_varint, encode_varint};
use tracing::{debug, info, warn};

use crate::proto::ids::{IdsWithType, ids_with_type::Data};

use super::{IdKind, IdStoreError};

/// Payload encoding used when writing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Lz4,
}

/// External ids by entity kind, in code order.
///
/// The index of an id within its kind's list is its compact code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdStore {
    ids: BTreeMap<IdKind, Vec<String>>,
}

impl IdStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ids of one kind, returning the previous list if any.
    pub fn insert(&mut self, kind: IdKind, ids: Vec<String>) -> Option<Vec<String>> {
        self.ids.insert(kind, ids)
    }

    /// The ids of one kind, in code order.
    pub fn get(&self, kind: IdKind) -> Option<&[String]> {
        self.ids.get(&kind).map(Vec::as_slice)
    }

    /// Iterate over kinds in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (IdKind, &[String])> {
        self.ids.iter().map(|(kind, ids)| (*kind, ids.as_slice()))
    }

    /// Number of kinds present.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Total number of ids over all kinds.
    pub fn id_count(&self) -> usize {
        self.ids.values().map(Vec::len).sum()
    }

    /// Load a store from a file.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on any malformed record; no partial store
    /// is ever returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdStoreError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| IdStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self::decode(&bytes)?;
        info!(
            path = %path.display(),
            kinds = store.len(),
            ids = store.id_count(),
            "loaded id store"
        );
        Ok(store)
    }

    /// Decode a whole store from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, IdStoreError> {
        let mut store = IdStore::new();
        let mut buf = bytes;

        while !buf.is_empty() {
            let offset = bytes.len() - buf.len();
            let len = decode_varint(&mut buf).map_err(|e| IdStoreError::Framing {
                offset,
                reason: e.to_string(),
            })?;
            let len = checked_len(len, buf.len()).ok_or_else(|| IdStoreError::Framing {
                offset,
                reason: format!("record length {len} exceeds remaining {} bytes", buf.len()),
            })?;

            let (body, rest) = buf.split_at(len);
            buf = rest;

            let record = IdsWithType::decode(body)
                .map_err(|source| IdStoreError::Message { offset, source })?;
            let kind = IdKind::from_tag(record.type_id)?;

            let payload = match record.data {
                Some(Data::Raw(raw)) => raw,
                Some(Data::Lz4Data(compressed)) => decompress(record.type_id, &compressed)?,
                None => {
                    debug!(kind = %kind, "skipping id record without payload");
                    continue;
                }
            };

            let ids = decode_strings(record.type_id, &payload)?;
            if store.ids.insert(kind, ids).is_some() {
                warn!(kind = %kind, "duplicate id record, keeping the last one");
            }
        }

        Ok(store)
    }

    /// Encode the store in file format.
    pub fn encode(&self, compression: Compression) -> Result<Vec<u8>, IdStoreError> {
        let mut out = Vec::new();

        for (kind, ids) in &self.ids {
            let payload = encode_strings(ids);
            let data = match compression {
                Compression::None => Data::Raw(payload),
                Compression::Lz4 => Data::Lz4Data(compress(kind.tag(), &payload)?),
            };

            let record = IdsWithType {
                type_id: kind.tag(),
                data: Some(data),
            };
            encode_varint(record.encoded_len() as u64, &mut out);
            out.extend_from_slice(&record.encode_to_vec());
        }

        Ok(out)
    }

    /// Write the store to a file.
    pub fn write(&self, path: impl AsRef<Path>, compression: Compression) -> Result<(), IdStoreError> {
        let path = path.as_ref();
        let bytes = self.encode(compression)?;
        std::fs::write(path, bytes).map_err(|source| IdStoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Convert a decoded length to `usize` if it fits in `available` bytes.
fn checked_len(len: u64, available: usize) -> Option<usize> {
    usize::try_from(len).ok().filter(|len| *len <= available)
}

fn decompress(tag: u64, compressed: &[u8]) -> Result<Vec<u8>, IdStoreError> {
    let mut out = Vec::new();
    FrameDecoder::new(compressed)
        .read_to_end(&mut out)
        .map_err(|source| IdStoreError::Decompress { tag, source })?;
    Ok(out)
}

fn compress(tag: u64, payload: &[u8]) -> Result<Vec<u8>, IdStoreError> {
    let mut encoder = FrameEncoder::new(Vec::new());
    encoder
        .write_all(payload)
        .map_err(|source| IdStoreError::Compress { tag, source })?;
    encoder.finish().map_err(|e| IdStoreError::Compress {
        tag,
        source: io::Error::other(e),
    })
}

/// Split a payload into its length-delimited strings. There is no count
/// prefix: strings are read until the payload is exhausted.
fn decode_strings(tag: u64, payload: &[u8]) -> Result<Vec<String>, IdStoreError> {
    let mut ids = Vec::new();
    let mut buf = payload;

    while !buf.is_empty() {
        let len = decode_varint(&mut buf).map_err(|e| IdStoreError::InvalidString {
            tag,
            reason: e.to_string(),
        })?;
        let len = checked_len(len, buf.len()).ok_or_else(|| IdStoreError::InvalidString {
            tag,
            reason: format!("string length {len} exceeds remaining {} bytes", buf.len()),
        })?;

        let (head, rest) = buf.split_at(len);
        let id = std::str::from_utf8(head).map_err(|e| IdStoreError::InvalidString {
            tag,
            reason: e.to_string(),
        })?;
        ids.push(id.to_owned());
        buf = rest;
    }

    Ok(ids)
}

fn encode_strings(ids: &[String]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ids.iter().map(|id| id.len() + 1).sum());
    for id in ids {
        encode_varint(id.len() as u64, &mut payload);
        payload.extend_from_slice(id.as_bytes());
    }
    payload
}
