//! PDF Trailer Parser
//!
//! Parses trailer dictionaries according to ISO 32000-1 Section 7.5.5 and
//! the trailer entries of cross-reference streams (Section 7.5.8.2).

use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// Where a trailer dictionary came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Classic `xref` table followed by `trailer`
    Table,
    /// Dictionary of a `/Type /XRef` stream
    Stream,
}

/// PDF Trailer information
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    /// Byte offset of the cross-reference section this trailer closes
    pub offset: u64,
    pub kind: SectionKind,
    pub size: Option<u32>,
    pub root: Option<ObjectId>,
    pub prev: Option<u64>,
    pub encrypt: Option<ObjectId>,
    pub info: Option<ObjectId>,
    pub id: Option<(Vec<u8>, Vec<u8>)>,
    /// Hybrid files: offset of the supplementary cross-reference stream
    pub xref_stm: Option<u64>,
    pub dict: PdfDictionary,
}

fn offset_entry(dict: &PdfDictionary, key: &str, position: u64) -> ParseResult<Option<u64>> {
    match dict.get(key) {
        None => Ok(None),
        Some(PdfObject::Integer(value)) if *value >= 0 => Ok(Some(*value as u64)),
        Some(other) => Err(ParseError::InvalidTrailer {
            position,
            message: format!("/{key} is {} instead of an offset", other.type_name()),
        }),
    }
}

impl Trailer {
    /// Extract the typed entries of a trailer dictionary
    pub fn from_dict(dict: PdfDictionary, offset: u64, kind: SectionKind) -> ParseResult<Self> {
        let prev = offset_entry(&dict, "Prev", offset)?;
        let xref_stm = offset_entry(&dict, "XRefStm", offset)?;

        let size = dict
            .get("Size")
            .and_then(PdfObject::as_integer)
            .and_then(|size| u32::try_from(size).ok());

        let id = dict.get("ID").and_then(PdfObject::as_array).and_then(|ids| {
            match (ids.get(0)?.as_string(), ids.get(1)?.as_string()) {
                (Some(first), Some(second)) => {
                    Some((first.as_bytes().to_vec(), second.as_bytes().to_vec()))
                }
                _ => None,
            }
        });

        Ok(Self {
            offset,
            kind,
            size,
            root: dict.get("Root").and_then(PdfObject::as_reference),
            prev,
            encrypt: dict.get("Encrypt").and_then(PdfObject::as_reference),
            info: dict.get("Info").and_then(PdfObject::as_reference),
            id,
            xref_stm,
            dict,
        })
    }

    /// Encryption is declared directly or by reference
    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }
}

/// Trailers in the order they were walked, newest first
#[derive(Debug, Clone, Default)]
pub struct TrailerChain {
    trailers: Vec<Trailer>,
}

impl TrailerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trailer: Trailer) {
        self.trailers.push(trailer);
    }

    pub fn newest(&self) -> Option<&Trailer> {
        self.trailers.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trailer> {
        self.trailers.iter()
    }

    pub fn len(&self) -> usize {
        self.trailers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trailers.is_empty()
    }

    /// Document catalog from the newest trailer that names one
    pub fn root(&self) -> Option<ObjectId> {
        self.trailers.iter().find_map(|t| t.root)
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.trailers.iter().find_map(|t| t.info)
    }

    /// Newest `/Encrypt` value, direct dictionary or reference
    pub fn encrypt(&self) -> Option<&PdfObject> {
        self.trailers.iter().find_map(|t| t.dict.get("Encrypt"))
    }

    pub fn id(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.trailers.iter().find_map(|t| t.id.as_ref())
    }

    pub fn incremental_updates(&self) -> usize {
        self.trailers.len().saturating_sub(1)
    }
}
