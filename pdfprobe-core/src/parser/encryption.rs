//! Encryption dictionary report
//!
//! Reads the parameters of the trailer's `/Encrypt` dictionary
//! (ISO 32000-1 Section 7.6.1). Nothing is decrypted.

use super::graph::ObjectGraph;
use super::objects::{PdfDictionary, PdfObject};
use super::ParseResult;
use crate::source::ByteSource;

/// Security handler parameters as declared by the document
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EncryptionInfo {
    /// Security handler (`/Filter`), usually `Standard`
    pub filter: Option<String>,
    pub sub_filter: Option<String>,
    /// Algorithm (`/V`)
    pub version: Option<i64>,
    /// Standard handler revision (`/R`)
    pub revision: Option<i64>,
    /// Key length in bits
    pub length: Option<i64>,
    /// User access permissions (`/P`)
    pub permissions: Option<i64>,
    /// Default crypt filter for streams (`/StmF`)
    pub stream_filter: Option<String>,
    /// Default crypt filter for strings (`/StrF`)
    pub string_filter: Option<String>,
}

impl EncryptionInfo {
    /// Read the direct entries of an encryption dictionary
    pub fn from_dict(dict: &PdfDictionary) -> Self {
        let name = |key: &str| {
            dict.get(key)
                .and_then(PdfObject::as_name)
                .map(|name| name.as_str().to_string())
        };
        let integer = |key: &str| dict.get(key).and_then(PdfObject::as_integer);

        Self {
            filter: name("Filter"),
            sub_filter: name("SubFilter"),
            version: integer("V"),
            revision: integer("R"),
            length: integer("Length"),
            permissions: integer("P"),
            stream_filter: name("StmF"),
            string_filter: name("StrF"),
        }
    }

    /// Resolve `/Encrypt` (direct or indirect) through the graph. Returns
    /// `None` when the entry does not lead to a dictionary.
    pub fn resolve<R: ByteSource>(
        graph: &mut ObjectGraph<R>,
        encrypt: &PdfObject,
    ) -> ParseResult<Option<Self>> {
        let resolved = graph.resolve(encrypt)?;
        Ok(resolved.as_dict().map(Self::from_dict))
    }

    /// Whether the document grants the print permission (bit 3)
    pub fn allows_printing(&self) -> Option<bool> {
        self.permissions.map(|p| p & (1 << 2) != 0)
    }
}
