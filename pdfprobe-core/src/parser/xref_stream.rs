//! Cross-reference stream support for PDF 1.5+
//!
//! This module implements cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8 (Cross-Reference Streams).
//!
//! Only the row layout lives here. Locating the stream, decoding its filter
//! chain and merging the rows is done by [`XRefResolver`](super::XRefResolver).

use super::objects::{PdfDictionary, PdfObject};
use super::xref::XRefEntry;
use super::{ParseError, ParseResult};

/// Widest field accepted in `/W`
const MAX_FIELD_WIDTH: usize = 8;

/// Row layout of a cross-reference stream
#[derive(Debug, Clone, PartialEq)]
pub struct XRefStream {
    /// Field widths from the W array
    pub widths: [usize; 3],
    /// Index array (pairs of [first_object_number, count])
    pub index: Vec<(u32, u32)>,
    pub size: u32,
}

/// Rows decoded from a cross-reference stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefRows {
    pub entries: Vec<(u32, XRefEntry)>,
    /// Rows with a type other than 0, 1 or 2
    pub ignored: usize,
    /// The data ended before every row named by `/Index` was read
    pub truncated: bool,
}

fn non_negative(obj: &PdfObject) -> Option<u64> {
    obj.as_integer().and_then(|n| u64::try_from(n).ok())
}

impl XRefStream {
    /// Read `/W`, `/Index` and `/Size` from the stream dictionary
    pub fn from_dict(dict: &PdfDictionary, position: u64) -> ParseResult<Self> {
        let invalid = |message: String| ParseError::InvalidXRefStream { position, message };

        let size = dict
            .get("Size")
            .and_then(non_negative)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid("missing or invalid /Size".to_string()))?;

        let w = dict
            .get("W")
            .and_then(PdfObject::as_array)
            .ok_or_else(|| invalid("missing /W array".to_string()))?;
        if w.len() != 3 {
            return Err(invalid(format!(
                "W array must have 3 elements, found {}",
                w.len()
            )));
        }
        let mut widths = [0usize; 3];
        for (slot, obj) in widths.iter_mut().zip(w.iter()) {
            *slot = non_negative(obj)
                .map(|n| n as usize)
                .filter(|&n| n <= MAX_FIELD_WIDTH)
                .ok_or_else(|| invalid("invalid width in W array".to_string()))?;
        }
        if widths.iter().sum::<usize>() == 0 {
            return Err(invalid("entry width is 0".to_string()));
        }

        let index = match dict.get("Index").and_then(PdfObject::as_array) {
            Some(array) => {
                if array.len() % 2 != 0 {
                    return Err(invalid("Index array has an odd length".to_string()));
                }
                let numbers = array
                    .iter()
                    .map(|obj| {
                        non_negative(obj)
                            .and_then(|n| u32::try_from(n).ok())
                            .ok_or_else(|| invalid("invalid number in Index".to_string()))
                    })
                    .collect::<ParseResult<Vec<u32>>>()?;
                numbers.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
            }
            None => vec![(0, size)],
        };

        Ok(Self {
            widths,
            index,
            size,
        })
    }

    fn row_width(&self) -> usize {
        self.widths.iter().sum()
    }

    /// Decode rows from the decompressed stream data
    pub fn entries(&self, data: &[u8]) -> XRefRows {
        let mut rows = XRefRows::default();
        let mut chunks = data.chunks_exact(self.row_width());
        let [w1, w2, _] = self.widths;

        for &(first, count) in &self.index {
            for i in 0..count {
                let Some(row) = chunks.next() else {
                    rows.truncated = true;
                    return rows;
                };
                let Some(number) = first.checked_add(i) else {
                    rows.ignored += 1;
                    continue;
                };

                let (kind, rest) = row.split_at(w1);
                let (field2, field3) = rest.split_at(w2);
                let kind = if w1 == 0 { 1 } else { read_field(kind) };
                let field2 = read_field(field2);
                let field3 = read_field(field3);

                let entry = match kind {
                    0 => XRefEntry::Free {
                        next: saturate_u32(field2),
                        generation: saturate_u16(field3),
                    },
                    1 => XRefEntry::Offset {
                        offset: field2,
                        generation: saturate_u16(field3),
                    },
                    2 => XRefEntry::Compressed {
                        container: saturate_u32(field2),
                        index: saturate_u32(field3),
                    },
                    _ => {
                        rows.ignored += 1;
                        continue;
                    }
                };
                rows.entries.push((number, entry));
            }
        }

        rows
    }
}

/// Read a field from bytes (big-endian); an absent field reads as 0
fn read_field(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for &byte in bytes {
        value = (value << 8) | (byte as u64);
    }
    value
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn saturate_u16(value: u64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfArray;

    fn layout(widths: [usize; 3], index: Vec<(u32, u32)>) -> XRefStream {
        XRefStream {
            widths,
            index,
            size: 100,
        }
    }

    fn int_array(values: &[i64]) -> PdfObject {
        PdfObject::Array(PdfArray(values.iter().map(|&v| PdfObject::Integer(v)).collect()))
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[]), 0);
        assert_eq!(read_field(&[0x01]), 1);
        assert_eq!(read_field(&[0x01, 0x00]), 256);
        assert_eq!(read_field(&[0x00, 0x03, 0xE8]), 1000);
    }

    #[test]
    fn test_from_dict_defaults_index_to_size() {
        let mut dict = PdfDictionary::new();
        dict.insert("Size".to_string(), PdfObject::Integer(6));
        dict.insert("W".to_string(), int_array(&[1, 2, 1]));

        let stream = XRefStream::from_dict(&dict, 0).unwrap();
        assert_eq!(stream.widths, [1, 2, 1]);
        assert_eq!(stream.index, vec![(0, 6)]);
    }

    #[test]
    fn test_from_dict_rejects_bad_layouts() {
        let mut dict = PdfDictionary::new();
        dict.insert("Size".to_string(), PdfObject::Integer(6));
        dict.insert("W".to_string(), int_array(&[1, 2]));
        assert!(matches!(
            XRefStream::from_dict(&dict, 40),
            Err(ParseError::InvalidXRefStream { position: 40, .. })
        ));

        dict.insert("W".to_string(), int_array(&[1, 2, 1]));
        dict.insert("Index".to_string(), int_array(&[0, 3, 5]));
        assert!(XRefStream::from_dict(&dict, 40).is_err());

        dict.insert("Index".to_string(), int_array(&[0, 6]));
        dict.insert("W".to_string(), int_array(&[0, 0, 0]));
        assert!(XRefStream::from_dict(&dict, 40).is_err());
    }

    #[test]
    fn test_offset_entry() {
        let rows = layout([1, 2, 1], vec![(10, 1)]).entries(&[1, 0x03, 0xE8, 0]);
        assert_eq!(
            rows.entries,
            vec![(
                10,
                XRefEntry::Offset {
                    offset: 1000,
                    generation: 0
                }
            )]
        );
        assert!(!rows.truncated);
    }

    #[test]
    fn test_compressed_entry() {
        let rows = layout([1, 2, 2], vec![(20, 1)]).entries(&[2, 0x00, 0x05, 0x00, 0x03]);
        assert_eq!(
            rows.entries,
            vec![(
                20,
                XRefEntry::Compressed {
                    container: 5,
                    index: 3
                }
            )]
        );
    }

    #[test]
    fn test_type_defaults_to_one_without_type_field() {
        let rows = layout([0, 2, 1], vec![(3, 1)]).entries(&[0x00, 0x10, 0x02]);
        assert_eq!(
            rows.entries,
            vec![(
                3,
                XRefEntry::Offset {
                    offset: 16,
                    generation: 2
                }
            )]
        );
    }

    #[test]
    fn test_multiple_index_ranges() {
        let data = [
            0, 0, 0, 0xFF, 0xFF, // free object 0
            1, 0, 0x0A, 0, 0, // object 1 at 10
            1, 0, 0x14, 0, 0, // object 10 at 20
            1, 0, 0x1E, 0, 0, // object 11 at 30
        ];
        let rows = layout([1, 2, 2], vec![(0, 2), (10, 2)]).entries(&data);
        let numbers: Vec<u32> = rows.entries.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![0, 1, 10, 11]);
        assert_eq!(
            rows.entries[0].1,
            XRefEntry::Free {
                next: 0,
                generation: 65535
            }
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let rows = layout([1, 1, 1], vec![(0, 2)]).entries(&[7, 0, 0, 1, 9, 0]);
        assert_eq!(rows.ignored, 1);
        assert_eq!(rows.entries.len(), 1);
        assert_eq!(rows.entries[0].0, 1);
    }

    #[test]
    fn test_short_data_is_truncated() {
        let rows = layout([1, 1, 1], vec![(0, 3)]).entries(&[1, 9, 0, 1, 12]);
        assert!(rows.truncated);
        assert_eq!(rows.entries.len(), 1);
    }
}
