//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4.
//! Only the filters structural streams use are decoded; image codecs are
//! recognized and refused.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

#[cfg(feature = "compression")]
use flate2::read::ZlibDecoder;
#[cfg(feature = "compression")]
use std::io::Read;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,

    /// CCITT fax decode
    CCITTFaxDecode,

    /// JBIG2 decode
    JBIG2Decode,

    /// DCT decode (JPEG)
    DCTDecode,

    /// JPX decode (JPEG 2000)
    JPXDecode,

    /// Crypt filter
    Crypt,
}

impl Filter {
    /// Parse filter from name, accepting the abbreviations allowed in inline images
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }
}

/// Predictor parameters from `/DecodeParms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let mut params = Self::default();
        let Some(dict) = dict else {
            return params;
        };
        let get = |key: &str| dict.get(key).and_then(PdfObject::as_integer);

        if let Some(predictor) = get("Predictor") {
            params.predictor = predictor;
        }
        if let Some(colors) = get("Colors").filter(|&c| c > 0) {
            params.colors = colors as usize;
        }
        if let Some(bpc) = get("BitsPerComponent").filter(|&b| b > 0) {
            params.bits_per_component = bpc as usize;
        }
        if let Some(columns) = get("Columns").filter(|&c| c > 0) {
            params.columns = columns as usize;
        }
        if let Some(early) = get("EarlyChange") {
            params.early_change = early != 0;
        }
        params
    }

    /// Bytes per sample, at least one
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    /// Bytes per row without the PNG tag byte
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

/// Decode stream data given its (already resolved) `/Filter` and `/DecodeParms`
pub fn decode_stream(
    data: &[u8],
    filter: Option<&PdfObject>,
    parms: Option<&PdfObject>,
) -> ParseResult<Vec<u8>> {
    let filters: Vec<&str> = match filter {
        None | Some(PdfObject::Null) => return Ok(data.to_vec()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array
            .iter()
            .map(|obj| {
                obj.as_name().map(|n| n.as_str()).ok_or_else(|| {
                    ParseError::StreamDecodeError("Invalid filter in array".to_string())
                })
            })
            .collect::<ParseResult<_>>()?,
        Some(other) => {
            return Err(ParseError::StreamDecodeError(format!(
                "Invalid Filter type: {}",
                other.type_name()
            )))
        }
    };

    let mut result = data.to_vec();
    for (i, filter_name) in filters.into_iter().enumerate() {
        let filter = Filter::from_name(filter_name).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Unknown filter: {filter_name}"))
        })?;
        let params = match parms {
            Some(PdfObject::Dictionary(dict)) if i == 0 => Some(dict),
            Some(PdfObject::Array(array)) => array.get(i).and_then(PdfObject::as_dict),
            _ => None,
        };
        result = apply_filter(&result, filter, params)?;
    }

    Ok(result)
}

/// Apply a single filter to data
pub fn apply_filter(
    data: &[u8],
    filter: Filter,
    params: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => {
            let params = PredictorParams::from_dict(params);
            apply_predictor(&decode_flate(data)?, &params)
        }
        Filter::LZWDecode => {
            let params = PredictorParams::from_dict(params);
            apply_predictor(&decode_lzw(data, params.early_change)?, &params)
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
        Filter::RunLengthDecode => decode_run_length(data),
        other => Err(ParseError::StreamDecodeError(format!(
            "Filter {other:?} is not decoded"
        ))),
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| ParseError::StreamDecodeError(format!("Flate decode error: {e}")))?;
    Ok(result)
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(ParseError::StreamDecodeError(
        "FlateDecode requires 'compression' feature".to_string(),
    ))
}

/// Decode LZWDecode data (MSB first, 9-12 bit codes)
#[cfg(feature = "compression")]
fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    use weezl::{decode::Decoder, BitOrder};

    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| ParseError::StreamDecodeError(format!("LZW decode error: {e:?}")))
}

#[cfg(not(feature = "compression"))]
fn decode_lzw(_data: &[u8], _early_change: bool) -> ParseResult<Vec<u8>> {
    Err(ParseError::StreamDecodeError(
        "LZWDecode requires 'compression' feature".to_string(),
    ))
}

/// Reverse a TIFF or PNG predictor
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unsupported predictor: {other}"
        ))),
    }
}

fn decode_tiff_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(ParseError::StreamDecodeError(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_bytes = params.row_bytes().max(1);
    let colors = params.colors;
    let mut output = Vec::with_capacity(data.len());

    for row in data.chunks(row_bytes) {
        let row_start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= colors {
                output[row_start + i - colors]
            } else {
                0
            };
            output.push(byte.wrapping_add(left));
        }
    }
    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn decode_png_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let row_bytes = params.row_bytes();
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_bytes];

    for chunk in data.chunks(row_bytes + 1) {
        let (tag, row) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };
        let mut current = vec![0u8; row_bytes];
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            current[i] = match tag {
                0 => byte,
                1 => byte.wrapping_add(left),
                2 => byte.wrapping_add(up),
                3 => byte.wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => byte.wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG row filter: {other}"
                    )))
                }
            };
        }
        output.extend_from_slice(&current[..row.len()]);
        previous = current;
    }
    Ok(output)
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut pending: Option<u8> = None;

    for &ch in data.iter().filter(|b| !b.is_ascii_whitespace()) {
        if ch == b'>' {
            break;
        }
        let value = hex_digit_value(ch).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char))
        })?;
        match pending.take() {
            Some(high) => result.push(high << 4 | value),
            None => pending = Some(value),
        }
    }
    // Odd number of digits, pad with 0
    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Get value of hex digit
fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut count = 0;

    let body = data.strip_prefix(b"<~").unwrap_or(data);
    for &ch in body.iter().filter(|b| !b.is_ascii_whitespace()) {
        match ch {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = ch - b'!';
                count += 1;
                if count == 5 {
                    result.extend_from_slice(&ascii85_group(&group)?);
                    count = 0;
                }
            }
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    ch as char
                )))
            }
        }
    }

    if count == 1 {
        return Err(ParseError::StreamDecodeError(
            "Incomplete ASCII85 group".to_string(),
        ));
    }
    if count > 1 {
        for slot in group.iter_mut().skip(count) {
            *slot = 84; // 'u'
        }
        let bytes = ascii85_group(&group)?;
        result.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(result)
}

fn ascii85_group(group: &[u8; 5]) -> ParseResult<[u8; 4]> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map(u32::to_be_bytes)
        .map_err(|_| ParseError::StreamDecodeError("ASCII85 group overflow".to_string()))
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let n = usize::from(length) + 1;
                let end = (i + n).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let byte = *data.get(i).ok_or_else(|| {
                    ParseError::StreamDecodeError("Truncated run".to_string())
                })?;
                result.extend(std::iter::repeat(byte).take(257 - usize::from(length)));
                i += 1;
            }
        }
    }

    Ok(result)
}
