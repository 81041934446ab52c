//! Test PDF Builder
//!
//! A builder for creating test PDFs with specific characteristics. Every
//! document it writes has correct offsets; deliberately broken documents are
//! derived from its output in [`super::invalid_pdfs`].

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

/// PDF version to generate
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PdfVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
    V1_4,
    V1_5,
    V1_6,
    V1_7,
    V2_0,
}

impl PdfVersion {
    pub const ALL: [PdfVersion; 9] = [
        PdfVersion::V1_0,
        PdfVersion::V1_1,
        PdfVersion::V1_2,
        PdfVersion::V1_3,
        PdfVersion::V1_4,
        PdfVersion::V1_5,
        PdfVersion::V1_6,
        PdfVersion::V1_7,
        PdfVersion::V2_0,
    ];
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = match self {
            PdfVersion::V1_0 => "1.0",
            PdfVersion::V1_1 => "1.1",
            PdfVersion::V1_2 => "1.2",
            PdfVersion::V1_3 => "1.3",
            PdfVersion::V1_4 => "1.4",
            PdfVersion::V1_5 => "1.5",
            PdfVersion::V1_6 => "1.6",
            PdfVersion::V1_7 => "1.7",
            PdfVersion::V2_0 => "2.0",
        };
        write!(f, "{version}")
    }
}

/// How the cross-reference information is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefStyle {
    /// Classic `xref` table and `trailer` dictionary
    Table,
    /// Cross-reference stream (PDF 1.5+)
    Stream,
    /// Cross-reference stream, with every non-stream object packed into a
    /// single object stream
    ObjectStreams,
}

/// Builder for creating test PDFs
pub struct TestPdfBuilder {
    version: PdfVersion,
    pages: Vec<PageSpec>,
    info: Vec<(String, String)>,
    outline: Vec<String>,
    extra: Vec<String>,
    catalog_entries: Vec<(String, String)>,
    inherited_media_box: Option<(f32, f32)>,
    include_binary_marker: bool,
    compress_streams: bool,
    xref_style: XRefStyle,
}

#[derive(Clone)]
struct PageSpec {
    width: f32,
    height: f32,
    rotate: Option<i32>,
    content_stream: String,
}

enum Body {
    Object(String),
    Stream { dict: String, data: Vec<u8> },
}

impl TestPdfBuilder {
    /// Create a new PDF builder with default settings
    pub fn new() -> Self {
        Self {
            version: PdfVersion::V1_4,
            pages: Vec::new(),
            info: Vec::new(),
            outline: Vec::new(),
            extra: Vec::new(),
            catalog_entries: Vec::new(),
            inherited_media_box: None,
            include_binary_marker: true,
            compress_streams: false,
            xref_style: XRefStyle::Table,
        }
    }

    /// Create a minimal valid PDF
    pub fn minimal() -> Self {
        let mut builder = Self::new();
        builder.add_empty_page(612.0, 792.0);
        builder
    }

    /// Set PDF version
    pub fn with_version(mut self, version: PdfVersion) -> Self {
        self.version = version;
        self
    }

    /// Add document info; `value` is written as a literal string
    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.info
            .push((key.to_string(), format!("({})", escape_pdf_string(value))));
        self
    }

    /// Add title
    pub fn with_title(self, title: &str) -> Self {
        self.with_info("Title", title)
    }

    /// Add creator
    pub fn with_creator(self, creator: &str) -> Self {
        self.with_info("Creator", creator)
    }

    /// Add a UTF-16 title carrying an embedded language escape (`en`, `enUS`)
    pub fn with_tagged_title(mut self, language: &str, title: &str) -> Self {
        // Each unit of the escape packs two ASCII letters
        let mut units = vec![0x1B_u16];
        units.extend(
            language
                .as_bytes()
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
        );
        units.push(0x1B);
        units.extend(title.encode_utf16());

        let mut hex = String::from("<FEFF");
        for unit in units {
            hex.push_str(&format!("{unit:04X}"));
        }
        hex.push('>');
        self.info.push(("Title".to_string(), hex));
        self
    }

    /// Add a raw entry to the document catalog
    pub fn with_catalog_entry(mut self, key: &str, value: &str) -> Self {
        self.catalog_entries
            .push((key.to_string(), value.to_string()));
        self
    }

    /// Put the media box on the page tree root instead of on each page
    pub fn with_inherited_media_box(mut self, width: f32, height: f32) -> Self {
        self.inherited_media_box = Some((width, height));
        self
    }

    /// Add a flat document outline with one item per title
    pub fn with_outline(mut self, titles: &[&str]) -> Self {
        self.outline = titles.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Enable stream compression
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Select how cross-reference information is written. Streams raise the
    /// version to 1.5.
    pub fn with_xref_style(mut self, style: XRefStyle) -> Self {
        self.xref_style = style;
        if style != XRefStyle::Table && self.version < PdfVersion::V1_5 {
            self.version = PdfVersion::V1_5;
        }
        self
    }

    /// Omit the binary comment after the header
    pub fn without_binary_marker(mut self) -> Self {
        self.include_binary_marker = false;
        self
    }

    /// Add an empty page
    pub fn add_empty_page(&mut self, width: f32, height: f32) -> &mut Self {
        self.pages.push(PageSpec {
            width,
            height,
            rotate: None,
            content_stream: String::new(),
        });
        self
    }

    /// Add a rotated empty page
    pub fn add_rotated_page(&mut self, rotate: i32) -> &mut Self {
        self.pages.push(PageSpec {
            width: 612.0,
            height: 792.0,
            rotate: Some(rotate),
            content_stream: String::new(),
        });
        self
    }

    /// Add a page with text
    pub fn add_text_page(&mut self, text: &str, font_size: f32) -> &mut Self {
        let content = format!(
            "BT\n/F1 {} Tf\n100 700 Td\n({}) Tj\nET",
            font_size,
            escape_pdf_string(text)
        );
        self.pages.push(PageSpec {
            width: 612.0,
            height: 792.0,
            rotate: None,
            content_stream: content,
        });
        self
    }

    /// Add an object outside the document structure and return its number.
    /// Extra objects are numbered from 3, in the order they are added.
    pub fn add_object(&mut self, content: &str) -> u32 {
        self.extra.push(content.to_string());
        2 + self.extra.len() as u32
    }

    /// Number of objects in use, excluding cross-reference and object
    /// stream containers
    pub fn object_count(&self) -> u32 {
        let contents = self
            .pages
            .iter()
            .filter(|p| !p.content_stream.is_empty())
            .count();
        let info = usize::from(!self.info.is_empty());
        let outline = if self.outline.is_empty() {
            0
        } else {
            1 + self.outline.len()
        };
        (2 + self.extra.len() + self.pages.len() + contents + info + outline) as u32
    }

    fn bodies(&self) -> (Vec<Body>, Option<u32>) {
        let pages_obj = 2;
        let first_page = 3 + self.extra.len() as u32;
        let first_content = first_page + self.pages.len() as u32;
        let contents = self
            .pages
            .iter()
            .filter(|p| !p.content_stream.is_empty())
            .count() as u32;
        let mut next = first_content + contents;
        let info_obj = (!self.info.is_empty()).then(|| {
            next += 1;
            next - 1
        });
        let outline_obj = (!self.outline.is_empty()).then_some(next);

        let mut bodies = Vec::new();

        let mut catalog = format!("<< /Type /Catalog /Pages {pages_obj} 0 R");
        if let Some(outlines) = outline_obj {
            catalog.push_str(&format!(" /Outlines {outlines} 0 R"));
        }
        for (key, value) in &self.catalog_entries {
            catalog.push_str(&format!(" /{key} {value}"));
        }
        catalog.push_str(" >>");
        bodies.push(Body::Object(catalog));

        let kids: Vec<String> = (0..self.pages.len() as u32)
            .map(|i| format!("{} 0 R", first_page + i))
            .collect();
        let mut pages = format!(
            "<< /Type /Pages /Kids [{}] /Count {}",
            kids.join(" "),
            self.pages.len()
        );
        if let Some((width, height)) = self.inherited_media_box {
            pages.push_str(&format!(" /MediaBox [0 0 {width} {height}]"));
        }
        pages.push_str(" >>");
        bodies.push(Body::Object(pages));

        bodies.extend(self.extra.iter().cloned().map(Body::Object));

        let mut content_obj = first_content;
        for page in &self.pages {
            let mut dict = format!("<< /Type /Page /Parent {pages_obj} 0 R");
            if self.inherited_media_box.is_none() {
                dict.push_str(&format!(" /MediaBox [0 0 {} {}]", page.width, page.height));
            }
            if let Some(rotate) = page.rotate {
                dict.push_str(&format!(" /Rotate {rotate}"));
            }
            if !page.content_stream.is_empty() {
                dict.push_str(&format!(
                    " /Resources << /Font << /F1 << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> >> >> /Contents {content_obj} 0 R"
                ));
                content_obj += 1;
            }
            dict.push_str(" >>");
            bodies.push(Body::Object(dict));
        }

        for page in self.pages.iter().filter(|p| !p.content_stream.is_empty()) {
            bodies.push(self.stream_body("", page.content_stream.as_bytes()));
        }

        if info_obj.is_some() {
            let mut dict = String::from("<<");
            for (key, value) in &self.info {
                dict.push_str(&format!(" /{key} {value}"));
            }
            dict.push_str(" >>");
            bodies.push(Body::Object(dict));
        }

        if let Some(root) = outline_obj {
            let first = root + 1;
            let last = root + self.outline.len() as u32;
            bodies.push(Body::Object(format!(
                "<< /Type /Outlines /First {first} 0 R /Last {last} 0 R /Count {} >>",
                self.outline.len()
            )));
            for (i, title) in self.outline.iter().enumerate() {
                let number = first + i as u32;
                let mut item = format!(
                    "<< /Title ({}) /Parent {root} 0 R",
                    escape_pdf_string(title)
                );
                if number > first {
                    item.push_str(&format!(" /Prev {} 0 R", number - 1));
                }
                if number < last {
                    item.push_str(&format!(" /Next {} 0 R", number + 1));
                }
                item.push_str(" >>");
                bodies.push(Body::Object(item));
            }
        }

        (bodies, info_obj)
    }

    fn stream_body(&self, dict_entries: &str, data: &[u8]) -> Body {
        if self.compress_streams {
            Body::Stream {
                dict: format!("{dict_entries} /Filter /FlateDecode"),
                data: deflate(data),
            }
        } else {
            Body::Stream {
                dict: dict_entries.to_string(),
                data: data.to_vec(),
            }
        }
    }

    /// Build the PDF
    pub fn build(&self) -> Vec<u8> {
        let mut pdf = format!("%PDF-{}\n", self.version).into_bytes();
        if self.include_binary_marker {
            pdf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        }

        let (bodies, info_obj) = self.bodies();
        let count = bodies.len() as u32;
        let mut trailer = String::from("/Root 1 0 R");
        if let Some(info) = info_obj {
            trailer.push_str(&format!(" /Info {info} 0 R"));
        }

        match self.xref_style {
            XRefStyle::Table => {
                let mut offsets = Vec::with_capacity(bodies.len());
                for (i, body) in bodies.iter().enumerate() {
                    offsets.push(pdf.len());
                    write_body(&mut pdf, i as u32 + 1, body);
                }
                let xref_offset = pdf.len();
                write_traditional_xref(&mut pdf, &offsets);
                pdf.extend_from_slice(
                    format!(
                        "trailer\n<< /Size {} {trailer} >>\nstartxref\n{xref_offset}\n%%EOF\n",
                        count + 1
                    )
                    .as_bytes(),
                );
            }
            XRefStyle::Stream => {
                let mut rows = vec![Row::Free];
                for (i, body) in bodies.iter().enumerate() {
                    rows.push(Row::Offset(pdf.len()));
                    write_body(&mut pdf, i as u32 + 1, body);
                }
                self.write_xref_stream(&mut pdf, count + 1, rows, &trailer);
            }
            XRefStyle::ObjectStreams => {
                let container = count + 1;
                let mut rows = vec![Row::Free];
                let mut packed = Vec::new();
                for (i, body) in bodies.iter().enumerate() {
                    match body {
                        Body::Object(text) => {
                            rows.push(Row::Compressed(container, packed.len() as u32));
                            packed.push((i as u32 + 1, text.as_str()));
                        }
                        Body::Stream { .. } => {
                            rows.push(Row::Offset(pdf.len()));
                            write_body(&mut pdf, i as u32 + 1, body);
                        }
                    }
                }

                rows.push(Row::Offset(pdf.len()));
                let (dict, data) = object_stream_payload(&packed);
                write_body(&mut pdf, container, &self.stream_body(&dict, &data));
                self.write_xref_stream(&mut pdf, container + 1, rows, &trailer);
            }
        }
        pdf
    }

    /// Write cross-reference stream `number`, which covers itself as the
    /// last row
    fn write_xref_stream(&self, pdf: &mut Vec<u8>, number: u32, mut rows: Vec<Row>, trailer: &str) {
        let start = pdf.len();
        rows.push(Row::Offset(start));

        let rows: Vec<(u8, u32, u16)> = rows
            .iter()
            .map(|row| match *row {
                Row::Free => (0, 0, 65535),
                Row::Offset(offset) => (1, offset as u32, 0),
                Row::Compressed(container, index) => (2, container, index as u16),
            })
            .collect();
        let data = encode_xref_rows(&rows);

        let dict = format!(
            "/Type /XRef /Size {} /W [1 4 2] {trailer}",
            number + 1
        );
        write_body(pdf, number, &self.stream_body(&dict, &data));
        pdf.extend_from_slice(format!("startxref\n{start}\n%%EOF\n").as_bytes());
    }
}

impl Default for TestPdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

enum Row {
    Free,
    Offset(usize),
    Compressed(u32, u32),
}

fn write_body(pdf: &mut Vec<u8>, number: u32, body: &Body) {
    match body {
        Body::Object(text) => {
            pdf.extend_from_slice(format!("{number} 0 obj\n{text}\nendobj\n").as_bytes());
        }
        Body::Stream { dict, data } => {
            pdf.extend_from_slice(
                format!("{number} 0 obj\n<< {dict} /Length {} >>\nstream\n", data.len()).as_bytes(),
            );
            pdf.extend_from_slice(data);
            pdf.extend_from_slice(b"\nendstream\nendobj\n");
        }
    }
}

/// Rows of a cross-reference stream with `/W [1 4 2]`
pub fn encode_xref_rows(rows: &[(u8, u32, u16)]) -> Vec<u8> {
    let mut data = Vec::with_capacity(rows.len() * 7);
    for &(kind, field2, field3) in rows {
        data.push(kind);
        data.extend_from_slice(&field2.to_be_bytes());
        data.extend_from_slice(&field3.to_be_bytes());
    }
    data
}

/// Write traditional cross-reference table for objects 1..=offsets.len()
fn write_traditional_xref(pdf: &mut Vec<u8>, offsets: &[usize]) {
    pdf.extend_from_slice(b"xref\n");
    pdf.extend_from_slice(format!("0 {}\n", offsets.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for &pos in offsets {
        pdf.extend_from_slice(format!("{pos:010} 00000 n \n").as_bytes());
    }
}

/// Dictionary entries and data of an object stream holding `objects`
fn object_stream_payload(objects: &[(u32, &str)]) -> (String, Vec<u8>) {
    let mut header = String::new();
    let mut body = String::new();
    for (number, text) in objects {
        header.push_str(&format!("{number} {} ", body.len()));
        body.push_str(text);
        body.push('\n');
    }
    let dict = format!("/Type /ObjStm /N {} /First {}", objects.len(), header.len());
    (dict, format!("{header}{body}").into_bytes())
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Append an incremental update redefining `objects` (number, body). The
/// new classic section links back to the last `startxref` of `base`.
pub fn append_incremental_update(base: &[u8], objects: &[(u32, &str)], size: u32, trailer: &str) -> Vec<u8> {
    let prev = last_startxref(base).unwrap_or(0);
    let mut pdf = base.to_vec();
    if !pdf.ends_with(b"\n") {
        pdf.push(b'\n');
    }

    let mut records = Vec::new();
    for &(number, body) in objects {
        records.push((number, pdf.len()));
        pdf.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    records.sort_by_key(|&(number, _)| number);

    let start = pdf.len();
    pdf.extend_from_slice(b"xref\n");
    for (number, offset) in records {
        pdf.extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!("trailer\n<< /Size {size} /Prev {prev} {trailer} >>\nstartxref\n{start}\n%%EOF\n")
            .as_bytes(),
    );
    pdf
}

/// Offset named by the last `startxref` keyword
pub fn last_startxref(pdf: &[u8]) -> Option<usize> {
    let keyword = b"startxref";
    let at = pdf.windows(keyword.len()).rposition(|w| w == keyword)?;
    let digits: String = pdf[at + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| char::from(b))
        .collect();
    digits.parse().ok()
}

/// Escape special characters in PDF strings
pub fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            '\n' => "\\n".to_string(),
            '\r' => "\\r".to_string(),
            '\t' => "\\t".to_string(),
            _ => c.to_string(),
        })
        .collect()
}
