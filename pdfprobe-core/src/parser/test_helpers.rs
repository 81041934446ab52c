//! Builders for sample documents with correct offsets

use std::collections::BTreeMap;
use std::io::Cursor;

/// Writes a document body object by object and emits cross-reference
/// sections for the objects added since the previous section.
pub struct DocBuilder {
    data: Vec<u8>,
    pending: BTreeMap<u32, u64>,
    last_section: Option<u64>,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self::with_version("1.4")
    }

    pub fn with_version(version: &str) -> Self {
        let mut data = format!("%PDF-{version}\n").into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            pending: BTreeMap::new(),
            last_section: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// `num 0 obj <body> endobj`
    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.pending.insert(num, self.position());
        self.data
            .extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
        self
    }

    /// A stream object whose `/Length` matches `data`
    pub fn stream(mut self, num: u32, dict_entries: &str, data: &[u8]) -> Self {
        self.pending.insert(num, self.position());
        self.data.extend_from_slice(
            format!("{num} 0 obj\n<< {dict_entries} /Length {} >>\nstream\n", data.len()).as_bytes(),
        );
        self.data.extend_from_slice(data);
        self.data.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    /// An uncompressed object stream holding `objects`
    pub fn object_stream(self, num: u32, objects: &[(u32, &str)]) -> Self {
        let mut header = String::new();
        let mut body = String::new();
        for (number, text) in objects {
            header.push_str(&format!("{number} {} ", body.len()));
            body.push_str(text);
            body.push(' ');
        }
        let first = header.len();
        let payload = format!("{header}{body}");
        self.stream(
            num,
            &format!("/Type /ObjStm /N {} /First {first}", objects.len()),
            payload.as_bytes(),
        )
    }

    fn prev_entry(&self) -> String {
        self.last_section
            .map(|offset| format!(" /Prev {offset}"))
            .unwrap_or_default()
    }

    fn finish_section(&mut self, start: u64) {
        self.data
            .extend_from_slice(format!("startxref\n{start}\n%%EOF\n").as_bytes());
        self.last_section = Some(start);
        self.pending.clear();
    }

    /// Classic table covering the pending objects, one subsection per run
    /// of consecutive numbers. `extra` is spliced into the trailer.
    pub fn xref(mut self, size: u32, extra: &str) -> Self {
        let start = self.position();
        let mut records: BTreeMap<u32, String> = self
            .pending
            .iter()
            .map(|(&num, &offset)| (num, format!("{offset:010} 00000 n \n")))
            .collect();
        if self.last_section.is_none() {
            records.insert(0, "0000000000 65535 f \n".to_string());
        }

        let mut out = String::from("xref\n");
        let numbers: Vec<u32> = records.keys().copied().collect();
        let mut i = 0;
        while i < numbers.len() {
            let first = numbers[i];
            let mut end = i + 1;
            while end < numbers.len() && numbers[end] == numbers[end - 1] + 1 {
                end += 1;
            }
            out.push_str(&format!("{first} {}\n", end - i));
            for number in &numbers[i..end] {
                out.push_str(&records[number]);
            }
            i = end;
        }
        out.push_str(&format!(
            "trailer\n<< /Size {size}{} {extra} >>\n",
            self.prev_entry()
        ));

        self.data.extend_from_slice(out.as_bytes());
        self.finish_section(start);
        self
    }

    /// Uncompressed cross-reference stream `num` with `/W [1 4 2]` covering
    /// the pending objects, itself, and `compressed` entries given as
    /// `(number, container, index)`.
    pub fn xref_stream(
        mut self,
        num: u32,
        size: u32,
        extra: &str,
        compressed: &[(u32, u32, u32)],
    ) -> Self {
        let mut rows: BTreeMap<u32, (u8, u32, u16)> = self
            .pending
            .iter()
            .map(|(&number, &offset)| (number, (1, offset as u32, 0)))
            .collect();
        if self.last_section.is_none() {
            rows.insert(0, (0, 0, 65535));
        }
        let extra = format!("{}{extra}", self.prev_entry());
        let start = self.write_xref_stream(num, size, &extra, rows, compressed);
        self.finish_section(start);
        self
    }

    /// Cross-reference stream for a hybrid file: only `num` itself and the
    /// `compressed` entries, no `startxref`. Returns its offset for
    /// `/XRefStm`.
    pub fn hybrid_stream(
        mut self,
        num: u32,
        size: u32,
        compressed: &[(u32, u32, u32)],
    ) -> (Self, u64) {
        let start = self.write_xref_stream(num, size, "", BTreeMap::new(), compressed);
        (self, start)
    }

    fn write_xref_stream(
        &mut self,
        num: u32,
        size: u32,
        extra: &str,
        mut rows: BTreeMap<u32, (u8, u32, u16)>,
        compressed: &[(u32, u32, u32)],
    ) -> u64 {
        let start = self.position();
        rows.insert(num, (1, start as u32, 0));
        for &(number, container, index) in compressed {
            rows.insert(number, (2, container, index as u16));
        }

        let mut index = Vec::new();
        let numbers: Vec<u32> = rows.keys().copied().collect();
        let mut i = 0;
        while i < numbers.len() {
            let mut end = i + 1;
            while end < numbers.len() && numbers[end] == numbers[end - 1] + 1 {
                end += 1;
            }
            index.push(format!("{} {}", numbers[i], end - i));
            i = end;
        }
        let mut data = Vec::new();
        for (kind, field2, field3) in rows.values() {
            data.push(*kind);
            data.extend_from_slice(&field2.to_be_bytes());
            data.extend_from_slice(&field3.to_be_bytes());
        }

        let dict = format!(
            "{num} 0 obj\n<< /Type /XRef /Size {size} /W [1 4 2] /Index [{}] {extra} /Length {} >>\nstream\n",
            index.join(" "),
            data.len()
        );
        self.data.extend_from_slice(dict.as_bytes());
        self.data.extend_from_slice(&data);
        self.data.extend_from_slice(b"\nendstream\nendobj\n");
        start
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    pub fn cursor(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.data)
    }
}

/// Catalog, page tree root and one page; `/Size 4`
pub fn minimal_pdf() -> Vec<u8> {
    DocBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>")
        .xref(4, "/Root 1 0 R")
        .build()
}

/// Catalog with an empty page tree under `version`
pub fn pdf_with_version(version: &str) -> Vec<u8> {
    DocBuilder::with_version(version)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .xref(3, "/Root 1 0 R")
        .build()
}
