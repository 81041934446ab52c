//! Outline (bookmark) tree walker
//!
//! Items are linked through `/First` (first child) and `/Next` (next
//! sibling). The walk is depth-first with an explicit stack; a revisited
//! item is reported once per walk and its branch dropped.

use std::collections::HashSet;

use super::graph::ObjectGraph;
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::ParseResult;
use crate::diagnostics::DiagnosticId;
use crate::source::ByteSource;

/// One outline entry
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    pub id: ObjectId,
    pub title: Option<String>,
    /// 0 for top-level items
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct OutlineWalker {
    stack: Vec<(ObjectId, usize)>,
    visited: HashSet<u32>,
    recursion_reported: bool,
    items: usize,
}

impl OutlineWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at the first top-level item of an `/Outlines` dictionary
    pub fn start_walk(&mut self, outlines: &PdfDictionary) {
        self.stack.clear();
        self.visited.clear();
        self.recursion_reported = false;
        self.items = 0;
        if let Some(first) = outlines.get("First").and_then(PdfObject::as_reference) {
            self.stack.push((first, 0));
        }
    }

    /// Items returned so far
    pub fn items_walked(&self) -> usize {
        self.items
    }

    pub fn next_node<R: ByteSource>(
        &mut self,
        graph: &mut ObjectGraph<R>,
    ) -> ParseResult<Option<OutlineItem>> {
        while let Some((id, depth)) = self.stack.pop() {
            if !self.visited.insert(id.number) {
                tracing::debug!(object = %id, "outline revisits an item");
                if !self.recursion_reported {
                    self.recursion_reported = true;
                    graph.diagnostics_mut().report(
                        DiagnosticId::RecursiveStructure,
                        Some(format!("outline revisits object {id}")),
                        None,
                    );
                }
                continue;
            }

            let node = graph.get_object(id)?;
            let Some(dict) = node.as_dict() else {
                graph.diagnostics_mut().report(
                    DiagnosticId::InvalidOutlineItem,
                    Some(format!("object {id} is {}", node.type_name())),
                    None,
                );
                continue;
            };

            // Sibling below child so children come first
            if let Some(next) = dict.get("Next").and_then(PdfObject::as_reference) {
                self.stack.push((next, depth));
            }
            if let Some(first) = dict.get("First").and_then(PdfObject::as_reference) {
                self.stack.push((first, depth + 1));
            }

            let title = match dict.get("Title") {
                Some(obj) => graph
                    .resolve(obj)?
                    .as_string()
                    .map(|title| title.to_text()),
                None => None,
            };
            if title.is_none() {
                graph.diagnostics_mut().report(
                    DiagnosticId::InvalidOutlineItem,
                    Some(format!("object {id} has no /Title string")),
                    None,
                );
            }

            self.items += 1;
            return Ok(Some(OutlineItem { id, title, depth }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::object_parser::Parser;
    use crate::parser::test_helpers::DocBuilder;
    use crate::parser::xref::XRefResolver;
    use crate::parser::ParseOptions;
    use std::io::Cursor;

    fn walk(data: Vec<u8>) -> (Vec<OutlineItem>, Diagnostics) {
        let options = ParseOptions::default();
        let mut parser = Parser::new(Cursor::new(data), &options);
        let mut diagnostics = Diagnostics::new();
        let mut resolver = XRefResolver::new(&mut parser, &mut diagnostics, &options);
        resolver.resolve().unwrap();
        let (table, chain) = resolver.into_parts();
        let mut graph = ObjectGraph::new(parser, table, chain, diagnostics, &options);

        let outlines = graph.get_object(ObjectId::new(2, 0)).unwrap();
        let mut walker = OutlineWalker::new();
        walker.start_walk(outlines.as_dict().unwrap());
        let mut items = Vec::new();
        while let Some(item) = walker.next_node(&mut graph).unwrap() {
            items.push(item);
        }
        assert_eq!(walker.items_walked(), items.len());
        (items, graph.into_diagnostics())
    }

    #[test]
    fn test_nested_outline_order() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Outlines 2 0 R >>")
            .object(2, "<< /Type /Outlines /First 3 0 R /Last 4 0 R /Count 3 >>")
            .object(3, "<< /Title (Chapter 1) /Parent 2 0 R /Next 4 0 R /First 5 0 R >>")
            .object(4, "<< /Title (Chapter 2) /Parent 2 0 R /Prev 3 0 R >>")
            .object(5, "<< /Title <FEFF0053006500630074> /Parent 3 0 R >>")
            .xref(6, "/Root 1 0 R")
            .build();
        let (items, diagnostics) = walk(data);

        let titles: Vec<_> = items
            .iter()
            .map(|item| (item.title.clone().unwrap(), item.depth))
            .collect();
        assert_eq!(
            titles,
            vec![
                ("Chapter 1".to_string(), 0),
                ("Sect".to_string(), 1),
                ("Chapter 2".to_string(), 0),
            ]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_sibling_cycle() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Outlines 2 0 R >>")
            .object(2, "<< /Type /Outlines /First 3 0 R >>")
            .object(3, "<< /Title (A) /Next 4 0 R >>")
            .object(4, "<< /Title (B) /Next 3 0 R /First 4 0 R >>")
            .xref(5, "/Root 1 0 R")
            .build();
        let (items, diagnostics) = walk(data);
        assert_eq!(items.len(), 2);
        assert_eq!(diagnostics.count(DiagnosticId::RecursiveStructure), 1);
        assert!(!diagnostics.has_invalid());
    }

    #[test]
    fn test_item_without_title() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Outlines 2 0 R >>")
            .object(2, "<< /Type /Outlines /First 3 0 R >>")
            .object(3, "<< /Next 4 0 R >>")
            .object(4, "[1 2]")
            .xref(5, "/Root 1 0 R")
            .build();
        let (items, diagnostics) = walk(data);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, None);
        assert_eq!(diagnostics.count(DiagnosticId::InvalidOutlineItem), 2);
    }

    #[test]
    fn test_empty_outlines() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Outlines 2 0 R >>")
            .object(2, "<< /Type /Outlines /Count 0 >>")
            .xref(3, "/Root 1 0 R")
            .build();
        let (items, _) = walk(data);
        assert!(items.is_empty());
    }
}
