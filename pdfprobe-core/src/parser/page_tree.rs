//! PDF Page Tree Walker
//!
//! Depth-first walk of the page tree in document order.
//!
//! # Overview
//!
//! The page tree consists of:
//! - **Page Tree Nodes** (`/Type /Pages`): internal nodes listing their
//!   children in `/Kids`
//! - **Page Objects** (`/Type /Page`): leaves
//! - **Inherited Attributes**: `Resources`, `MediaBox`, `CropBox` and
//!   `Rotate` may be defined on any ancestor and are found through `/Parent`
//!
//! The walker keeps an explicit stack and a visited set, so hostile trees
//! (cycles through `/Kids`, self-parenting nodes) terminate without deep
//! recursion. Findings go to the graph's diagnostics.

use std::collections::HashSet;

use super::graph::ObjectGraph;
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::ParseResult;
use crate::diagnostics::DiagnosticId;
use crate::source::ByteSource;

/// Upper bound on `/Parent` hops while looking up an inherited attribute
pub const MAX_INHERIT_HOPS: usize = 64;

/// Attributes a page may inherit from its ancestors
pub const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Role of a node in the page tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Intermediate node
    Pages,
    /// Leaf
    Page,
}

/// A page tree node as seen by the walker.
///
/// For leaves, the box and rotation fields hold the *effective* values,
/// i.e. after inheritance.
#[derive(Debug, Clone, PartialEq)]
pub struct PageNode {
    pub id: ObjectId,
    pub kind: NodeKind,
    /// Distance from the root node
    pub depth: usize,
    /// Declared `/Count` of an intermediate node
    pub count: Option<i64>,
    pub media_box: Option<[f64; 4]>,
    pub crop_box: Option<[f64; 4]>,
    pub rotate: i64,
    pub has_resources: bool,
}

impl PageNode {
    fn pages(id: ObjectId, depth: usize, count: Option<i64>) -> Self {
        Self {
            id,
            kind: NodeKind::Pages,
            depth,
            count,
            media_box: None,
            crop_box: None,
            rotate: 0,
            has_resources: false,
        }
    }

    pub fn is_page(&self) -> bool {
        self.kind == NodeKind::Page
    }
}

/// Iterative page tree walker
#[derive(Debug, Default)]
pub struct PageWalker {
    stack: Vec<(ObjectId, usize)>,
    visited: HashSet<u32>,
    recursion_reported: bool,
    pages: usize,
    nodes: usize,
}

impl PageWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the walker to start at the page tree root
    pub fn start_walk(&mut self, root_pages: ObjectId) {
        self.stack.clear();
        self.visited.clear();
        self.recursion_reported = false;
        self.pages = 0;
        self.nodes = 0;
        self.stack.push((root_pages, 0));
    }

    /// Leaves returned so far
    pub fn pages_walked(&self) -> usize {
        self.pages
    }

    /// Nodes of either kind returned so far
    pub fn nodes_walked(&self) -> usize {
        self.nodes
    }

    /// Next node in document order, intermediate nodes included
    pub fn next_node<R: ByteSource>(
        &mut self,
        graph: &mut ObjectGraph<R>,
    ) -> ParseResult<Option<PageNode>> {
        while let Some((id, depth)) = self.stack.pop() {
            if !self.visited.insert(id.number) {
                self.report_recursion(graph, id);
                continue;
            }

            let node = graph.get_object(id)?;
            let Some(dict) = node.as_dict() else {
                graph.diagnostics_mut().report(
                    DiagnosticId::InvalidPageNode,
                    Some(format!("object {id} is {}", node.type_name())),
                    None,
                );
                continue;
            };

            let page = match dict.get_type() {
                Some("Pages") => self.enter_pages(graph, id, depth, dict)?,
                Some("Page") => Self::read_page(graph, id, depth, dict)?,
                other => {
                    graph.diagnostics_mut().report(
                        DiagnosticId::InvalidPageNode,
                        Some(format!("object {id} has /Type {}", other.unwrap_or("(none)"))),
                        None,
                    );
                    continue;
                }
            };

            self.nodes += 1;
            if page.is_page() {
                self.pages += 1;
            }
            return Ok(Some(page));
        }
        Ok(None)
    }

    /// Next leaf in document order
    pub fn next_page<R: ByteSource>(
        &mut self,
        graph: &mut ObjectGraph<R>,
    ) -> ParseResult<Option<PageNode>> {
        while let Some(node) = self.next_node(graph)? {
            if node.is_page() {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    fn report_recursion<R: ByteSource>(&mut self, graph: &mut ObjectGraph<R>, id: ObjectId) {
        tracing::debug!(object = %id, "page tree revisits a node");
        if !self.recursion_reported {
            self.recursion_reported = true;
            graph.diagnostics_mut().report(
                DiagnosticId::RecursiveStructure,
                Some(format!("page tree revisits object {id}")),
                None,
            );
        }
    }

    fn enter_pages<R: ByteSource>(
        &mut self,
        graph: &mut ObjectGraph<R>,
        id: ObjectId,
        depth: usize,
        dict: &PdfDictionary,
    ) -> ParseResult<PageNode> {
        let count = match dict.get("Count") {
            Some(obj) => graph.resolve(obj)?.as_integer(),
            None => None,
        };

        let kids = match dict.get("Kids") {
            Some(obj) => graph.resolve(obj)?.into_owned(),
            None => PdfObject::Null,
        };
        let PdfObject::Array(kids) = kids else {
            graph.diagnostics_mut().report(
                DiagnosticId::MissingKids,
                Some(format!("object {id}")),
                None,
            );
            return Ok(PageNode::pages(id, depth, count));
        };

        // Reverse so the first kid is popped first
        for kid in kids.iter().rev() {
            match kid {
                PdfObject::Reference(kid_id) => self.stack.push((*kid_id, depth + 1)),
                other => graph.diagnostics_mut().report(
                    DiagnosticId::InvalidPageNode,
                    Some(format!("kid of {id} is a direct {}", other.type_name())),
                    None,
                ),
            }
        }
        Ok(PageNode::pages(id, depth, count))
    }

    fn read_page<R: ByteSource>(
        graph: &mut ObjectGraph<R>,
        id: ObjectId,
        depth: usize,
        dict: &PdfDictionary,
    ) -> ParseResult<PageNode> {
        let media_box = match inherited_attribute(graph, dict, "MediaBox")? {
            Some(obj) => rectangle_or_report(graph, id, "MediaBox", &obj),
            None => {
                graph.diagnostics_mut().report(
                    DiagnosticId::MissingMediaBox,
                    Some(format!("page {id}")),
                    None,
                );
                None
            }
        };
        let crop_box = match inherited_attribute(graph, dict, "CropBox")? {
            Some(obj) => rectangle_or_report(graph, id, "CropBox", &obj),
            None => None,
        };

        let rotate = match inherited_attribute(graph, dict, "Rotate")? {
            Some(PdfObject::Integer(angle)) if angle % 90 == 0 => angle,
            Some(other) => {
                graph.diagnostics_mut().report(
                    DiagnosticId::InvalidRotate,
                    Some(format!("page {id}: /Rotate {other:?}")),
                    None,
                );
                0
            }
            None => 0,
        };

        let has_resources = inherited_attribute(graph, dict, "Resources")?
            .is_some_and(|obj| obj.as_dict().is_some());

        Ok(PageNode {
            id,
            kind: NodeKind::Page,
            depth,
            count: None,
            media_box,
            crop_box,
            rotate,
            has_resources,
        })
    }
}

/// Value of `key` on `dict` or on the nearest ancestor that defines it,
/// resolved.
pub fn inherited_attribute<R: ByteSource>(
    graph: &mut ObjectGraph<R>,
    dict: &PdfDictionary,
    key: &str,
) -> ParseResult<Option<PdfObject>> {
    if let Some(value) = dict.get(key) {
        return Ok(Some(graph.resolve(value)?.into_owned()));
    }

    let mut parent = dict.get("Parent").and_then(PdfObject::as_reference);
    let mut seen = HashSet::new();
    while let Some(parent_id) = parent {
        if !seen.insert(parent_id.number) || seen.len() > MAX_INHERIT_HOPS {
            tracing::debug!(parent = %parent_id, key, "stopped /Parent walk");
            break;
        }
        let node = graph.get_object(parent_id)?;
        let Some(parent_dict) = node.as_dict() else {
            break;
        };
        if let Some(value) = parent_dict.get(key) {
            return Ok(Some(graph.resolve(value)?.into_owned()));
        }
        parent = parent_dict.get("Parent").and_then(PdfObject::as_reference);
    }
    Ok(None)
}

/// `[llx lly urx ury]` with four numbers
pub fn rectangle(obj: &PdfObject) -> Option<[f64; 4]> {
    let array = obj.as_array()?;
    if array.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(array.iter()) {
        *slot = value.as_real()?;
    }
    Some(rect)
}

fn rectangle_or_report<R: ByteSource>(
    graph: &mut ObjectGraph<R>,
    id: ObjectId,
    key: &str,
    obj: &PdfObject,
) -> Option<[f64; 4]> {
    let rect = rectangle(obj);
    if rect.is_none() {
        graph.diagnostics_mut().report(
            DiagnosticId::InvalidRectangle,
            Some(format!("page {id}: /{key} is not four numbers")),
            None,
        );
    }
    rect
}
