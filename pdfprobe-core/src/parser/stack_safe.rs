//! Stack-safe resolution utilities
//!
//! Chained lookups (a reference to a reference, an object stream stored in
//! another object stream) recurse through the object graph. The budget here
//! bounds that recursion so a hostile file cannot exhaust the stack.

use super::{ParseError, ParseResult};

/// Default budget for chained resolution
pub const MAX_RESOLVE_DEPTH: usize = 30;

/// Depth counter shared by every resolution in one session
#[derive(Debug, Clone)]
pub struct StackSafeContext {
    depth: usize,
    max_depth: usize,
}

impl Default for StackSafeContext {
    fn default() -> Self {
        Self::new(MAX_RESOLVE_DEPTH)
    }
}

impl StackSafeContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    /// Enter a new recursion level. Every successful `enter` must be paired
    /// with an `exit`.
    pub fn enter(&mut self) -> ParseResult<()> {
        if self.depth >= self.max_depth {
            return Err(ParseError::RecursionLimit {
                depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Exit a recursion level
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
