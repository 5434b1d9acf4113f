//! Syntax-tree collaborator interface.
//!
//! The chunking core never looks inside a parsed tree. It holds an opaque
//! [`SyntaxTree`] handle and asks a [`SyntaxBackend`] for function and class
//! nodes, their text and their line spans.

use crate::error::Result;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Inclusive 1-indexed line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineSpan {
    pub const fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    pub const fn contains(&self, other: &LineSpan) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }

    pub const fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub const fn len(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub const fn is_empty(&self) -> bool {
        self.end_line < self.start_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Function,
    Method,
    Class,
    Interface,
}

/// Declaration extracted from a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub name: Option<String>,
    /// Enclosing class/impl name for methods
    pub parent: Option<String>,
    pub span: LineSpan,
    pub start_byte: usize,
    pub end_byte: usize,
}

/// Opaque parsed tree; only the backend that produced it can look inside
#[derive(Clone)]
pub struct SyntaxTree {
    language: Language,
    inner: Arc<dyn Any + Send + Sync>,
}

impl SyntaxTree {
    pub fn new<T: Any + Send + Sync>(language: Language, inner: T) -> Self {
        Self {
            language,
            inner: Arc::new(inner),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Backend-side access to the concrete tree
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Parser and declaration extractor for a set of languages
pub trait SyntaxBackend: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, language: Language) -> bool;

    fn parse(&self, content: &str, language: Language) -> Result<SyntaxTree>;

    /// Functions and methods, in source order
    fn extract_functions(&self, tree: &SyntaxTree) -> Vec<SyntaxNode>;

    /// Classes, structs, impls, traits and interfaces, in source order
    fn extract_classes(&self, tree: &SyntaxTree) -> Vec<SyntaxNode>;

    fn node_text<'c>(&self, node: &SyntaxNode, content: &'c str) -> &'c str {
        content.get(node.start_byte..node.end_byte).unwrap_or("")
    }

    fn node_location(&self, node: &SyntaxNode) -> LineSpan {
        node.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_containment() {
        let outer = LineSpan::new(1, 10);
        assert!(outer.contains(&LineSpan::new(2, 10)));
        assert!(!outer.contains(&LineSpan::new(0, 3)));
        assert_eq!(outer.len(), 10);
    }

    #[test]
    fn tree_downcast_only_to_its_own_type() {
        let tree = SyntaxTree::new(Language::Rust, 42_u32);
        assert_eq!(tree.downcast_ref::<u32>(), Some(&42));
        assert!(tree.downcast_ref::<String>().is_none());
        assert_eq!(tree.language(), Language::Rust);
    }
}
