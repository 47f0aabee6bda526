//! Batch span edits over source text.
//!
//! Edits are collected against the *original* source and applied in one pass
//! in descending position order, so earlier spans stay valid while later text
//! changes length.
//!
//! | Edit | Effect |
//! |------|--------|
//! | `Replace { span, text }` | `span.start..span.end` becomes `text` |
//! | `Delete { span }` | Removes `span.start..span.end` |
//! | `InsertAt { position, text }` | Inserts `text` at `position` |
//!
//! At the same position, deletions and replacements are applied before
//! insertions, so an insertion lands at the original offset.

use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

/// A half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `offset` lies in `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// A single edit against the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Replace { span: Span, text: String },
    Delete { span: Span },
    InsertAt { position: usize, text: String },
}

impl Edit {
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Edit::Replace {
            span,
            text: text.into(),
        }
    }

    pub fn delete(span: Span) -> Self {
        Edit::Delete { span }
    }

    pub fn insert_at(position: usize, text: impl Into<String>) -> Self {
        Edit::InsertAt {
            position,
            text: text.into(),
        }
    }

    /// The range of original text this edit consumes.
    pub fn span(&self) -> Span {
        match self {
            Edit::Replace { span, .. } | Edit::Delete { span } => *span,
            Edit::InsertAt { position, .. } => Span::new(*position, *position),
        }
    }

    fn is_insertion(&self) -> bool {
        matches!(self, Edit::InsertAt { .. })
    }

    fn text(&self) -> &str {
        match self {
            Edit::Replace { text, .. } | Edit::InsertAt { text, .. } => text,
            Edit::Delete { .. } => "",
        }
    }
}

/// Errors from applying a batch of edits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("overlapping edits: ({}, {}) and ({}, {})", first.start, first.end, second.start, second.end)]
    Overlapping { first: Span, second: Span },

    #[error("span ({}, {}) is out of bounds for source of length {source_len}", span.start, span.end)]
    OutOfBounds { span: Span, source_len: usize },

    #[error("span ({}, {}) does not fall on character boundaries", span.start, span.end)]
    NotCharBoundary { span: Span },
}

/// Collects edits and applies them atomically.
#[derive(Debug)]
pub struct BatchEditor<'src> {
    source: &'src str,
    edits: Vec<Edit>,
}

impl<'src> BatchEditor<'src> {
    pub fn new(source: &'src str) -> Self {
        BatchEditor {
            source,
            edits: Vec::new(),
        }
    }

    pub fn add(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn add_all(&mut self, edits: impl IntoIterator<Item = Edit>) {
        self.edits.extend(edits);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply every queued edit and return the new source.
    ///
    /// An empty batch returns the source unchanged.
    pub fn apply(mut self) -> Result<String, EditError> {
        let source_len = self.source.len();
        for edit in &self.edits {
            let span = edit.span();
            if span.start > span.end || span.end > source_len {
                return Err(EditError::OutOfBounds { span, source_len });
            }
            if !self.source.is_char_boundary(span.start) || !self.source.is_char_boundary(span.end)
            {
                return Err(EditError::NotCharBoundary { span });
            }
        }

        self.edits.sort_by(|a, b| {
            match b.span().start.cmp(&a.span().start) {
                // Deletions before insertions at the same position
                Ordering::Equal => match (a.is_insertion(), b.is_insertion()) {
                    (false, true) => Ordering::Less,
                    (true, false) => Ordering::Greater,
                    _ => Ordering::Equal,
                },
                other => other,
            }
        });

        // Sorted descending: prev.start >= curr.start
        for pair in self.edits.windows(2) {
            let (prev, curr) = (pair[0].span(), pair[1].span());
            if !curr.is_empty() && !prev.is_empty() && curr.end > prev.start {
                return Err(EditError::Overlapping {
                    first: curr,
                    second: prev,
                });
            }
            if prev.is_empty() && curr.start < prev.start && curr.end > prev.start {
                return Err(EditError::Overlapping {
                    first: curr,
                    second: prev,
                });
            }
        }

        let mut result = self.source.to_string();
        for edit in &self.edits {
            let span = edit.span();
            result.replace_range(span.start..span.end, edit.text());
        }
        Ok(result)
    }
}
