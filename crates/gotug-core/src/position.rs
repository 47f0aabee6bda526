//! Position table: a set of files laid out on one global offset axis.
//!
//! Every file added to a [`PositionTable`] receives a *base*; a global
//! [`Pos`] is `base + byte offset`. One `Pos` therefore identifies both a
//! file and a location inside it, which lets identifier tables from many
//! files share a single key space.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed**, columns count UTF-8 bytes
//! - Byte offsets are **0-indexed**
//! - `Pos(0)` is never assigned to any file
//!
//! Out-of-range lookups return `None`. Callers treat that as "not found",
//! not as a failure.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::Location;

// ============================================================================
// Pos / FileId
// ============================================================================

/// A global source position within one [`PositionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Pos(pub u32);

impl Pos {
    /// The position that belongs to no file.
    pub const NONE: Pos = Pos(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Index of a file within its [`PositionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

// ============================================================================
// FileEntry
// ============================================================================

/// Per-file layout information.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the table's root, with `/` separators.
    pub path: String,
    /// Global position of byte offset 0.
    pub base: u32,
    /// File size in bytes.
    pub size: u32,
    /// Byte offset at which each line starts. Always starts with 0.
    line_starts: Vec<u32>,
}

impl FileEntry {
    fn new(path: String, base: u32, content: &[u8]) -> Self {
        let mut line_starts = vec![0u32];
        for (i, &b) in content.iter().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        FileEntry {
            path,
            base,
            size: content.len() as u32,
            line_starts,
        }
    }

    /// Number of lines in the file.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a 1-indexed line and column to a byte offset.
    ///
    /// Returns `None` if the line does not exist or the offset lies past
    /// the end of the file.
    pub fn offset_of(&self, line: u32, col: u32) -> Option<u32> {
        if line == 0 || col == 0 {
            return None;
        }
        let start = *self.line_starts.get(line as usize - 1)?;
        let offset = start.checked_add(col - 1)?;
        if offset > self.size {
            return None;
        }
        Some(offset)
    }

    /// Convert a byte offset to a 1-indexed `(line, col)`.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.size);
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (idx as u32 + 1, offset - self.line_starts[idx] + 1)
    }
}

// ============================================================================
// PositionTable
// ============================================================================

/// A table of files sharing one global position space.
#[derive(Debug, Clone)]
pub struct PositionTable {
    files: Vec<FileEntry>,
    by_path: HashMap<String, FileId>,
    next_base: u32,
}

impl Default for PositionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTable {
    pub fn new() -> Self {
        PositionTable {
            files: Vec::new(),
            by_path: HashMap::new(),
            next_base: 1,
        }
    }

    /// Add a file and return its id.
    ///
    /// Adding the same path twice registers a second, independent entry;
    /// path lookup returns the most recent one.
    pub fn add_file(&mut self, path: impl Into<String>, content: &[u8]) -> FileId {
        let path = path.into();
        let id = FileId(self.files.len() as u32);
        let entry = FileEntry::new(path.clone(), self.next_base, content);
        // One extra slot so the end-of-file position stays inside the file.
        self.next_base = self.next_base.saturating_add(entry.size + 1);
        self.files.push(entry);
        self.by_path.insert(path, id);
        id
    }

    pub fn file(&self, id: FileId) -> &FileEntry {
        &self.files[id.0 as usize]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &FileEntry)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    /// Global position of `offset` within file `id`.
    pub fn pos(&self, id: FileId, offset: u32) -> Pos {
        Pos(self.file(id).base + offset)
    }

    /// Resolve a root-relative path and 1-indexed line/column.
    ///
    /// Returns `None` for an unknown file, a line past the last line, or
    /// an offset past the end of the file.
    pub fn resolve(&self, path: &str, line: u32, col: u32) -> Option<Pos> {
        let id = self.file_id(path)?;
        let offset = self.file(id).offset_of(line, col)?;
        Some(self.pos(id, offset))
    }

    /// Split a global position into its file and byte offset.
    pub fn locate(&self, pos: Pos) -> Option<(FileId, u32)> {
        if !pos.is_valid() {
            return None;
        }
        let idx = match self.files.binary_search_by_key(&pos.0, |f| f.base) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let file = &self.files[idx];
        let offset = pos.0 - file.base;
        if offset > file.size {
            return None;
        }
        Some((FileId(idx as u32), offset))
    }

    /// Render a global position as a root-relative [`Location`].
    pub fn location(&self, pos: Pos) -> Option<Location> {
        let (id, offset) = self.locate(pos)?;
        let file = self.file(id);
        let (line, col) = file.line_col(offset);
        Some(Location::new(file.path.clone(), line, col))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PositionTable {
        let mut t = PositionTable::new();
        t.add_file("a.go", b"package a\n\nfunc F() {}\n");
        t.add_file("b/b.go", b"package b\n");
        t
    }

    mod resolve {
        use super::*;

        #[test]
        fn resolves_first_byte() {
            let t = table();
            let pos = t.resolve("a.go", 1, 1).unwrap();
            assert_eq!(pos, Pos(1));
        }

        #[test]
        fn resolves_into_second_file() {
            let t = table();
            let pos = t.resolve("b/b.go", 1, 9).unwrap();
            let (id, offset) = t.locate(pos).unwrap();
            assert_eq!(t.file(id).path, "b/b.go");
            assert_eq!(offset, 8);
        }

        #[test]
        fn unknown_file_is_none() {
            assert!(table().resolve("c.go", 1, 1).is_none());
        }

        #[test]
        fn line_past_end_is_none() {
            let t = table();
            // a.go has a trailing newline, so line 4 exists and is empty.
            assert!(t.resolve("a.go", 4, 1).is_some());
            assert!(t.resolve("a.go", 5, 1).is_none());
            assert!(t.resolve("a.go", 1000, 1).is_none());
        }

        #[test]
        fn column_past_end_of_file_is_none() {
            let t = table();
            assert!(t.resolve("b/b.go", 2, 1).is_some());
            assert!(t.resolve("b/b.go", 2, 2).is_none());
        }
    }

    mod round_trip {
        use super::*;

        #[test]
        fn location_matches_resolved_position() {
            let t = table();
            let pos = t.resolve("a.go", 3, 6).unwrap();
            assert_eq!(t.location(pos), Some(Location::new("a.go", 3, 6)));
        }

        #[test]
        fn invalid_position_has_no_location() {
            let t = table();
            assert!(t.location(Pos::NONE).is_none());
            assert!(t.location(Pos(10_000)).is_none());
        }
    }

    #[test]
    fn line_col_handles_line_starts() {
        let t = table();
        let f = t.file(FileId(0));
        assert_eq!(f.line_col(0), (1, 1));
        assert_eq!(f.line_col(10), (2, 1));
        assert_eq!(f.line_col(11), (3, 1));
        assert_eq!(f.line_count(), 4);
    }
}
