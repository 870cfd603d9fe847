//! Source positions and the file set that translates them.
//!
//! Every AST node carries a [`Pos`]: a compact offset into a [`FileSet`].
//! Offsets are global across all files registered in the set, so a single
//! `u32` pinpoints both the file and the byte within it. Translation back to
//! human-readable `file:line:col` form happens only when diagnostics are
//! rendered.

use std::fmt;

/// Compact position: a global byte offset into a [`FileSet`], plus one.
///
/// Offset zero is reserved for "no position" so that `Pos` can be stored in
/// nodes without an `Option` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos(u32);

impl Pos {
    /// The absent position.
    pub const NONE: Pos = Pos(0);

    pub(crate) fn new(global_offset: u32) -> Pos {
        Pos(global_offset + 1)
    }

    /// Whether this position points at a real source location.
    #[inline]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub(crate) fn offset(self) -> u32 {
        debug_assert!(self.is_some(), "cannot take the offset of Pos::NONE");
        self.0 - 1
    }
}

impl Default for Pos {
    fn default() -> Self {
        Pos::NONE
    }
}

/// A resolved position: file name, 1-based line, 1-based column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// One registered file: its name, base offset in the set, and line table.
#[derive(Debug, Clone)]
struct File {
    name: String,
    base: u32,
    size: u32,
    /// Byte offsets (file-relative) at which each line starts. Line 1 starts
    /// at offset 0, so `line_starts[0] == 0` always.
    line_starts: Vec<u32>,
}

/// Registry of source files sharing one global offset space.
///
/// Mirrors the usual compiler file-set convention: each file occupies a
/// half-open range `[base, base + size)` of global offsets, and positions are
/// resolved by binary search over the bases.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<File>,
    next_base: u32,
}

impl FileSet {
    pub fn new() -> FileSet {
        FileSet::default()
    }

    /// Registers a file and returns the global offset of its first byte.
    ///
    /// The source text is only inspected for line breaks; it is not retained.
    pub fn add_file(&mut self, name: &str, src: &str) -> u32 {
        let base = self.next_base;
        let mut line_starts = vec![0u32];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(u32::try_from(i).unwrap_or(u32::MAX) + 1);
            }
        }
        let size = u32::try_from(src.len()).unwrap_or(u32::MAX);
        self.files.push(File {
            name: name.to_owned(),
            base,
            size,
            line_starts,
        });
        // +1 keeps file ranges disjoint even for empty files.
        self.next_base = base + size + 1;
        base
    }

    /// Translates a position to `file:line:col` form.
    ///
    /// Returns `None` for [`Pos::NONE`] or positions outside every
    /// registered file.
    pub fn position(&self, pos: Pos) -> Option<Position> {
        if !pos.is_some() {
            return None;
        }
        let offset = pos.offset();
        let idx = match self.files.binary_search_by(|f| f.base.cmp(&offset)) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let file = &self.files[idx];
        if offset > file.base + file.size {
            return None;
        }
        let rel = offset - file.base;
        let line_idx = match file.line_starts.binary_search(&rel) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some(Position {
            file: file.name.clone(),
            line: u32::try_from(line_idx).unwrap_or(u32::MAX) + 1,
            col: rel - file.line_starts[line_idx] + 1,
        })
    }

    /// Renders a position, falling back to `"-"` when it cannot be resolved.
    pub fn display(&self, pos: Pos) -> String {
        match self.position(pos) {
            Some(p) => p.to_string(),
            None => "-".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_resolve_across_files() {
        let mut fset = FileSet::new();
        let a = fset.add_file("a.go", "package a\nvar x = 1\n");
        let b = fset.add_file("b.go", "package b\n");

        let first = fset.position(Pos::new(a)).unwrap();
        assert_eq!(first.to_string(), "a.go:1:1");

        // "var" starts at offset 10 of a.go, line 2 column 1.
        let var = fset.position(Pos::new(a + 10)).unwrap();
        assert_eq!(var.to_string(), "a.go:2:1");

        let other = fset.position(Pos::new(b + 8)).unwrap();
        assert_eq!(other.to_string(), "b.go:1:9");
    }

    #[test]
    fn none_position_does_not_resolve() {
        let fset = FileSet::new();
        assert_eq!(fset.position(Pos::NONE), None);
        assert_eq!(fset.display(Pos::NONE), "-");
    }
}
