use std::fmt;

pub mod diagnostics;

pub use diagnostics::{Diagnostic, Diagnostics, ErrorClass, Note, Severity};

/// Name of a file used as a compilation input
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct FileName(pub String);

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line number in a file, counted from 1
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct Line(pub u64);

/// The column index in a line, counted from 1
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct Column(pub u64);

/// Fully qualified location
#[derive(PartialEq, Debug, Clone)]
pub enum FileLocation {
    Known(FileName, Line, Column),
    Unknown,
}

impl FileLocation {
    pub fn new(file: FileName, line: u64, column: u64) -> FileLocation {
        FileLocation::Known(file, Line(line), Column(column))
    }
    pub fn none() -> FileLocation {
        FileLocation::Unknown
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FileLocation::Known(ref file, Line(line), Column(column)) => {
                write!(f, "{}:{}:{}", file, line, column)
            }
            FileLocation::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// The raw number of bytes from the start of a stream
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct StreamLocation(pub u64);

/// Wrapper to pair a node with a FileLocation
#[derive(PartialEq, Debug, Clone)]
pub struct Located<T> {
    pub node: T,
    pub location: FileLocation,
}

impl<T> Located<T> {
    pub fn new(node: T, loc: FileLocation) -> Located<T> {
        Located {
            node,
            location: loc,
        }
    }
    pub fn to_node(self) -> T {
        self.node
    }
    pub fn to_loc(self) -> FileLocation {
        self.location
    }
    pub fn loc(line: u64, column: u64, node: T) -> Located<T> {
        Located {
            node,
            location: FileLocation::Known(FileName(String::new()), Line(line), Column(column)),
        }
    }
    pub fn none(node: T) -> Located<T> {
        Located {
            node,
            location: FileLocation::none(),
        }
    }
}

impl<T> std::ops::Deref for Located<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

/// A character cursor over immutable source text
///
/// Tracks the line/column of the read head and supports a one character
/// unread, which is all the lookahead the pre-processor scanner needs.
pub struct SourceReader<'a> {
    source: &'a str,
    file: FileName,
    offset: usize,
    line: u64,
    column: u64,
    // Cursor state before the last next() call, restored by unread()
    last: Option<(usize, u64, u64)>,
}

impl<'a> SourceReader<'a> {
    pub fn new(source: &'a str, file: FileName) -> SourceReader<'a> {
        SourceReader {
            source,
            file,
            offset: 0,
            line: 1,
            column: 1,
            last: None,
        }
    }

    pub fn location(&self) -> FileLocation {
        FileLocation::Known(self.file.clone(), Line(self.line), Column(self.column))
    }

    pub fn file_name(&self) -> &FileName {
        &self.file
    }

    pub fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    /// Peek at the character after the next one
    pub fn peek_second(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    pub fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.last = Some((self.offset, self.line, self.column));
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Push the most recently read character back onto the stream
    ///
    /// Only valid directly after a next() call.
    pub fn unread(&mut self) {
        if let Some((offset, line, column)) = self.last.take() {
            self.offset = offset;
            self.line = line;
            self.column = column;
        }
    }
}

/// A source file returned from an include handler
#[derive(PartialEq, Debug, Clone)]
pub struct IncludedFile {
    /// Canonical identifier for the file, used for #pragma once bookkeeping
    pub file_name: FileName,
    pub contents: String,
}

/// Trait for loading files from #include directives
///
/// Must be deterministic within a single compilation. `use_system_search` is
/// true for `#include <name>` and false for `#include "name"`.
pub trait IncludeHandler {
    fn load(&mut self, file_name: &str, use_system_search: bool) -> Result<IncludedFile, ()>;
}

/// A file loader that fails to load any files
pub struct NullIncludeHandler;

impl IncludeHandler for NullIncludeHandler {
    fn load(&mut self, _: &str, _: bool) -> Result<IncludedFile, ()> {
        Err(())
    }
}

/// A file loader backed by an in-memory name -> contents map
pub struct MapIncludeHandler(pub std::collections::HashMap<String, String>);

impl IncludeHandler for MapIncludeHandler {
    fn load(&mut self, file_name: &str, _: bool) -> Result<IncludedFile, ()> {
        match self.0.get(file_name) {
            Some(contents) => Ok(IncludedFile {
                file_name: FileName(file_name.to_string()),
                contents: contents.clone(),
            }),
            None => Err(()),
        }
    }
}

#[test]
fn test_source_reader() {
    fn loc(line: u64, column: u64) -> FileLocation {
        FileLocation::new(FileName("test".to_string()), line, column)
    }

    let mut reader = SourceReader::new("ab\nc", FileName("test".to_string()));
    assert_eq!(reader.location(), loc(1, 1));
    assert_eq!(reader.peek(), Some('a'));
    assert_eq!(reader.peek_second(), Some('b'));
    assert_eq!(reader.next(), Some('a'));
    assert_eq!(reader.next(), Some('b'));
    assert_eq!(reader.location(), loc(1, 3));
    assert_eq!(reader.next(), Some('\n'));
    assert_eq!(reader.location(), loc(2, 1));
    reader.unread();
    assert_eq!(reader.location(), loc(1, 3));
    assert_eq!(reader.next(), Some('\n'));
    assert_eq!(reader.next(), Some('c'));
    assert_eq!(reader.next(), None);
}
