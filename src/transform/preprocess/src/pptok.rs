//! Whitespace-preserving tokenizer for the pre-processor.
//!
//! The pre-processor rewrites concrete source text rather than an abstract
//! token stream, so whitespace, newlines and comments all come through as
//! explicit tokens. Line continuations are their own token kind so the
//! directive parser can join physical lines without losing track of where
//! the text came from.

use crate::preprocess::PreprocessError;
use rfx_shared::{FileLocation, FileName, SourceReader};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PPTokenKind {
    Ident,
    Number,
    StringLiteral,
    Punct,
    /// `#`, a directive start when it is the first token of a logical line
    Hash,
    Whitespace,
    Newline,
    /// Backslash directly followed by a newline
    LineContinuation,
    LineComment,
    BlockComment,
    Other,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PPToken {
    pub kind: PPTokenKind,
    pub text: String,
    pub location: FileLocation,
}

impl PPToken {
    /// True for tokens that only separate other tokens
    pub fn is_space(&self) -> bool {
        matches!(
            self.kind,
            PPTokenKind::Whitespace
                | PPTokenKind::LineComment
                | PPTokenKind::BlockComment
                | PPTokenKind::LineContinuation
        )
    }
}

fn is_identifier_firstchar(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Two character operators that must stay glued for #if conditions
const DIGRAPHS: &[&str] = &["&&", "||", "<<", ">>", "<=", ">=", "==", "!="];

/// Tokenize one file worth of source text
pub fn scan(source: &str, file: FileName) -> Result<Vec<PPToken>, PreprocessError> {
    let mut reader = SourceReader::new(source, file);
    let mut tokens = Vec::new();

    loop {
        let location = reader.location();
        let c = match reader.next() {
            Some(c) => c,
            None => break,
        };

        let (kind, text) = match c {
            '\n' => (PPTokenKind::Newline, "\n".to_string()),
            '\\' if reader.peek() == Some('\n') => {
                reader.next();
                (PPTokenKind::LineContinuation, "\\\n".to_string())
            }
            '\\' if reader.peek() == Some('\r') && reader.peek_second() == Some('\n') => {
                reader.next();
                reader.next();
                (PPTokenKind::LineContinuation, "\\\r\n".to_string())
            }
            ' ' | '\t' | '\r' => {
                let mut text = c.to_string();
                while let Some(next) = reader.peek() {
                    // \r\n stays split so the newline token is emitted alone
                    if next == ' ' || next == '\t' || (next == '\r' && reader.peek_second() != Some('\n')) {
                        text.push(next);
                        reader.next();
                    } else {
                        break;
                    }
                }
                (PPTokenKind::Whitespace, text)
            }
            '/' if reader.peek() == Some('/') => {
                let mut text = "/".to_string();
                while let Some(next) = reader.peek() {
                    if next == '\n' {
                        break;
                    }
                    text.push(next);
                    reader.next();
                }
                (PPTokenKind::LineComment, text)
            }
            '/' if reader.peek() == Some('*') => {
                let mut text = "/".to_string();
                text.push(reader.next().unwrap());
                let mut closed = false;
                while let Some(next) = reader.next() {
                    text.push(next);
                    if next == '*' && reader.peek() == Some('/') {
                        text.push(reader.next().unwrap());
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(PreprocessError::UnterminatedBlockComment(location));
                }
                (PPTokenKind::BlockComment, text)
            }
            '"' => {
                let mut text = "\"".to_string();
                let mut closed = false;
                while let Some(next) = reader.next() {
                    if next == '\n' {
                        break;
                    }
                    text.push(next);
                    if next == '\\' {
                        // Keep the escaped character raw, including \"
                        if let Some(escaped) = reader.next() {
                            text.push(escaped);
                        }
                    } else if next == '"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(PreprocessError::UnterminatedStringLiteral(location));
                }
                (PPTokenKind::StringLiteral, text)
            }
            '#' => (PPTokenKind::Hash, "#".to_string()),
            c if is_identifier_firstchar(c) => {
                let mut text = c.to_string();
                while let Some(next) = reader.peek() {
                    if is_identifier_char(next) {
                        text.push(next);
                        reader.next();
                    } else {
                        break;
                    }
                }
                (PPTokenKind::Ident, text)
            }
            c if c.is_ascii_digit() || (c == '.' && reader.peek().map_or(false, |n| n.is_ascii_digit())) => {
                // A pp-number: digits, identifier characters, dots, and
                // exponent signs. The main scanner decides what it means.
                let mut text = c.to_string();
                while let Some(next) = reader.peek() {
                    if is_identifier_char(next) || next == '.' {
                        text.push(next);
                        reader.next();
                    } else if (next == '+' || next == '-')
                        && matches!(text.chars().last(), Some('e') | Some('E'))
                    {
                        text.push(next);
                        reader.next();
                    } else {
                        break;
                    }
                }
                (PPTokenKind::Number, text)
            }
            c if c.is_ascii_punctuation() => {
                let mut text = c.to_string();
                if let Some(next) = reader.peek() {
                    let mut pair = text.clone();
                    pair.push(next);
                    if DIGRAPHS.contains(&&pair[..]) {
                        text = pair;
                        reader.next();
                    }
                }
                (PPTokenKind::Punct, text)
            }
            c => (PPTokenKind::Other, c.to_string()),
        };

        tokens.push(PPToken {
            kind,
            text,
            location,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
fn scan_kinds(source: &str) -> Vec<(PPTokenKind, String)> {
    scan(source, FileName("test".to_string()))
        .unwrap()
        .into_iter()
        .map(|tok| (tok.kind, tok.text))
        .collect()
}

#[test]
fn test_scan_basic() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("int a = 3;\n"),
        vec![
            (Ident, "int".to_string()),
            (Whitespace, " ".to_string()),
            (Ident, "a".to_string()),
            (Whitespace, " ".to_string()),
            (Punct, "=".to_string()),
            (Whitespace, " ".to_string()),
            (Number, "3".to_string()),
            (Punct, ";".to_string()),
            (Newline, "\n".to_string()),
        ]
    );
}

#[test]
fn test_scan_directive_line() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("#define X 1\n"),
        vec![
            (Hash, "#".to_string()),
            (Ident, "define".to_string()),
            (Whitespace, " ".to_string()),
            (Ident, "X".to_string()),
            (Whitespace, " ".to_string()),
            (Number, "1".to_string()),
            (Newline, "\n".to_string()),
        ]
    );
}

#[test]
fn test_scan_line_continuation() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("a\\\nb"),
        vec![
            (Ident, "a".to_string()),
            (LineContinuation, "\\\n".to_string()),
            (Ident, "b".to_string()),
        ]
    );
}

#[test]
fn test_scan_comments() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("a // comment\nb /* multi\nline */ c"),
        vec![
            (Ident, "a".to_string()),
            (Whitespace, " ".to_string()),
            (LineComment, "// comment".to_string()),
            (Newline, "\n".to_string()),
            (Ident, "b".to_string()),
            (Whitespace, " ".to_string()),
            (BlockComment, "/* multi\nline */".to_string()),
            (Whitespace, " ".to_string()),
            (Ident, "c".to_string()),
        ]
    );

    assert!(matches!(
        scan("/* never closed", FileName("test".to_string())),
        Err(PreprocessError::UnterminatedBlockComment(_))
    ));
}

#[test]
fn test_scan_digraphs() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("a<<2 && b<=c"),
        vec![
            (Ident, "a".to_string()),
            (Punct, "<<".to_string()),
            (Number, "2".to_string()),
            (Whitespace, " ".to_string()),
            (Punct, "&&".to_string()),
            (Whitespace, " ".to_string()),
            (Ident, "b".to_string()),
            (Punct, "<=".to_string()),
            (Ident, "c".to_string()),
        ]
    );
}

#[test]
fn test_scan_numbers_and_strings() {
    use self::PPTokenKind::*;
    assert_eq!(
        scan_kinds("0x1F 1.5e+3f \"a \\\"b\\\"\""),
        vec![
            (Number, "0x1F".to_string()),
            (Whitespace, " ".to_string()),
            (Number, "1.5e+3f".to_string()),
            (Whitespace, " ".to_string()),
            (StringLiteral, "\"a \\\"b\\\"\"".to_string()),
        ]
    );

    assert!(matches!(
        scan("\"unterminated\n", FileName("test".to_string())),
        Err(PreprocessError::UnterminatedStringLiteral(_))
    ));
}

#[test]
fn test_scan_locations() {
    let tokens = scan("ab\n c", FileName("f".to_string())).unwrap();
    assert_eq!(tokens[0].location, FileLocation::new(FileName("f".to_string()), 1, 1));
    assert_eq!(tokens[1].location, FileLocation::new(FileName("f".to_string()), 1, 3));
    assert_eq!(tokens[2].location, FileLocation::new(FileName("f".to_string()), 2, 1));
    assert_eq!(tokens[3].location, FileLocation::new(FileName("f".to_string()), 2, 2));
}
