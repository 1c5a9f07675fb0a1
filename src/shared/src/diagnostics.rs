use crate::FileLocation;
use std::fmt;

/// How serious a diagnostic is
///
/// Only errors fail a compilation.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Which stage of the front end a diagnostic belongs to
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorClass {
    Lexical,
    PreProcessor,
    Syntactic,
    Semantic,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorClass::Lexical => write!(f, "lexical"),
            ErrorClass::PreProcessor => write!(f, "preprocessor"),
            ErrorClass::Syntactic => write!(f, "syntax"),
            ErrorClass::Semantic => write!(f, "semantic"),
            ErrorClass::Internal => write!(f, "internal"),
        }
    }
}

/// A secondary location attached to a diagnostic, such as a previous
/// definition or an entry in the inclusion chain
#[derive(PartialEq, Debug, Clone)]
pub struct Note {
    pub message: String,
    pub location: FileLocation,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub class: ErrorClass,
    pub message: String,
    pub location: FileLocation,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn error(class: ErrorClass, message: String, location: FileLocation) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            class,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn warning(class: ErrorClass, message: String, location: FileLocation) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            class,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, message: String, location: FileLocation) -> Diagnostic {
        self.notes.push(Note { message, location });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(
            f,
            "{}: {} {}: {}",
            self.location, self.class, severity, self.message
        )?;
        for note in &self.notes {
            write!(f, "\n{}: note: {}", note.location, note.message)?;
        }
        Ok(())
    }
}

/// Ordered accumulator for diagnostics
///
/// Diagnostics are reported in the order they were produced, which for
/// identical inputs is always the same order.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.0.iter().filter(|d| d.severity == Severity::Error).count()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[test]
fn test_diagnostics_accumulate() {
    let mut sink = Diagnostics::new();
    assert!(!sink.has_errors());

    sink.push(Diagnostic::warning(
        ErrorClass::PreProcessor,
        "unknown pragma".to_string(),
        FileLocation::none(),
    ));
    assert!(!sink.has_errors());
    assert_eq!(sink.len(), 1);

    sink.push(Diagnostic::error(
        ErrorClass::Syntactic,
        "unexpected token".to_string(),
        FileLocation::none(),
    ));
    assert!(sink.has_errors());
    assert_eq!(sink.error_count(), 1);
}
