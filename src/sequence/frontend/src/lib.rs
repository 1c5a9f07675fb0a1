//! Drives the front-end pipeline: pre-processor, scanner, parser and the
//! resolve pass, in that order, with one combined error type.

use log::debug;
use rfx_lang_hst::Module;
use rfx_shared::*;
use rfx_transform_htk_to_hst::parse;
use rfx_transform_lexer::{lex, LexError};
use rfx_transform_preprocess::{preprocess, PreprocessError, PreprocessedText};
use rfx_transform_resolve::resolve;
use std::fmt;

pub use rfx_shared::{Diagnostics, FileName, IncludeHandler, NullIncludeHandler};

#[derive(Debug, Clone)]
pub enum CompileError {
    PreprocessError(PreprocessError),
    LexError(LexError),
    /// The parser or the resolve pass produced at least one error
    FrontendFailed(Diagnostics),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CompileError::PreprocessError(ref err) => write!(f, "{}", err),
            CompileError::LexError(ref err) => write!(f, "{}", err),
            CompileError::FrontendFailed(ref diagnostics) => {
                write!(f, "compilation failed with {} errors", diagnostics.error_count())
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<PreprocessError> for CompileError {
    fn from(err: PreprocessError) -> CompileError {
        CompileError::PreprocessError(err)
    }
}

impl From<LexError> for CompileError {
    fn from(err: LexError) -> CompileError {
        CompileError::LexError(err)
    }
}

impl CompileError {
    /// Render the error as ordered diagnostics, whichever stage it came from
    pub fn to_diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        match *self {
            CompileError::PreprocessError(ref err) => {
                let mut diagnostic = Diagnostic::error(
                    ErrorClass::PreProcessor,
                    err.to_string(),
                    err.location(),
                );
                // A failed include reports the whole inclusion chain
                if let PreprocessError::FailedToFindFile {
                    ref include_chain, ..
                } = *err
                {
                    for loc in include_chain.iter().rev() {
                        if *loc != FileLocation::Unknown {
                            diagnostic =
                                diagnostic.with_note("included from here".to_string(), loc.clone());
                        }
                    }
                }
                diagnostics.push(diagnostic)
            }
            CompileError::LexError(ref err) => diagnostics.push(Diagnostic::error(
                ErrorClass::Lexical,
                err.to_string(),
                err.location(),
            )),
            CompileError::FrontendFailed(ref failed) => diagnostics.extend(failed.clone()),
        }
        diagnostics
    }
}

pub struct Input {
    pub main_file: String,
    pub file_name: FileName,
    pub include_handler: Box<dyn IncludeHandler>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Output {
    pub module: Module,
    /// Warnings and infos; a successful compilation holds no errors here
    pub diagnostics: Diagnostics,
}

/// Run the front end over one translation unit
///
/// A compilation succeeds only when no stage emitted an error; warnings pass
/// through in the output.
pub fn compile_front(mut input: Input) -> Result<Output, CompileError> {
    let preprocessed = preprocess(
        &input.main_file,
        input.file_name.clone(),
        &mut *input.include_handler,
    )?;
    debug!("preprocessed {}", input.file_name);

    let tokens = lex(&preprocessed)?;
    debug!("lexed {} tokens", tokens.stream.len());

    let parsed = parse(&tokens.stream);
    let mut module = parsed.module;
    let mut diagnostics = parsed.diagnostics;

    diagnostics.extend(resolve(&mut module));

    if diagnostics.has_errors() {
        return Err(CompileError::FrontendFailed(diagnostics));
    }
    Ok(Output {
        module,
        diagnostics,
    })
}

/// Pre-process a translation unit without running the later stages
pub fn preprocess_front(
    input: &str,
    file_name: FileName,
    include_handler: &mut dyn IncludeHandler,
) -> Result<PreprocessedText, PreprocessError> {
    preprocess(input, file_name, include_handler)
}

#[cfg(test)]
mod tests;
