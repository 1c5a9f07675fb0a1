mod condition_parser;
mod pptok;
mod preprocess;

pub use pptok::{PPToken, PPTokenKind};
pub use preprocess::{
    preprocess, preprocess_single, PreprocessError, PreprocessedText,
};
