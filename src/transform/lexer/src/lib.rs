mod lexer;

pub use lexer::{lex, LexError};
