pub mod keywords;
pub mod tokens;
pub mod types;

pub use keywords::{
    keyword_to_buffer_type, keyword_to_data_type, keyword_to_storage_class, keyword_token,
    KeywordError,
};
pub use tokens::*;
pub use types::*;
