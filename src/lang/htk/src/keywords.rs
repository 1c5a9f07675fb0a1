//! Read-only keyword and type tables for the source dialect.
//!
//! All four maps are built once per process from constant literal lists and
//! never mutated afterwards. Identifier spellings that resemble reserved
//! words are never user-definable; the scanner consults these tables before
//! producing an identifier token.
//!
//! `register` and `packoffset` do not appear here: the scanner consumes them
//! together with their parenthesised argument and produces tokens carrying
//! the decoded slot.

use crate::tokens::{Identifier, Token};
use crate::types::*;
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// A keyword lookup that missed the table it was expected to hit
#[derive(PartialEq, Eq, Debug, Clone, Error)]
#[error("failed to map keyword '{keyword}' to {category}")]
pub struct KeywordError {
    pub keyword: String,
    pub category: &'static str,
}

const DATA_TYPES: &[(&str, DataType)] = &[
    ("string", DataType::String),
    // Scalars, with the 1 / 1x1 spellings folding onto the scalar variant
    // and dword folding onto uint
    ("bool", DataType::Bool),
    ("bool1", DataType::Bool),
    ("bool1x1", DataType::Bool),
    ("int", DataType::Int),
    ("int1", DataType::Int),
    ("int1x1", DataType::Int),
    ("uint", DataType::UInt),
    ("uint1", DataType::UInt),
    ("uint1x1", DataType::UInt),
    ("dword", DataType::UInt),
    ("dword1", DataType::UInt),
    ("dword1x1", DataType::UInt),
    ("half", DataType::Half),
    ("half1", DataType::Half),
    ("half1x1", DataType::Half),
    ("float", DataType::Float),
    ("float1", DataType::Float),
    ("float1x1", DataType::Float),
    ("double", DataType::Double),
    ("double1", DataType::Double),
    ("double1x1", DataType::Double),
    // Vectors
    ("bool2", DataType::Bool2),
    ("bool3", DataType::Bool3),
    ("bool4", DataType::Bool4),
    ("int2", DataType::Int2),
    ("int3", DataType::Int3),
    ("int4", DataType::Int4),
    ("uint2", DataType::UInt2),
    ("uint3", DataType::UInt3),
    ("uint4", DataType::UInt4),
    ("dword2", DataType::UInt2),
    ("dword3", DataType::UInt3),
    ("dword4", DataType::UInt4),
    ("half2", DataType::Half2),
    ("half3", DataType::Half3),
    ("half4", DataType::Half4),
    ("float2", DataType::Float2),
    ("float3", DataType::Float3),
    ("float4", DataType::Float4),
    ("double2", DataType::Double2),
    ("double3", DataType::Double3),
    ("double4", DataType::Double4),
    // Matrices
    ("bool2x2", DataType::Bool2x2),
    ("bool2x3", DataType::Bool2x3),
    ("bool2x4", DataType::Bool2x4),
    ("bool3x2", DataType::Bool3x2),
    ("bool3x3", DataType::Bool3x3),
    ("bool3x4", DataType::Bool3x4),
    ("bool4x2", DataType::Bool4x2),
    ("bool4x3", DataType::Bool4x3),
    ("bool4x4", DataType::Bool4x4),
    ("int2x2", DataType::Int2x2),
    ("int2x3", DataType::Int2x3),
    ("int2x4", DataType::Int2x4),
    ("int3x2", DataType::Int3x2),
    ("int3x3", DataType::Int3x3),
    ("int3x4", DataType::Int3x4),
    ("int4x2", DataType::Int4x2),
    ("int4x3", DataType::Int4x3),
    ("int4x4", DataType::Int4x4),
    ("uint2x2", DataType::UInt2x2),
    ("uint2x3", DataType::UInt2x3),
    ("uint2x4", DataType::UInt2x4),
    ("uint3x2", DataType::UInt3x2),
    ("uint3x3", DataType::UInt3x3),
    ("uint3x4", DataType::UInt3x4),
    ("uint4x2", DataType::UInt4x2),
    ("uint4x3", DataType::UInt4x3),
    ("uint4x4", DataType::UInt4x4),
    ("dword2x2", DataType::UInt2x2),
    ("dword2x3", DataType::UInt2x3),
    ("dword2x4", DataType::UInt2x4),
    ("dword3x2", DataType::UInt3x2),
    ("dword3x3", DataType::UInt3x3),
    ("dword3x4", DataType::UInt3x4),
    ("dword4x2", DataType::UInt4x2),
    ("dword4x3", DataType::UInt4x3),
    ("dword4x4", DataType::UInt4x4),
    ("half2x2", DataType::Half2x2),
    ("half2x3", DataType::Half2x3),
    ("half2x4", DataType::Half2x4),
    ("half3x2", DataType::Half3x2),
    ("half3x3", DataType::Half3x3),
    ("half3x4", DataType::Half3x4),
    ("half4x2", DataType::Half4x2),
    ("half4x3", DataType::Half4x3),
    ("half4x4", DataType::Half4x4),
    ("float2x2", DataType::Float2x2),
    ("float2x3", DataType::Float2x3),
    ("float2x4", DataType::Float2x4),
    ("float3x2", DataType::Float3x2),
    ("float3x3", DataType::Float3x3),
    ("float3x4", DataType::Float3x4),
    ("float4x2", DataType::Float4x2),
    ("float4x3", DataType::Float4x3),
    ("float4x4", DataType::Float4x4),
    ("double2x2", DataType::Double2x2),
    ("double2x3", DataType::Double2x3),
    ("double2x4", DataType::Double2x4),
    ("double3x2", DataType::Double3x2),
    ("double3x3", DataType::Double3x3),
    ("double3x4", DataType::Double3x4),
    ("double4x2", DataType::Double4x2),
    ("double4x3", DataType::Double4x3),
    ("double4x4", DataType::Double4x4),
];

const STORAGE_CLASSES: &[(&str, StorageClass)] = &[
    ("extern", StorageClass::Extern),
    ("precise", StorageClass::Precise),
    ("shared", StorageClass::Shared),
    ("groupshared", StorageClass::GroupShared),
    ("static", StorageClass::Static),
    ("uniform", StorageClass::Uniform),
    ("volatile", StorageClass::Volatile),
    ("nointerpolation", StorageClass::NoInterpolation),
    ("linear", StorageClass::Linear),
    ("centroid", StorageClass::Centroid),
    ("noperspective", StorageClass::NoPerspective),
    ("sample", StorageClass::Sample),
];

// The original table spells StructuredBuffer without its first 'r'
// ("StucturedBuffer"); both spellings are accepted here so that the keys the
// original accepted keep working alongside the correct ones.
const BUFFER_TYPES: &[(&str, BufferType)] = &[
    ("Buffer", BufferType::Buffer),
    ("StructuredBuffer", BufferType::StructuredBuffer),
    ("StucturedBuffer", BufferType::StructuredBuffer),
    ("ByteAddressBuffer", BufferType::ByteAddressBuffer),
    ("RWBuffer", BufferType::RWBuffer),
    ("RWStructuredBuffer", BufferType::RWStructuredBuffer),
    ("RWStucturedBuffer", BufferType::RWStructuredBuffer),
    ("RWByteAddressBuffer", BufferType::RWByteAddressBuffer),
    ("AppendStructuredBuffer", BufferType::AppendStructuredBuffer),
    ("ConsumeStructuredBuffer", BufferType::ConsumeStructuredBuffer),
    ("RWTexture1D", BufferType::RWTexture1D),
    ("RWTexture1DArray", BufferType::RWTexture1DArray),
    ("RWTexture2D", BufferType::RWTexture2D),
    ("RWTexture2DArray", BufferType::RWTexture2DArray),
    ("RWTexture3D", BufferType::RWTexture3D),
    ("Texture1D", BufferType::Texture1D),
    ("Texture1DArray", BufferType::Texture1DArray),
    ("Texture2D", BufferType::Texture2D),
    ("Texture2DArray", BufferType::Texture2DArray),
    ("Texture3D", BufferType::Texture3D),
    ("TextureCube", BufferType::TextureCube),
    ("TextureCubeArray", BufferType::TextureCubeArray),
    ("Texture2DMS", BufferType::Texture2DMS),
    ("Texture2DMSArray", BufferType::Texture2DMSArray),
];

const RESERVED_WORDS: &[&str] = &[
    "auto",
    "catch",
    "char",
    "const_cast",
    "delete",
    "dynamic_cast",
    "enum",
    "explicit",
    "friend",
    "goto",
    "long",
    "mutable",
    "new",
    "operator",
    "private",
    "protected",
    "public",
    "reinterpret_cast",
    "short",
    "signed",
    "sizeof",
    "static_cast",
    "template",
    "this",
    "throw",
    "try",
    "typename",
    "union",
    "unsigned",
    "using",
    "virtual",
];

fn generate_keyword_map() -> FxHashMap<&'static str, Token> {
    let mut map = FxHashMap::default();
    let mut insert = |keyword: &'static str, token: Token| {
        let previous = map.insert(keyword, token);
        assert!(previous.is_none(), "keyword mapped twice: {}", keyword);
    };

    insert("true", Token::LiteralBool(true));
    insert("false", Token::LiteralBool(false));

    insert("void", Token::Void);
    insert("vector", Token::Vector);
    insert("matrix", Token::Matrix);

    insert("do", Token::Do);
    insert("while", Token::While);
    insert("for", Token::For);
    insert("if", Token::If);
    insert("else", Token::Else);
    insert("switch", Token::Switch);
    insert("case", Token::Case);
    insert("default", Token::Default);
    insert("break", Token::Break);
    insert("continue", Token::Continue);
    insert("discard", Token::Discard);
    insert("return", Token::Return);

    insert("typedef", Token::Typedef);
    insert("struct", Token::Struct);

    insert("sampler", Token::Sampler(SamplerType::Sampler));
    insert("sampler1D", Token::Sampler(SamplerType::Sampler1D));
    insert("sampler2D", Token::Sampler(SamplerType::Sampler2D));
    insert("sampler3D", Token::Sampler(SamplerType::Sampler3D));
    insert("samplerCUBE", Token::Sampler(SamplerType::SamplerCube));
    insert("sampler_state", Token::Sampler(SamplerType::SamplerState));
    insert("SamplerState", Token::Sampler(SamplerType::SamplerState));
    insert(
        "SamplerComparisonState",
        Token::Sampler(SamplerType::SamplerComparisonState),
    );

    insert("Texture1D", Token::Texture(TextureType::Texture1D));
    insert("Texture1DArray", Token::Texture(TextureType::Texture1DArray));
    insert("Texture2D", Token::Texture(TextureType::Texture2D));
    insert("Texture2DArray", Token::Texture(TextureType::Texture2DArray));
    insert("Texture3D", Token::Texture(TextureType::Texture3D));
    insert("TextureCube", Token::Texture(TextureType::TextureCube));
    insert("TextureCubeArray", Token::Texture(TextureType::TextureCubeArray));
    insert("Texture2DMS", Token::Texture(TextureType::Texture2DMS));
    insert("Texture2DMSArray", Token::Texture(TextureType::Texture2DMSArray));
    insert("RWTexture1D", Token::Texture(TextureType::RWTexture1D));
    insert("RWTexture1DArray", Token::Texture(TextureType::RWTexture1DArray));
    insert("RWTexture2D", Token::Texture(TextureType::RWTexture2D));
    insert("RWTexture2DArray", Token::Texture(TextureType::RWTexture2DArray));
    insert("RWTexture3D", Token::Texture(TextureType::RWTexture3D));

    insert("Buffer", Token::StorageBuffer(BufferType::Buffer));
    insert(
        "StructuredBuffer",
        Token::StorageBuffer(BufferType::StructuredBuffer),
    );
    insert(
        "ByteAddressBuffer",
        Token::StorageBuffer(BufferType::ByteAddressBuffer),
    );
    insert("RWBuffer", Token::StorageBuffer(BufferType::RWBuffer));
    insert(
        "RWStructuredBuffer",
        Token::StorageBuffer(BufferType::RWStructuredBuffer),
    );
    insert(
        "RWByteAddressBuffer",
        Token::StorageBuffer(BufferType::RWByteAddressBuffer),
    );
    insert(
        "AppendStructuredBuffer",
        Token::StorageBuffer(BufferType::AppendStructuredBuffer),
    );
    insert(
        "ConsumeStructuredBuffer",
        Token::StorageBuffer(BufferType::ConsumeStructuredBuffer),
    );

    insert("cbuffer", Token::UniformBuffer(UniformBufferType::ConstantBuffer));
    insert("tbuffer", Token::UniformBuffer(UniformBufferType::TextureBuffer));

    insert("uniform", Token::InputModifier(InputModifier::Uniform));
    insert("in", Token::InputModifier(InputModifier::In));
    insert("out", Token::InputModifier(InputModifier::Out));
    insert("inout", Token::InputModifier(InputModifier::InOut));

    insert("extern", Token::StorageClass(StorageClass::Extern));
    insert("nointerpolation", Token::StorageClass(StorageClass::NoInterpolation));
    insert("precise", Token::StorageClass(StorageClass::Precise));
    insert("shared", Token::StorageClass(StorageClass::Shared));
    insert("groupshared", Token::StorageClass(StorageClass::GroupShared));
    insert("static", Token::StorageClass(StorageClass::Static));
    insert("volatile", Token::StorageClass(StorageClass::Volatile));
    insert("linear", Token::StorageClass(StorageClass::Linear));
    insert("centroid", Token::StorageClass(StorageClass::Centroid));
    insert("noperspective", Token::StorageClass(StorageClass::NoPerspective));
    insert("sample", Token::StorageClass(StorageClass::Sample));

    insert("const", Token::TypeModifier(TypeModifierKeyword::Const));
    insert("row_major", Token::TypeModifier(TypeModifierKeyword::RowMajor));
    insert(
        "column_major",
        Token::TypeModifier(TypeModifierKeyword::ColumnMajor),
    );

    insert("technique", Token::Technique);
    insert("pass", Token::Pass);
    insert("compile", Token::Compile);

    for &name in RESERVED_WORDS {
        insert(name, Token::Reserved(Identifier(name.to_string())));
    }

    // Every spelling in the data-type table classifies by its dimensions;
    // "string" is already inserted as its own token kind
    for &(keyword, data_type) in DATA_TYPES {
        if data_type == DataType::String {
            insert(keyword, Token::StringType);
        } else if is_scalar_type(data_type) {
            insert(keyword, Token::ScalarType(data_type));
        } else if is_vector_type(data_type) {
            insert(keyword, Token::VectorType(data_type));
        } else {
            insert(keyword, Token::MatrixType(data_type));
        }
    }

    map
}

lazy_static! {
    static ref KEYWORD_MAP: FxHashMap<&'static str, Token> = generate_keyword_map();
    static ref DATA_TYPE_MAP: FxHashMap<&'static str, DataType> =
        DATA_TYPES.iter().cloned().collect();
    static ref STORAGE_CLASS_MAP: FxHashMap<&'static str, StorageClass> =
        STORAGE_CLASSES.iter().cloned().collect();
    static ref BUFFER_TYPE_MAP: FxHashMap<&'static str, BufferType> =
        BUFFER_TYPES.iter().cloned().collect();
}

/// Classify an identifier spelling as a keyword token
///
/// Returns None for spellings that are ordinary identifiers.
pub fn keyword_token(keyword: &str) -> Option<Token> {
    KEYWORD_MAP.get(keyword).cloned()
}

pub fn keyword_to_data_type(keyword: &str) -> Result<DataType, KeywordError> {
    match DATA_TYPE_MAP.get(keyword) {
        Some(ty) => Ok(*ty),
        None => Err(KeywordError {
            keyword: keyword.to_string(),
            category: "data type",
        }),
    }
}

pub fn keyword_to_storage_class(keyword: &str) -> Result<StorageClass, KeywordError> {
    match STORAGE_CLASS_MAP.get(keyword) {
        Some(sc) => Ok(*sc),
        None => Err(KeywordError {
            keyword: keyword.to_string(),
            category: "storage class",
        }),
    }
}

pub fn keyword_to_buffer_type(keyword: &str) -> Result<BufferType, KeywordError> {
    match BUFFER_TYPE_MAP.get(keyword) {
        Some(bt) => Ok(*bt),
        None => Err(KeywordError {
            keyword: keyword.to_string(),
            category: "buffer type",
        }),
    }
}

/// True if the spelling is reserved and may not name a user symbol
pub fn is_reserved_word(keyword: &str) -> bool {
    matches!(KEYWORD_MAP.get(keyword), Some(Token::Reserved(_)))
}

#[test]
fn test_keyword_classification() {
    assert_eq!(keyword_token("float"), Some(Token::ScalarType(DataType::Float)));
    assert_eq!(keyword_token("float3"), Some(Token::VectorType(DataType::Float3)));
    assert_eq!(
        keyword_token("float4x4"),
        Some(Token::MatrixType(DataType::Float4x4))
    );
    assert_eq!(keyword_token("string"), Some(Token::StringType));
    assert_eq!(keyword_token("true"), Some(Token::LiteralBool(true)));
    assert_eq!(keyword_token("false"), Some(Token::LiteralBool(false)));
    assert_eq!(keyword_token("void"), Some(Token::Void));
    assert_eq!(
        keyword_token("cbuffer"),
        Some(Token::UniformBuffer(UniformBufferType::ConstantBuffer))
    );
    assert_eq!(
        keyword_token("SamplerComparisonState"),
        Some(Token::Sampler(SamplerType::SamplerComparisonState))
    );
    assert_eq!(keyword_token("not_a_keyword"), None);
    assert!(is_reserved_word("template"));
    assert!(!is_reserved_word("technique"));
}

#[test]
fn test_data_type_alias_folding() {
    for base in ["bool", "int", "uint", "half", "float", "double"].iter() {
        let plain = keyword_to_data_type(base).unwrap();
        let one = keyword_to_data_type(&format!("{}1", base)).unwrap();
        let one_by_one = keyword_to_data_type(&format!("{}1x1", base)).unwrap();
        assert_eq!(plain, one);
        assert_eq!(plain, one_by_one);
        assert!(is_scalar_type(plain));
    }
    for i in 2..5 {
        let dword = keyword_to_data_type(&format!("dword{}", i)).unwrap();
        let uint = keyword_to_data_type(&format!("uint{}", i)).unwrap();
        assert_eq!(dword, uint);
    }
    for m in 2..5 {
        for n in 2..5 {
            let dword = keyword_to_data_type(&format!("dword{}x{}", m, n)).unwrap();
            let uint = keyword_to_data_type(&format!("uint{}x{}", m, n)).unwrap();
            assert_eq!(dword, uint);
        }
    }
}

#[test]
fn test_keyword_lookup_error() {
    let err = keyword_to_data_type("float5").unwrap_err();
    assert_eq!(err.keyword, "float5");
    assert_eq!(
        err.to_string(),
        "failed to map keyword 'float5' to data type"
    );

    assert!(keyword_to_storage_class("float").is_err());
    assert!(keyword_to_buffer_type("float").is_err());
}

#[test]
fn test_buffer_type_legacy_spelling() {
    // The misspelled key from the original table stays accepted
    assert_eq!(
        keyword_to_buffer_type("StucturedBuffer").unwrap(),
        BufferType::StructuredBuffer
    );
    assert_eq!(
        keyword_to_buffer_type("StructuredBuffer").unwrap(),
        BufferType::StructuredBuffer
    );
    assert_eq!(
        keyword_to_buffer_type("RWStucturedBuffer").unwrap(),
        BufferType::RWStructuredBuffer
    );
    assert_eq!(
        keyword_to_buffer_type("Texture2DMSArray").unwrap(),
        BufferType::Texture2DMSArray
    );
}
