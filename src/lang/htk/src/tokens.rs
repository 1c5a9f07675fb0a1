use crate::types::*;
use rfx_shared::*;

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct Identifier(pub String);

/// Records whether an operator character was directly followed by another
/// token, used to distinguish `>>` from two closing angle brackets and `&&`
/// from two addresses
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FollowedBy {
    Token,
    Whitespace,
}

/// A resource binding slot from a register() annotation
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RegisterSlot {
    T(u32),
    U(u32),
    B(u32),
    S(u32),
}

/// Component selector in a packoffset() annotation
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PackSubOffset {
    None,
    X,
    Y,
    Z,
    W,
}

/// A constant buffer offset from a packoffset() annotation
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct OffsetSlot(pub u32, pub PackSubOffset);

#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    Eof, // Marks the end of a stream

    Id(Identifier),
    LiteralInt(u64), // Ints do not have sign, the - is an operator on the literal
    LiteralUInt(u64),
    LiteralLong(u64),
    LiteralHalf(f32),
    LiteralFloat(f32),
    LiteralDouble(f64),
    LiteralString(String),
    LiteralBool(bool),

    // Type keywords, classified through the keyword table
    ScalarType(DataType),
    VectorType(DataType),
    MatrixType(DataType),
    StringType,
    Void,
    // The generic vector<T, N> / matrix<T, M, N> forms
    Vector,
    Matrix,

    Sampler(SamplerType),
    Texture(TextureType),
    StorageBuffer(BufferType),
    UniformBuffer(UniformBufferType),

    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftSquareBracket,
    RightSquareBracket,
    LeftAngleBracket(FollowedBy),
    RightAngleBracket(FollowedBy),
    Semicolon,
    Comma,
    QuestionMark,

    Plus,
    Minus,
    ForwardSlash,
    Percent,
    Asterix,
    VerticalBar(FollowedBy),
    Ampersand(FollowedBy),
    Hat,
    Equals,
    Hash,
    At,
    ExclamationPoint,
    Tilde,
    Period,
    DoubleEquals,
    ExclamationEquals,
    Colon,

    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Discard,
    Return,

    Typedef,
    Struct,
    Register(RegisterSlot),
    PackOffset(OffsetSlot),

    InputModifier(InputModifier),
    StorageClass(StorageClass),
    TypeModifier(TypeModifierKeyword),

    Technique,
    Pass,
    Compile,

    /// A keyword reserved by the dialect but not usable in programs
    Reserved(Identifier),
}

#[derive(PartialEq, Debug, Clone)]
pub struct LexToken(pub Token, pub FileLocation);

impl LexToken {
    pub fn to_loc(self) -> FileLocation {
        self.1
    }
    pub fn with_no_loc(token: Token) -> LexToken {
        LexToken(token, FileLocation::none())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Tokens {
    pub stream: Vec<LexToken>,
}
