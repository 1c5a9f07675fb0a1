//! Semantic tags attached to tokens and type denoters.
//!
//! `DataType` spans the full scalar/vector/matrix product of the dialect's
//! base types. The `dword` spellings fold onto `uint` and the `·1`/`·1x1`
//! spellings fold onto the scalar variants when keywords are mapped, so the
//! enumeration itself only carries distinct types.

/// Base type with all dimension variants
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum DataType {
    String,

    Bool,
    Int,
    UInt,
    Half,
    Float,
    Double,

    Bool2,
    Bool3,
    Bool4,
    Int2,
    Int3,
    Int4,
    UInt2,
    UInt3,
    UInt4,
    Half2,
    Half3,
    Half4,
    Float2,
    Float3,
    Float4,
    Double2,
    Double3,
    Double4,

    Bool2x2,
    Bool2x3,
    Bool2x4,
    Bool3x2,
    Bool3x3,
    Bool3x4,
    Bool4x2,
    Bool4x3,
    Bool4x4,
    Int2x2,
    Int2x3,
    Int2x4,
    Int3x2,
    Int3x3,
    Int3x4,
    Int4x2,
    Int4x3,
    Int4x4,
    UInt2x2,
    UInt2x3,
    UInt2x4,
    UInt3x2,
    UInt3x3,
    UInt3x4,
    UInt4x2,
    UInt4x3,
    UInt4x4,
    Half2x2,
    Half2x3,
    Half2x4,
    Half3x2,
    Half3x3,
    Half3x4,
    Half4x2,
    Half4x3,
    Half4x4,
    Float2x2,
    Float2x3,
    Float2x4,
    Float3x2,
    Float3x3,
    Float3x4,
    Float4x2,
    Float4x3,
    Float4x4,
    Double2x2,
    Double2x3,
    Double2x4,
    Double3x2,
    Double3x3,
    Double3x4,
    Double4x2,
    Double4x3,
    Double4x4,
}

/// Return the component count for a vector type
pub fn vector_type_dim(ty: DataType) -> Option<u32> {
    use self::DataType::*;
    match ty {
        Bool2 | Int2 | UInt2 | Half2 | Float2 | Double2 => Some(2),
        Bool3 | Int3 | UInt3 | Half3 | Float3 | Double3 => Some(3),
        Bool4 | Int4 | UInt4 | Half4 | Float4 | Double4 => Some(4),
        _ => None,
    }
}

/// Return the (rows, columns) pair for a matrix type
pub fn matrix_type_dim(ty: DataType) -> Option<(u32, u32)> {
    use self::DataType::*;
    match ty {
        Bool2x2 | Int2x2 | UInt2x2 | Half2x2 | Float2x2 | Double2x2 => Some((2, 2)),
        Bool2x3 | Int2x3 | UInt2x3 | Half2x3 | Float2x3 | Double2x3 => Some((2, 3)),
        Bool2x4 | Int2x4 | UInt2x4 | Half2x4 | Float2x4 | Double2x4 => Some((2, 4)),
        Bool3x2 | Int3x2 | UInt3x2 | Half3x2 | Float3x2 | Double3x2 => Some((3, 2)),
        Bool3x3 | Int3x3 | UInt3x3 | Half3x3 | Float3x3 | Double3x3 => Some((3, 3)),
        Bool3x4 | Int3x4 | UInt3x4 | Half3x4 | Float3x4 | Double3x4 => Some((3, 4)),
        Bool4x2 | Int4x2 | UInt4x2 | Half4x2 | Float4x2 | Double4x2 => Some((4, 2)),
        Bool4x3 | Int4x3 | UInt4x3 | Half4x3 | Float4x3 | Double4x3 => Some((4, 3)),
        Bool4x4 | Int4x4 | UInt4x4 | Half4x4 | Float4x4 | Double4x4 => Some((4, 4)),
        _ => None,
    }
}

pub fn is_scalar_type(ty: DataType) -> bool {
    use self::DataType::*;
    matches!(ty, Bool | Int | UInt | Half | Float | Double)
}

/// Build the vector type with the given scalar base and component count
pub fn vector_of(scalar: DataType, x: u32) -> Option<DataType> {
    use self::DataType::*;
    let ty = match (scalar, x) {
        (Bool, 1) => Bool,
        (Bool, 2) => Bool2,
        (Bool, 3) => Bool3,
        (Bool, 4) => Bool4,
        (Int, 1) => Int,
        (Int, 2) => Int2,
        (Int, 3) => Int3,
        (Int, 4) => Int4,
        (UInt, 1) => UInt,
        (UInt, 2) => UInt2,
        (UInt, 3) => UInt3,
        (UInt, 4) => UInt4,
        (Half, 1) => Half,
        (Half, 2) => Half2,
        (Half, 3) => Half3,
        (Half, 4) => Half4,
        (Float, 1) => Float,
        (Float, 2) => Float2,
        (Float, 3) => Float3,
        (Float, 4) => Float4,
        (Double, 1) => Double,
        (Double, 2) => Double2,
        (Double, 3) => Double3,
        (Double, 4) => Double4,
        _ => return None,
    };
    Some(ty)
}

/// Build the matrix type with the given scalar base and dimensions
pub fn matrix_of(scalar: DataType, x: u32, y: u32) -> Option<DataType> {
    use self::DataType::*;
    if (x, y) == (1, 1) {
        return if is_scalar_type(scalar) { Some(scalar) } else { None };
    }
    let ty = match (scalar, x, y) {
        (Bool, 2, 2) => Bool2x2,
        (Bool, 2, 3) => Bool2x3,
        (Bool, 2, 4) => Bool2x4,
        (Bool, 3, 2) => Bool3x2,
        (Bool, 3, 3) => Bool3x3,
        (Bool, 3, 4) => Bool3x4,
        (Bool, 4, 2) => Bool4x2,
        (Bool, 4, 3) => Bool4x3,
        (Bool, 4, 4) => Bool4x4,
        (Int, 2, 2) => Int2x2,
        (Int, 2, 3) => Int2x3,
        (Int, 2, 4) => Int2x4,
        (Int, 3, 2) => Int3x2,
        (Int, 3, 3) => Int3x3,
        (Int, 3, 4) => Int3x4,
        (Int, 4, 2) => Int4x2,
        (Int, 4, 3) => Int4x3,
        (Int, 4, 4) => Int4x4,
        (UInt, 2, 2) => UInt2x2,
        (UInt, 2, 3) => UInt2x3,
        (UInt, 2, 4) => UInt2x4,
        (UInt, 3, 2) => UInt3x2,
        (UInt, 3, 3) => UInt3x3,
        (UInt, 3, 4) => UInt3x4,
        (UInt, 4, 2) => UInt4x2,
        (UInt, 4, 3) => UInt4x3,
        (UInt, 4, 4) => UInt4x4,
        (Half, 2, 2) => Half2x2,
        (Half, 2, 3) => Half2x3,
        (Half, 2, 4) => Half2x4,
        (Half, 3, 2) => Half3x2,
        (Half, 3, 3) => Half3x3,
        (Half, 3, 4) => Half3x4,
        (Half, 4, 2) => Half4x2,
        (Half, 4, 3) => Half4x3,
        (Half, 4, 4) => Half4x4,
        (Float, 2, 2) => Float2x2,
        (Float, 2, 3) => Float2x3,
        (Float, 2, 4) => Float2x4,
        (Float, 3, 2) => Float3x2,
        (Float, 3, 3) => Float3x3,
        (Float, 3, 4) => Float3x4,
        (Float, 4, 2) => Float4x2,
        (Float, 4, 3) => Float4x3,
        (Float, 4, 4) => Float4x4,
        (Double, 2, 2) => Double2x2,
        (Double, 2, 3) => Double2x3,
        (Double, 2, 4) => Double2x4,
        (Double, 3, 2) => Double3x2,
        (Double, 3, 3) => Double3x3,
        (Double, 3, 4) => Double3x4,
        (Double, 4, 2) => Double4x2,
        (Double, 4, 3) => Double4x3,
        (Double, 4, 4) => Double4x4,
        _ => return None,
    };
    Some(ty)
}

pub fn is_vector_type(ty: DataType) -> bool {
    vector_type_dim(ty).is_some()
}

pub fn is_matrix_type(ty: DataType) -> bool {
    matrix_type_dim(ty).is_some()
}

/// Storage class of a global or struct member declaration
///
/// The interpolation modifiers share this space, as the dialect allows them
/// in the same position.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum StorageClass {
    Extern,
    Precise,
    Shared,
    GroupShared,
    Static,
    Uniform,
    Volatile,
    NoInterpolation,
    Linear,
    Centroid,
    NoPerspective,
    Sample,
}

/// Parameter passing modifier
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InputModifier {
    In,
    Out,
    InOut,
    Uniform,
}

impl Default for InputModifier {
    fn default() -> InputModifier {
        InputModifier::In
    }
}

/// Keywords that modify the type itself rather than its storage
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TypeModifierKeyword {
    Const,
    RowMajor,
    ColumnMajor,
}

/// Classification of texture object types
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum TextureType {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    Texture2DMS,
    Texture2DMSArray,
    RWTexture1D,
    RWTexture1DArray,
    RWTexture2D,
    RWTexture2DArray,
    RWTexture3D,
}

/// Classification of sampler object types
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum SamplerType {
    /// The legacy untyped `sampler` keyword
    Sampler,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    SamplerState,
    SamplerComparisonState,
}

/// Classification of storage buffer and texture object types
///
/// Textures share this space because the buffer-type table of the dialect
/// covers both kinds of resource view.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum BufferType {
    Buffer,
    StructuredBuffer,
    ByteAddressBuffer,
    RWBuffer,
    RWStructuredBuffer,
    RWByteAddressBuffer,
    AppendStructuredBuffer,
    ConsumeStructuredBuffer,

    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    Texture2DMS,
    Texture2DMSArray,
    RWTexture1D,
    RWTexture1DArray,
    RWTexture2D,
    RWTexture2DArray,
    RWTexture3D,
}

/// The two flavours of uniform buffer declaration
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UniformBufferType {
    ConstantBuffer,
    TextureBuffer,
}

#[test]
fn test_data_type_predicates() {
    assert!(is_scalar_type(DataType::Float));
    assert!(!is_scalar_type(DataType::Float2));
    assert!(!is_scalar_type(DataType::String));

    assert!(is_vector_type(DataType::UInt3));
    assert!(!is_vector_type(DataType::UInt));
    assert!(!is_vector_type(DataType::UInt3x3));

    assert!(is_matrix_type(DataType::Half2x4));
    assert!(!is_matrix_type(DataType::Half4));

    assert_eq!(vector_type_dim(DataType::Double4), Some(4));
    assert_eq!(vector_type_dim(DataType::Double), None);
    assert_eq!(matrix_type_dim(DataType::Float4x3), Some((4, 3)));
    assert_eq!(matrix_type_dim(DataType::Float4), None);
}
