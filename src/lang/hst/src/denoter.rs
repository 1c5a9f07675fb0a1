//! Structural descriptions of types, distinct from their declarations.

use crate::ast::{Expression, Literal};
use rfx_lang_htk::types::*;
use rfx_shared::Located;
use std::fmt;

/// Discriminator over the type denoter variants
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TypeClass {
    Void,
    Base,
    Buffer,
    Texture,
    Sampler,
    Struct,
    Alias,
    Array,
}

/// Index of a struct declaration in its translation unit's declaration
/// table, in declaration order
///
/// Denoters refer to declarations by index so they never keep a declaration
/// alive themselves.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct StructDeclId(pub u32);

#[derive(PartialEq, Debug, Clone)]
pub struct StructTypeDenoter {
    /// Empty for anonymous structs
    pub ident: String,
    /// Bound by the resolve pass. When bound, `ident` equals the name of the
    /// referenced declaration.
    pub struct_decl: Option<StructDeclId>,
}

impl StructTypeDenoter {
    pub fn named(ident: &str) -> StructTypeDenoter {
        StructTypeDenoter {
            ident: ident.to_string(),
            struct_decl: None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AliasTypeDenoter {
    /// The typedef name, resolved to its target denoter by a later pass
    pub ident: String,
}

/// One dimension of an array type. None means the dimension was left
/// unbounded (`[]`).
#[derive(PartialEq, Debug, Clone)]
pub struct ArrayDimension(pub Option<Located<Expression>>);

impl ArrayDimension {
    /// Fold the dimension expression down to a constant if it is one of the
    /// constant-evaluable forms
    pub fn constant_value(&self) -> Option<u64> {
        fn eval(expr: &Expression) -> Option<u64> {
            match *expr {
                Expression::Literal(Literal::UntypedInt(v))
                | Expression::Literal(Literal::UInt(v))
                | Expression::Literal(Literal::Long(v)) => Some(v),
                Expression::BinaryOperation(ref op, ref lhs, ref rhs) => {
                    use crate::ast::BinOp;
                    let lhs = eval(&lhs.node)?;
                    let rhs = eval(&rhs.node)?;
                    match *op {
                        BinOp::Add => Some(lhs + rhs),
                        BinOp::Subtract => lhs.checked_sub(rhs),
                        BinOp::Multiply => Some(lhs * rhs),
                        BinOp::Divide => lhs.checked_div(rhs),
                        BinOp::Modulus => lhs.checked_rem(rhs),
                        _ => None,
                    }
                }
                _ => None,
            }
        }
        eval(&self.0.as_ref()?.node)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ArrayTypeDenoter {
    /// Always present; arrays of arrays nest through this field
    pub inner: Box<TypeDenoter>,
    /// Ordered outermost dimension last
    pub dims: Vec<ArrayDimension>,
}

/// A structural description of a type
#[derive(PartialEq, Debug, Clone)]
pub enum TypeDenoter {
    Void,
    Base(DataType),
    Buffer(BufferType),
    Texture(TextureType),
    Sampler(SamplerType),
    Struct(StructTypeDenoter),
    Alias(AliasTypeDenoter),
    Array(ArrayTypeDenoter),
}

impl TypeDenoter {
    pub fn type_class(&self) -> TypeClass {
        match *self {
            TypeDenoter::Void => TypeClass::Void,
            TypeDenoter::Base(_) => TypeClass::Base,
            TypeDenoter::Buffer(_) => TypeClass::Buffer,
            TypeDenoter::Texture(_) => TypeClass::Texture,
            TypeDenoter::Sampler(_) => TypeClass::Sampler,
            TypeDenoter::Struct(_) => TypeClass::Struct,
            TypeDenoter::Alias(_) => TypeClass::Alias,
            TypeDenoter::Array(_) => TypeClass::Array,
        }
    }

    pub fn is_void(&self) -> bool {
        self.type_class() == TypeClass::Void
    }
    pub fn is_base(&self) -> bool {
        self.type_class() == TypeClass::Base
    }
    pub fn is_buffer(&self) -> bool {
        self.type_class() == TypeClass::Buffer
    }
    pub fn is_texture(&self) -> bool {
        self.type_class() == TypeClass::Texture
    }
    pub fn is_sampler(&self) -> bool {
        self.type_class() == TypeClass::Sampler
    }
    pub fn is_struct(&self) -> bool {
        self.type_class() == TypeClass::Struct
    }
    pub fn is_alias(&self) -> bool {
        self.type_class() == TypeClass::Alias
    }
    pub fn is_array(&self) -> bool {
        self.type_class() == TypeClass::Array
    }

    pub fn is_scalar(&self) -> bool {
        match *self {
            TypeDenoter::Base(dt) => is_scalar_type(dt),
            _ => false,
        }
    }

    pub fn is_vector(&self) -> bool {
        match *self {
            TypeDenoter::Base(dt) => is_vector_type(dt),
            _ => false,
        }
    }

    pub fn is_matrix(&self) -> bool {
        match *self {
            TypeDenoter::Base(dt) => is_matrix_type(dt),
            _ => false,
        }
    }

    /// The user-visible identifier. Only struct and alias denoters carry
    /// one; every other variant returns the empty string.
    pub fn ident(&self) -> &str {
        match *self {
            TypeDenoter::Struct(ref s) => &s.ident,
            TypeDenoter::Alias(ref a) => &a.ident,
            _ => "",
        }
    }

    /// Structural, kind-gated equality
    ///
    /// Buffer/texture/sampler denoters compare equal on variant alone; their
    /// classifications may be refined by later passes. Array dimensions
    /// compare by arity and, positionally, by constant value where both
    /// sides fold to a constant.
    pub fn equals(&self, rhs: &TypeDenoter) -> bool {
        match (self, rhs) {
            (&TypeDenoter::Base(lhs), &TypeDenoter::Base(rhs)) => lhs == rhs,
            (&TypeDenoter::Struct(ref lhs), &TypeDenoter::Struct(ref rhs)) => {
                lhs.ident == rhs.ident
            }
            (&TypeDenoter::Alias(ref lhs), &TypeDenoter::Alias(ref rhs)) => lhs.ident == rhs.ident,
            (&TypeDenoter::Array(ref lhs), &TypeDenoter::Array(ref rhs)) => {
                if !lhs.inner.equals(&rhs.inner) || lhs.dims.len() != rhs.dims.len() {
                    return false;
                }
                lhs.dims.iter().zip(rhs.dims.iter()).all(|(l, r)| {
                    match (l.constant_value(), r.constant_value()) {
                        (Some(l), Some(r)) => l == r,
                        _ => true,
                    }
                })
            }
            _ => self.type_class() == rhs.type_class(),
        }
    }

    /// Whether a value of this type can be cast to the target type
    pub fn is_castable_to(&self, target: &TypeDenoter) -> bool {
        match *self {
            // Void can not be cast to anything
            TypeDenoter::Void => false,
            TypeDenoter::Base(dt) => {
                if is_scalar_type(dt) {
                    // Scalars splat into any base type and initialize aggregates
                    target.is_base() || target.is_struct()
                } else if let Some(dim) = vector_type_dim(dt) {
                    match *target {
                        TypeDenoter::Base(target_dt) => vector_type_dim(target_dt) == Some(dim),
                        _ => false,
                    }
                } else if let Some(dims) = matrix_type_dim(dt) {
                    match *target {
                        TypeDenoter::Base(target_dt) => matrix_type_dim(target_dt) == Some(dims),
                        _ => false,
                    }
                } else {
                    // The string type does not cast
                    false
                }
            }
            _ => self.type_class() == target.type_class(),
        }
    }
}

impl fmt::Display for TypeDenoter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TypeDenoter::Void => write!(f, "void"),
            TypeDenoter::Base(_) => {
                if self.is_scalar() {
                    write!(f, "scalar")
                } else if self.is_vector() {
                    write!(f, "vector")
                } else if self.is_matrix() {
                    write!(f, "matrix")
                } else {
                    write!(f, "<undefined>")
                }
            }
            TypeDenoter::Buffer(_) => write!(f, "buffer"),
            TypeDenoter::Texture(_) => write!(f, "texture"),
            TypeDenoter::Sampler(_) => write!(f, "sampler"),
            TypeDenoter::Struct(ref s) => {
                if s.ident.is_empty() {
                    write!(f, "struct <anonymous>")
                } else {
                    write!(f, "struct {}", s.ident)
                }
            }
            TypeDenoter::Alias(ref a) => write!(f, "{}", a.ident),
            TypeDenoter::Array(ref a) => {
                write!(f, "{}", a.inner)?;
                for _ in &a.dims {
                    write!(f, "[]")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
fn denoter_samples() -> Vec<TypeDenoter> {
    vec![
        TypeDenoter::Void,
        TypeDenoter::Base(DataType::Float),
        TypeDenoter::Base(DataType::Float3),
        TypeDenoter::Base(DataType::Float4x4),
        TypeDenoter::Buffer(BufferType::StructuredBuffer),
        TypeDenoter::Texture(TextureType::Texture2D),
        TypeDenoter::Sampler(SamplerType::SamplerState),
        TypeDenoter::Struct(StructTypeDenoter::named("V")),
        TypeDenoter::Alias(AliasTypeDenoter {
            ident: "Color".to_string(),
        }),
        TypeDenoter::Array(ArrayTypeDenoter {
            inner: Box::new(TypeDenoter::Base(DataType::Float)),
            dims: vec![ArrayDimension(None)],
        }),
    ]
}

#[test]
fn test_equality_is_reflexive_and_variant_disjoint() {
    let samples = denoter_samples();
    for (i, lhs) in samples.iter().enumerate() {
        for (j, rhs) in samples.iter().enumerate() {
            // Symmetry in both directions
            assert_eq!(lhs.equals(rhs), rhs.equals(lhs));
            if i == j {
                assert!(lhs.equals(rhs));
            }
            if lhs.type_class() != rhs.type_class() {
                assert!(!lhs.equals(rhs));
            }
        }
    }

    // Same variant, different payload
    assert!(!TypeDenoter::Base(DataType::Float).equals(&TypeDenoter::Base(DataType::Int)));
    assert!(!TypeDenoter::Struct(StructTypeDenoter::named("A"))
        .equals(&TypeDenoter::Struct(StructTypeDenoter::named("B"))));

    // Classification refinements do not break variant equality
    assert!(TypeDenoter::Buffer(BufferType::Buffer)
        .equals(&TypeDenoter::Buffer(BufferType::RWBuffer)));
    assert!(TypeDenoter::Sampler(SamplerType::Sampler)
        .equals(&TypeDenoter::Sampler(SamplerType::SamplerComparisonState)));
}

#[test]
fn test_array_equality_by_dims() {
    fn dim(value: u64) -> ArrayDimension {
        ArrayDimension(Some(Located::none(Expression::Literal(
            Literal::UntypedInt(value),
        ))))
    }
    fn array_of(inner: TypeDenoter, dims: Vec<ArrayDimension>) -> TypeDenoter {
        TypeDenoter::Array(ArrayTypeDenoter {
            inner: Box::new(inner),
            dims,
        })
    }

    let float = TypeDenoter::Base(DataType::Float);
    assert!(array_of(float.clone(), vec![dim(3)]).equals(&array_of(float.clone(), vec![dim(3)])));
    assert!(!array_of(float.clone(), vec![dim(3)]).equals(&array_of(float.clone(), vec![dim(4)])));
    assert!(!array_of(float.clone(), vec![dim(3)])
        .equals(&array_of(float.clone(), vec![dim(3), dim(3)])));
    // Unbounded dimensions only compare by arity
    assert!(array_of(float.clone(), vec![ArrayDimension(None)])
        .equals(&array_of(float.clone(), vec![dim(7)])));
    // Inner type still matters
    assert!(!array_of(float, vec![dim(3)])
        .equals(&array_of(TypeDenoter::Base(DataType::Int), vec![dim(3)])));
}

#[test]
fn test_cast_rules() {
    let void = TypeDenoter::Void;
    let scalar = TypeDenoter::Base(DataType::Float);
    let int3 = TypeDenoter::Base(DataType::Int3);
    let float3 = TypeDenoter::Base(DataType::Float3);
    let float4 = TypeDenoter::Base(DataType::Float4);
    let m34 = TypeDenoter::Base(DataType::Float3x4);
    let h34 = TypeDenoter::Base(DataType::Half3x4);
    let m43 = TypeDenoter::Base(DataType::Float4x3);
    let user = TypeDenoter::Struct(StructTypeDenoter::named("V"));

    for target in denoter_samples() {
        assert!(!void.is_castable_to(&target));
    }

    // Scalars cast to any base type and to structs
    assert!(scalar.is_castable_to(&float3));
    assert!(scalar.is_castable_to(&m34));
    assert!(scalar.is_castable_to(&scalar));
    assert!(scalar.is_castable_to(&user));
    assert!(!scalar.is_castable_to(&TypeDenoter::Sampler(SamplerType::Sampler)));

    // Vectors cast only to vectors of the same arity
    assert!(int3.is_castable_to(&float3));
    assert!(!int3.is_castable_to(&float4));
    assert!(!int3.is_castable_to(&scalar));
    assert!(!int3.is_castable_to(&user));

    // Matrices cast only to matrices of the same shape
    assert!(m34.is_castable_to(&h34));
    assert!(!m34.is_castable_to(&m43));
    assert!(!m34.is_castable_to(&float3));

    // Everything else is castable exactly to its own variant
    assert!(TypeDenoter::Buffer(BufferType::Buffer)
        .is_castable_to(&TypeDenoter::Buffer(BufferType::RWBuffer)));
    assert!(!TypeDenoter::Buffer(BufferType::Buffer)
        .is_castable_to(&TypeDenoter::Texture(TextureType::Texture2D)));
}

#[test]
fn test_to_string() {
    assert_eq!(TypeDenoter::Void.to_string(), "void");
    assert_eq!(TypeDenoter::Base(DataType::Double).to_string(), "scalar");
    assert_eq!(TypeDenoter::Base(DataType::Bool2).to_string(), "vector");
    assert_eq!(TypeDenoter::Base(DataType::Half3x3).to_string(), "matrix");
    assert_eq!(
        TypeDenoter::Struct(StructTypeDenoter::named("Vertex")).to_string(),
        "struct Vertex"
    );
    assert_eq!(
        TypeDenoter::Struct(StructTypeDenoter::named("")).to_string(),
        "struct <anonymous>"
    );
    assert_eq!(
        TypeDenoter::Alias(AliasTypeDenoter {
            ident: "Color".to_string()
        })
        .to_string(),
        "Color"
    );

    let array = TypeDenoter::Array(ArrayTypeDenoter {
        inner: Box::new(TypeDenoter::Alias(AliasTypeDenoter {
            ident: "Color".to_string(),
        })),
        dims: vec![
            ArrayDimension(Some(Located::none(Expression::Literal(
                Literal::UntypedInt(3),
            )))),
            ArrayDimension(Some(Located::none(Expression::Literal(
                Literal::UntypedInt(2),
            )))),
        ],
    });
    assert_eq!(array.to_string(), "Color[][]");
}

#[test]
fn test_ident_extraction() {
    assert_eq!(TypeDenoter::Struct(StructTypeDenoter::named("V")).ident(), "V");
    assert_eq!(
        TypeDenoter::Alias(AliasTypeDenoter {
            ident: "Color".to_string()
        })
        .ident(),
        "Color"
    );
    assert_eq!(TypeDenoter::Void.ident(), "");
    assert_eq!(TypeDenoter::Base(DataType::Float).ident(), "");
    assert_eq!(TypeDenoter::Buffer(BufferType::Buffer).ident(), "");
}

#[test]
fn test_dimension_constant_folding() {
    use crate::ast::BinOp;

    let lit = |v| Located::none(Expression::Literal(Literal::UntypedInt(v)));
    assert_eq!(ArrayDimension(Some(lit(8))).constant_value(), Some(8));
    assert_eq!(ArrayDimension(None).constant_value(), None);

    let sum = Located::none(Expression::BinaryOperation(
        BinOp::Multiply,
        Box::new(lit(4)),
        Box::new(lit(16)),
    ));
    assert_eq!(ArrayDimension(Some(sum)).constant_value(), Some(64));

    let var = Located::none(Expression::Variable("n".to_string()));
    assert_eq!(ArrayDimension(Some(var)).constant_value(), None);
}
