use crate::denoter::{ArrayDimension, ArrayTypeDenoter, StructDeclId, TypeDenoter};
use rfx_lang_htk::tokens::{OffsetSlot, RegisterSlot};
use rfx_lang_htk::types::*;
use rfx_shared::Located;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RowOrder {
    Row,
    Column,
}

/// Modifiers on the type itself (const, matrix packing order)
#[derive(PartialEq, Debug, Clone)]
pub struct TypeModifier {
    pub is_const: bool,
    pub row_order: RowOrder,
}

impl Default for TypeModifier {
    fn default() -> TypeModifier {
        TypeModifier {
            is_const: false,
            row_order: RowOrder::Column,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Type(pub TypeDenoter, pub TypeModifier);

impl Type {
    pub fn from_denoter(denoter: TypeDenoter) -> Type {
        Type(denoter, TypeModifier::default())
    }
    pub fn from_data_type(data_type: DataType) -> Type {
        Type::from_denoter(TypeDenoter::Base(data_type))
    }
    pub fn void() -> Type {
        Type::from_denoter(TypeDenoter::Void)
    }
    pub fn uint() -> Type {
        Type::from_data_type(DataType::UInt)
    }
    pub fn int() -> Type {
        Type::from_data_type(DataType::Int)
    }
    pub fn float() -> Type {
        Type::from_data_type(DataType::Float)
    }
    pub fn float4() -> Type {
        Type::from_data_type(DataType::Float4)
    }
    pub fn float4x4() -> Type {
        Type::from_data_type(DataType::Float4x4)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LocalStorage {
    Local,
    Static,
}

impl Default for LocalStorage {
    fn default() -> LocalStorage {
        LocalStorage::Local
    }
}

/// The type of any global declaration
#[derive(PartialEq, Debug, Clone)]
pub struct GlobalType(pub Type, pub Vec<StorageClass>);

impl From<Type> for GlobalType {
    fn from(ty: Type) -> GlobalType {
        GlobalType(ty, Vec::new())
    }
}

/// The type of any parameter declaration
#[derive(PartialEq, Debug, Clone)]
pub struct ParamType(pub Type, pub InputModifier);

impl From<Type> for ParamType {
    fn from(ty: Type) -> ParamType {
        ParamType(ty, InputModifier::default())
    }
}

/// The type of any local variable declaration
#[derive(PartialEq, Debug, Clone)]
pub struct LocalType(pub Type, pub LocalStorage);

impl From<Type> for LocalType {
    fn from(ty: Type) -> LocalType {
        LocalType(ty, LocalStorage::default())
    }
}

/// Array dimensions attached to a declarator
///
/// An empty list means the declarator introduces no array.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct VariableBind(pub Vec<ArrayDimension>);

impl VariableBind {
    /// The full denoter of the declared variable: the base type wrapped in
    /// an array denoter when dimensions are present, outermost dimension
    /// last
    pub fn apply(&self, base: &TypeDenoter) -> TypeDenoter {
        if self.0.is_empty() {
            base.clone()
        } else {
            TypeDenoter::Array(ArrayTypeDenoter {
                inner: Box::new(base.clone()),
                dims: self.0.clone(),
            })
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    LeftShift,
    RightShift,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Equality,
    Inequality,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    BooleanAnd,
    BooleanOr,
    Assignment,
    SumAssignment,
    DifferenceAssignment,
    ProductAssignment,
    QuotientAssignment,
    RemainderAssignment,
    Sequence,
}

#[derive(PartialEq, Debug, Clone)]
pub enum UnaryOp {
    PrefixIncrement,
    PrefixDecrement,
    PostfixIncrement,
    PostfixDecrement,
    Plus,
    Minus,
    LogicalNot,
    BitwiseNot,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Bool(bool),
    UntypedInt(u64),
    UInt(u64),
    Long(u64),
    Half(f32),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    UnaryOperation(UnaryOp, Box<Located<Expression>>),
    BinaryOperation(BinOp, Box<Located<Expression>>, Box<Located<Expression>>),
    TernaryConditional(
        Box<Located<Expression>>,
        Box<Located<Expression>>,
        Box<Located<Expression>>,
    ),
    ArraySubscript(Box<Located<Expression>>, Box<Located<Expression>>),
    Member(Box<Located<Expression>>, String),
    Call(Box<Located<Expression>>, Vec<Located<Expression>>),
    NumericConstructor(DataType, Vec<Located<Expression>>),
    Cast(Type, Box<Located<Expression>>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Initializer {
    Expression(Located<Expression>),
    Aggregate(Vec<Initializer>),
}

/// A shader semantic annotation such as SV_Position or TEXCOORD0
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Semantic(pub String);

#[derive(PartialEq, Debug, Clone)]
pub struct LocalVariableName {
    pub name: Located<String>,
    pub bind: VariableBind,
    pub init: Option<Initializer>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct VarDef {
    pub local_type: LocalType,
    pub defs: Vec<LocalVariableName>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum InitStatement {
    Empty,
    Expression(Located<Expression>),
    Declaration(VarDef),
}

#[derive(PartialEq, Debug, Clone)]
pub enum SwitchLabel {
    Case(Located<Expression>),
    Default,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SwitchCase {
    pub label: SwitchLabel,
    pub statements: Vec<Statement>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Statement {
    Empty,
    Expression(Located<Expression>),
    Var(VarDef),
    Block(Vec<Statement>),
    If(Located<Expression>, Box<Statement>),
    IfElse(Located<Expression>, Box<Statement>, Box<Statement>),
    While(Located<Expression>, Box<Statement>),
    DoWhile(Box<Statement>, Located<Expression>),
    For(
        InitStatement,
        Located<Expression>,
        Located<Expression>,
        Box<Statement>,
    ),
    Switch(Located<Expression>, Vec<SwitchCase>),
    Break,
    Continue,
    Discard,
    Return(Option<Located<Expression>>),
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructMemberName {
    pub name: Located<String>,
    pub bind: VariableBind,
    pub semantic: Option<Semantic>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructMember {
    pub ty: Type,
    pub defs: Vec<StructMemberName>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructDefinition {
    /// None for hoisted anonymous structs
    pub name: Option<Located<String>>,
    pub members: Vec<StructMember>,
}

impl StructDefinition {
    pub fn ident(&self) -> &str {
        match self.name {
            Some(ref name) => &name.node,
            None => "",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct TypedefDefinition {
    pub name: Located<String>,
    pub source: Type,
    /// Array dimensions on the typedef name itself
    pub bind: VariableBind,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ConstantSlot(pub u32);

#[derive(PartialEq, Debug, Clone)]
pub struct ConstantVariableName {
    pub name: Located<String>,
    pub bind: VariableBind,
    pub offset: Option<OffsetSlot>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConstantVariable {
    pub ty: Type,
    pub defs: Vec<ConstantVariableName>,
}

/// A cbuffer or tbuffer block
#[derive(PartialEq, Debug, Clone)]
pub struct ConstantBuffer {
    pub buffer_type: UniformBufferType,
    pub name: Located<String>,
    pub slot: Option<ConstantSlot>,
    pub members: Vec<ConstantVariable>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum GlobalSlot {
    ReadSlot(u32),
    ReadWriteSlot(u32),
    SamplerSlot(u32),
    ConstantSlot(u32),
}

impl GlobalSlot {
    pub fn from_register(slot: RegisterSlot) -> GlobalSlot {
        match slot {
            RegisterSlot::T(num) => GlobalSlot::ReadSlot(num),
            RegisterSlot::U(num) => GlobalSlot::ReadWriteSlot(num),
            RegisterSlot::S(num) => GlobalSlot::SamplerSlot(num),
            RegisterSlot::B(num) => GlobalSlot::ConstantSlot(num),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct GlobalVariableName {
    pub name: Located<String>,
    pub bind: VariableBind,
    pub slot: Option<GlobalSlot>,
    pub init: Option<Initializer>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GlobalVariable {
    pub global_type: GlobalType,
    pub defs: Vec<GlobalVariableName>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FunctionAttribute {
    NumThreads(
        Located<Expression>,
        Located<Expression>,
        Located<Expression>,
    ),
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionParam {
    pub name: Located<String>,
    pub param_type: ParamType,
    pub bind: VariableBind,
    pub semantic: Option<Semantic>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDefinition {
    pub name: Located<String>,
    pub returntype: Type,
    pub params: Vec<FunctionParam>,
    pub body: Vec<Statement>,
    pub attributes: Vec<FunctionAttribute>,
    pub semantic: Option<Semantic>,
}

/// A state assignment inside a pass block
#[derive(PartialEq, Debug, Clone)]
pub enum PassStateValue {
    Expression(Located<Expression>),
    Compile {
        profile: String,
        call: Located<Expression>,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub struct PassState {
    pub name: Located<String>,
    pub value: PassStateValue,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PassDefinition {
    pub name: Option<Located<String>>,
    pub states: Vec<PassState>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TechniqueDefinition {
    pub name: Option<Located<String>>,
    pub passes: Vec<PassDefinition>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum RootDefinition {
    Struct(StructDefinition),
    Typedef(TypedefDefinition),
    ConstantBuffer(ConstantBuffer),
    GlobalVariable(GlobalVariable),
    Function(FunctionDefinition),
    Technique(TechniqueDefinition),
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Module {
    pub root_definitions: Vec<RootDefinition>,
}

impl Module {
    /// All struct declarations in declaration order. StructDeclId values
    /// index into this sequence.
    pub fn struct_decls(&self) -> Vec<&StructDefinition> {
        self.root_definitions
            .iter()
            .filter_map(|root| match *root {
                RootDefinition::Struct(ref sd) => Some(sd),
                _ => None,
            })
            .collect()
    }

    pub fn struct_decl(&self, id: StructDeclId) -> Option<&StructDefinition> {
        self.struct_decls().get(id.0 as usize).copied()
    }
}

#[test]
fn test_variable_bind_apply() {
    let float = TypeDenoter::Base(DataType::Float);

    let no_dims = VariableBind::default();
    assert_eq!(no_dims.apply(&float), float);

    let two_dims = VariableBind(vec![ArrayDimension(None), ArrayDimension(None)]);
    match two_dims.apply(&float) {
        TypeDenoter::Array(array) => {
            assert_eq!(*array.inner, float);
            assert_eq!(array.dims.len(), 2);
        }
        other => panic!("expected array denoter: {:?}", other),
    }
}

#[test]
fn test_module_struct_decl_table() {
    let module = Module {
        root_definitions: vec![
            RootDefinition::Struct(StructDefinition {
                name: Some(Located::none("A".to_string())),
                members: Vec::new(),
            }),
            RootDefinition::GlobalVariable(GlobalVariable {
                global_type: Type::float().into(),
                defs: Vec::new(),
            }),
            RootDefinition::Struct(StructDefinition {
                name: Some(Located::none("B".to_string())),
                members: Vec::new(),
            }),
        ],
    };
    assert_eq!(module.struct_decls().len(), 2);
    assert_eq!(module.struct_decl(StructDeclId(0)).unwrap().ident(), "A");
    assert_eq!(module.struct_decl(StructDeclId(1)).unwrap().ident(), "B");
    assert!(module.struct_decl(StructDeclId(2)).is_none());
}
