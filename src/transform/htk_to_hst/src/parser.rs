//! Recursive-descent parser with one-token lookahead.
//!
//! Syntax errors produce a located diagnostic and the parser synchronizes to
//! the next statement terminator or block boundary, so a broken declaration
//! does not take the rest of the translation unit with it.

use rfx_lang_hst::*;
use rfx_lang_htk::*;
use rfx_shared::*;
use rustc_hash::FxHashSet;
use std::cell::RefCell;

#[derive(PartialEq, Debug, Clone)]
pub enum ParseErrorReason {
    UnexpectedEndOfStream,
    WrongToken,
    WrongSlotType,
    UnknownType,
    ReservedIdentifier(String),
    FailedToParse,
}

impl ParseErrorReason {
    fn describe(&self) -> String {
        match *self {
            ParseErrorReason::UnexpectedEndOfStream => "unexpected end of stream".to_string(),
            ParseErrorReason::WrongToken => "unexpected token".to_string(),
            ParseErrorReason::WrongSlotType => "wrong register type for this binding".to_string(),
            ParseErrorReason::UnknownType => "unknown type name".to_string(),
            ParseErrorReason::ReservedIdentifier(ref name) => {
                format!("'{}' is a reserved identifier", name)
            }
            ParseErrorReason::FailedToParse => "failed to parse declaration".to_string(),
        }
    }
}

/// A parse failure together with the tokens it failed at
#[derive(PartialEq, Debug, Clone)]
struct ParseErrorContext<'t>(&'t [LexToken], ParseErrorReason);

impl<'t> ParseErrorContext<'t> {
    fn location(&self) -> FileLocation {
        match self.0.first() {
            Some(&LexToken(_, ref loc)) => loc.clone(),
            None => FileLocation::none(),
        }
    }

    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(ErrorClass::Syntactic, self.1.describe(), self.location())
    }
}

type ParseResult<'t, T> = Result<(&'t [LexToken], T), ParseErrorContext<'t>>;

// Return the error that consumed the most tokens before failing
fn get_most_relevant_error<'t>(
    lhs: ParseErrorContext<'t>,
    rhs: ParseErrorContext<'t>,
) -> ParseErrorContext<'t> {
    if rhs.0.len() < lhs.0.len() {
        rhs
    } else {
        lhs
    }
}

macro_rules! token {
    ($input:expr, $pattern:pat => $result:expr) => {
        match $input.first() {
            Some(first_token) => match *first_token {
                $pattern => Ok((&$input[1..], $result)),
                _ => Err(ParseErrorContext($input, ParseErrorReason::WrongToken)),
            },
            None => Err(ParseErrorContext($input, ParseErrorReason::UnexpectedEndOfStream)),
        }
    };
    ($input:expr, $pattern:pat) => {
        token!($input, $pattern => ())
    };
}

/// Names declared so far, used to classify identifiers in type positions
#[derive(Default)]
struct SymbolTable {
    structs: FxHashSet<String>,
    typedefs: FxHashSet<String>,
}

/// Shared state for one parse run
#[derive(Default)]
struct Context {
    symbols: SymbolTable,
    diagnostics: RefCell<Diagnostics>,
}

impl Context {
    fn report(&self, error: &ParseErrorContext) {
        self.diagnostics.borrow_mut().push(error.to_diagnostic());
    }
}

trait Parse: Sized {
    type Output;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self::Output>;
}

struct VariableName;

impl Parse for VariableName {
    type Output = Located<String>;
    fn parse<'t>(input: &'t [LexToken], _: &Context) -> ParseResult<'t, Self::Output> {
        match input.first() {
            Some(&LexToken(Token::Id(Identifier(ref name)), ref loc)) => {
                Ok((&input[1..], Located::new(name.clone(), loc.clone())))
            }
            Some(&LexToken(Token::Reserved(Identifier(ref name)), _)) => Err(ParseErrorContext(
                input,
                ParseErrorReason::ReservedIdentifier(name.clone()),
            )),
            Some(_) => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
            None => Err(ParseErrorContext(
                input,
                ParseErrorReason::UnexpectedEndOfStream,
            )),
        }
    }
}

/// Parse a dimension argument of a generic vector/matrix form
fn parse_digit(input: &[LexToken]) -> ParseResult<u32> {
    token!(input, LexToken(Token::LiteralInt(value), _) => value as u32)
}

/// Parse a scalar type keyword
fn parse_scalartype(input: &[LexToken]) -> ParseResult<DataType> {
    match input.first() {
        Some(&LexToken(Token::ScalarType(data_type), _)) => Ok((&input[1..], data_type)),
        Some(_) => Err(ParseErrorContext(input, ParseErrorReason::UnknownType)),
        None => Err(ParseErrorContext(
            input,
            ParseErrorReason::UnexpectedEndOfStream,
        )),
    }
}

/// Parse a type keyword or generic vector/matrix form into its DataType
fn parse_data_type<'t>(input: &'t [LexToken], _: &Context) -> ParseResult<'t, DataType> {
    match input.first() {
        Some(&LexToken(Token::ScalarType(data_type), _))
        | Some(&LexToken(Token::VectorType(data_type), _))
        | Some(&LexToken(Token::MatrixType(data_type), _)) => Ok((&input[1..], data_type)),
        Some(&LexToken(Token::StringType, _)) => Ok((&input[1..], DataType::String)),
        Some(&LexToken(Token::Vector, _)) => {
            let input = &input[1..];
            let (input, _) = token!(input, LexToken(Token::LeftAngleBracket(_), _))?;
            let (input, scalar) = parse_scalartype(input)?;
            let (input, _) = token!(input, LexToken(Token::Comma, _))?;
            let (input, x) = parse_digit(input)?;
            let (input, _) = token!(input, LexToken(Token::RightAngleBracket(_), _))?;
            match vector_of(scalar, x) {
                Some(data_type) => Ok((input, data_type)),
                None => Err(ParseErrorContext(input, ParseErrorReason::UnknownType)),
            }
        }
        Some(&LexToken(Token::Matrix, _)) => {
            let input = &input[1..];
            let (input, _) = token!(input, LexToken(Token::LeftAngleBracket(_), _))?;
            let (input, scalar) = parse_scalartype(input)?;
            let (input, _) = token!(input, LexToken(Token::Comma, _))?;
            let (input, x) = parse_digit(input)?;
            let (input, _) = token!(input, LexToken(Token::Comma, _))?;
            let (input, y) = parse_digit(input)?;
            let (input, _) = token!(input, LexToken(Token::RightAngleBracket(_), _))?;
            match matrix_of(scalar, x, y) {
                Some(data_type) => Ok((input, data_type)),
                None => Err(ParseErrorContext(input, ParseErrorReason::UnknownType)),
            }
        }
        Some(_) => Err(ParseErrorContext(input, ParseErrorReason::UnknownType)),
        None => Err(ParseErrorContext(
            input,
            ParseErrorReason::UnexpectedEndOfStream,
        )),
    }
}

/// Parse the optional format argument of a texture or buffer object type.
/// The classification alone flows into the denoter.
fn skip_object_format_arg<'t>(input: &'t [LexToken], ctx: &Context) -> &'t [LexToken] {
    fn attempt<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, ()> {
        let (rest, _) = token!(input, LexToken(Token::LeftAngleBracket(_), _))?;
        let rest = match parse_data_type(rest, ctx) {
            Ok((rest, _)) => rest,
            Err(_) => {
                // Structured buffers take struct or typedef element types
                let (rest, _) = VariableName::parse(rest, ctx)?;
                rest
            }
        };
        let (rest, _) = token!(rest, LexToken(Token::RightAngleBracket(_), _))?;
        Ok((rest, ()))
    }
    match attempt(input, ctx) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

impl Parse for TypeDenoter {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        match input.first() {
            Some(&LexToken(Token::Void, _)) => Ok((&input[1..], TypeDenoter::Void)),
            Some(&LexToken(Token::Sampler(sampler_type), _)) => {
                Ok((&input[1..], TypeDenoter::Sampler(sampler_type)))
            }
            Some(&LexToken(Token::Texture(texture_type), _)) => {
                let rest = skip_object_format_arg(&input[1..], ctx);
                Ok((rest, TypeDenoter::Texture(texture_type)))
            }
            Some(&LexToken(Token::StorageBuffer(buffer_type), _)) => {
                let rest = skip_object_format_arg(&input[1..], ctx);
                Ok((rest, TypeDenoter::Buffer(buffer_type)))
            }
            Some(&LexToken(Token::Struct, _)) => {
                let (rest, name) = VariableName::parse(&input[1..], ctx)?;
                if ctx.symbols.structs.contains(&name.node) {
                    Ok((rest, TypeDenoter::Struct(StructTypeDenoter::named(&name.node))))
                } else {
                    Err(ParseErrorContext(input, ParseErrorReason::UnknownType))
                }
            }
            Some(&LexToken(Token::Id(Identifier(ref name)), _)) => {
                if ctx.symbols.structs.contains(name) {
                    Ok((&input[1..], TypeDenoter::Struct(StructTypeDenoter::named(name))))
                } else if ctx.symbols.typedefs.contains(name) {
                    Ok((
                        &input[1..],
                        TypeDenoter::Alias(AliasTypeDenoter {
                            ident: name.clone(),
                        }),
                    ))
                } else {
                    Err(ParseErrorContext(input, ParseErrorReason::UnknownType))
                }
            }
            _ => match parse_data_type(input, ctx) {
                Ok((rest, data_type)) => Ok((rest, TypeDenoter::Base(data_type))),
                Err(err) => Err(err),
            },
        }
    }
}

impl Parse for Type {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let mut modifier = TypeModifier::default();
        let mut rest = input;
        loop {
            match rest.first() {
                Some(&LexToken(Token::TypeModifier(TypeModifierKeyword::Const), _)) => {
                    modifier.is_const = true;
                    rest = &rest[1..];
                }
                Some(&LexToken(Token::TypeModifier(TypeModifierKeyword::RowMajor), _)) => {
                    modifier.row_order = RowOrder::Row;
                    rest = &rest[1..];
                }
                Some(&LexToken(Token::TypeModifier(TypeModifierKeyword::ColumnMajor), _)) => {
                    modifier.row_order = RowOrder::Column;
                    rest = &rest[1..];
                }
                _ => break,
            }
        }
        let (rest, denoter) = TypeDenoter::parse(rest, ctx)?;
        Ok((rest, Type(denoter, modifier)))
    }
}

impl Parse for GlobalType {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let mut storage = Vec::new();
        let mut rest = input;
        loop {
            match rest.first() {
                Some(&LexToken(Token::StorageClass(class), _)) => {
                    storage.push(class);
                    rest = &rest[1..];
                }
                Some(&LexToken(Token::InputModifier(InputModifier::Uniform), _)) => {
                    storage.push(StorageClass::Uniform);
                    rest = &rest[1..];
                }
                _ => break,
            }
        }
        let (rest, ty) = Type::parse(rest, ctx)?;
        Ok((rest, GlobalType(ty, storage)))
    }
}

impl Parse for InputModifier {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], _: &Context) -> ParseResult<'t, Self> {
        token!(input, LexToken(Token::InputModifier(modifier), _) => modifier)
    }
}

impl Parse for ParamType {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, modifier) = match InputModifier::parse(input, ctx) {
            Ok((rest, modifier)) => (rest, modifier),
            Err(_) => (input, InputModifier::default()),
        };
        let (input, ty) = Type::parse(input, ctx)?;
        Ok((input, ParamType(ty, modifier)))
    }
}

impl Parse for LocalType {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, storage) = match input.first() {
            Some(&LexToken(Token::StorageClass(StorageClass::Static), _)) => {
                (&input[1..], LocalStorage::Static)
            }
            _ => (input, LocalStorage::default()),
        };
        let (input, ty) = Type::parse(input, ctx)?;
        Ok((input, LocalType(ty, storage)))
    }
}

/// Parse one `[dim]` or `[]` bracket pair
fn parse_arraydim<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, ArrayDimension> {
    let (input, _) = token!(input, LexToken(Token::LeftSquareBracket, _))?;
    let (input, constant_expression) = match ExpressionNoSeq::parse(input, ctx) {
        Ok((rest, expr)) => (rest, Some(expr)),
        Err(_) => (input, None),
    };
    let (input, _) = token!(input, LexToken(Token::RightSquareBracket, _))?;
    Ok((input, ArrayDimension(constant_expression)))
}

/// Parse all trailing array dimensions of a declarator
fn parse_bind<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, VariableBind> {
    let mut dims = Vec::new();
    let mut rest = input;
    while let Ok((next, dim)) = parse_arraydim(rest, ctx) {
        dims.push(dim);
        rest = next;
    }
    Ok((rest, VariableBind(dims)))
}

/// Parse a `: SEMANTIC` annotation
fn parse_semantic<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Option<Semantic>> {
    fn attempt<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Semantic> {
        let (rest, _) = token!(input, LexToken(Token::Colon, _))?;
        let (rest, name) = VariableName::parse(rest, ctx)?;
        Ok((rest, Semantic(name.node)))
    }
    match attempt(input, ctx) {
        Ok((rest, semantic)) => Ok((rest, Some(semantic))),
        Err(_) => Ok((input, None)),
    }
}

/// Fold a chain of binary operations into a left-leaning expression tree, so
/// `a op1 b op2 c` becomes `(a op1 b) op2 c`
fn build_binary_expr_tree(
    left: Located<Expression>,
    rights: Vec<(BinOp, Located<Expression>)>,
) -> Located<Expression> {
    let loc = left.location.clone();
    let mut final_expression = left;
    for (op, exp) in rights {
        final_expression = Located::new(
            Expression::BinaryOperation(op, Box::new(final_expression), Box::new(exp)),
            loc.clone(),
        )
    }
    final_expression
}

/// Generic helper for one precedence level of left-associative binary
/// operators: gathers an operand/operator chain then folds it
fn parse_binary_operations<'t, Operand, Op>(
    input: &'t [LexToken],
    ctx: &Context,
    parse_operand: Operand,
    parse_op: Op,
) -> ParseResult<'t, Located<Expression>>
where
    Operand: Fn(&'t [LexToken], &Context) -> ParseResult<'t, Located<Expression>>,
    Op: Fn(&'t [LexToken]) -> ParseResult<'t, BinOp>,
{
    let (mut input, left) = parse_operand(input, ctx)?;
    let mut rights = Vec::new();
    loop {
        let (after_op, op) = match parse_op(input) {
            Ok(ok) => ok,
            Err(_) => break,
        };
        // An operator without a right operand is not part of this chain
        let (after_operand, right) = match parse_operand(after_op, ctx) {
            Ok(ok) => ok,
            Err(_) => break,
        };
        rights.push((op, right));
        input = after_operand;
    }
    Ok((input, build_binary_expr_tree(left, rights)))
}

fn expr_paren<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    match input.first() {
        Some(&LexToken(Token::LeftParen, ref loc)) => {
            let (input, expr) = Expression::parse(&input[1..], ctx)?;
            let (input, _) = token!(input, LexToken(Token::RightParen, _))?;
            Ok((input, Located::new(expr.to_node(), loc.clone())))
        }
        Some(&LexToken(Token::Id(_), _)) | Some(&LexToken(Token::Reserved(_), _)) => {
            let (input, name) = VariableName::parse(input, ctx)?;
            let location = name.location.clone();
            Ok((input, Located::new(Expression::Variable(name.node), location)))
        }
        Some(&LexToken(Token::LiteralInt(value), ref loc)) => Ok((
            &input[1..],
            Located::new(
                Expression::Literal(Literal::UntypedInt(value)),
                loc.clone(),
            ),
        )),
        Some(&LexToken(Token::LiteralUInt(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::UInt(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralLong(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::Long(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralHalf(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::Half(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralFloat(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::Float(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralDouble(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::Double(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralBool(value), ref loc)) => Ok((
            &input[1..],
            Located::new(Expression::Literal(Literal::Bool(value)), loc.clone()),
        )),
        Some(&LexToken(Token::LiteralString(ref value), ref loc)) => Ok((
            &input[1..],
            Located::new(
                Expression::Literal(Literal::String(value.clone())),
                loc.clone(),
            ),
        )),
        Some(_) => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        None => Err(ParseErrorContext(
            input,
            ParseErrorReason::UnexpectedEndOfStream,
        )),
    }
}

/// Parse a comma-separated expression list (no top-level sequence operator)
fn parse_expression_list<'t>(
    input: &'t [LexToken],
    ctx: &Context,
) -> ParseResult<'t, Vec<Located<Expression>>> {
    let mut expressions = Vec::new();
    let (mut input, first) = match ExpressionNoSeq::parse(input, ctx) {
        Ok((rest, first)) => (rest, first),
        Err(_) => return Ok((input, expressions)),
    };
    expressions.push(first);
    while let Ok((rest, _)) = token!(input, LexToken(Token::Comma, _)) {
        let (rest, next) = ExpressionNoSeq::parse(rest, ctx)?;
        expressions.push(next);
        input = rest;
    }
    Ok((input, expressions))
}

fn expr_p1<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    // Numeric constructors such as float4(x, y, z, w)
    fn numeric_constructor<'t>(
        input: &'t [LexToken],
        ctx: &Context,
    ) -> ParseResult<'t, Located<Expression>> {
        let loc = match input.first() {
            Some(&LexToken(_, ref loc)) => loc.clone(),
            None => {
                return Err(ParseErrorContext(
                    input,
                    ParseErrorReason::UnexpectedEndOfStream,
                ))
            }
        };
        let (rest, data_type) = match input.first() {
            Some(&LexToken(Token::ScalarType(data_type), _))
            | Some(&LexToken(Token::VectorType(data_type), _))
            | Some(&LexToken(Token::MatrixType(data_type), _)) => (&input[1..], data_type),
            _ => return Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        };
        let (rest, _) = token!(rest, LexToken(Token::LeftParen, _))?;
        let (rest, list) = parse_expression_list(rest, ctx)?;
        let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
        Ok((
            rest,
            Located::new(Expression::NumericConstructor(data_type, list), loc),
        ))
    }

    if let Ok(ok) = numeric_constructor(input, ctx) {
        return Ok(ok);
    }

    let (mut input, mut final_expression) = expr_paren(input, ctx)?;
    let loc = final_expression.location.clone();
    loop {
        match input {
            [LexToken(Token::Plus, _), LexToken(Token::Plus, _), ..] => {
                final_expression = Located::new(
                    Expression::UnaryOperation(
                        UnaryOp::PostfixIncrement,
                        Box::new(final_expression),
                    ),
                    loc.clone(),
                );
                input = &input[2..];
            }
            [LexToken(Token::Minus, _), LexToken(Token::Minus, _), ..] => {
                final_expression = Located::new(
                    Expression::UnaryOperation(
                        UnaryOp::PostfixDecrement,
                        Box::new(final_expression),
                    ),
                    loc.clone(),
                );
                input = &input[2..];
            }
            [LexToken(Token::LeftParen, _), ..] => {
                let (rest, params) = parse_expression_list(&input[1..], ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                final_expression = Located::new(
                    Expression::Call(Box::new(final_expression), params),
                    loc.clone(),
                );
                input = rest;
            }
            [LexToken(Token::Period, _), ..] => {
                let (rest, member) = VariableName::parse(&input[1..], ctx)?;
                final_expression = Located::new(
                    Expression::Member(Box::new(final_expression), member.node),
                    loc.clone(),
                );
                input = rest;
            }
            [LexToken(Token::LeftSquareBracket, _), ..] => {
                let (rest, subscript) = ExpressionNoSeq::parse(&input[1..], ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightSquareBracket, _))?;
                final_expression = Located::new(
                    Expression::ArraySubscript(
                        Box::new(final_expression),
                        Box::new(subscript),
                    ),
                    loc.clone(),
                );
                input = rest;
            }
            _ => break,
        }
    }
    Ok((input, final_expression))
}

fn unaryop_prefix(input: &[LexToken]) -> ParseResult<Located<UnaryOp>> {
    match input {
        [LexToken(Token::Plus, ref loc), LexToken(Token::Plus, _), ..] => Ok((
            &input[2..],
            Located::new(UnaryOp::PrefixIncrement, loc.clone()),
        )),
        [LexToken(Token::Minus, ref loc), LexToken(Token::Minus, _), ..] => Ok((
            &input[2..],
            Located::new(UnaryOp::PrefixDecrement, loc.clone()),
        )),
        [LexToken(Token::Plus, ref loc), ..] => {
            Ok((&input[1..], Located::new(UnaryOp::Plus, loc.clone())))
        }
        [LexToken(Token::Minus, ref loc), ..] => {
            Ok((&input[1..], Located::new(UnaryOp::Minus, loc.clone())))
        }
        [LexToken(Token::ExclamationPoint, ref loc), ..] => {
            Ok((&input[1..], Located::new(UnaryOp::LogicalNot, loc.clone())))
        }
        [LexToken(Token::Tilde, ref loc), ..] => {
            Ok((&input[1..], Located::new(UnaryOp::BitwiseNot, loc.clone())))
        }
        _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
    }
}

fn expr_p2<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    if let Ok((rest, unary)) = unaryop_prefix(input) {
        let (rest, expr) = expr_p2(rest, ctx)?;
        let location = unary.location.clone();
        return Ok((
            rest,
            Located::new(
                Expression::UnaryOperation(unary.to_node(), Box::new(expr)),
                location,
            ),
        ));
    }

    // Cast expressions backtrack to parenthesised expressions when the
    // contents do not name a type
    let cast = |input: &'t [LexToken]| -> ParseResult<'t, Located<Expression>> {
        let (rest, start) = token!(input, LexToken(Token::LeftParen, ref loc) => loc.clone())?;
        let (rest, ty) = Type::parse(rest, ctx)?;
        let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
        let (rest, expr) = expr_p2(rest, ctx)?;
        Ok((rest, Located::new(Expression::Cast(ty, Box::new(expr)), start)))
    };
    if let Ok(ok) = cast(input) {
        return Ok(ok);
    }

    expr_p1(input, ctx)
}

fn expr_p3<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input.first() {
            Some(&LexToken(Token::Asterix, _)) => Ok((&input[1..], BinOp::Multiply)),
            Some(&LexToken(Token::ForwardSlash, _)) => Ok((&input[1..], BinOp::Divide)),
            Some(&LexToken(Token::Percent, _)) => Ok((&input[1..], BinOp::Modulus)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p2, parse_op)
}

fn expr_p4<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        // += and -= belong to the assignment level
        match input {
            [LexToken(Token::Plus, _), LexToken(Token::Equals, _), ..]
            | [LexToken(Token::Minus, _), LexToken(Token::Equals, _), ..] => {
                Err(ParseErrorContext(input, ParseErrorReason::WrongToken))
            }
            [LexToken(Token::Plus, _), ..] => Ok((&input[1..], BinOp::Add)),
            [LexToken(Token::Minus, _), ..] => Ok((&input[1..], BinOp::Subtract)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p3, parse_op)
}

fn expr_p5<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::LeftAngleBracket(FollowedBy::Token), _), LexToken(Token::LeftAngleBracket(_), _), ..] => {
                Ok((&input[2..], BinOp::LeftShift))
            }
            [LexToken(Token::RightAngleBracket(FollowedBy::Token), _), LexToken(Token::RightAngleBracket(_), _), ..] => {
                Ok((&input[2..], BinOp::RightShift))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p4, parse_op)
}

fn expr_p6<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::LeftAngleBracket(FollowedBy::Token), _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::LessEqual))
            }
            [LexToken(Token::RightAngleBracket(FollowedBy::Token), _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::GreaterEqual))
            }
            [LexToken(Token::LeftAngleBracket(_), _), ..] => {
                Ok((&input[1..], BinOp::LessThan))
            }
            [LexToken(Token::RightAngleBracket(_), _), ..] => {
                Ok((&input[1..], BinOp::GreaterThan))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p5, parse_op)
}

fn expr_p7<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input.first() {
            Some(&LexToken(Token::DoubleEquals, _)) => Ok((&input[1..], BinOp::Equality)),
            Some(&LexToken(Token::ExclamationEquals, _)) => {
                Ok((&input[1..], BinOp::Inequality))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p6, parse_op)
}

fn expr_p8<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            // A & directly followed by another token is && or &=
            [LexToken(Token::Ampersand(FollowedBy::Token), _), LexToken(Token::Ampersand(_), _), ..]
            | [LexToken(Token::Ampersand(FollowedBy::Token), _), LexToken(Token::Equals, _), ..] => {
                Err(ParseErrorContext(input, ParseErrorReason::WrongToken))
            }
            [LexToken(Token::Ampersand(_), _), ..] => Ok((&input[1..], BinOp::BitwiseAnd)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p7, parse_op)
}

fn expr_p9<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input.first() {
            Some(&LexToken(Token::Hat, _)) => Ok((&input[1..], BinOp::BitwiseXor)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p8, parse_op)
}

fn expr_p10<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::VerticalBar(FollowedBy::Token), _), LexToken(Token::VerticalBar(_), _), ..]
            | [LexToken(Token::VerticalBar(FollowedBy::Token), _), LexToken(Token::Equals, _), ..] => {
                Err(ParseErrorContext(input, ParseErrorReason::WrongToken))
            }
            [LexToken(Token::VerticalBar(_), _), ..] => Ok((&input[1..], BinOp::BitwiseOr)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p9, parse_op)
}

fn expr_p11<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::Ampersand(FollowedBy::Token), _), LexToken(Token::Ampersand(_), _), ..] => {
                Ok((&input[2..], BinOp::BooleanAnd))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p10, parse_op)
}

fn expr_p12<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::VerticalBar(FollowedBy::Token), _), LexToken(Token::VerticalBar(_), _), ..] => {
                Ok((&input[2..], BinOp::BooleanOr))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p11, parse_op)
}

/// Ternary conditional, right-associative
fn expr_p13<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    let (input, main) = expr_p12(input, ctx)?;
    match input.first() {
        Some(&LexToken(Token::QuestionMark, _)) => {
            let (input, left) = expr_p13(&input[1..], ctx)?;
            let (input, _) = token!(input, LexToken(Token::Colon, _))?;
            let (input, right) = expr_p13(input, ctx)?;
            let loc = main.location.clone();
            Ok((
                input,
                Located::new(
                    Expression::TernaryConditional(
                        Box::new(main),
                        Box::new(left),
                        Box::new(right),
                    ),
                    loc,
                ),
            ))
        }
        _ => Ok((input, main)),
    }
}

/// Assignment operators, right-associative
fn expr_p14<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input {
            [LexToken(Token::Equals, _), ..] => Ok((&input[1..], BinOp::Assignment)),
            [LexToken(Token::Plus, _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::SumAssignment))
            }
            [LexToken(Token::Minus, _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::DifferenceAssignment))
            }
            [LexToken(Token::Asterix, _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::ProductAssignment))
            }
            [LexToken(Token::ForwardSlash, _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::QuotientAssignment))
            }
            [LexToken(Token::Percent, _), LexToken(Token::Equals, _), ..] => {
                Ok((&input[2..], BinOp::RemainderAssignment))
            }
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }

    let (input, lhs) = expr_p13(input, ctx)?;
    match parse_op(input) {
        Ok((rest, op)) => {
            let (rest, rhs) = expr_p14(rest, ctx)?;
            let loc = lhs.location.clone();
            Ok((
                rest,
                Located::new(
                    Expression::BinaryOperation(op, Box::new(lhs), Box::new(rhs)),
                    loc,
                ),
            ))
        }
        Err(_) => Ok((input, lhs)),
    }
}

/// Comma sequence operator
fn expr_p15<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Located<Expression>> {
    fn parse_op(input: &[LexToken]) -> ParseResult<BinOp> {
        match input.first() {
            Some(&LexToken(Token::Comma, _)) => Ok((&input[1..], BinOp::Sequence)),
            _ => Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
        }
    }
    parse_binary_operations(input, ctx, expr_p14, parse_op)
}

impl Parse for Expression {
    type Output = Located<Self>;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self::Output> {
        expr_p15(input, ctx)
    }
}

/// Fake node for parsing an expression where the comma has a different
/// meaning at the top level, so skip that node
struct ExpressionNoSeq;

impl Parse for ExpressionNoSeq {
    type Output = Located<Expression>;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self::Output> {
        expr_p14(input, ctx)
    }
}

impl Parse for Initializer {
    type Output = Option<Initializer>;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self::Output> {
        fn init_expr<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Initializer> {
            let (input, expr) = ExpressionNoSeq::parse(input, ctx)?;
            Ok((input, Initializer::Expression(expr)))
        }

        fn init_aggregate<'t>(
            input: &'t [LexToken],
            ctx: &Context,
        ) -> ParseResult<'t, Initializer> {
            let (mut input, _) = token!(input, LexToken(Token::LeftBrace, _))?;
            let mut elements = Vec::new();
            loop {
                let (rest, element) = init_any(input, ctx)?;
                elements.push(element);
                input = rest;
                match input.first() {
                    Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                    _ => break,
                }
            }
            let (input, _) = token!(input, LexToken(Token::RightBrace, _))?;
            Ok((input, Initializer::Aggregate(elements)))
        }

        fn init_any<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Initializer> {
            match init_expr(input, ctx) {
                Ok(ok) => Ok(ok),
                Err(lhs) => match init_aggregate(input, ctx) {
                    Ok(ok) => Ok(ok),
                    Err(rhs) => Err(get_most_relevant_error(lhs, rhs)),
                },
            }
        }

        match input.first() {
            Some(&LexToken(Token::Equals, _)) => {
                let (input, init) = init_any(&input[1..], ctx)?;
                Ok((input, Some(init)))
            }
            Some(_) => Ok((input, None)),
            None => Err(ParseErrorContext(
                input,
                ParseErrorReason::UnexpectedEndOfStream,
            )),
        }
    }
}

impl Parse for VarDef {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (mut input, local_type) = LocalType::parse(input, ctx)?;
        let mut defs = Vec::new();
        loop {
            let (rest, name) = VariableName::parse(input, ctx)?;
            let (rest, bind) = parse_bind(rest, ctx)?;
            let (rest, init) = Initializer::parse(rest, ctx)?;
            defs.push(LocalVariableName { name, bind, init });
            input = rest;
            match input.first() {
                Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                _ => break,
            }
        }
        Ok((input, VarDef { local_type, defs }))
    }
}

impl Parse for InitStatement {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        if let Ok((rest, vardef)) = VarDef::parse(input, ctx) {
            return Ok((rest, InitStatement::Declaration(vardef)));
        }
        if let Ok((rest, expr)) = Expression::parse(input, ctx) {
            return Ok((rest, InitStatement::Expression(expr)));
        }
        Ok((input, InitStatement::Empty))
    }
}

/// Parse and discard an attribute before a statement, like [unroll]
fn statement_attribute<'t>(input: &'t [LexToken], _: &Context) -> ParseResult<'t, ()> {
    let (mut input, _) = token!(input, LexToken(Token::LeftSquareBracket, _))?;
    // Attribute arguments never nest brackets
    loop {
        match input.first() {
            Some(&LexToken(Token::RightSquareBracket, _)) => return Ok((&input[1..], ())),
            Some(_) => input = &input[1..],
            None => {
                return Err(ParseErrorContext(
                    input,
                    ParseErrorReason::UnexpectedEndOfStream,
                ))
            }
        }
    }
}

impl Parse for Statement {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        // Parse and ignore attributes before a statement
        let mut input = input;
        while let Ok((rest, ())) = statement_attribute(input, ctx) {
            input = rest;
        }
        if input.is_empty() {
            return Err(ParseErrorContext(
                input,
                ParseErrorReason::UnexpectedEndOfStream,
            ));
        }
        let (head, tail) = (&input[0], &input[1..]);
        match head.0 {
            Token::Semicolon => Ok((tail, Statement::Empty)),
            Token::If => {
                let (rest, _) = token!(tail, LexToken(Token::LeftParen, _))?;
                let (rest, cond) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                let (rest, inner) = Statement::parse(rest, ctx)?;
                match rest.first() {
                    Some(&LexToken(Token::Else, _)) => {
                        let (rest, else_part) = Statement::parse(&rest[1..], ctx)?;
                        Ok((
                            rest,
                            Statement::IfElse(cond, Box::new(inner), Box::new(else_part)),
                        ))
                    }
                    _ => Ok((rest, Statement::If(cond, Box::new(inner)))),
                }
            }
            Token::For => {
                let (rest, _) = token!(tail, LexToken(Token::LeftParen, _))?;
                let (rest, init) = InitStatement::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                let (rest, cond) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                let (rest, inc) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                let (rest, inner) = Statement::parse(rest, ctx)?;
                Ok((rest, Statement::For(init, cond, inc, Box::new(inner))))
            }
            Token::While => {
                let (rest, _) = token!(tail, LexToken(Token::LeftParen, _))?;
                let (rest, cond) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                let (rest, inner) = Statement::parse(rest, ctx)?;
                Ok((rest, Statement::While(cond, Box::new(inner))))
            }
            Token::Do => {
                let (rest, inner) = Statement::parse(tail, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::While, _))?;
                let (rest, _) = token!(rest, LexToken(Token::LeftParen, _))?;
                let (rest, cond) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                Ok((rest, Statement::DoWhile(Box::new(inner), cond)))
            }
            Token::Switch => {
                let (rest, _) = token!(tail, LexToken(Token::LeftParen, _))?;
                let (rest, cond) = Expression::parse(rest, ctx)?;
                let (rest, _) = token!(rest, LexToken(Token::RightParen, _))?;
                let (mut rest, _) = token!(rest, LexToken(Token::LeftBrace, _))?;
                let mut cases = Vec::new();
                loop {
                    let label = match rest.first() {
                        Some(&LexToken(Token::Case, _)) => {
                            let (next, expr) = ExpressionNoSeq::parse(&rest[1..], ctx)?;
                            let (next, _) = token!(next, LexToken(Token::Colon, _))?;
                            rest = next;
                            SwitchLabel::Case(expr)
                        }
                        Some(&LexToken(Token::Default, _)) => {
                            let (next, _) = token!(&rest[1..], LexToken(Token::Colon, _))?;
                            rest = next;
                            SwitchLabel::Default
                        }
                        Some(&LexToken(Token::RightBrace, _)) => break,
                        _ => {
                            return Err(ParseErrorContext(rest, ParseErrorReason::WrongToken));
                        }
                    };
                    let mut statements = Vec::new();
                    loop {
                        match rest.first() {
                            Some(&LexToken(Token::Case, _))
                            | Some(&LexToken(Token::Default, _))
                            | Some(&LexToken(Token::RightBrace, _))
                            | None => break,
                            _ => {
                                let (next, statement) = Statement::parse(rest, ctx)?;
                                statements.push(statement);
                                rest = next;
                            }
                        }
                    }
                    cases.push(SwitchCase { label, statements });
                }
                let (rest, _) = token!(rest, LexToken(Token::RightBrace, _))?;
                Ok((rest, Statement::Switch(cond, cases)))
            }
            Token::Break => {
                let (rest, _) = token!(tail, LexToken(Token::Semicolon, _))?;
                Ok((rest, Statement::Break))
            }
            Token::Continue => {
                let (rest, _) = token!(tail, LexToken(Token::Semicolon, _))?;
                Ok((rest, Statement::Continue))
            }
            Token::Discard => {
                let (rest, _) = token!(tail, LexToken(Token::Semicolon, _))?;
                Ok((rest, Statement::Discard))
            }
            Token::Return => match token!(tail, LexToken(Token::Semicolon, _)) {
                Ok((rest, _)) => Ok((rest, Statement::Return(None))),
                Err(_) => {
                    let (rest, expr) = Expression::parse(tail, ctx)?;
                    let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                    Ok((rest, Statement::Return(Some(expr))))
                }
            },
            Token::LeftBrace => {
                let (rest, block) = statement_block(input, ctx)?;
                Ok((rest, Statement::Block(block)))
            }
            _ => {
                fn vardef_statement<'t>(
                    input: &'t [LexToken],
                    ctx: &Context,
                ) -> ParseResult<'t, Statement> {
                    let (rest, vardef) = VarDef::parse(input, ctx)?;
                    let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                    Ok((rest, Statement::Var(vardef)))
                }
                fn expr_statement<'t>(
                    input: &'t [LexToken],
                    ctx: &Context,
                ) -> ParseResult<'t, Statement> {
                    let (rest, expr) = Expression::parse(input, ctx)?;
                    let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
                    Ok((rest, Statement::Expression(expr)))
                }

                // Try a variable definition, then an expression statement,
                // and keep the most likely error
                let vardef_err = match vardef_statement(input, ctx) {
                    Ok(ok) => return Ok(ok),
                    Err(err) => err,
                };
                let expr_err = match expr_statement(input, ctx) {
                    Ok(ok) => return Ok(ok),
                    Err(err) => err,
                };
                Err(get_most_relevant_error(vardef_err, expr_err))
            }
        }
    }
}

/// Skip a balanced brace group. The input starts just after a left brace;
/// the returned slice starts just after the matching right brace.
fn skip_balanced_block(mut input: &[LexToken]) -> &[LexToken] {
    let mut depth = 1u32;
    loop {
        match input.first() {
            Some(&LexToken(Token::LeftBrace, _)) => depth += 1,
            Some(&LexToken(Token::RightBrace, _)) => {
                depth -= 1;
                if depth == 0 {
                    return &input[1..];
                }
            }
            Some(&LexToken(Token::Eof, _)) | None => return input,
            _ => {}
        }
        input = &input[1..];
    }
}

/// Advance to the next statement terminator or block boundary
fn skip_to_statement_boundary(mut input: &[LexToken]) -> &[LexToken] {
    loop {
        match input.first() {
            Some(&LexToken(Token::Semicolon, _)) => return &input[1..],
            Some(&LexToken(Token::LeftBrace, _)) => return skip_balanced_block(&input[1..]),
            // The enclosing block closes here, leave it for the caller
            Some(&LexToken(Token::RightBrace, _)) => return input,
            Some(&LexToken(Token::Eof, _)) | None => return input,
            _ => input = &input[1..],
        }
    }
}

/// Parse a braced statement list, recovering inside the block on bad
/// statements
fn statement_block<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Vec<Statement>> {
    let mut statements = Vec::new();
    let (mut rest, _) = token!(input, LexToken(Token::LeftBrace, _))?;
    loop {
        match rest.first() {
            Some(&LexToken(Token::RightBrace, _)) => return Ok((&rest[1..], statements)),
            Some(&LexToken(Token::Eof, _)) | None => {
                return Err(ParseErrorContext(
                    rest,
                    ParseErrorReason::UnexpectedEndOfStream,
                ))
            }
            _ => {}
        }
        match Statement::parse(rest, ctx) {
            Ok((remaining, statement)) => {
                statements.push(statement);
                rest = remaining;
            }
            Err(err) => {
                if err.1 == ParseErrorReason::UnexpectedEndOfStream {
                    return Err(err);
                }
                ctx.report(&err);
                let recovered = skip_to_statement_boundary(rest);
                // Always make progress, even on a degenerate error
                rest = if recovered.len() == rest.len() {
                    &rest[1..]
                } else {
                    recovered
                };
            }
        }
    }
}

impl Parse for StructMemberName {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, bind) = parse_bind(input, ctx)?;
        let (input, semantic) = parse_semantic(input, ctx)?;
        Ok((
            input,
            StructMemberName {
                name,
                bind,
                semantic,
            },
        ))
    }
}

impl Parse for StructMember {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (mut input, ty) = Type::parse(input, ctx)?;
        let mut defs = Vec::new();
        loop {
            let (rest, def) = StructMemberName::parse(input, ctx)?;
            defs.push(def);
            input = rest;
            match input.first() {
                Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                _ => break,
            }
        }
        let (input, _) = token!(input, LexToken(Token::Semicolon, _))?;
        Ok((input, StructMember { ty, defs }))
    }
}

impl Parse for StructDefinition {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, _) = token!(input, LexToken(Token::Struct, _))?;
        let (input, name) = match VariableName::parse(input, ctx) {
            Ok((rest, name)) => (rest, Some(name)),
            Err(_) => (input, None),
        };
        let (mut input, _) = token!(input, LexToken(Token::LeftBrace, _))?;
        let mut members = Vec::new();
        loop {
            if let Ok((rest, _)) = token!(input, LexToken(Token::RightBrace, _)) {
                return Ok((rest, StructDefinition { name, members }));
            }
            let (rest, member) = StructMember::parse(input, ctx)?;
            members.push(member);
            input = rest;
        }
    }
}

impl Parse for ConstantVariableName {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, bind) = parse_bind(input, ctx)?;
        let (input, offset) = match input.first() {
            Some(&LexToken(Token::Colon, _)) => {
                let (rest, offset) =
                    token!(&input[1..], LexToken(Token::PackOffset(slot), _) => slot)?;
                (rest, Some(offset))
            }
            _ => (input, None),
        };
        Ok((input, ConstantVariableName { name, bind, offset }))
    }
}

impl Parse for ConstantVariable {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (mut input, ty) = Type::parse(input, ctx)?;
        let mut defs = Vec::new();
        loop {
            let (rest, def) = ConstantVariableName::parse(input, ctx)?;
            defs.push(def);
            input = rest;
            match input.first() {
                Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                _ => break,
            }
        }
        let (input, _) = token!(input, LexToken(Token::Semicolon, _))?;
        Ok((input, ConstantVariable { ty, defs }))
    }
}

impl Parse for ConstantBuffer {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, buffer_type) =
            token!(input, LexToken(Token::UniformBuffer(buffer_type), _) => buffer_type)?;
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, slot) = match input.first() {
            Some(&LexToken(Token::Colon, _)) => match &input[1..] {
                [LexToken(Token::Register(RegisterSlot::B(slot)), _), rest @ ..] => {
                    (rest, Some(ConstantSlot(*slot)))
                }
                [LexToken(Token::Register(_), _), ..] => {
                    return Err(ParseErrorContext(input, ParseErrorReason::WrongSlotType))
                }
                _ => return Err(ParseErrorContext(input, ParseErrorReason::WrongToken)),
            },
            _ => (input, None),
        };
        let (mut input, _) = token!(input, LexToken(Token::LeftBrace, _))?;
        let mut members = Vec::new();
        loop {
            if let Ok((rest, _)) = token!(input, LexToken(Token::RightBrace, _)) {
                return Ok((
                    rest,
                    ConstantBuffer {
                        buffer_type,
                        name,
                        slot,
                        members,
                    },
                ));
            }
            let (rest, member) = ConstantVariable::parse(input, ctx)?;
            members.push(member);
            input = rest;
        }
    }
}

impl Parse for GlobalVariableName {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, bind) = parse_bind(input, ctx)?;
        let (input, slot) = match input.first() {
            Some(&LexToken(Token::Colon, _)) => {
                let (rest, register) =
                    token!(&input[1..], LexToken(Token::Register(slot), _) => slot)?;
                (rest, Some(GlobalSlot::from_register(register)))
            }
            _ => (input, None),
        };
        let (input, init) = Initializer::parse(input, ctx)?;
        Ok((
            input,
            GlobalVariableName {
                name,
                bind,
                slot,
                init,
            },
        ))
    }
}

impl Parse for GlobalVariable {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (mut input, global_type) = GlobalType::parse(input, ctx)?;
        let mut defs = Vec::new();
        loop {
            let (rest, def) = GlobalVariableName::parse(input, ctx)?;
            defs.push(def);
            input = rest;
            match input.first() {
                Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                _ => break,
            }
        }
        let (input, _) = token!(input, LexToken(Token::Semicolon, _))?;
        Ok((input, GlobalVariable { global_type, defs }))
    }
}

impl Parse for TypedefDefinition {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, _) = token!(input, LexToken(Token::Typedef, _))?;
        let (input, source) = Type::parse(input, ctx)?;
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, bind) = parse_bind(input, ctx)?;
        let (input, _) = token!(input, LexToken(Token::Semicolon, _))?;
        Ok((input, TypedefDefinition { name, source, bind }))
    }
}

/// Parse attributes before a function, keeping the ones with meaning to the
/// front end
fn parse_function_attributes<'t>(
    input: &'t [LexToken],
    ctx: &Context,
) -> ParseResult<'t, Vec<FunctionAttribute>> {
    let mut attributes = Vec::new();
    let mut rest = input;
    loop {
        if token!(rest, LexToken(Token::LeftSquareBracket, _)).is_err() {
            break;
        }
        let numthreads = |input: &'t [LexToken]| -> ParseResult<'t, FunctionAttribute> {
            let (input, _) = token!(input, LexToken(Token::LeftSquareBracket, _))?;
            let (input, name) = VariableName::parse(input, ctx)?;
            if name.node != "numthreads" {
                return Err(ParseErrorContext(input, ParseErrorReason::WrongToken));
            }
            let (input, _) = token!(input, LexToken(Token::LeftParen, _))?;
            let (input, x) = ExpressionNoSeq::parse(input, ctx)?;
            let (input, _) = token!(input, LexToken(Token::Comma, _))?;
            let (input, y) = ExpressionNoSeq::parse(input, ctx)?;
            let (input, _) = token!(input, LexToken(Token::Comma, _))?;
            let (input, z) = ExpressionNoSeq::parse(input, ctx)?;
            let (input, _) = token!(input, LexToken(Token::RightParen, _))?;
            let (input, _) = token!(input, LexToken(Token::RightSquareBracket, _))?;
            Ok((input, FunctionAttribute::NumThreads(x, y, z)))
        };
        match numthreads(rest) {
            Ok((next, attribute)) => {
                attributes.push(attribute);
                rest = next;
            }
            Err(_) => {
                // Unknown attributes are consumed and dropped
                let (next, ()) = statement_attribute(rest, ctx)?;
                rest = next;
            }
        }
    }
    Ok((rest, attributes))
}

impl Parse for FunctionParam {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, param_type) = ParamType::parse(input, ctx)?;
        let (input, name) = VariableName::parse(input, ctx)?;
        let (input, bind) = parse_bind(input, ctx)?;
        let (input, semantic) = parse_semantic(input, ctx)?;
        Ok((
            input,
            FunctionParam {
                name,
                param_type,
                bind,
                semantic,
            },
        ))
    }
}

impl Parse for FunctionDefinition {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, attributes) = parse_function_attributes(input, ctx)?;
        let (input, returntype) = Type::parse(input, ctx)?;
        let (input, name) = VariableName::parse(input, ctx)?;
        let (mut input, _) = token!(input, LexToken(Token::LeftParen, _))?;
        let mut params = Vec::new();
        if token!(input, LexToken(Token::RightParen, _)).is_err() {
            loop {
                let (rest, param) = FunctionParam::parse(input, ctx)?;
                params.push(param);
                input = rest;
                match input.first() {
                    Some(&LexToken(Token::Comma, _)) => input = &input[1..],
                    _ => break,
                }
            }
        }
        let (input, _) = token!(input, LexToken(Token::RightParen, _))?;
        let (input, semantic) = parse_semantic(input, ctx)?;
        let (input, body) = statement_block(input, ctx)?;
        Ok((
            input,
            FunctionDefinition {
                name,
                returntype,
                params,
                body,
                attributes,
                semantic,
            },
        ))
    }
}

impl Parse for PassDefinition {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, _) = token!(input, LexToken(Token::Pass, _))?;
        let (input, name) = match VariableName::parse(input, ctx) {
            Ok((rest, name)) => (rest, Some(name)),
            Err(_) => (input, None),
        };
        let (mut input, _) = token!(input, LexToken(Token::LeftBrace, _))?;
        let mut states = Vec::new();
        loop {
            if let Ok((rest, _)) = token!(input, LexToken(Token::RightBrace, _)) {
                return Ok((rest, PassDefinition { name, states }));
            }
            let (rest, state_name) = VariableName::parse(input, ctx)?;
            let (rest, _) = token!(rest, LexToken(Token::Equals, _))?;
            let (rest, value) = match rest.first() {
                Some(&LexToken(Token::Compile, _)) => {
                    let (rest, profile) = VariableName::parse(&rest[1..], ctx)?;
                    let (rest, call) = ExpressionNoSeq::parse(rest, ctx)?;
                    (
                        rest,
                        PassStateValue::Compile {
                            profile: profile.node,
                            call,
                        },
                    )
                }
                _ => {
                    let (rest, expr) = ExpressionNoSeq::parse(rest, ctx)?;
                    (rest, PassStateValue::Expression(expr))
                }
            };
            let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;
            states.push(PassState {
                name: state_name,
                value,
            });
            input = rest;
        }
    }
}

impl Parse for TechniqueDefinition {
    type Output = Self;
    fn parse<'t>(input: &'t [LexToken], ctx: &Context) -> ParseResult<'t, Self> {
        let (input, _) = token!(input, LexToken(Token::Technique, _))?;
        let (input, name) = match VariableName::parse(input, ctx) {
            Ok((rest, name)) => (rest, Some(name)),
            Err(_) => (input, None),
        };
        let (mut input, _) = token!(input, LexToken(Token::LeftBrace, _))?;
        let mut passes = Vec::new();
        loop {
            if let Ok((rest, _)) = token!(input, LexToken(Token::RightBrace, _)) {
                return Ok((rest, TechniqueDefinition { name, passes }));
            }
            let (rest, pass) = PassDefinition::parse(input, ctx)?;
            passes.push(pass);
            input = rest;
        }
    }
}

/// Parse `struct Name? { ... }` optionally followed by declarators, which
/// declares both the struct and variables of it in one statement
fn parse_struct_root<'t>(
    input: &'t [LexToken],
    ctx: &Context,
) -> ParseResult<'t, Vec<RootDefinition>> {
    let (input, struct_def) = StructDefinition::parse(input, ctx)?;

    // Plain definition
    if let Ok((rest, _)) = token!(input, LexToken(Token::Semicolon, _)) {
        return Ok((rest, vec![RootDefinition::Struct(struct_def)]));
    }

    // Definition with trailing declarators
    let denoter = TypeDenoter::Struct(StructTypeDenoter {
        ident: struct_def.ident().to_string(),
        struct_decl: None,
    });
    let mut defs = Vec::new();
    let mut rest = input;
    loop {
        let (next, name) = VariableName::parse(rest, ctx)?;
        let (next, bind) = parse_bind(next, ctx)?;
        let (next, init) = Initializer::parse(next, ctx)?;
        defs.push(GlobalVariableName {
            name,
            bind,
            slot: None,
            init,
        });
        rest = next;
        match rest.first() {
            Some(&LexToken(Token::Comma, _)) => rest = &rest[1..],
            _ => break,
        }
    }
    let (rest, _) = token!(rest, LexToken(Token::Semicolon, _))?;

    let global = GlobalVariable {
        global_type: Type::from_denoter(denoter).into(),
        defs,
    };
    Ok((
        rest,
        vec![
            RootDefinition::Struct(struct_def),
            RootDefinition::GlobalVariable(global),
        ],
    ))
}

fn parse_root_definition<'t>(
    input: &'t [LexToken],
    ctx: &Context,
) -> ParseResult<'t, Vec<RootDefinition>> {
    let err = match parse_struct_root(input, ctx) {
        Ok(ok) => return Ok(ok),
        Err(err) => err,
    };

    let err = match TypedefDefinition::parse(input, ctx) {
        Ok((rest, typedef)) => return Ok((rest, vec![RootDefinition::Typedef(typedef)])),
        Err(e) => get_most_relevant_error(err, e),
    };

    let err = match ConstantBuffer::parse(input, ctx) {
        Ok((rest, cbuffer)) => return Ok((rest, vec![RootDefinition::ConstantBuffer(cbuffer)])),
        Err(e) => get_most_relevant_error(err, e),
    };

    let err = match TechniqueDefinition::parse(input, ctx) {
        Ok((rest, technique)) => return Ok((rest, vec![RootDefinition::Technique(technique)])),
        Err(e) => get_most_relevant_error(err, e),
    };

    let err = match GlobalVariable::parse(input, ctx) {
        Ok((rest, global)) => return Ok((rest, vec![RootDefinition::GlobalVariable(global)])),
        Err(e) => get_most_relevant_error(err, e),
    };

    let err = match FunctionDefinition::parse(input, ctx) {
        Ok((rest, function)) => return Ok((rest, vec![RootDefinition::Function(function)])),
        Err(e) => get_most_relevant_error(err, e),
    };

    Err(err)
}

/// Advance to the next top-level declaration boundary
fn skip_to_root_boundary(mut input: &[LexToken]) -> &[LexToken] {
    loop {
        match input.first() {
            Some(&LexToken(Token::Semicolon, _)) => return &input[1..],
            Some(&LexToken(Token::LeftBrace, _)) => return skip_balanced_block(&input[1..]),
            Some(&LexToken(Token::RightBrace, _)) => return &input[1..],
            Some(&LexToken(Token::Eof, _)) | None => return input,
            _ => input = &input[1..],
        }
    }
}

/// Bind struct denoters in a definition-with-declarators batch to the
/// declaration that was just emitted
fn bind_batch_struct_refs(batch: &mut [RootDefinition], next_struct_id: u32) {
    let mut ident = None;
    for definition in batch.iter() {
        if let RootDefinition::Struct(ref sd) = *definition {
            ident = Some(sd.ident().to_string());
        }
    }
    let ident = match ident {
        Some(ident) => ident,
        None => return,
    };
    for definition in batch.iter_mut() {
        if let RootDefinition::GlobalVariable(ref mut gv) = *definition {
            if let TypeDenoter::Struct(ref mut denoter) = (gv.global_type.0).0 {
                if denoter.ident == ident {
                    denoter.struct_decl = Some(StructDeclId(next_struct_id));
                }
            }
        }
    }
}

/// The result of parsing a translation unit: a structurally well-formed
/// (possibly partial) module plus every diagnostic produced on the way
#[derive(PartialEq, Debug, Clone)]
pub struct ParseOutput {
    pub module: Module,
    pub diagnostics: Diagnostics,
}

/// Parse a full translation unit from a token stream
///
/// Declarations that fail to parse are reported and skipped; parsing
/// continues at the next declaration boundary.
pub fn parse(source: &[LexToken]) -> ParseOutput {
    let mut ctx = Context::default();
    let mut module = Module::default();
    let mut struct_count = 0u32;
    let mut rest = source;

    loop {
        // Stray semicolons between declarations are harmless
        while let Ok((next, _)) = token!(rest, LexToken(Token::Semicolon, _)) {
            rest = next;
        }
        match rest.first() {
            None | Some(&LexToken(Token::Eof, _)) => break,
            _ => {}
        }

        match parse_root_definition(rest, &ctx) {
            Ok((remaining, mut batch)) => {
                bind_batch_struct_refs(&mut batch, struct_count);
                for definition in batch {
                    match definition {
                        RootDefinition::Struct(sd) => {
                            struct_count += 1;
                            if let Some(ref name) = sd.name {
                                ctx.symbols.structs.insert(name.node.clone());
                            }
                            module.root_definitions.push(RootDefinition::Struct(sd));
                        }
                        RootDefinition::Typedef(td) => {
                            ctx.symbols.typedefs.insert(td.name.node.clone());
                            module.root_definitions.push(RootDefinition::Typedef(td));
                        }
                        other => module.root_definitions.push(other),
                    }
                }
                rest = remaining;
            }
            Err(err) => {
                ctx.report(&err);
                let recovered = skip_to_root_boundary(rest);
                rest = if recovered.len() == rest.len() {
                    &rest[1..]
                } else {
                    recovered
                };
            }
        }
    }

    ParseOutput {
        module,
        diagnostics: ctx.diagnostics.into_inner(),
    }
}

#[cfg(test)]
fn parse_str(source: &str) -> ParseOutput {
    use rfx_transform_lexer::lex;
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single(source, FileName("parser_test.hlsl".to_string()))
        .expect("preprocess failed");
    let tokens = lex(&text).expect("lex failed");
    parse(&tokens.stream)
}

#[cfg(test)]
fn parse_str_clean(source: &str) -> Module {
    let output = parse_str(source);
    assert!(
        !output.diagnostics.has_errors(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.module
}

#[cfg(test)]
fn expr_from_str(source: &str) -> Located<Expression> {
    use rfx_transform_lexer::lex;
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single(
        &format!("{}\n", source),
        FileName("parser_test.hlsl".to_string()),
    )
    .expect("preprocess failed");
    let tokens = lex(&text).expect("lex failed");
    let ctx = Context::default();
    match Expression::parse(&tokens.stream, &ctx) {
        Ok((rest, expr)) => {
            assert!(
                rest.len() == 1 && rest[0].0 == Token::Eof,
                "tokens remaining: {:?}",
                rest
            );
            expr
        }
        Err(err) => panic!("failed to parse `{}`: {:?}", source, err.1),
    }
}

#[cfg(test)]
fn test_loc(line: u64, column: u64, node: Expression) -> Located<Expression> {
    Located::new(
        node,
        FileLocation::new(FileName("parser_test.hlsl".to_string()), line, column),
    )
}

#[cfg(test)]
fn bexp_var(name: &'static str, line: u64, column: u64) -> Box<Located<Expression>> {
    Box::new(test_loc(line, column, Expression::Variable(name.to_string())))
}

#[test]
fn test_expr_binary_precedence() {
    assert_eq!(
        expr_from_str("a + b"),
        test_loc(
            1,
            1,
            Expression::BinaryOperation(BinOp::Add, bexp_var("a", 1, 1), bexp_var("b", 1, 5))
        )
    );
    assert_eq!(
        expr_from_str("a-b+c"),
        test_loc(
            1,
            1,
            Expression::BinaryOperation(
                BinOp::Add,
                Box::new(test_loc(
                    1,
                    1,
                    Expression::BinaryOperation(
                        BinOp::Subtract,
                        bexp_var("a", 1, 1),
                        bexp_var("b", 1, 3)
                    )
                )),
                bexp_var("c", 1, 5)
            )
        )
    );
    assert_eq!(
        expr_from_str("a-b*c"),
        test_loc(
            1,
            1,
            Expression::BinaryOperation(
                BinOp::Subtract,
                bexp_var("a", 1, 1),
                Box::new(test_loc(
                    1,
                    3,
                    Expression::BinaryOperation(
                        BinOp::Multiply,
                        bexp_var("b", 1, 3),
                        bexp_var("c", 1, 5)
                    )
                ))
            )
        )
    );
}

#[test]
fn test_expr_postfix_and_member() {
    assert_eq!(
        expr_from_str("a.b"),
        test_loc(
            1,
            1,
            Expression::Member(bexp_var("a", 1, 1), "b".to_string())
        )
    );
    assert_eq!(
        expr_from_str("f(x)[0]"),
        test_loc(
            1,
            1,
            Expression::ArraySubscript(
                Box::new(test_loc(
                    1,
                    1,
                    Expression::Call(
                        bexp_var("f", 1, 1),
                        vec![test_loc(1, 3, Expression::Variable("x".to_string()))]
                    )
                )),
                Box::new(test_loc(
                    1,
                    6,
                    Expression::Literal(Literal::UntypedInt(0))
                ))
            )
        )
    );
}

#[test]
fn test_expr_ternary_and_assignment() {
    // Ternary is right-associative
    match expr_from_str("a ? b : c ? d : e").node {
        Expression::TernaryConditional(_, _, alt) => match alt.node {
            Expression::TernaryConditional(_, _, _) => {}
            other => panic!("expected nested ternary: {:?}", other),
        },
        other => panic!("expected ternary: {:?}", other),
    }
    // Assignment is right-associative
    match expr_from_str("a = b = c").node {
        Expression::BinaryOperation(BinOp::Assignment, _, rhs) => match rhs.node {
            Expression::BinaryOperation(BinOp::Assignment, _, _) => {}
            other => panic!("expected nested assignment: {:?}", other),
        },
        other => panic!("expected assignment: {:?}", other),
    }
    match expr_from_str("a += b").node {
        Expression::BinaryOperation(BinOp::SumAssignment, _, _) => {}
        other => panic!("expected compound assignment: {:?}", other),
    }
}

#[test]
fn test_expr_shift_and_boolean() {
    match expr_from_str("a<<b").node {
        Expression::BinaryOperation(BinOp::LeftShift, _, _) => {}
        other => panic!("expected shift: {:?}", other),
    }
    match expr_from_str("a<b").node {
        Expression::BinaryOperation(BinOp::LessThan, _, _) => {}
        other => panic!("expected comparison: {:?}", other),
    }
    match expr_from_str("a<=b").node {
        Expression::BinaryOperation(BinOp::LessEqual, _, _) => {}
        other => panic!("expected comparison: {:?}", other),
    }
    match expr_from_str("a&&b || c").node {
        Expression::BinaryOperation(BinOp::BooleanOr, lhs, _) => match lhs.node {
            Expression::BinaryOperation(BinOp::BooleanAnd, _, _) => {}
            other => panic!("expected boolean and: {:?}", other),
        },
        other => panic!("expected boolean or: {:?}", other),
    }
}

#[test]
fn test_expr_numeric_constructor() {
    match expr_from_str("float4(x, y, z, 1.0f)").node {
        Expression::NumericConstructor(DataType::Float4, args) => assert_eq!(args.len(), 4),
        other => panic!("expected constructor: {:?}", other),
    }
}

#[test]
fn test_expr_cast() {
    match expr_from_str("(float3)n").node {
        Expression::Cast(Type(TypeDenoter::Base(DataType::Float3), _), _) => {}
        other => panic!("expected cast: {:?}", other),
    }
    // A parenthesised variable is not a cast
    match expr_from_str("(n)").node {
        Expression::Variable(name) => assert_eq!(name, "n"),
        other => panic!("expected variable: {:?}", other),
    }
}

#[test]
fn test_parse_global_matrix() {
    let module = parse_str_clean("float4x4 M;\n");
    match module.root_definitions[0] {
        RootDefinition::GlobalVariable(ref gv) => {
            let denoter = &(gv.global_type.0).0;
            assert_eq!(*denoter, TypeDenoter::Base(DataType::Float4x4));
            assert!(denoter.is_matrix());
            assert_eq!(gv.defs[0].name.node, "M");
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_parse_struct_and_variable() {
    let module = parse_str_clean("struct V { float3 p; };\nV v;\n");
    assert_eq!(module.root_definitions.len(), 2);
    match module.root_definitions[1] {
        RootDefinition::GlobalVariable(ref gv) => match (gv.global_type.0).0 {
            TypeDenoter::Struct(ref denoter) => {
                assert_eq!(denoter.ident, "V");
                // Binding happens in the resolve pass
                assert_eq!(denoter.struct_decl, None);
            }
            ref other => panic!("expected struct denoter: {:?}", other),
        },
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_parse_struct_with_declarator() {
    let module = parse_str_clean("struct V { float3 p; } v;\n");
    assert_eq!(module.root_definitions.len(), 2);
    match module.root_definitions[1] {
        RootDefinition::GlobalVariable(ref gv) => match (gv.global_type.0).0 {
            TypeDenoter::Struct(ref denoter) => {
                // Bound directly to the definition it rides on
                assert_eq!(denoter.struct_decl, Some(StructDeclId(0)));
            }
            ref other => panic!("expected struct denoter: {:?}", other),
        },
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_parse_typedef_array() {
    let module = parse_str_clean("typedef float4 Color;\nColor c[3][2];\n");
    match module.root_definitions[1] {
        RootDefinition::GlobalVariable(ref gv) => {
            let base = &(gv.global_type.0).0;
            let denoter = gv.defs[0].bind.apply(base);
            match denoter {
                TypeDenoter::Array(ref array) => {
                    assert_eq!(array.dims.len(), 2);
                    assert_eq!(array.dims[0].constant_value(), Some(3));
                    assert_eq!(array.dims[1].constant_value(), Some(2));
                    assert!(array.inner.is_alias());
                    assert_eq!(array.inner.ident(), "Color");
                }
                ref other => panic!("expected array denoter: {:?}", other),
            }
            assert_eq!(denoter.to_string(), "Color[][]");
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_parse_constant_buffer() {
    let module = parse_str_clean(
        "cbuffer Globals : register(b0)\n{\n    float4x4 world;\n    float4 tint : packoffset(c4.x);\n}\n",
    );
    match module.root_definitions[0] {
        RootDefinition::ConstantBuffer(ref cb) => {
            assert_eq!(cb.buffer_type, UniformBufferType::ConstantBuffer);
            assert_eq!(cb.name.node, "Globals");
            assert_eq!(cb.slot, Some(ConstantSlot(0)));
            assert_eq!(cb.members.len(), 2);
            assert_eq!(
                cb.members[1].defs[0].offset,
                Some(OffsetSlot(4, PackSubOffset::X))
            );
        }
        ref other => panic!("expected constant buffer: {:?}", other),
    }
}

#[test]
fn test_parse_wrong_register_for_cbuffer() {
    let output = parse_str("cbuffer Globals : register(t0) { float4 x; }\n");
    assert!(output.diagnostics.has_errors());
}

#[test]
fn test_parse_resources() {
    let module = parse_str_clean(
        "struct BufType { int i; float f; };\nStructuredBuffer<BufType> Buffer0 : register(t0);\nRWStructuredBuffer<BufType> BufferOut : register(u0);\nTexture2D<float4> tex;\nSamplerState samp : register(s0);\n",
    );
    assert_eq!(module.root_definitions.len(), 5);
    match module.root_definitions[1] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(
                (gv.global_type.0).0,
                TypeDenoter::Buffer(BufferType::StructuredBuffer)
            );
            assert_eq!(gv.defs[0].slot, Some(GlobalSlot::ReadSlot(0)));
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
    match module.root_definitions[3] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(
                (gv.global_type.0).0,
                TypeDenoter::Texture(TextureType::Texture2D)
            );
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
    match module.root_definitions[4] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(
                (gv.global_type.0).0,
                TypeDenoter::Sampler(SamplerType::SamplerState)
            );
            assert_eq!(gv.defs[0].slot, Some(GlobalSlot::SamplerSlot(0)));
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_parse_function() {
    let module = parse_str_clean(
        "float4 main(float3 position : POSITION, in float2 uv : TEXCOORD0) : SV_Target\n{\n    if (uv.x > 0.5f)\n    {\n        discard;\n    }\n    float brightness = 1.0f;\n    for (int i = 0; i < 4; ++i)\n    {\n        brightness *= 0.5f;\n    }\n    do { brightness += 0.1f; } while (brightness < 1.0f);\n    return float4(position * brightness, 1.0f);\n}\n",
    );
    match module.root_definitions[0] {
        RootDefinition::Function(ref function) => {
            assert_eq!(function.name.node, "main");
            assert_eq!(function.params.len(), 2);
            assert_eq!(function.params[0].semantic, Some(Semantic("POSITION".to_string())));
            assert_eq!(function.params[1].param_type.1, InputModifier::In);
            assert_eq!(function.semantic, Some(Semantic("SV_Target".to_string())));
            assert_eq!(function.body.len(), 5);
        }
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn test_parse_numthreads_attribute() {
    let module = parse_str_clean("[numthreads(8, 8, 1)]\nvoid CSMain(uint3 id : SV_DispatchThreadID)\n{\n}\n");
    match module.root_definitions[0] {
        RootDefinition::Function(ref function) => {
            assert_eq!(function.attributes.len(), 1);
            assert!(matches!(
                function.attributes[0],
                FunctionAttribute::NumThreads(_, _, _)
            ));
        }
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn test_parse_switch() {
    let module = parse_str_clean(
        "void f(int x)\n{\n    switch (x)\n    {\n    case 0:\n        break;\n    case 1:\n    case 2:\n        return;\n    default:\n        break;\n    }\n}\n",
    );
    match module.root_definitions[0] {
        RootDefinition::Function(ref function) => match function.body[0] {
            Statement::Switch(_, ref cases) => {
                assert_eq!(cases.len(), 4);
                assert!(matches!(cases[0].label, SwitchLabel::Case(_)));
                assert_eq!(cases[1].statements.len(), 0);
                assert!(matches!(cases[3].label, SwitchLabel::Default));
            }
            ref other => panic!("expected switch: {:?}", other),
        },
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn test_parse_technique() {
    let module = parse_str_clean(
        "technique Default\n{\n    pass P0\n    {\n        VertexShader = compile vs_2_0 VS();\n        AlphaBlendEnable = 1;\n    }\n}\n",
    );
    match module.root_definitions[0] {
        RootDefinition::Technique(ref technique) => {
            assert_eq!(technique.name.as_ref().unwrap().node, "Default");
            assert_eq!(technique.passes.len(), 1);
            let pass = &technique.passes[0];
            assert_eq!(pass.states.len(), 2);
            assert!(matches!(
                pass.states[0].value,
                PassStateValue::Compile { ref profile, .. } if profile == "vs_2_0"
            ));
        }
        ref other => panic!("expected technique: {:?}", other),
    }
}

#[test]
fn test_parse_reserved_identifier() {
    let output = parse_str("int template = 0;\n");
    assert!(output.diagnostics.has_errors());
    let message = output.diagnostics.iter().next().unwrap().message.clone();
    assert!(message.contains("template"), "message: {}", message);
}

#[test]
fn test_parse_error_recovery() {
    // The bad declaration is reported and skipped, the rest parses
    let output = parse_str("int a = ;\nfloat b;\n");
    assert!(output.diagnostics.has_errors());
    assert_eq!(output.module.root_definitions.len(), 1);
    match output.module.root_definitions[0] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(gv.defs[0].name.node, "b");
        }
        ref other => panic!("expected global variable: {:?}", other),
    }

    // Recovery inside a function body keeps the surrounding function
    let output = parse_str("void f()\n{\n    int x = ;\n    int y = 1;\n}\nfloat g;\n");
    assert!(output.diagnostics.has_errors());
    assert_eq!(output.module.root_definitions.len(), 2);
    match output.module.root_definitions[0] {
        RootDefinition::Function(ref function) => {
            assert_eq!(function.body.len(), 1);
        }
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn test_parse_unknown_type_diagnostic() {
    let output = parse_str("Missing m;\n");
    assert!(output.diagnostics.has_errors());
    assert_eq!(output.module.root_definitions.len(), 0);
}
