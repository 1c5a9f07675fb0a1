use nom::{error::ErrorKind, IResult, Needed};
use rfx_lang_htk::*;
use rfx_shared::*;
use rfx_transform_preprocess::PreprocessedText;
use thiserror::Error;

#[derive(PartialEq, Clone, Error)]
pub enum LexError {
    #[error("unknown lexer error")]
    Unknown,
    #[error("failed to parse tokens")]
    FailedToParse(Vec<u8>, FileLocation),
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
}

impl LexError {
    pub fn location(&self) -> FileLocation {
        match *self {
            LexError::FailedToParse(_, ref loc) => loc.clone(),
            _ => FileLocation::none(),
        }
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            LexError::Unknown => write!(f, "Unknown"),
            LexError::FailedToParse(ref data, ref loc) => match std::str::from_utf8(data) {
                Ok(friendly) => {
                    let substr = match friendly.find('\n') {
                        Some(index) => &friendly[..index],
                        None => friendly,
                    };
                    write!(f, "FailedToParse(\"{}\" at {})", substr, loc)
                }
                Err(_) => write!(f, "FailedToParse({:?} at {})", data, loc),
            },
            LexError::UnexpectedEndOfStream => write!(f, "UnexpectedEndOfStream"),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
struct IntermediateLocation(u64);

#[derive(PartialEq, Debug, Clone)]
struct IntermediateToken(Token, IntermediateLocation);

#[derive(PartialEq, Debug, Clone)]
struct StreamToken(pub Token, pub StreamLocation);

/// Parse a single decimal digit
fn digit(input: &[u8]) -> IResult<&[u8], u64> {
    if input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )));
    }
    match input[0] {
        b @ b'0'..=b'9' => Ok((&input[1..], (b - b'0') as u64)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse multiple decimal digits into a 64-bit value
fn digits(input: &[u8]) -> IResult<&[u8], u64> {
    let (mut input, mut value) = digit(input)?;
    while let Ok((next_input, d)) = digit(input) {
        input = next_input;
        value = value * 10 + d;
    }
    Ok((input, value))
}

#[test]
fn test_digits() {
    let p = digits;
    assert_eq!(p(b"086"), Ok((&b""[..], 86)));
    assert_eq!(p(b"086;"), Ok((&b";"[..], 86)));
}

/// Parse a single hexadecimal digit
fn digit_hex(input: &[u8]) -> IResult<&[u8], u64> {
    if input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )));
    }
    let n = match input[0] {
        b @ b'0'..=b'9' => (b - b'0') as u64,
        b @ b'a'..=b'f' => (b - b'a') as u64 + 10,
        b @ b'A'..=b'F' => (b - b'A') as u64 + 10,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Tag,
            )))
        }
    };
    Ok((&input[1..], n))
}

/// Parse multiple hexadecimal digits into a 64-bit value
fn digits_hex(input: &[u8]) -> IResult<&[u8], u64> {
    let (mut input, mut value) = digit_hex(input)?;
    while let Ok((next_input, d)) = digit_hex(input) {
        input = next_input;
        value = value * 16 + d;
    }
    Ok((input, value))
}

#[test]
fn test_digits_hex() {
    let p = digits_hex;
    assert_eq!(p(b"08a"), Ok((&b""[..], 138)));
    assert_eq!(p(b"08a;"), Ok((&b";"[..], 138)));
}

/// Parse a single octal digit
fn digit_octal(input: &[u8]) -> IResult<&[u8], u64> {
    if input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )));
    }
    match input[0] {
        b @ b'0'..=b'7' => Ok((&input[1..], (b - b'0') as u64)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse multiple octal digits into a 64-bit value
fn digits_octal(input: &[u8]) -> IResult<&[u8], u64> {
    let (mut input, mut value) = digit_octal(input)?;
    while let Ok((next_input, d)) = digit_octal(input) {
        input = next_input;
        value = value * 8 + d;
    }
    Ok((input, value))
}

/// Integer literal type
enum IntType {
    UInt,
    Long,
}

/// Parse an integer literal suffix
fn int_type(input: &[u8]) -> IResult<&[u8], IntType> {
    let n = match input.first() {
        Some(b'u') | Some(b'U') => IntType::UInt,
        Some(b'l') | Some(b'L') => IntType::Long,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Tag,
            )));
        }
    };
    Ok((&input[1..], n))
}

fn int_token(value: u64, int_type_opt: Option<IntType>) -> Token {
    match int_type_opt {
        None => Token::LiteralInt(value),
        Some(IntType::UInt) => Token::LiteralUInt(value),
        Some(IntType::Long) => Token::LiteralLong(value),
    }
}

/// Parse an integer literal
fn literal_int(input: &[u8]) -> IResult<&[u8], Token> {
    if input.starts_with(b"0x") || input.starts_with(b"0X") {
        let (input, value) = digits_hex(&input[2..])?;
        let (input, int_type_opt) = nom::combinator::opt(int_type)(input)?;
        Ok((input, int_token(value, int_type_opt)))
    } else if input.starts_with(b"0") && digit_octal(&input[1..]).is_ok() {
        let (input, value) = digits_octal(&input[1..])?;
        let (input, int_type_opt) = nom::combinator::opt(int_type)(input)?;
        Ok((input, int_token(value, int_type_opt)))
    } else {
        let (input, value) = digits(input)?;
        let (input, int_type_opt) = nom::combinator::opt(int_type)(input)?;
        Ok((input, int_token(value, int_type_opt)))
    }
}

#[test]
fn test_literal_int() {
    let p = literal_int;
    assert_eq!(p(b"0u"), Ok((&b""[..], Token::LiteralUInt(0))));
    assert_eq!(p(b"0 "), Ok((&b" "[..], Token::LiteralInt(0))));
    assert_eq!(p(b"12 "), Ok((&b" "[..], Token::LiteralInt(12))));
    assert_eq!(p(b"12u"), Ok((&b""[..], Token::LiteralUInt(12))));
    assert_eq!(p(b"12l"), Ok((&b""[..], Token::LiteralLong(12))));
    assert_eq!(p(b"12L"), Ok((&b""[..], Token::LiteralLong(12))));
    assert_eq!(p(b"0x3 "), Ok((&b" "[..], Token::LiteralInt(3))));
    assert_eq!(p(b"0xA1 "), Ok((&b" "[..], Token::LiteralInt(161))));
    assert_eq!(p(b"0xA1u"), Ok((&b""[..], Token::LiteralUInt(161))));
    assert_eq!(p(b"0123u"), Ok((&b""[..], Token::LiteralUInt(83))));
}

type DigitSequence = Vec<u64>;

/// Parse a sequence of digits into an array
fn digit_sequence(input: &[u8]) -> IResult<&[u8], DigitSequence> {
    nom::multi::many1(digit)(input)
}

#[derive(PartialEq, Debug, Clone)]
struct Fraction(DigitSequence, DigitSequence);

/// Parse the main fractional parts of a float literal
fn fractional_constant(input: &[u8]) -> IResult<&[u8], Fraction> {
    let (input, whole_part) = nom::combinator::opt(digit_sequence)(input)?;
    let (input, _) = nom::bytes::complete::tag(".")(input)?;

    // If there was not a whole part then the fractional part is mandatory
    let (input, fractional_part) = if whole_part.is_none() {
        nom::combinator::map(digit_sequence, Some)(input)?
    } else {
        nom::combinator::opt(digit_sequence)(input)?
    };

    let whole_part = whole_part.unwrap_or_default();
    let fractional_part = fractional_part.unwrap_or_default();

    Ok((input, Fraction(whole_part, fractional_part)))
}

/// Float literal type
enum FloatType {
    Half,
    Float,
    Double,
}

/// Parse a float literal suffix
fn float_type(input: &[u8]) -> IResult<&[u8], FloatType> {
    let n = match input.first() {
        Some(b'h') | Some(b'H') => FloatType::Half,
        Some(b'f') | Some(b'F') => FloatType::Float,
        Some(b'l') | Some(b'L') => FloatType::Double,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Tag,
            )));
        }
    };
    Ok((&input[1..], n))
}

/// Sign marker
enum Sign {
    Positive,
    Negative,
}

/// Parse a sign marker
fn sign(input: &[u8]) -> IResult<&[u8], Sign> {
    match input.first() {
        Some(b'+') => Ok((&input[1..], Sign::Positive)),
        Some(b'-') => Ok((&input[1..], Sign::Negative)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Exponent value
#[derive(PartialEq, Debug, Clone)]
struct Exponent(i64);

/// Parse an exponent in a float literal
fn float_exponent(input: &[u8]) -> IResult<&[u8], Exponent> {
    // Use streaming tag so we return incomplete on empty streams
    // Float parsing code currently relies on this to not error when there is not an exponent
    use nom::bytes::streaming::tag;
    let (input, _) = nom::branch::alt((tag("e"), tag("E")))(input)?;
    let (input, s_opt) = nom::combinator::opt(sign)(input)?;
    let (input, exponent) = digits(input)?;
    let exponent = match s_opt {
        Some(Sign::Negative) => -(exponent as i64),
        _ => exponent as i64,
    };
    Ok((input, Exponent(exponent)))
}

#[test]
fn test_exponent() {
    let p = float_exponent;
    assert_eq!(p(b"E0"), Ok((&b""[..], Exponent(0))));
    assert_eq!(p(b"E+8"), Ok((&b""[..], Exponent(8))));
    assert_eq!(p(b"E-45"), Ok((&b""[..], Exponent(-45))));
    assert_eq!(p(b""), Err(nom::Err::Incomplete(nom::Needed::new(1))));
}

/// Build a float literal token from each part of literal
fn calculate_float_from_parts(
    left: DigitSequence,
    right: DigitSequence,
    exponent: i64,
    float_type: Option<FloatType>,
) -> Token {
    let mut left_combined = 0f64;
    for digit in left {
        left_combined = left_combined * 10f64 + digit as f64;
    }

    let mut right_combined = 0f64;
    let right_len = right.len();
    for digit in right {
        right_combined = right_combined * 10f64 + digit as f64;
    }
    let mut right_float = right_combined;
    for _ in 0..right_len {
        right_float /= 10f64;
    }

    let mantissa = left_combined + right_float;
    let mut value64 = mantissa;
    if exponent > 0 {
        for _ in 0..exponent {
            value64 *= 10f64;
        }
    } else {
        for _ in 0..(-exponent) {
            value64 /= 10f64;
        }
    }

    match float_type.unwrap_or(FloatType::Float) {
        FloatType::Half => Token::LiteralHalf(value64 as f32),
        FloatType::Float => Token::LiteralFloat(value64 as f32),
        FloatType::Double => Token::LiteralDouble(value64),
    }
}

/// Parse a float literal
fn literal_float(input: &[u8]) -> IResult<&[u8], Token> {
    let (input, fraction) = nom::combinator::opt(fractional_constant)(input)?;

    let has_fraction = fraction.is_some();
    let (input, fraction) = match fraction {
        Some(f) => (input, f),
        None => {
            let (input, whole_number) = digit_sequence(input)?;
            (input, Fraction(whole_number, Vec::new()))
        }
    };

    let (input, exponent_opt) = nom::combinator::opt(float_exponent)(input)?;

    // If we did not have a fractional part then we require the exponent, else
    // integers would parse as valid floats
    if !has_fraction && exponent_opt.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(
            &b"."[..],
            nom::error::ErrorKind::Not,
        )));
    }

    let (input, float_type) = nom::combinator::opt(float_type)(input)?;

    let Exponent(exp) = exponent_opt.unwrap_or(Exponent(0));
    let Fraction(left, right) = fraction;
    let token = calculate_float_from_parts(left, right, exp, float_type);

    Ok((input, token))
}

#[test]
fn test_literal_float() {
    let p = literal_float;
    assert_eq!(p(b"0.0f"), Ok((&b""[..], Token::LiteralFloat(0.0))));
    assert_eq!(p(b"2.7h"), Ok((&b""[..], Token::LiteralHalf(2.7))));
    assert_eq!(p(b"9.7L"), Ok((&b""[..], Token::LiteralDouble(9.7))));
    assert_eq!(p(b"0.f"), Ok((&b""[..], Token::LiteralFloat(0.0))));
    assert_eq!(p(b".0f"), Ok((&b""[..], Token::LiteralFloat(0.0))));
    assert_eq!(p(b"7E-7"), Ok((&b""[..], Token::LiteralFloat(7e-7))));
    assert_eq!(p(b"1e+11"), Ok((&b""[..], Token::LiteralFloat(1e+11))));
    assert_eq!(
        p(b"4.863e+11"),
        Ok((&b""[..], Token::LiteralFloat(4.863e+11)))
    );
    assert!(p(b"0").is_err());
}

/// Decode a string literal with escape sequences
fn literal_string(input: &[u8]) -> IResult<&[u8], Token> {
    if input.first() != Some(&b'"') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )));
    }
    let mut decoded = String::new();
    let mut rest = &input[1..];
    loop {
        match rest.first() {
            Some(&b'"') => return Ok((&rest[1..], Token::LiteralString(decoded))),
            Some(&b'\\') => {
                let escaped = match rest.get(1) {
                    Some(&b'n') => '\n',
                    Some(&b't') => '\t',
                    Some(&b'r') => '\r',
                    Some(&b'0') => '\0',
                    Some(&b'\\') => '\\',
                    Some(&b'"') => '"',
                    Some(&b'\'') => '\'',
                    // A bad escape sequence is a hard lexical error
                    _ => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            rest,
                            ErrorKind::Escaped,
                        )))
                    }
                };
                decoded.push(escaped);
                rest = &rest[2..];
            }
            Some(&b'\n') | None => {
                // Unterminated string literals are fatal
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Eof,
                )));
            }
            Some(&c) => {
                decoded.push(c as char);
                rest = &rest[1..];
            }
        }
    }
}

#[test]
fn test_literal_string() {
    let p = literal_string;
    assert_eq!(
        p(b"\"hello\" "),
        Ok((&b" "[..], Token::LiteralString("hello".to_string())))
    );
    assert_eq!(
        p(b"\"a\\n\\\"b\\\"\""),
        Ok((&b""[..], Token::LiteralString("a\n\"b\"".to_string())))
    );
    assert!(matches!(p(b"\"oops"), Err(nom::Err::Failure(_))));
    assert!(matches!(p(b"\"bad \\q\""), Err(nom::Err::Failure(_))));
}

fn identifier_firstchar(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Register class for a resource
enum RegisterType {
    T,
    U,
    B,
    S,
}

/// Parse the parenthesised part of a register annotation
fn register_args(input: &[u8]) -> IResult<&[u8], Token> {
    use nom::bytes::complete::tag;
    let (input, _) = skip_whitespace(input)?;
    let (input, _) = tag("(")(input)?;
    let (input, _) = skip_whitespace(input)?;
    let (input, slot_type) = {
        let slot_type = match input.first() {
            Some(b't') => RegisterType::T,
            Some(b'u') => RegisterType::U,
            Some(b'b') => RegisterType::B,
            Some(b's') => RegisterType::S,
            _ => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Tag,
                )))
            }
        };
        (&input[1..], slot_type)
    };
    let (input, num) = digits(input)?;
    let (input, _) = skip_whitespace(input)?;
    let (input, _) = tag(")")(input)?;

    let token = Token::Register(match slot_type {
        RegisterType::T => RegisterSlot::T(num as u32),
        RegisterType::U => RegisterSlot::U(num as u32),
        RegisterType::B => RegisterSlot::B(num as u32),
        RegisterType::S => RegisterSlot::S(num as u32),
    });

    Ok((input, token))
}

/// Parse the parenthesised part of a packoffset annotation
fn packoffset_args(input: &[u8]) -> IResult<&[u8], Token> {
    use nom::bytes::complete::tag;
    let (input, _) = skip_whitespace(input)?;
    let (input, _) = tag("(")(input)?;
    let (input, _) = skip_whitespace(input)?;
    let (input, _) = tag("c")(input)?;
    let (input, num) = digits(input)?;
    let (input, component) = match input.first() {
        Some(b'.') => {
            let component = match input.get(1) {
                Some(b'x') => PackSubOffset::X,
                Some(b'y') => PackSubOffset::Y,
                Some(b'z') => PackSubOffset::Z,
                Some(b'w') => PackSubOffset::W,
                _ => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        ErrorKind::Tag,
                    )))
                }
            };
            (&input[2..], component)
        }
        _ => (input, PackSubOffset::None),
    };
    let (input, _) = skip_whitespace(input)?;
    let (input, _) = tag(")")(input)?;

    Ok((input, Token::PackOffset(OffsetSlot(num as u32, component))))
}

/// Parse an identifier run and classify it through the keyword table
fn identifier_or_keyword(input: &[u8]) -> IResult<&[u8], Token> {
    if input.is_empty() {
        return Err(nom::Err::Incomplete(Needed::new(1)));
    }
    if !identifier_firstchar(input[0]) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )));
    }
    let mut end = 1;
    while end < input.len() && identifier_char(input[end]) {
        end += 1;
    }
    let spelling = std::str::from_utf8(&input[..end]).unwrap();
    let rest = &input[end..];

    // register and packoffset carry their slot argument in the token
    match spelling {
        "register" => return register_args(rest),
        "packoffset" => return packoffset_args(rest),
        _ => {}
    }

    match keyword_token(spelling) {
        Some(token) => Ok((rest, token)),
        None => Ok((rest, Token::Id(Identifier(spelling.to_string())))),
    }
}

#[test]
fn test_identifier_or_keyword() {
    let p = identifier_or_keyword;
    assert_eq!(
        p(b"name"),
        Ok((&b""[..], Token::Id(Identifier("name".to_string()))))
    );
    assert_eq!(
        p(b"float4 "),
        Ok((&b" "[..], Token::VectorType(DataType::Float4)))
    );
    assert_eq!(
        p(b"dword3 "),
        Ok((&b" "[..], Token::VectorType(DataType::UInt3)))
    );
    assert_eq!(p(b"true"), Ok((&b""[..], Token::LiteralBool(true))));
    assert_eq!(
        p(b"structName"),
        Ok((&b""[..], Token::Id(Identifier("structName".to_string()))))
    );
    assert_eq!(p(b"struct "), Ok((&b" "[..], Token::Struct)));
    assert_eq!(
        p(b"template"),
        Ok((&b""[..], Token::Reserved(Identifier("template".to_string()))))
    );
    assert_eq!(
        p(b"register(t4)"),
        Ok((&b""[..], Token::Register(RegisterSlot::T(4))))
    );
    assert_eq!(
        p(b"register ( u1 ) ;"),
        Ok((&b" ;"[..], Token::Register(RegisterSlot::U(1))))
    );
    assert_eq!(
        p(b"packoffset(c2.y)"),
        Ok((
            &b""[..],
            Token::PackOffset(OffsetSlot(2, PackSubOffset::Y))
        ))
    );
    assert_eq!(
        p(b"packoffset(c0)"),
        Ok((
            &b""[..],
            Token::PackOffset(OffsetSlot(0, PackSubOffset::None))
        ))
    );
}

/// Parse trivial whitespace
fn whitespace_simple(input: &[u8]) -> IResult<&[u8], ()> {
    if input.is_empty() {
        Err(nom::Err::Incomplete(Needed::new(1)))
    } else {
        match input[0] {
            b' ' | b'\n' | b'\r' | b'\t' => Ok((&input[1..], ())),
            _ => Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Alt,
            ))),
        }
    }
}

/// Parse a line comment
fn line_comment(input: &[u8]) -> IResult<&[u8], ()> {
    if input.starts_with(b"//") {
        match input.iter().position(|c| *c == b'\n') {
            Some(len) => Ok((&input[len..], ())),
            None => Ok((&[], ())),
        }
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Eof,
        )))
    }
}

/// Parse a block comment
fn block_comment(input: &[u8]) -> IResult<&[u8], ()> {
    if input.starts_with(b"/*") {
        // Find the end of the block
        // We do not support nested blocks
        let mut search = &input[2..];
        loop {
            if search.len() < 2 {
                break;
            }
            if search.starts_with(b"*/") {
                return Ok((&search[2..], ()));
            }
            search = &search[1..];
        }

        // Comment goes off the end of the file
        Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Eof,
        )))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        )))
    }
}

/// Parse any kind of whitespace
fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let mut search = input;
    loop {
        search = match nom::branch::alt((whitespace_simple, line_comment, block_comment))(search) {
            Ok((input, ())) => input,
            Err(nom::Err::Failure(err)) => return Err(nom::Err::Failure(err)),
            Err(_) => break,
        }
    }

    if input == search {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alt,
        )))
    } else {
        Ok((search, ()))
    }
}

/// Parse any kind of white space or no whitespace
fn skip_whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (input, _) = nom::combinator::opt(whitespace)(input)?;
    Ok((input, ()))
}

#[test]
fn test_whitespace() {
    let complete = Ok((&[][..], ()));
    assert!(whitespace(b"").is_err());
    assert_eq!(whitespace(b" "), complete);
    assert_eq!(whitespace(b"//\n"), complete);
    assert_eq!(whitespace(b"// comment\n"), complete);
    assert_eq!(whitespace(b"/* comment */"), complete);
    assert_eq!(whitespace(b"/* line 1\n\t line 2\n\t line 3 */"), complete);
    assert_eq!(whitespace(b"/* line 1\n\t star *\n\t line 3 */"), complete);
}

/// Peek at what token is coming next unless there is whitespace
fn lookahead_token(input: &[u8]) -> IResult<&[u8], Option<Token>> {
    match token_no_whitespace_intermediate(input) {
        Ok((_, o)) => Ok((input, Some(o))),
        Err(_) => Ok((input, None)),
    }
}

/// Parse a < token
fn leftanglebracket(input: &[u8]) -> IResult<&[u8], Token> {
    match input.first() {
        Some(b'<') => {
            let input = &input[1..];
            let token = match lookahead_token(input)?.1 {
                Some(_) => Token::LeftAngleBracket(FollowedBy::Token),
                _ => Token::LeftAngleBracket(FollowedBy::Whitespace),
            };
            Ok((input, token))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a > token
fn rightanglebracket(input: &[u8]) -> IResult<&[u8], Token> {
    match input.first() {
        Some(b'>') => {
            let input = &input[1..];
            let token = match lookahead_token(input)?.1 {
                Some(_) => Token::RightAngleBracket(FollowedBy::Token),
                _ => Token::RightAngleBracket(FollowedBy::Whitespace),
            };
            Ok((input, token))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a = or == token
fn symbol_equals(input: &[u8]) -> IResult<&[u8], Token> {
    match input {
        [b'=', b'=', b'=', ..] => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Not,
        ))),
        [b'=', b'=', ..] => Ok((&input[2..], Token::DoubleEquals)),
        [b'=', ..] => Ok((&input[1..], Token::Equals)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a ! or != token
fn symbol_exclamation(input: &[u8]) -> IResult<&[u8], Token> {
    match input {
        [b'!', b'=', b'=', ..] => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Not,
        ))),
        [b'!', b'=', ..] => Ok((&input[2..], Token::ExclamationEquals)),
        [b'!', ..] => Ok((&input[1..], Token::ExclamationPoint)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a & token
fn symbol_ampersand(input: &[u8]) -> IResult<&[u8], Token> {
    match input.first() {
        Some(b'&') => {
            let input = &input[1..];
            let token = match lookahead_token(input)?.1 {
                Some(_) => Token::Ampersand(FollowedBy::Token),
                _ => Token::Ampersand(FollowedBy::Whitespace),
            };
            Ok((input, token))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a | token
fn symbol_verticalbar(input: &[u8]) -> IResult<&[u8], Token> {
    match input.first() {
        Some(b'|') => {
            let input = &input[1..];
            let token = match lookahead_token(input)?.1 {
                Some(_) => Token::VerticalBar(FollowedBy::Token),
                _ => Token::VerticalBar(FollowedBy::Whitespace),
            };
            Ok((input, token))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Tag,
        ))),
    }
}

/// Parse a symbol into a token
fn token_no_whitespace_symbols(input: &[u8]) -> IResult<&[u8], Token> {
    use nom::bytes::complete::tag;
    use nom::combinator::map;
    nom::branch::alt((
        map(tag(";"), |_| Token::Semicolon),
        map(tag(","), |_| Token::Comma),
        map(tag("+"), |_| Token::Plus),
        map(tag("-"), |_| Token::Minus),
        map(tag("/"), |_| Token::ForwardSlash),
        map(tag("%"), |_| Token::Percent),
        map(tag("*"), |_| Token::Asterix),
        symbol_verticalbar,
        symbol_ampersand,
        map(tag("^"), |_| Token::Hat),
        symbol_equals,
        map(tag("#"), |_| Token::Hash),
        map(tag("@"), |_| Token::At),
        symbol_exclamation,
        map(tag("~"), |_| Token::Tilde),
        map(tag("."), |_| Token::Period),
        map(tag(":"), |_| Token::Colon),
        map(tag("?"), |_| Token::QuestionMark),
    ))(input)
}

/// Parse any single non-whitespace token - without a location
fn token_no_whitespace_intermediate(input: &[u8]) -> IResult<&[u8], Token> {
    use nom::bytes::complete::tag;
    use nom::combinator::map;
    nom::branch::alt((
        // Literals and identifiers (keywords classify inside the identifier
        // parser via the keyword table)
        identifier_or_keyword,
        literal_float,
        literal_int,
        literal_string,
        // Scope markers
        map(tag("{"), |_| Token::LeftBrace),
        map(tag("}"), |_| Token::RightBrace),
        map(tag("("), |_| Token::LeftParen),
        map(tag(")"), |_| Token::RightParen),
        map(tag("["), |_| Token::LeftSquareBracket),
        map(tag("]"), |_| Token::RightSquareBracket),
        leftanglebracket,
        rightanglebracket,
        // Remaining symbols
        token_no_whitespace_symbols,
    ))(input)
}

/// Parse any single non-whitespace token - with a location
fn token_no_whitespace(input: &[u8]) -> IResult<&[u8], IntermediateToken> {
    let (remaining, token) = token_no_whitespace_intermediate(input)?;
    let intermediate_token = IntermediateToken(token, IntermediateLocation(input.len() as u64));
    Ok((remaining, intermediate_token))
}

/// Parse a single token
fn token(input: &[u8]) -> IResult<&[u8], IntermediateToken> {
    let (input, _) = skip_whitespace(input)?;
    let (input, token) = token_no_whitespace(input)?;
    let (input, _) = skip_whitespace(input)?;

    Ok((input, token))
}

/// Parse all tokens in a stream
fn token_stream(input: &[u8]) -> IResult<&[u8], Vec<StreamToken>> {
    let total_length = input.len() as u64;
    match nom::multi::many0(nom::combinator::complete(token))(input) {
        Ok((rest, itokens)) => {
            let tokens = itokens
                .into_iter()
                .map(|itoken| StreamToken(itoken.0, StreamLocation(total_length - (itoken.1).0)))
                .collect::<Vec<_>>();
            Ok((rest, tokens))
        }
        Err(err) => Err(err),
    }
}

/// Run the lexer on input text to turn it into a token stream
pub fn lex(preprocessed: &PreprocessedText) -> Result<Tokens, LexError> {
    let code_bytes = preprocessed.as_bytes();
    let total_length = code_bytes.len() as u64;

    let fail_location = |rest: &[u8]| {
        let stream_location = StreamLocation(total_length - rest.len() as u64);
        preprocessed
            .get_file_location(&stream_location)
            .unwrap_or(FileLocation::Unknown)
    };

    match token_stream(code_bytes) {
        Ok((rest, mut stream)) => {
            if rest.is_empty() {
                stream.push(StreamToken(Token::Eof, StreamLocation(total_length)));
                let mut lex_tokens = Vec::with_capacity(stream.len());
                for StreamToken(ref token, ref stream_location) in stream {
                    let loc = match preprocessed.get_file_location(stream_location) {
                        Ok(file_location) => file_location,
                        Err(()) => return Err(LexError::Unknown),
                    };
                    lex_tokens.push(LexToken(token.clone(), loc));
                }
                Ok(Tokens { stream: lex_tokens })
            } else {
                // Find the next point where we can find a valid token
                let mut after = rest;
                loop {
                    if after.is_empty() {
                        break;
                    }
                    after = &after[1..];

                    if let Ok((_, token)) = token_no_whitespace(after) {
                        if let IntermediateToken(Token::Id(_), _) = token {
                            // An identifier here would be a substring of a
                            // longer identifier that failed to lex
                        } else {
                            break;
                        }
                    }

                    if whitespace(after).is_ok() {
                        break;
                    }
                }

                let failing_bytes = rest[..rest.len() - after.len()].to_vec();
                Err(LexError::FailedToParse(failing_bytes, fail_location(rest)))
            }
        }
        Err(nom::Err::Incomplete(_)) => Err(LexError::UnexpectedEndOfStream),
        Err(nom::Err::Failure(err)) => {
            let rest = err.input;
            Err(LexError::FailedToParse(
                rest[..rest.len().min(16)].to_vec(),
                fail_location(rest),
            ))
        }
        Err(_) => Err(LexError::Unknown),
    }
}

#[cfg(test)]
fn lex_str(source: &str) -> Vec<Token> {
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single(source, FileName("lexer_test.hlsl".to_string()))
        .expect("preprocess failed");
    let tokens = lex(&text).expect("lex failed");
    tokens.stream.into_iter().map(|t| t.0).collect()
}

#[test]
fn test_token() {
    fn from_end(tok: Token, from: u64) -> IntermediateToken {
        IntermediateToken(tok, IntermediateLocation(from))
    }

    assert_eq!(token(&b""[..]), Err(nom::Err::Incomplete(Needed::new(1))));
    assert_eq!(
        token(&b";"[..]),
        Ok((&b""[..], from_end(Token::Semicolon, 1)))
    );
    assert_eq!(
        token(&b" ; "[..]),
        Ok((&b""[..], from_end(Token::Semicolon, 2)))
    );
    assert_eq!(
        token(&b"name"[..]),
        Ok((
            &b""[..],
            from_end(Token::Id(Identifier("name".to_string())), 4)
        ))
    );

    assert_eq!(
        token(&b"12 "[..]),
        Ok((&b""[..], from_end(Token::LiteralInt(12), 3)))
    );
    assert_eq!(
        token(&b"12u"[..]),
        Ok((&b""[..], from_end(Token::LiteralUInt(12), 3)))
    );
    assert_eq!(
        token(&b"12L"[..]),
        Ok((&b""[..], from_end(Token::LiteralLong(12), 3)))
    );
    assert_eq!(
        token(&b"1.0f"[..]),
        Ok((&b""[..], from_end(Token::LiteralFloat(1.0f32), 4)))
    );
    assert_eq!(
        token(&b"2.0L"[..]),
        Ok((&b""[..], from_end(Token::LiteralDouble(2.0f64), 4)))
    );
    assert_eq!(
        token(&b"0.5h"[..]),
        Ok((&b""[..], from_end(Token::LiteralHalf(0.5f32), 4)))
    );

    assert_eq!(
        token(&b"< "[..]),
        Ok((
            &b""[..],
            from_end(Token::LeftAngleBracket(FollowedBy::Whitespace), 2)
        ))
    );
    assert_eq!(
        token(&b"<< "[..]),
        Ok((
            &b"< "[..],
            from_end(Token::LeftAngleBracket(FollowedBy::Token), 3)
        ))
    );
    assert_eq!(
        token(&b">> "[..]),
        Ok((
            &b"> "[..],
            from_end(Token::RightAngleBracket(FollowedBy::Token), 3)
        ))
    );
    assert_eq!(
        token(&b"&& "[..]),
        Ok((&b"& "[..], from_end(Token::Ampersand(FollowedBy::Token), 3)))
    );
    assert_eq!(
        token(&b"|| "[..]),
        Ok((
            &b"| "[..],
            from_end(Token::VerticalBar(FollowedBy::Token), 3)
        ))
    );

    assert_eq!(token(&b"if"[..]), Ok((&b""[..], from_end(Token::If, 2))));
    assert_eq!(
        token(&b"discard"[..]),
        Ok((&b""[..], from_end(Token::Discard, 7)))
    );
    assert_eq!(
        token(&b"do"[..]),
        Ok((&b""[..], from_end(Token::Do, 2)))
    );
    assert_eq!(
        token(&b"typedef"[..]),
        Ok((&b""[..], from_end(Token::Typedef, 7)))
    );
    assert_eq!(
        token(&b"cbuffer"[..]),
        Ok((
            &b""[..],
            from_end(Token::UniformBuffer(UniformBufferType::ConstantBuffer), 7)
        ))
    );
    assert_eq!(
        token(&b"SamplerState"[..]),
        Ok((
            &b""[..],
            from_end(Token::Sampler(SamplerType::SamplerState), 12)
        ))
    );
    assert_eq!(
        token(&b"register(t4)"[..]),
        Ok((&b""[..], from_end(Token::Register(RegisterSlot::T(4)), 12)))
    );
    assert_eq!(
        token(&b"groupshared"[..]),
        Ok((
            &b""[..],
            from_end(Token::StorageClass(StorageClass::GroupShared), 11)
        ))
    );
    assert_eq!(
        token(&b"inout"[..]),
        Ok((
            &b""[..],
            from_end(Token::InputModifier(InputModifier::InOut), 5)
        ))
    );
    assert_eq!(
        token(&b"const"[..]),
        Ok((
            &b""[..],
            from_end(Token::TypeModifier(TypeModifierKeyword::Const), 5)
        ))
    );
}

#[test]
fn test_lex_stream() {
    use rfx_lang_htk::types::DataType;

    assert_eq!(
        lex_str("void func();\n"),
        vec![
            Token::Void,
            Token::Id(Identifier("func".to_string())),
            Token::LeftParen,
            Token::RightParen,
            Token::Semicolon,
            Token::Eof,
        ]
    );

    assert_eq!(
        lex_str("float4x4 M;\n"),
        vec![
            Token::MatrixType(DataType::Float4x4),
            Token::Id(Identifier("M".to_string())),
            Token::Semicolon,
            Token::Eof,
        ]
    );

    assert_eq!(
        lex_str("StructuredBuffer<BufType> Buffer0 : register(t0);\n"),
        vec![
            Token::StorageBuffer(BufferType::StructuredBuffer),
            Token::LeftAngleBracket(FollowedBy::Token),
            Token::Id(Identifier("BufType".to_string())),
            Token::RightAngleBracket(FollowedBy::Whitespace),
            Token::Id(Identifier("Buffer0".to_string())),
            Token::Colon,
            Token::Register(RegisterSlot::T(0)),
            Token::Semicolon,
            Token::Eof,
        ]
    );

    assert_eq!(
        lex_str("string s = \"hi\\n\";\n"),
        vec![
            Token::StringType,
            Token::Id(Identifier("s".to_string())),
            Token::Equals,
            Token::LiteralString("hi\n".to_string()),
            Token::Semicolon,
            Token::Eof,
        ]
    );

    // Comments and whitespace are skipped entirely
    assert_eq!(
        lex_str("int a; // trailing\n/* block */ int b;\n"),
        vec![
            Token::ScalarType(DataType::Int),
            Token::Id(Identifier("a".to_string())),
            Token::Semicolon,
            Token::ScalarType(DataType::Int),
            Token::Id(Identifier("b".to_string())),
            Token::Semicolon,
            Token::Eof,
        ]
    );
}

#[test]
fn test_lex_locations() {
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single("int a;\nint b;\n", FileName("loc.hlsl".to_string()))
        .expect("preprocess failed");
    let tokens = lex(&text).expect("lex failed");
    let file = FileName("loc.hlsl".to_string());
    assert_eq!(tokens.stream[0].1, FileLocation::new(file.clone(), 1, 1));
    assert_eq!(tokens.stream[1].1, FileLocation::new(file.clone(), 1, 5));
    assert_eq!(tokens.stream[2].1, FileLocation::new(file.clone(), 1, 6));
    assert_eq!(tokens.stream[3].1, FileLocation::new(file.clone(), 2, 1));
}

#[test]
fn test_lex_failure() {
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single("int a = $;\n", FileName("bad.hlsl".to_string()))
        .expect("preprocess failed");
    assert!(matches!(lex(&text), Err(LexError::FailedToParse(_, _))));
}
