use crate::condition_parser;
use crate::pptok::{self, PPToken, PPTokenKind};
use log::{debug, trace};
use rfx_shared::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(PartialEq, Debug, Clone, Error)]
pub enum PreprocessError {
    #[error("unknown preprocessor directive '#{0}'")]
    UnknownDirective(String, FileLocation),
    #[error("invalid #define directive")]
    InvalidDefine(FileLocation),
    #[error("macro '{name}' redefined with a different body")]
    MacroRedefinition {
        name: String,
        previous: FileLocation,
        redefinition: FileLocation,
    },
    #[error("macro function '{0}' requires arguments")]
    MacroRequiresArguments(String, FileLocation),
    #[error("arguments to macro '{0}' never end")]
    MacroArgumentsNeverEnd(String, FileLocation),
    #[error("macro '{name}' expects {expected} arguments but was given {found}")]
    MacroExpectsDifferentNumberOfArguments {
        name: String,
        expected: usize,
        found: usize,
        location: FileLocation,
    },
    #[error("invalid #include directive")]
    InvalidInclude(FileLocation),
    #[error("could not find file '{file_name}'")]
    FailedToFindFile {
        file_name: String,
        location: FileLocation,
        include_chain: Vec<FileLocation>,
    },
    #[error("file '{0}' is included recursively")]
    RecursiveInclude(String, FileLocation),
    #[error("#elif without matching #if")]
    UnexpectedElif(FileLocation),
    #[error("#elif after #else")]
    ElifAfterElse(FileLocation),
    #[error("#else without matching #if")]
    UnexpectedElse(FileLocation),
    #[error("#else after #else")]
    ElseAfterElse(FileLocation),
    #[error("#endif without matching #if")]
    UnexpectedEndif(FileLocation),
    #[error("unterminated #{0} block")]
    UnterminatedIfBlock(String, FileLocation),
    #[error("failed to parse condition: {0}")]
    FailedToParseIfCondition(String),
    #[error("division by zero in preprocessor condition")]
    DivisionByZero(FileLocation),
    #[error("invalid #line directive")]
    InvalidLineDirective(FileLocation),
    #[error("#error: {0}")]
    ErrorDirective(String, FileLocation),
    #[error("unterminated block comment")]
    UnterminatedBlockComment(FileLocation),
    #[error("unterminated string literal")]
    UnterminatedStringLiteral(FileLocation),
}

impl PreprocessError {
    /// The primary source location of the error, if it carries one
    pub fn location(&self) -> FileLocation {
        use self::PreprocessError::*;
        match *self {
            UnknownDirective(_, ref loc)
            | InvalidDefine(ref loc)
            | MacroRedefinition {
                redefinition: ref loc,
                ..
            }
            | MacroRequiresArguments(_, ref loc)
            | MacroArgumentsNeverEnd(_, ref loc)
            | MacroExpectsDifferentNumberOfArguments {
                location: ref loc, ..
            }
            | InvalidInclude(ref loc)
            | FailedToFindFile {
                location: ref loc, ..
            }
            | RecursiveInclude(_, ref loc)
            | UnexpectedElif(ref loc)
            | ElifAfterElse(ref loc)
            | UnexpectedElse(ref loc)
            | ElseAfterElse(ref loc)
            | UnexpectedEndif(ref loc)
            | UnterminatedIfBlock(_, ref loc)
            | DivisionByZero(ref loc)
            | InvalidLineDirective(ref loc)
            | ErrorDirective(_, ref loc)
            | UnterminatedBlockComment(ref loc)
            | UnterminatedStringLiteral(ref loc) => loc.clone(),
            FailedToParseIfCondition(_) => FileLocation::none(),
        }
    }
}

/// The output of the pre-processor: concrete source text with a map from
/// byte offsets back to locations in the original files
pub struct PreprocessedText {
    code: Vec<u8>,
    debug_locations: LineMap,
}

impl PreprocessedText {
    fn from_intermediate_text(text: IntermediateText) -> PreprocessedText {
        PreprocessedText {
            code: text.buffer.into_bytes(),
            debug_locations: text.debug_locations,
        }
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }
    pub fn as_str(&self) -> &str {
        // The buffer was built from str segments
        std::str::from_utf8(&self.code).expect("preprocessed text not utf-8")
    }
    pub fn get_file_location(&self, stream_location: &StreamLocation) -> Result<FileLocation, ()> {
        self.debug_locations.get_file_location(stream_location)
    }
}

struct IntermediateText {
    buffer: String,
    debug_locations: LineMap,
}

impl IntermediateText {
    fn new() -> IntermediateText {
        IntermediateText {
            buffer: String::new(),
            debug_locations: LineMap { lines: Vec::new() },
        }
    }

    fn push_str(&mut self, segment: &str, segment_location: FileLocation) {
        let parts = segment.split('\n');
        let last = parts.clone().count() - 1;
        for (index, part) in parts.enumerate() {
            let location = match segment_location {
                FileLocation::Known(ref file, Line(line), Column(column)) => {
                    if index == 0 {
                        FileLocation::Known(file.clone(), Line(line), Column(column))
                    } else {
                        FileLocation::Known(file.clone(), Line(line + index as u64), Column(1))
                    }
                }
                FileLocation::Unknown => FileLocation::Unknown,
            };
            let stream_location_in_buffer = StreamLocation(self.buffer.len() as u64);
            self.buffer.push_str(part);
            if index != last {
                self.buffer.push('\n');
            }
            self.debug_locations
                .lines
                .push((stream_location_in_buffer, location));
        }
    }
}

struct LineMap {
    lines: Vec<(StreamLocation, FileLocation)>,
}

impl LineMap {
    fn get_file_location(&self, stream_location: &StreamLocation) -> Result<FileLocation, ()> {
        let index = self
            .lines
            .partition_point(|&(StreamLocation(stream), _)| stream <= stream_location.0);
        if index == 0 {
            return Err(());
        }
        let (StreamLocation(segment_stream), ref segment_location) = self.lines[index - 1];
        match *segment_location {
            FileLocation::Known(ref file, line, Column(base_column)) => {
                let column = Column(base_column + (stream_location.0 - segment_stream));
                Ok(FileLocation::Known(file.clone(), line, column))
            }
            FileLocation::Unknown => Ok(FileLocation::Unknown),
        }
    }
}

/// A stored macro definition
#[derive(PartialEq, Debug, Clone)]
struct Macro {
    name: String,
    /// None for object-like macros. A zero-argument function-like macro is
    /// Some with an empty list.
    params: Option<Vec<String>>,
    body: Vec<PPToken>,
    location: FileLocation,
}

impl Macro {
    /// True when a redefinition is byte-identical and therefore allowed
    fn same_definition(&self, other: &Macro) -> bool {
        if self.params != other.params || self.body.len() != other.body.len() {
            return false;
        }
        self.body
            .iter()
            .zip(other.body.iter())
            .all(|(lhs, rhs)| lhs.kind == rhs.kind && lhs.text == rhs.text)
    }
}

/// One entry on the conditional-inclusion stack
struct IfBlock {
    directive: String,
    location: FileLocation,
    /// The current branch's body is emitted
    active: bool,
    /// Some branch of this group has already been taken
    any_active: bool,
    /// All enclosing blocks were active when this block was opened
    parent_active: bool,
    /// An #else has been seen, forbidding further #elif/#else
    expect_endif: bool,
}

/// Per-file processing state, tracking #line adjustments
struct FileState {
    file_name: FileName,
    line_delta: i64,
    file_override: Option<FileName>,
}

impl FileState {
    fn new(file_name: FileName) -> FileState {
        FileState {
            file_name,
            line_delta: 0,
            file_override: None,
        }
    }

    fn adjust(&self, location: &FileLocation) -> FileLocation {
        match *location {
            FileLocation::Known(ref file, Line(line), column) => {
                let line = std::cmp::max(line as i64 + self.line_delta, 1) as u64;
                let file = match self.file_override {
                    Some(ref name) => name.clone(),
                    None => file.clone(),
                };
                FileLocation::Known(file, Line(line), column)
            }
            FileLocation::Unknown => FileLocation::Unknown,
        }
    }
}

fn next_non_space(tokens: &[PPToken], mut from: usize) -> Option<usize> {
    while from < tokens.len() {
        if !tokens[from].is_space() {
            return Some(from);
        }
        from += 1;
    }
    None
}

fn trim_space(tokens: &[PPToken]) -> &[PPToken] {
    let start = tokens.iter().position(|tok| !tok.is_space());
    let start = match start {
        Some(start) => start,
        None => return &[],
    };
    let end = tokens.iter().rposition(|tok| !tok.is_space()).unwrap() + 1;
    &tokens[start..end]
}

struct Preprocessor<'a> {
    include_handler: &'a mut dyn IncludeHandler,
    macros: FxHashMap<String, Macro>,
    once_included: FxHashSet<FileName>,
    if_stack: Vec<IfBlock>,
    include_stack: Vec<(FileName, FileLocation)>,
    output: IntermediateText,
}

impl<'a> Preprocessor<'a> {
    fn new(include_handler: &'a mut dyn IncludeHandler) -> Preprocessor<'a> {
        Preprocessor {
            include_handler,
            macros: FxHashMap::default(),
            once_included: FxHashSet::default(),
            if_stack: Vec::new(),
            include_stack: Vec::new(),
            output: IntermediateText::new(),
        }
    }

    /// True if every block on the conditional stack has an active branch
    fn active(&self) -> bool {
        self.if_stack.iter().all(|block| block.active)
    }

    fn process_file(
        &mut self,
        contents: &str,
        file_name: FileName,
        include_location: FileLocation,
    ) -> Result<(), PreprocessError> {
        let tokens = pptok::scan(contents, file_name.clone())?;
        self.include_stack.push((file_name.clone(), include_location));
        let depth_at_entry = self.if_stack.len();
        let mut state = FileState::new(file_name);

        let result = self.process_tokens(&tokens, &mut state);

        if result.is_ok() && self.if_stack.len() != depth_at_entry {
            let block = &self.if_stack[self.if_stack.len() - 1];
            return Err(PreprocessError::UnterminatedIfBlock(
                block.directive.clone(),
                block.location.clone(),
            ));
        }
        self.include_stack.pop();
        result
    }

    fn process_tokens(
        &mut self,
        tokens: &[PPToken],
        state: &mut FileState,
    ) -> Result<(), PreprocessError> {
        let mut i = 0;
        let mut at_line_start = true;
        while i < tokens.len() {
            let tok = &tokens[i];
            match tok.kind {
                PPTokenKind::Hash if at_line_start => {
                    let start = i + 1;
                    let mut end = start;
                    while end < tokens.len() && tokens[end].kind != PPTokenKind::Newline {
                        end += 1;
                    }
                    self.handle_directive(&tokens[start..end], &tok.location, state)?;
                    // The directive line itself contributes one newline so
                    // later diagnostics keep their line numbers
                    if end < tokens.len() {
                        let newline_loc = state.adjust(&tokens[end].location);
                        self.output.push_str("\n", newline_loc);
                        i = end + 1;
                    } else {
                        i = end;
                    }
                    at_line_start = true;
                }
                PPTokenKind::Newline => {
                    // Newlines survive inactive regions to preserve numbering
                    self.output.push_str("\n", state.adjust(&tok.location));
                    at_line_start = true;
                    i += 1;
                }
                PPTokenKind::Whitespace | PPTokenKind::LineComment | PPTokenKind::BlockComment => {
                    if self.active() {
                        self.output
                            .push_str(&tok.text, state.adjust(&tok.location));
                    }
                    i += 1;
                }
                PPTokenKind::LineContinuation => {
                    // Collapses two physical lines into one logical line
                    i += 1;
                }
                PPTokenKind::Ident if self.active() => {
                    let mut active_macros = Vec::new();
                    match self.try_expand_at(tokens, i, &mut active_macros)? {
                        Some((expanded, next)) => {
                            let use_location = state.adjust(&tok.location);
                            for expanded_tok in &expanded {
                                self.output
                                    .push_str(&expanded_tok.text, use_location.clone());
                            }
                            // Newlines swallowed by a multi-line argument
                            // list are re-emitted to keep lines aligned
                            for consumed in &tokens[i..next] {
                                if consumed.kind == PPTokenKind::Newline {
                                    self.output
                                        .push_str("\n", state.adjust(&consumed.location));
                                }
                            }
                            i = next;
                        }
                        None => {
                            self.output
                                .push_str(&tok.text, state.adjust(&tok.location));
                            i += 1;
                        }
                    }
                    at_line_start = false;
                }
                _ => {
                    if self.active() {
                        self.output
                            .push_str(&tok.text, state.adjust(&tok.location));
                    }
                    at_line_start = false;
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn handle_directive(
        &mut self,
        line: &[PPToken],
        raw_location: &FileLocation,
        state: &mut FileState,
    ) -> Result<(), PreprocessError> {
        let location = state.adjust(raw_location);
        let name_index = match next_non_space(line, 0) {
            Some(index) => index,
            // A lone # is a null directive
            None => return Ok(()),
        };
        let name_tok = &line[name_index];
        if name_tok.kind != PPTokenKind::Ident {
            if !self.active() {
                return Ok(());
            }
            return Err(PreprocessError::UnknownDirective(
                name_tok.text.clone(),
                location,
            ));
        }
        let rest = &line[name_index + 1..];

        match &name_tok.text[..] {
            "if" => self.directive_if(rest, location, "if"),
            "ifdef" => self.directive_ifdef(rest, location, false),
            "ifndef" => self.directive_ifdef(rest, location, true),
            "elif" => self.directive_elif(rest, location),
            "else" => self.directive_else(location),
            "endif" => self.directive_endif(location),
            _ if !self.active() => Ok(()),
            "define" => self.directive_define(rest, location, state),
            "undef" => self.directive_undef(rest, location),
            "include" => self.directive_include(rest, location),
            "pragma" => self.directive_pragma(rest, state),
            "line" => self.directive_line(rest, raw_location, state),
            "error" => {
                let message: String = trim_space(rest)
                    .iter()
                    .map(|tok| tok.text.as_str())
                    .collect();
                Err(PreprocessError::ErrorDirective(message, location))
            }
            other => Err(PreprocessError::UnknownDirective(
                other.to_string(),
                location,
            )),
        }
    }

    fn directive_define(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
        _: &mut FileState,
    ) -> Result<(), PreprocessError> {
        let name_index = match next_non_space(rest, 0) {
            Some(index) if rest[index].kind == PPTokenKind::Ident => index,
            _ => return Err(PreprocessError::InvalidDefine(location)),
        };
        let name = rest[name_index].text.clone();

        // A parameter list only exists if the parenthesis directly follows
        // the name with no whitespace between
        let is_function_like = match rest.get(name_index + 1) {
            Some(tok) => tok.kind == PPTokenKind::Punct && tok.text == "(",
            None => false,
        };

        let (params, body_start) = if is_function_like {
            let mut params = Vec::new();
            let mut index = name_index + 2;
            // Empty parameter lists are permitted
            if let Some(close) = next_non_space(rest, index) {
                if rest[close].kind == PPTokenKind::Punct && rest[close].text == ")" {
                    index = close + 1;
                } else {
                    loop {
                        let param = match next_non_space(rest, index) {
                            Some(i) if rest[i].kind == PPTokenKind::Ident => i,
                            _ => return Err(PreprocessError::InvalidDefine(location)),
                        };
                        params.push(rest[param].text.clone());
                        let separator = match next_non_space(rest, param + 1) {
                            Some(i) if rest[i].kind == PPTokenKind::Punct => i,
                            _ => return Err(PreprocessError::InvalidDefine(location)),
                        };
                        index = separator + 1;
                        match &rest[separator].text[..] {
                            "," => continue,
                            ")" => break,
                            _ => return Err(PreprocessError::InvalidDefine(location)),
                        }
                    }
                }
            } else {
                return Err(PreprocessError::InvalidDefine(location));
            }
            (Some(params), index)
        } else {
            (None, name_index + 1)
        };

        // Line continuations inside the body behave as plain spacing
        let body: Vec<PPToken> = trim_space(&rest[body_start.min(rest.len())..])
            .iter()
            .map(|tok| {
                if tok.kind == PPTokenKind::LineContinuation {
                    PPToken {
                        kind: PPTokenKind::Whitespace,
                        text: " ".to_string(),
                        location: tok.location.clone(),
                    }
                } else {
                    tok.clone()
                }
            })
            .collect();

        let macro_def = Macro {
            name: name.clone(),
            params,
            body,
            location: location.clone(),
        };

        if let Some(existing) = self.macros.get(&name) {
            if existing.same_definition(&macro_def) {
                // Identical redefinition is silently accepted
                return Ok(());
            }
            return Err(PreprocessError::MacroRedefinition {
                name,
                previous: existing.location.clone(),
                redefinition: location,
            });
        }

        debug!("#define {}", name);
        self.macros.insert(name, macro_def);
        Ok(())
    }

    fn directive_undef(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
    ) -> Result<(), PreprocessError> {
        let name_index = match next_non_space(rest, 0) {
            Some(index) if rest[index].kind == PPTokenKind::Ident => index,
            _ => return Err(PreprocessError::InvalidDefine(location)),
        };
        // Removing an unknown macro is a no-op
        self.macros.remove(&rest[name_index].text);
        Ok(())
    }

    fn directive_include(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
    ) -> Result<(), PreprocessError> {
        let first = match next_non_space(rest, 0) {
            Some(index) => index,
            None => return Err(PreprocessError::InvalidInclude(location)),
        };

        let (file_name, use_system_search) = match rest[first].kind {
            PPTokenKind::StringLiteral => {
                let text = &rest[first].text;
                (text[1..text.len() - 1].to_string(), false)
            }
            PPTokenKind::Punct if rest[first].text == "<" => {
                let mut name = String::new();
                let mut closed = false;
                for tok in &rest[first + 1..] {
                    if tok.kind == PPTokenKind::Punct && tok.text == ">" {
                        closed = true;
                        break;
                    }
                    name.push_str(&tok.text);
                }
                if !closed {
                    return Err(PreprocessError::InvalidInclude(location));
                }
                (name, true)
            }
            _ => return Err(PreprocessError::InvalidInclude(location)),
        };

        let included = match self.include_handler.load(&file_name, use_system_search) {
            Ok(included) => included,
            Err(()) => {
                return Err(PreprocessError::FailedToFindFile {
                    file_name,
                    location,
                    include_chain: self
                        .include_stack
                        .iter()
                        .map(|&(_, ref loc)| loc.clone())
                        .collect(),
                })
            }
        };

        // A file marked #pragma once expands exactly once per compilation
        if self.once_included.contains(&included.file_name) {
            return Ok(());
        }
        if self
            .include_stack
            .iter()
            .any(|&(ref name, _)| *name == included.file_name)
        {
            return Err(PreprocessError::RecursiveInclude(file_name, location));
        }

        debug!("#include {}", included.file_name);
        self.process_file(&included.contents, included.file_name, location.clone())?;
        // Keep the last line of the included file separate from the text
        // that follows the #include
        self.output.push_str("\n", location);
        Ok(())
    }

    fn directive_if(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
        directive: &str,
    ) -> Result<(), PreprocessError> {
        let parent_active = self.active();
        // A statically dead branch is scanned only to balance directives
        let condition = if parent_active {
            self.evaluate_condition(rest, &location)?
        } else {
            false
        };
        self.if_stack.push(IfBlock {
            directive: directive.to_string(),
            location,
            active: parent_active && condition,
            any_active: condition,
            parent_active,
            expect_endif: false,
        });
        Ok(())
    }

    fn directive_ifdef(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
        negate: bool,
    ) -> Result<(), PreprocessError> {
        let parent_active = self.active();
        let condition = if parent_active {
            let name_index = match next_non_space(rest, 0) {
                Some(index) if rest[index].kind == PPTokenKind::Ident => index,
                _ => {
                    return Err(PreprocessError::FailedToParseIfCondition(
                        trim_space(rest)
                            .iter()
                            .map(|tok| tok.text.as_str())
                            .collect(),
                    ))
                }
            };
            self.macros.contains_key(&rest[name_index].text) != negate
        } else {
            false
        };
        self.if_stack.push(IfBlock {
            directive: if negate { "ifndef" } else { "ifdef" }.to_string(),
            location,
            active: parent_active && condition,
            any_active: condition,
            parent_active,
            expect_endif: false,
        });
        Ok(())
    }

    fn directive_elif(
        &mut self,
        rest: &[PPToken],
        location: FileLocation,
    ) -> Result<(), PreprocessError> {
        // Evaluate the condition before reborrowing the block mutably
        let (parent_active, any_active, expect_endif) = match self.if_stack.last() {
            Some(block) => (block.parent_active, block.any_active, block.expect_endif),
            None => return Err(PreprocessError::UnexpectedElif(location)),
        };
        if expect_endif {
            return Err(PreprocessError::ElifAfterElse(location));
        }
        let condition = if parent_active && !any_active {
            self.evaluate_condition(rest, &location)?
        } else {
            false
        };
        let block = self.if_stack.last_mut().unwrap();
        block.active = condition;
        if condition {
            block.any_active = true;
        }
        Ok(())
    }

    fn directive_else(&mut self, location: FileLocation) -> Result<(), PreprocessError> {
        let block = match self.if_stack.last_mut() {
            Some(block) => block,
            None => return Err(PreprocessError::UnexpectedElse(location)),
        };
        if block.expect_endif {
            return Err(PreprocessError::ElseAfterElse(location));
        }
        block.active = block.parent_active && !block.any_active;
        if block.active {
            block.any_active = true;
        }
        block.expect_endif = true;
        Ok(())
    }

    fn directive_endif(&mut self, location: FileLocation) -> Result<(), PreprocessError> {
        match self.if_stack.pop() {
            Some(_) => Ok(()),
            None => Err(PreprocessError::UnexpectedEndif(location)),
        }
    }

    fn directive_pragma(
        &mut self,
        rest: &[PPToken],
        state: &mut FileState,
    ) -> Result<(), PreprocessError> {
        if let Some(index) = next_non_space(rest, 0) {
            if rest[index].kind == PPTokenKind::Ident && rest[index].text == "once" {
                trace!("#pragma once: {}", state.file_name);
                self.once_included.insert(state.file_name.clone());
            }
            // Other pragmas are not interpreted by the front end
        }
        Ok(())
    }

    fn directive_line(
        &mut self,
        rest: &[PPToken],
        raw_location: &FileLocation,
        state: &mut FileState,
    ) -> Result<(), PreprocessError> {
        let location = state.adjust(raw_location);
        let line_index = match next_non_space(rest, 0) {
            Some(index) if rest[index].kind == PPTokenKind::Number => index,
            _ => return Err(PreprocessError::InvalidLineDirective(location)),
        };
        let line = match rest[line_index].text.parse::<i64>() {
            Ok(line) => line,
            Err(_) => return Err(PreprocessError::InvalidLineDirective(location)),
        };
        if let Some(index) = next_non_space(rest, line_index + 1) {
            if rest[index].kind != PPTokenKind::StringLiteral {
                return Err(PreprocessError::InvalidLineDirective(location));
            }
            let text = &rest[index].text;
            state.file_override = Some(FileName(text[1..text.len() - 1].to_string()));
        }
        // The directive renumbers the physical line that follows it
        match *raw_location {
            FileLocation::Known(_, Line(directive_line), _) => {
                state.line_delta = line - (directive_line as i64 + 1);
            }
            FileLocation::Unknown => {}
        }
        Ok(())
    }

    fn evaluate_condition(
        &self,
        tokens: &[PPToken],
        location: &FileLocation,
    ) -> Result<bool, PreprocessError> {
        let rewritten = self.rewrite_defined(tokens)?;
        let mut active_macros = Vec::new();
        let expanded = self.expand_token_string(&rewritten, &mut active_macros)?;
        condition_parser::parse_and_evaluate(&expanded, location)
    }

    /// Replace `defined(NAME)` and `defined NAME` with 1 or 0. Recognized
    /// only inside #if/#elif conditions.
    fn rewrite_defined(&self, tokens: &[PPToken]) -> Result<Vec<PPToken>, PreprocessError> {
        let fail = || {
            PreprocessError::FailedToParseIfCondition(
                trim_space(tokens)
                    .iter()
                    .map(|tok| tok.text.as_str())
                    .collect(),
            )
        };

        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if tok.kind == PPTokenKind::Ident && tok.text == "defined" {
                let next = next_non_space(tokens, i + 1).ok_or_else(fail)?;
                let name_index = if tokens[next].kind == PPTokenKind::Punct
                    && tokens[next].text == "("
                {
                    let name = next_non_space(tokens, next + 1).ok_or_else(fail)?;
                    if tokens[name].kind != PPTokenKind::Ident {
                        return Err(fail());
                    }
                    let close = next_non_space(tokens, name + 1).ok_or_else(fail)?;
                    if tokens[close].kind != PPTokenKind::Punct || tokens[close].text != ")" {
                        return Err(fail());
                    }
                    i = close + 1;
                    name
                } else if tokens[next].kind == PPTokenKind::Ident {
                    i = next + 1;
                    next
                } else {
                    return Err(fail());
                };
                let is_defined = self.macros.contains_key(&tokens[name_index].text);
                out.push(PPToken {
                    kind: PPTokenKind::Number,
                    text: if is_defined { "1" } else { "0" }.to_string(),
                    location: tok.location.clone(),
                });
            } else {
                out.push(tok.clone());
                i += 1;
            }
        }
        Ok(out)
    }

    /// Expand every macro invocation in a token string, rescanning
    /// replacement text once for further invocations
    fn expand_token_string(
        &self,
        tokens: &[PPToken],
        active_macros: &mut Vec<String>,
    ) -> Result<Vec<PPToken>, PreprocessError> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if tok.kind == PPTokenKind::Ident {
                if let Some((expanded, next)) = self.try_expand_at(tokens, i, active_macros)? {
                    out.extend(expanded);
                    i = next;
                    continue;
                }
            }
            out.push(tok.clone());
            i += 1;
        }
        Ok(out)
    }

    /// Attempt to expand a macro invocation starting at the identifier at
    /// `index`. Returns the replacement tokens and the index just past the
    /// invocation, or None if the identifier is left unchanged.
    fn try_expand_at(
        &self,
        tokens: &[PPToken],
        index: usize,
        active_macros: &mut Vec<String>,
    ) -> Result<Option<(Vec<PPToken>, usize)>, PreprocessError> {
        let tok = &tokens[index];
        // A macro is not re-entered while expanding itself
        if active_macros.contains(&tok.text) {
            return Ok(None);
        }
        let macro_def = match self.macros.get(&tok.text) {
            Some(macro_def) => macro_def,
            None => return Ok(None),
        };

        let (substituted, next) = match macro_def.params {
            None => (macro_def.body.clone(), index + 1),
            Some(ref params) => {
                // Scan past whitespace for the argument list; without one
                // the identifier is not an invocation
                let mut j = index + 1;
                while j < tokens.len()
                    && (tokens[j].is_space() || tokens[j].kind == PPTokenKind::Newline)
                {
                    j += 1;
                }
                match tokens.get(j) {
                    Some(open) if open.kind == PPTokenKind::Punct && open.text == "(" => {}
                    _ => return Ok(None),
                }

                let (arguments, after) =
                    self.parse_macro_arguments(macro_def, tokens, j + 1, &tok.location)?;

                if arguments.len() != params.len() {
                    return Err(PreprocessError::MacroExpectsDifferentNumberOfArguments {
                        name: macro_def.name.clone(),
                        expected: params.len(),
                        found: arguments.len(),
                        location: tok.location.clone(),
                    });
                }

                // Substitute each parameter occurrence in the body with the
                // full argument token string. Arguments are not re-expanded
                // before substitution.
                let mut substituted = Vec::new();
                for body_tok in &macro_def.body {
                    if body_tok.kind == PPTokenKind::Ident {
                        if let Some(position) =
                            params.iter().position(|param| *param == body_tok.text)
                        {
                            substituted.extend(arguments[position].iter().cloned());
                            continue;
                        }
                    }
                    substituted.push(body_tok.clone());
                }
                (substituted, after)
            }
        };

        // The resulting text is re-scanned once for further invocations
        active_macros.push(macro_def.name.clone());
        let rescanned = self.expand_token_string(&substituted, active_macros);
        active_macros.pop();
        let mut expanded = rescanned?;

        // Replacement tokens report the invocation site
        for expanded_tok in &mut expanded {
            expanded_tok.location = tok.location.clone();
        }
        Ok(Some((expanded, next)))
    }

    /// Parse comma-separated argument token strings honoring nested
    /// parentheses. `index` points just past the opening parenthesis; the
    /// returned index is just past the closing one.
    #[allow(clippy::type_complexity)]
    fn parse_macro_arguments(
        &self,
        macro_def: &Macro,
        tokens: &[PPToken],
        mut index: usize,
        location: &FileLocation,
    ) -> Result<(Vec<Vec<PPToken>>, usize), PreprocessError> {
        let mut arguments: Vec<Vec<PPToken>> = Vec::new();
        let mut current: Vec<PPToken> = Vec::new();
        let mut depth = 1u32;
        loop {
            let tok = match tokens.get(index) {
                Some(tok) => tok,
                None => {
                    return Err(PreprocessError::MacroArgumentsNeverEnd(
                        macro_def.name.clone(),
                        location.clone(),
                    ))
                }
            };
            index += 1;
            match tok.kind {
                PPTokenKind::Punct if tok.text == "(" => {
                    depth += 1;
                    current.push(tok.clone());
                }
                PPTokenKind::Punct if tok.text == ")" => {
                    depth -= 1;
                    if depth == 0 {
                        arguments.push(current);
                        break;
                    }
                    current.push(tok.clone());
                }
                // Commas inside inner parens belong to the argument
                PPTokenKind::Punct if tok.text == "," && depth == 1 => {
                    arguments.push(std::mem::take(&mut current));
                }
                PPTokenKind::Newline => current.push(PPToken {
                    kind: PPTokenKind::Whitespace,
                    text: " ".to_string(),
                    location: tok.location.clone(),
                }),
                _ => current.push(tok.clone()),
            }
        }

        let mut arguments: Vec<Vec<PPToken>> = arguments
            .iter()
            .map(|argument| trim_space(argument).to_vec())
            .collect();
        // `M()` for a zero-parameter macro is a call with no arguments, not
        // one empty argument
        if arguments.len() == 1
            && arguments[0].is_empty()
            && macro_def.params.as_ref().map_or(false, |p| p.is_empty())
        {
            arguments.clear();
        }
        Ok((arguments, index))
    }
}

/// Run the pre-processor over input text, resolving includes through the
/// given handler
pub fn preprocess(
    input: &str,
    file_name: FileName,
    include_handler: &mut dyn IncludeHandler,
) -> Result<PreprocessedText, PreprocessError> {
    let mut preprocessor = Preprocessor::new(include_handler);
    preprocessor.process_file(input, file_name, FileLocation::none())?;
    Ok(PreprocessedText::from_intermediate_text(preprocessor.output))
}

/// Run the pre-processor on a self-contained source string
pub fn preprocess_single(
    input: &str,
    file_name: FileName,
) -> Result<PreprocessedText, PreprocessError> {
    preprocess(input, file_name, &mut NullIncludeHandler)
}

#[cfg(test)]
fn pp(input: &str) -> String {
    preprocess_single(input, FileName("test.hlsl".to_string()))
        .expect("preprocess failed")
        .as_str()
        .to_string()
}

#[cfg(test)]
fn pp_err(input: &str) -> PreprocessError {
    match preprocess_single(input, FileName("test.hlsl".to_string())) {
        Ok(text) => panic!("expected preprocess error, got: {:?}", text.as_str()),
        Err(err) => err,
    }
}

#[test]
fn test_no_directives_is_identity() {
    let input = "struct V {\n    float4 position;\n};\n// trailing comment\n";
    assert_eq!(pp(input), input);
}

#[test]
fn test_line_continuation_collapses() {
    assert_eq!(pp("float a\\\n= 1;\n"), "float a= 1;\n");
}

#[test]
fn test_define_object_like() {
    assert_eq!(pp("#define X 3\nint a = X;\n"), "\nint a = 3;\n");
    assert_eq!(pp("#define X 3\nint aX = 1;\n"), "\nint aX = 1;\n");
    assert_eq!(pp("#define X 3\nint Xa = 1;\n"), "\nint Xa = 1;\n");
}

#[test]
fn test_define_function_like() {
    assert_eq!(
        pp("#define ADD(a,b) ((a)+(b))\nint c = ADD(1,2);\n"),
        "\nint c = ((1)+(2));\n"
    );
    assert_eq!(
        pp("#define ADD(a, b) ((a)+(b))\nint c = ADD(f(1, 2), 3);\n"),
        "\nint c = ((f(1, 2))+(3));\n"
    );
    // Without an argument list the identifier is emitted unchanged
    assert_eq!(pp("#define F(x) x\nint F = 1;\n"), "\nint F = 1;\n");
}

#[test]
fn test_macro_rescan_and_no_reentry() {
    assert_eq!(pp("#define A B\n#define B 2\nint x = A;\n"), "\n\nint x = 2;\n");
    // Self-referential macros do not recurse
    assert_eq!(pp("#define A A\nint x = A;\n"), "\nint x = A;\n");
    assert_eq!(pp("#define A B\n#define B A\nint x = A;\n"), "\n\nint x = A;\n");
}

#[test]
fn test_macro_arity_mismatch() {
    assert!(matches!(
        pp_err("#define ADD(a,b) ((a)+(b))\nint c = ADD(1);\n"),
        PreprocessError::MacroExpectsDifferentNumberOfArguments { expected: 2, found: 1, .. }
    ));
}

#[test]
fn test_macro_redefinition() {
    // Identical redefinition is accepted silently
    assert_eq!(pp("#define X 3\n#define X 3\nint a = X;\n"), "\n\nint a = 3;\n");
    assert!(matches!(
        pp_err("#define X 3\n#define X 4\n"),
        PreprocessError::MacroRedefinition { .. }
    ));
}

#[test]
fn test_undef() {
    assert_eq!(pp("#define X 3\n#undef X\nint a = X;\n"), "\n\nint a = X;\n");
    // Undefining an unknown macro is a no-op
    assert_eq!(pp("#undef NOT_DEFINED\n"), "\n");
}

#[test]
fn test_conditional_if_else() {
    assert_eq!(pp("#if 1+2*3 == 7\nA\n#else\nB\n#endif\n"), "\nA\n\n\n\n");
    assert_eq!(pp("#if 1+2*3 == 8\nA\n#else\nB\n#endif\n"), "\n\n\nB\n\n");
}

#[test]
fn test_conditional_elif() {
    let source = "#if A == 1\none\n#elif A == 2\ntwo\n#else\nthree\n#endif\n";
    assert_eq!(
        pp(&format!("#define A 2\n{}", source)),
        "\n\n\n\ntwo\n\n\n\n"
    );
    assert_eq!(
        pp(&format!("#define A 1\n{}", source)),
        "\n\none\n\n\n\n\n\n"
    );
    assert_eq!(pp(source), "\n\n\n\n\nthree\n\n");
}

#[test]
fn test_conditional_ifdef() {
    assert_eq!(pp("#define X\n#ifdef X\nA\n#endif\n"), "\n\nA\n\n");
    assert_eq!(pp("#ifdef X\nA\n#endif\n"), "\n\n\n");
    assert_eq!(pp("#ifndef X\nA\n#endif\n"), "\nA\n\n");
}

#[test]
fn test_conditional_defined_operator() {
    assert_eq!(pp("#define X\n#if defined(X)\nA\n#endif\n"), "\n\nA\n\n");
    assert_eq!(pp("#define X\n#if defined X\nA\n#endif\n"), "\n\nA\n\n");
    assert_eq!(pp("#if defined(X)\nA\n#endif\n"), "\n\n\n");
    assert_eq!(pp("#if !defined(X)\nA\n#endif\n"), "\nA\n\n");
}

#[test]
fn test_conditional_nesting() {
    let source = "#if 1\n#if 0\nA\n#else\nB\n#endif\n#endif\n";
    assert_eq!(pp(source), "\n\n\n\nB\n\n\n");
    // An inactive outer block suppresses the whole inner group
    let source = "#if 0\n#if 1\nA\n#endif\nB\n#endif\n";
    assert_eq!(pp(source), "\n\n\n\n\n\n");
}

#[test]
fn test_conditional_dead_branch_is_not_evaluated() {
    // Division by zero inside a statically dead branch must not fault
    assert_eq!(pp("#if 0\n#if 1/0\nA\n#endif\n#endif\n"), "\n\n\n\n\n");
}

#[test]
fn test_conditional_errors() {
    assert!(matches!(pp_err("#endif\n"), PreprocessError::UnexpectedEndif(_)));
    assert!(matches!(pp_err("#else\n"), PreprocessError::UnexpectedElse(_)));
    assert!(matches!(pp_err("#elif 1\n"), PreprocessError::UnexpectedElif(_)));
    assert!(matches!(
        pp_err("#if 1\n#else\n#elif 0\n#endif\n"),
        PreprocessError::ElifAfterElse(_)
    ));
    assert!(matches!(
        pp_err("#if 1\nA\n"),
        PreprocessError::UnterminatedIfBlock(_, _)
    ));
    assert!(matches!(
        pp_err("#if 1/0\nA\n#endif\n"),
        PreprocessError::DivisionByZero(_)
    ));
}

#[test]
fn test_include() {
    let mut files = std::collections::HashMap::new();
    files.insert("lib.hlsl".to_string(), "float4 helper();\n".to_string());
    let mut handler = MapIncludeHandler(files);

    let output = preprocess(
        "#include \"lib.hlsl\"\nfloat4 x;\n",
        FileName("main.hlsl".to_string()),
        &mut handler,
    )
    .expect("preprocess failed");
    assert_eq!(output.as_str(), "float4 helper();\n\n\nfloat4 x;\n");
}

#[test]
fn test_include_not_found() {
    assert!(matches!(
        pp_err("#include \"missing.hlsl\"\n"),
        PreprocessError::FailedToFindFile { .. }
    ));
}

#[test]
fn test_pragma_once() {
    let mut files = std::collections::HashMap::new();
    files.insert(
        "lib.hlsl".to_string(),
        "#pragma once\nfloat4 helper();\n".to_string(),
    );
    let mut handler = MapIncludeHandler(files);

    let output = preprocess(
        "#include \"lib.hlsl\"\n#include \"lib.hlsl\"\nfloat4 x;\n",
        FileName("main.hlsl".to_string()),
        &mut handler,
    )
    .expect("preprocess failed");
    // The helper declaration appears exactly once
    let declarations = output.as_str().matches("float4 helper();").count();
    assert_eq!(declarations, 1);
}

#[test]
fn test_recursive_include() {
    let mut files = std::collections::HashMap::new();
    files.insert("a.hlsl".to_string(), "#include \"b.hlsl\"\n".to_string());
    files.insert("b.hlsl".to_string(), "#include \"a.hlsl\"\n".to_string());
    let mut handler = MapIncludeHandler(files);

    let result = preprocess(
        "#include \"a.hlsl\"\n",
        FileName("main.hlsl".to_string()),
        &mut handler,
    );
    assert!(matches!(result, Err(PreprocessError::RecursiveInclude(_, _))));
}

#[test]
fn test_error_directive() {
    match pp_err("#error unsupported target\n") {
        PreprocessError::ErrorDirective(message, _) => {
            assert_eq!(message, "unsupported target");
        }
        other => panic!("wrong error: {:?}", other),
    }
}

#[test]
fn test_unknown_directive() {
    assert!(matches!(
        pp_err("#frobnicate\n"),
        PreprocessError::UnknownDirective(_, _)
    ));
    // Unknown directives inside dead branches are skipped
    assert_eq!(pp("#if 0\n#frobnicate\n#endif\n"), "\n\n\n");
}

#[test]
fn test_line_directive() {
    let text = preprocess_single(
        "#line 100\nfloat4 x;\n",
        FileName("test.hlsl".to_string()),
    )
    .expect("preprocess failed");
    // "float4 x;" starts at output offset 1, after the directive newline
    let location = text.get_file_location(&StreamLocation(1)).unwrap();
    assert_eq!(
        location,
        FileLocation::new(FileName("test.hlsl".to_string()), 100, 1)
    );

    let text = preprocess_single(
        "#line 7 \"other.hlsl\"\nfloat4 x;\n",
        FileName("test.hlsl".to_string()),
    )
    .expect("preprocess failed");
    let location = text.get_file_location(&StreamLocation(1)).unwrap();
    assert_eq!(
        location,
        FileLocation::new(FileName("other.hlsl".to_string()), 7, 1)
    );
}

#[test]
fn test_output_location_mapping() {
    let text = preprocess_single(
        "#define X 3\nint a = X;\n",
        FileName("test.hlsl".to_string()),
    )
    .expect("preprocess failed");
    assert_eq!(text.as_str(), "\nint a = 3;\n");

    // "int" is at output offset 1, line 2 column 1 of the original
    let location = text.get_file_location(&StreamLocation(1)).unwrap();
    assert_eq!(
        location,
        FileLocation::new(FileName("test.hlsl".to_string()), 2, 1)
    );
    // "a" is at output offset 5, line 2 column 5
    let location = text.get_file_location(&StreamLocation(5)).unwrap();
    assert_eq!(
        location,
        FileLocation::new(FileName("test.hlsl".to_string()), 2, 5)
    );
    // The expansion of X reports the invocation site at column 9
    let location = text.get_file_location(&StreamLocation(9)).unwrap();
    assert_eq!(
        location,
        FileLocation::new(FileName("test.hlsl".to_string()), 2, 9)
    );
}
