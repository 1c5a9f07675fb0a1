//! Symbol resolution over a freshly parsed translation unit.
//!
//! Binds struct denoters to their declarations, rebinds alias denoters to
//! their typedef targets, and reports duplicate struct names, duplicate
//! struct members and unresolved aliases. Findings accumulate as semantic
//! diagnostics; the pass always walks the whole module.

use log::debug;
use rfx_lang_hst::*;
use rfx_shared::*;
use rustc_hash::{FxHashMap, FxHashSet};

struct Resolver {
    structs: FxHashMap<String, StructDeclId>,
    typedefs: FxHashMap<String, TypeDenoter>,
    diagnostics: Diagnostics,
}

impl Resolver {
    fn new() -> Resolver {
        Resolver {
            structs: FxHashMap::default(),
            typedefs: FxHashMap::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn report(&mut self, message: String, location: FileLocation) {
        self.diagnostics
            .push(Diagnostic::error(ErrorClass::Semantic, message, location));
    }

    /// First pass: collect struct declarations and typedef targets, checking
    /// for duplicate struct names and duplicate members
    fn collect_symbols(&mut self, module: &Module) {
        let mut struct_locations: FxHashMap<String, FileLocation> = FxHashMap::default();
        let mut next_struct_id = 0u32;

        for root in &module.root_definitions {
            match *root {
                RootDefinition::Struct(ref sd) => {
                    let id = StructDeclId(next_struct_id);
                    next_struct_id += 1;

                    let mut member_names = FxHashSet::default();
                    for member in &sd.members {
                        for def in &member.defs {
                            if !member_names.insert(def.name.node.clone()) {
                                self.report(
                                    format!(
                                        "duplicate member '{}' in struct '{}'",
                                        def.name.node,
                                        if sd.ident().is_empty() {
                                            "<anonymous>"
                                        } else {
                                            sd.ident()
                                        }
                                    ),
                                    def.name.location.clone(),
                                );
                            }
                        }
                    }

                    let name = match sd.name {
                        Some(ref name) => name,
                        None => continue,
                    };
                    if let Some(previous) = struct_locations.get(&name.node) {
                        let diagnostic = Diagnostic::error(
                            ErrorClass::Semantic,
                            format!("struct '{}' is already defined", name.node),
                            name.location.clone(),
                        )
                        .with_note("previous definition is here".to_string(), previous.clone());
                        self.diagnostics.push(diagnostic);
                        continue;
                    }
                    struct_locations.insert(name.node.clone(), name.location.clone());
                    self.structs.insert(name.node.clone(), id);
                }
                RootDefinition::Typedef(ref td) => {
                    // Typedefs may only refer to earlier names, so resolving
                    // against the symbols gathered so far leaves the stored
                    // target free of aliases
                    let mut target = td.bind.apply(&(td.source.0));
                    self.resolve_denoter(&mut target, &td.name.location);
                    debug!("typedef {} = {}", td.name.node, target);
                    self.typedefs.insert(td.name.node.clone(), target);
                }
                _ => {}
            }
        }
    }

    /// Rewrite one denoter in place: aliases become their targets and struct
    /// references are attached
    fn resolve_denoter(&mut self, denoter: &mut TypeDenoter, location: &FileLocation) {
        match *denoter {
            TypeDenoter::Alias(ref alias) => {
                match self.typedefs.get(&alias.ident) {
                    Some(target) => {
                        let target = target.clone();
                        *denoter = target;
                    }
                    None => {
                        self.report(
                            format!("unresolved type alias '{}'", alias.ident),
                            location.clone(),
                        );
                    }
                }
            }
            TypeDenoter::Struct(ref mut st) => {
                if st.struct_decl.is_none() {
                    match self.structs.get(&st.ident) {
                        Some(&id) => st.struct_decl = Some(id),
                        None => {
                            let name = if st.ident.is_empty() {
                                "<anonymous>".to_string()
                            } else {
                                st.ident.clone()
                            };
                            self.report(
                                format!("unknown struct type '{}'", name),
                                location.clone(),
                            );
                        }
                    }
                }
            }
            TypeDenoter::Array(ref mut array) => {
                self.resolve_denoter(&mut array.inner, location);
                for dim in &mut array.dims {
                    if let ArrayDimension(Some(ref mut expr)) = *dim {
                        let location = expr.location.clone();
                        self.resolve_expression(&mut expr.node, &location);
                    }
                }
            }
            _ => {}
        }
    }

    fn resolve_type(&mut self, ty: &mut Type, location: &FileLocation) {
        self.resolve_denoter(&mut ty.0, location);
    }

    /// Types can hide inside expressions through casts
    fn resolve_expression(&mut self, expression: &mut Expression, location: &FileLocation) {
        match *expression {
            Expression::Literal(_) | Expression::Variable(_) => {}
            Expression::UnaryOperation(_, ref mut inner) => {
                self.resolve_located_expression(inner);
            }
            Expression::BinaryOperation(_, ref mut lhs, ref mut rhs) => {
                self.resolve_located_expression(lhs);
                self.resolve_located_expression(rhs);
            }
            Expression::TernaryConditional(ref mut cond, ref mut left, ref mut right) => {
                self.resolve_located_expression(cond);
                self.resolve_located_expression(left);
                self.resolve_located_expression(right);
            }
            Expression::ArraySubscript(ref mut array, ref mut subscript) => {
                self.resolve_located_expression(array);
                self.resolve_located_expression(subscript);
            }
            Expression::Member(ref mut composite, _) => {
                self.resolve_located_expression(composite);
            }
            Expression::Call(ref mut target, ref mut args) => {
                self.resolve_located_expression(target);
                for arg in args {
                    self.resolve_located_expression(arg);
                }
            }
            Expression::NumericConstructor(_, ref mut args) => {
                for arg in args {
                    self.resolve_located_expression(arg);
                }
            }
            Expression::Cast(ref mut ty, ref mut inner) => {
                self.resolve_type(ty, location);
                self.resolve_located_expression(inner);
            }
        }
    }

    fn resolve_located_expression(&mut self, expression: &mut Located<Expression>) {
        let location = expression.location.clone();
        self.resolve_expression(&mut expression.node, &location);
    }

    fn resolve_initializer(&mut self, init: &mut Initializer) {
        match *init {
            Initializer::Expression(ref mut expr) => self.resolve_located_expression(expr),
            Initializer::Aggregate(ref mut elements) => {
                for element in elements {
                    self.resolve_initializer(element);
                }
            }
        }
    }

    fn resolve_bind(&mut self, bind: &mut VariableBind) {
        for dim in &mut bind.0 {
            if let ArrayDimension(Some(ref mut expr)) = *dim {
                self.resolve_located_expression(expr);
            }
        }
    }

    fn resolve_vardef(&mut self, vardef: &mut VarDef) {
        let location = match vardef.defs.first() {
            Some(def) => def.name.location.clone(),
            None => FileLocation::none(),
        };
        self.resolve_type(&mut (vardef.local_type.0), &location);
        for def in &mut vardef.defs {
            let location = def.name.location.clone();
            self.resolve_bind(&mut def.bind);
            if let Some(ref mut init) = def.init {
                self.resolve_initializer(init);
            }
        }
    }

    fn resolve_statement(&mut self, statement: &mut Statement) {
        match *statement {
            Statement::Empty | Statement::Break | Statement::Continue | Statement::Discard => {}
            Statement::Expression(ref mut expr) => self.resolve_located_expression(expr),
            Statement::Var(ref mut vardef) => self.resolve_vardef(vardef),
            Statement::Block(ref mut statements) => {
                for statement in statements {
                    self.resolve_statement(statement);
                }
            }
            Statement::If(ref mut cond, ref mut inner) => {
                self.resolve_located_expression(cond);
                self.resolve_statement(inner);
            }
            Statement::IfElse(ref mut cond, ref mut then_part, ref mut else_part) => {
                self.resolve_located_expression(cond);
                self.resolve_statement(then_part);
                self.resolve_statement(else_part);
            }
            Statement::While(ref mut cond, ref mut inner) => {
                self.resolve_located_expression(cond);
                self.resolve_statement(inner);
            }
            Statement::DoWhile(ref mut inner, ref mut cond) => {
                self.resolve_statement(inner);
                self.resolve_located_expression(cond);
            }
            Statement::For(ref mut init, ref mut cond, ref mut inc, ref mut inner) => {
                match *init {
                    InitStatement::Empty => {}
                    InitStatement::Expression(ref mut expr) => {
                        self.resolve_located_expression(expr)
                    }
                    InitStatement::Declaration(ref mut vardef) => self.resolve_vardef(vardef),
                }
                self.resolve_located_expression(cond);
                self.resolve_located_expression(inc);
                self.resolve_statement(inner);
            }
            Statement::Switch(ref mut cond, ref mut cases) => {
                self.resolve_located_expression(cond);
                for case in cases {
                    if let SwitchLabel::Case(ref mut expr) = case.label {
                        self.resolve_located_expression(expr);
                    }
                    for statement in &mut case.statements {
                        self.resolve_statement(statement);
                    }
                }
            }
            Statement::Return(ref mut expr) => {
                if let Some(ref mut expr) = *expr {
                    self.resolve_located_expression(expr);
                }
            }
        }
    }

    /// Second pass: rewrite every type denoter in the module
    fn resolve_module(&mut self, module: &mut Module) {
        for root in &mut module.root_definitions {
            match *root {
                RootDefinition::Struct(ref mut sd) => {
                    let location = match sd.name {
                        Some(ref name) => name.location.clone(),
                        None => FileLocation::none(),
                    };
                    for member in &mut sd.members {
                        self.resolve_type(&mut member.ty, &location);
                        for def in &mut member.defs {
                            let location = def.name.location.clone();
                            self.resolve_bind(&mut def.bind);
                        }
                    }
                }
                // Typedef targets were resolved while collecting symbols
                RootDefinition::Typedef(_) => {}
                RootDefinition::ConstantBuffer(ref mut cb) => {
                    for member in &mut cb.members {
                        let location = match member.defs.first() {
                            Some(def) => def.name.location.clone(),
                            None => FileLocation::none(),
                        };
                        self.resolve_type(&mut member.ty, &location);
                        for def in &mut member.defs {
                            let location = def.name.location.clone();
                            self.resolve_bind(&mut def.bind);
                        }
                    }
                }
                RootDefinition::GlobalVariable(ref mut gv) => {
                    let location = match gv.defs.first() {
                        Some(def) => def.name.location.clone(),
                        None => FileLocation::none(),
                    };
                    self.resolve_type(&mut (gv.global_type.0), &location);
                    for def in &mut gv.defs {
                        let location = def.name.location.clone();
                        self.resolve_bind(&mut def.bind);
                        if let Some(ref mut init) = def.init {
                            self.resolve_initializer(init);
                        }
                    }
                }
                RootDefinition::Function(ref mut function) => {
                    let location = function.name.location.clone();
                    self.resolve_type(&mut function.returntype, &location);
                    for param in &mut function.params {
                        let location = param.name.location.clone();
                        self.resolve_type(&mut (param.param_type.0), &location);
                        self.resolve_bind(&mut param.bind);
                    }
                    for statement in &mut function.body {
                        self.resolve_statement(statement);
                    }
                }
                RootDefinition::Technique(ref mut technique) => {
                    for pass in &mut technique.passes {
                        for state in &mut pass.states {
                            match state.value {
                                PassStateValue::Expression(ref mut expr)
                                | PassStateValue::Compile {
                                    call: ref mut expr, ..
                                } => self.resolve_located_expression(expr),
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Resolve symbols in a parsed module, rewriting its type denoters in place
///
/// Returns the semantic diagnostics found on the way. The module is left in
/// a consistent state even when diagnostics were produced.
pub fn resolve(module: &mut Module) -> Diagnostics {
    let mut resolver = Resolver::new();
    resolver.collect_symbols(module);
    resolver.resolve_module(module);
    resolver.diagnostics
}

#[cfg(test)]
fn parse_module(source: &str) -> Module {
    use rfx_transform_htk_to_hst::parse;
    use rfx_transform_lexer::lex;
    use rfx_transform_preprocess::preprocess_single;
    let text = preprocess_single(source, FileName("resolve_test.hlsl".to_string()))
        .expect("preprocess failed");
    let tokens = lex(&text).expect("lex failed");
    let output = parse(&tokens.stream);
    assert!(
        !output.diagnostics.has_errors(),
        "unexpected parse diagnostics: {:?}",
        output.diagnostics
    );
    output.module
}

#[cfg(test)]
fn global_denoter(module: &Module, index: usize) -> TypeDenoter {
    match module.root_definitions[index] {
        RootDefinition::GlobalVariable(ref gv) => {
            let base = &(gv.global_type.0).0;
            gv.defs[0].bind.apply(base)
        }
        ref other => panic!("expected global variable: {:?}", other),
    }
}

#[test]
fn test_struct_binding() {
    let mut module = parse_module("struct V { float3 p; };\nV v;\n");
    let diagnostics = resolve(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    match global_denoter(&module, 1) {
        TypeDenoter::Struct(ref denoter) => {
            let id = denoter.struct_decl.expect("struct not bound");
            let decl = module.struct_decl(id).expect("bad struct id");
            // The denoter identifier matches the declaration it refers to
            assert_eq!(decl.ident(), denoter.ident);
            assert_eq!(decl.ident(), "V");
        }
        ref other => panic!("expected struct denoter: {:?}", other),
    }
}

#[test]
fn test_alias_rebinding() {
    let mut module = parse_module("typedef float4 Color;\nColor c;\n");
    let diagnostics = resolve(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    assert_eq!(
        global_denoter(&module, 1),
        TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
    );
}

#[test]
fn test_alias_of_alias() {
    let mut module = parse_module("typedef float4 Color;\ntypedef Color Tint;\nTint t;\n");
    let diagnostics = resolve(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    assert_eq!(
        global_denoter(&module, 2),
        TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
    );
}

#[test]
fn test_array_typedef_composes() {
    let mut module = parse_module("typedef float2 Row[3];\nRow rows[4];\n");
    let diagnostics = resolve(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    // The declarator dimensions nest outside the typedef's own
    match global_denoter(&module, 1) {
        TypeDenoter::Array(ref outer) => {
            assert_eq!(outer.dims.len(), 1);
            assert_eq!(outer.dims[0].constant_value(), Some(4));
            match *outer.inner {
                TypeDenoter::Array(ref inner) => {
                    assert_eq!(inner.dims.len(), 1);
                    assert_eq!(inner.dims[0].constant_value(), Some(3));
                    assert_eq!(
                        *inner.inner,
                        TypeDenoter::Base(rfx_lang_htk::DataType::Float2)
                    );
                }
                ref other => panic!("expected nested array: {:?}", other),
            }
        }
        ref other => panic!("expected array denoter: {:?}", other),
    }
}

#[test]
fn test_alias_in_struct_member_and_function() {
    let mut module = parse_module(
        "typedef float4 Color;\nstruct V { Color c; };\nColor f(Color x)\n{\n    Color y = x;\n    return y;\n}\n",
    );
    let diagnostics = resolve(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    match module.root_definitions[1] {
        RootDefinition::Struct(ref sd) => {
            assert_eq!(
                (sd.members[0].ty).0,
                TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
            );
        }
        ref other => panic!("expected struct: {:?}", other),
    }
    match module.root_definitions[2] {
        RootDefinition::Function(ref function) => {
            assert_eq!(
                (function.returntype).0,
                TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
            );
            assert_eq!(
                (function.params[0].param_type.0).0,
                TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
            );
            match function.body[0] {
                Statement::Var(ref vardef) => {
                    assert_eq!(
                        (vardef.local_type.0).0,
                        TypeDenoter::Base(rfx_lang_htk::DataType::Float4)
                    );
                }
                ref other => panic!("expected declaration: {:?}", other),
            }
        }
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn test_duplicate_struct_reported() {
    let mut module = parse_module("struct V { float3 p; };\nstruct V { float2 q; };\n");
    let diagnostics = resolve(&mut module);
    assert!(diagnostics.has_errors());
    let first = diagnostics.iter().next().unwrap();
    assert!(first.message.contains("'V'"), "message: {}", first.message);
    // The previous definition rides along as a note
    assert_eq!(first.notes.len(), 1);
}

#[test]
fn test_duplicate_member_reported() {
    let mut module = parse_module("struct V { float3 p; float2 p; };\n");
    let diagnostics = resolve(&mut module);
    assert!(diagnostics.has_errors());
    let first = diagnostics.iter().next().unwrap();
    assert!(first.message.contains("'p'"), "message: {}", first.message);
}

#[test]
fn test_unresolved_alias_reported() {
    // Hand-built module carrying an alias no typedef declares
    let mut module = Module {
        root_definitions: vec![RootDefinition::GlobalVariable(GlobalVariable {
            global_type: Type::from_denoter(TypeDenoter::Alias(AliasTypeDenoter {
                ident: "Missing".to_string(),
            }))
            .into(),
            defs: vec![GlobalVariableName {
                name: Located::none("m".to_string()),
                bind: VariableBind::default(),
                slot: None,
                init: None,
            }],
        })],
    };
    let diagnostics = resolve(&mut module);
    assert!(diagnostics.has_errors());
    let first = diagnostics.iter().next().unwrap();
    assert!(
        first.message.contains("Missing"),
        "message: {}",
        first.message
    );
}
