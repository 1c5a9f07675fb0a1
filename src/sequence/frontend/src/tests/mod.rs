use crate::{compile_front, preprocess_front, CompileError, Input, Output};
use rfx_shared::*;
use std::collections::HashMap;

mod vs1;

fn compile_source(source: &str) -> Result<Output, CompileError> {
    compile_front(Input {
        main_file: source.to_string(),
        file_name: FileName("test.hlsl".to_string()),
        include_handler: Box::new(NullIncludeHandler),
    })
}

fn compile_with_files(source: &str, files: &[(&str, &str)]) -> Result<Output, CompileError> {
    let map = files
        .iter()
        .map(|&(name, contents)| (name.to_string(), contents.to_string()))
        .collect::<HashMap<_, _>>();
    compile_front(Input {
        main_file: source.to_string(),
        file_name: FileName("test.hlsl".to_string()),
        include_handler: Box::new(MapIncludeHandler(map)),
    })
}

#[test]
fn compile_include_chain() {
    let lib = "#pragma once\nstruct Light { float3 position; float intensity; };\n";
    let main = "#include \"light.hlsl\"\n#include \"light.hlsl\"\nLight light;\n";
    let output = compile_with_files(main, &[("light.hlsl", lib)]).expect("compile failed");
    // The struct arrives through the include exactly once and resolves
    assert_eq!(output.module.struct_decls().len(), 1);
    assert_eq!(output.module.struct_decls()[0].ident(), "Light");
}

#[test]
fn compile_missing_include_fails() {
    let result = compile_source("#include \"nowhere.hlsl\"\n");
    assert!(matches!(result, Err(CompileError::PreprocessError(_))));
}

#[test]
fn compile_syntax_error_fails_with_diagnostics() {
    let result = compile_source("float4 f(\n");
    match result {
        Err(CompileError::FrontendFailed(diagnostics)) => {
            assert!(diagnostics.has_errors());
        }
        other => panic!("expected frontend failure: {:?}", other.map(|_| ())),
    }
}

#[test]
fn compile_duplicate_struct_fails() {
    let result = compile_source("struct V { float3 p; };\nstruct V { float2 q; };\n");
    match result {
        Err(CompileError::FrontendFailed(diagnostics)) => {
            assert_eq!(diagnostics.error_count(), 1);
            let first = diagnostics.iter().next().unwrap();
            assert_eq!(first.class, ErrorClass::Semantic);
        }
        other => panic!("expected frontend failure: {:?}", other.map(|_| ())),
    }
}

#[test]
fn compile_error_diagnostics_render() {
    let result = compile_source("#error custom message\n");
    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("expected error"),
    };
    let diagnostics = err.to_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    let rendered = diagnostics.iter().next().unwrap().to_string();
    assert!(rendered.contains("custom message"), "{}", rendered);
    assert!(rendered.contains("preprocessor"), "{}", rendered);
}

#[test]
fn preprocess_preserves_line_numbering() {
    let mut handler = NullIncludeHandler;
    let text = preprocess_front(
        "#if 1\nA\n#else\nB\n#endif\n",
        FileName("test.hlsl".to_string()),
        &mut handler,
    )
    .expect("preprocess failed");
    // Five input lines stay five output lines
    assert_eq!(text.as_str().matches('\n').count(), 5);
    assert!(text.as_str().contains("A\n"));
    assert!(!text.as_str().contains('B'));
}
