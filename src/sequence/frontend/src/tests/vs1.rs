use crate::{compile_front, Input};
use rfx_lang_hst::*;
use rfx_lang_htk::{DataType, SamplerType, TextureType};
use rfx_shared::*;

// A small but representative vertex shader
const VS1: &str = include_str!("vs1.hlsl");

#[test]
fn vs1_compiles() {
    // Normalise line endings so git checkout settings do not matter
    let source = VS1.replace("\r\n", "\n");
    let output = compile_front(Input {
        main_file: source,
        file_name: FileName("vs1.hlsl".to_string()),
        include_handler: Box::new(NullIncludeHandler),
    })
    .expect("vs1 failed to compile");

    let module = &output.module;
    assert_eq!(module.root_definitions.len(), 7);

    // cbuffer with its register slot and a packoffset on the last member
    match module.root_definitions[0] {
        RootDefinition::ConstantBuffer(ref cb) => {
            assert_eq!(cb.name.node, "SceneConstants");
            assert_eq!(cb.slot, Some(ConstantSlot(0)));
            assert_eq!(cb.members.len(), 3);
            // The macro expanded into the array dimension
            let lights = &cb.members[1].defs[0];
            assert_eq!(lights.bind.0.len(), 1);
            assert_eq!(lights.bind.0[0].constant_value(), Some(4));
            assert!(cb.members[2].defs[0].offset.is_some());
        }
        ref other => panic!("expected cbuffer: {:?}", other),
    }

    // The typedef survives as a declaration while uses are rebound
    match module.root_definitions[1] {
        RootDefinition::Typedef(ref td) => assert_eq!(td.name.node, "Color"),
        ref other => panic!("expected typedef: {:?}", other),
    }

    let structs = module.struct_decls();
    assert_eq!(structs.len(), 2);
    assert_eq!(structs[0].ident(), "VertexIn");
    assert_eq!(structs[1].ident(), "VertexOut");

    // The Color member of VertexOut resolved to its target type
    let vertex_out = structs[1];
    assert_eq!(
        (vertex_out.members[1].ty).0,
        TypeDenoter::Base(DataType::Float4)
    );
    assert_eq!(
        vertex_out.members[0].defs[0].semantic,
        Some(Semantic("SV_Position".to_string()))
    );

    // Resources keep their classifications and slots
    match module.root_definitions[4] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(
                (gv.global_type.0).0,
                TypeDenoter::Texture(TextureType::Texture2D)
            );
            assert_eq!(gv.defs[0].slot, Some(GlobalSlot::ReadSlot(0)));
        }
        ref other => panic!("expected texture: {:?}", other),
    }
    match module.root_definitions[5] {
        RootDefinition::GlobalVariable(ref gv) => {
            assert_eq!(
                (gv.global_type.0).0,
                TypeDenoter::Sampler(SamplerType::SamplerState)
            );
        }
        ref other => panic!("expected sampler: {:?}", other),
    }

    // The entry point with resolved struct parameter and return types
    match module.root_definitions[6] {
        RootDefinition::Function(ref function) => {
            assert_eq!(function.name.node, "VSMain");
            match (function.returntype).0 {
                TypeDenoter::Struct(ref denoter) => {
                    assert_eq!(denoter.ident, "VertexOut");
                    let id = denoter.struct_decl.expect("return type not bound");
                    assert_eq!(module.struct_decl(id).unwrap().ident(), "VertexOut");
                }
                ref other => panic!("expected struct denoter: {:?}", other),
            }
            match (function.params[0].param_type.0).0 {
                TypeDenoter::Struct(ref denoter) => {
                    assert_eq!(denoter.ident, "VertexIn");
                    assert!(denoter.struct_decl.is_some());
                }
                ref other => panic!("expected struct denoter: {:?}", other),
            }
            // declaration, three assignments, for loop, return
            assert_eq!(function.body.len(), 6);
        }
        ref other => panic!("expected function: {:?}", other),
    }
}

#[test]
fn vs1_skinning_branch_elided() {
    let source = VS1.replace("\r\n", "\n");
    let output = compile_front(Input {
        main_file: source,
        file_name: FileName("vs1.hlsl".to_string()),
        include_handler: Box::new(NullIncludeHandler),
    })
    .expect("vs1 failed to compile");

    // The #if defined(USE_SKINNING) block is inactive, so no bone buffer
    for root in &output.module.root_definitions {
        if let RootDefinition::GlobalVariable(ref gv) = *root {
            for def in &gv.defs {
                assert_ne!(def.name.node, "boneTransforms");
            }
        }
    }
}
