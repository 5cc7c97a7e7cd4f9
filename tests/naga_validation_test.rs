mod common;

use common::{id, stage};
use shadeweave::processor::VersionProcessor;
use shadeweave::validate::validate_glsl;
use shadeweave::{
    HeadlessDevice, MemorySourceProvider, ProgramDefinition, ShaderCompiler, ShaderError,
    ShaderKind, ShaderModification, ShaderModificationManager, ShaderPreDefinitions,
    ShaderProgram, SourceKind,
};
use std::rc::Rc;

const VERTEX: &str = "layout(location = 0) in vec2 position;\n\
                      void main() {\n\
                          gl_Position = vec4(position, 0.0, 1.0);\n\
                      }\n";

const FRAGMENT: &str = "#include demo:palette\n\
                        #TINT\n\
                        layout(location = 0) out vec4 color;\n\
                        void main() {\n\
                            color = vec4(warm(TINT), 0.0);\n\
                        }\n";

const PALETTE: &str = "vec3 warm(float amount) {\n\
                           return vec3(1.0, 0.5, 0.25) * amount;\n\
                       }\n";

fn compiler(modifications: ShaderModificationManager) -> ShaderCompiler<HeadlessDevice> {
    let provider = MemorySourceProvider::new()
        .with("demo:quad", stage(ShaderKind::Vertex), VERTEX)
        .with("demo:quad", stage(ShaderKind::Fragment), FRAGMENT)
        .with("demo:palette", SourceKind::Include, PALETTE);
    ShaderCompiler::builder(HeadlessDevice::new().with_naga_validation(true))
        .provider(Rc::new(provider))
        .modifications(Rc::new(modifications))
        .default_version(VersionProcessor::new("450 core").expect("Valid version"))
        .verbose_errors(true)
        .build()
}

fn quad() -> ProgramDefinition {
    let mut definition = ProgramDefinition::default();
    definition.set_stage(ShaderKind::Vertex, id("demo:quad"));
    definition.set_stage(ShaderKind::Fragment, id("demo:quad"));
    definition
        .definitions
        .insert("TINT".to_string(), "0.75".to_string());
    definition
}

#[test]
fn test_pipeline_output_is_valid_glsl() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:quad"),
        stage(ShaderKind::Fragment),
        ShaderModification::parse("[FUNCTION main TAIL]\n#out0.a = 1.0;\n").unwrap(),
    );
    let mut compiler = compiler(modifications);
    let mut program = ShaderProgram::new(id("demo:quad"));

    program
        .compile(&mut compiler, &quad(), &ShaderPreDefinitions::new())
        .expect("Program should pass naga validation");

    for stage in program.stages() {
        let source = compiler.device().shader_source_of(stage.handle()).unwrap();
        assert!(source.starts_with("#version 450 core"));
        validate_glsl(stage.kind(), source).expect("Processed source should validate");
    }
    let fragment = program.stage(ShaderKind::Fragment).unwrap();
    let source = compiler.device().shader_source_of(fragment.handle()).unwrap();
    assert!(source.contains("#define TINT 0.75"));
    assert!(source.contains("color.a = 1.0;"));
}

#[test]
fn test_invalid_injection_reports_processed_source() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:quad"),
        stage(ShaderKind::Fragment),
        ShaderModification::parse("[FUNCTION main HEAD]\nfloat broken = undefined_amount;\n")
            .unwrap(),
    );
    let mut compiler = compiler(modifications);
    let mut program = ShaderProgram::new(id("demo:quad"));

    let error = program
        .compile(&mut compiler, &quad(), &ShaderPreDefinitions::new())
        .unwrap_err();
    match &error {
        ShaderError::NativeCompile {
            kind,
            shader,
            processed_source,
            ..
        } => {
            assert_eq!(*kind, ShaderKind::Fragment);
            assert_eq!(shader, "demo:quad");
            assert!(processed_source.as_deref().unwrap().contains("undefined_amount"));
        }
        other => panic!("Expected compile error, got {:?}", other),
    }
    assert!(error.diagnostic().contains("undefined_amount"));
    assert_eq!(compiler.device().live_shaders(), 0);
    assert_eq!(compiler.device().live_programs(), 0);
}
