mod common;

use common::{id, stage};
use shadeweave::{
    CompileContext, HeadlessDevice, MemorySourceProvider, ModificationError, ShaderCompiler,
    ShaderError, ShaderKind, ShaderModification, ShaderModificationManager, ShaderPreDefinitions,
    SourceKind,
};
use std::rc::Rc;

const SKY: &str = "#version 330 core\n\
                   in vec2 uv;\n\
                   layout(location = 0) out vec4 color;\n\
                   uniform sampler2D tex;\n\
                   void main() {\n\
                       if (uv.x < 0.0) {\n\
                           color = vec4(0.0);\n\
                           return;\n\
                       }\n\
                       color = texture(tex, uv);\n\
                   }\n";

fn provider() -> MemorySourceProvider {
    MemorySourceProvider::new()
        .with("demo:sky", stage(ShaderKind::Fragment), SKY)
        .with(
            "demo:night",
            stage(ShaderKind::Fragment),
            "layout(location = 0) out vec4 night;\nvoid main() {\n    night = vec4(0.0, 0.0, 0.1, 1.0);\n}\n",
        )
        .with(
            "demo:noon",
            stage(ShaderKind::Fragment),
            "out vec4 noon;\nvoid main() {\n    noon = vec4(1.0);\n}\n",
        )
        .with(
            "demo:scene",
            stage(ShaderKind::Fragment),
            "#include demo:common\nout vec4 color;\nvoid main() {\n    color = tint();\n}\n",
        )
        .with(
            "demo:common",
            SourceKind::Include,
            "vec4 tint() {\n    return vec4(1.0);\n}\n",
        )
}

fn modification(text: &str) -> ShaderModification {
    ShaderModification::parse(text).expect("Modification should parse")
}

fn compile(
    modifications: ShaderModificationManager,
    shader: &str,
) -> (ShaderCompiler<HeadlessDevice>, Result<String, ShaderError>) {
    let mut compiler = ShaderCompiler::builder(HeadlessDevice::new())
        .provider(Rc::new(provider()))
        .modifications(Rc::new(modifications))
        .verbose_errors(false)
        .build();
    let definitions = ShaderPreDefinitions::new();
    let result = compiler
        .compile(CompileContext::new(&definitions), ShaderKind::Fragment, &id(shader))
        .map(|stage| {
            compiler
                .device()
                .shader_source_of(stage.handle())
                .unwrap_or_default()
                .to_string()
        });
    (compiler, result)
}

#[test]
fn test_injection_adds_uniform_and_tail_code() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:sky"),
        stage(ShaderKind::Fragment),
        modification(
            "#version 400\n\
             [UNIFORM]\n\
             uniform float brightness;\n\
             [FUNCTION main(0) TAIL]\n\
             #out0.rgb *= brightness;\n",
        ),
    );

    let (_, result) = compile(modifications, "demo:sky");
    let source = result.unwrap();
    assert!(source.starts_with("#version 400 core"), "{}", source);
    let tex = source.find("uniform sampler2D tex;").unwrap();
    let brightness = source.find("uniform float brightness;").unwrap();
    assert!(brightness > tex);
    assert_eq!(source.matches("color.rgb *= brightness;").count(), 2);
}

#[test]
fn test_highest_priority_replacement_wins() {
    let mut modifications = ShaderModificationManager::new();
    let kind = stage(ShaderKind::Fragment);
    modifications.add(id("demo:sky"), kind, modification("#priority 50\n#replace demo:noon\n"));
    modifications.add(id("demo:sky"), kind, modification("#priority 100\n#replace demo:night\n"));
    modifications.add(
        id("demo:sky"),
        kind,
        modification("#priority 10\n[FUNCTION main HEAD]\nfloat shade = 0.5;\n"),
    );

    let (_, result) = compile(modifications, "demo:sky");
    let source = result.unwrap();
    assert!(source.contains("night = vec4(0.0, 0.0, 0.1, 1.0);"));
    assert!(!source.contains("noon"));
    assert!(!source.contains("sampler2D"));
    assert!(source.contains("float shade = 0.5;"));
}

#[test]
fn test_modifications_reach_imports() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:common"),
        SourceKind::Include,
        modification("[FUNCTION tint(0) HEAD]\nfloat boost = 2.0;\n"),
    );

    let (_, result) = compile(modifications, "demo:scene");
    let source = result.unwrap();
    let tint = source.find("vec4 tint()").unwrap();
    let boost = source.find("float boost = 2.0;").unwrap();
    assert!(boost > tint);
}

#[test]
fn test_unresolved_placeholder_fails() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:sky"),
        stage(ShaderKind::Fragment),
        modification("[FUNCTION main TAIL]\n#nothing = vec4(1.0);\n"),
    );

    let (compiler, result) = compile(modifications, "demo:sky");
    assert!(matches!(
        result,
        Err(ShaderError::ModificationApplication {
            source: ModificationError::UnresolvedPlaceholder(_),
            ..
        })
    ));
    assert_eq!(compiler.device().live_shaders(), 0);
}

#[test]
fn test_unmatched_function_fails() {
    let mut modifications = ShaderModificationManager::new();
    modifications.add(
        id("demo:sky"),
        stage(ShaderKind::Fragment),
        modification("[FUNCTION main(2) HEAD]\nfloat x = 1.0;\n"),
    );

    let (_, result) = compile(modifications, "demo:sky");
    assert!(matches!(
        result,
        Err(ShaderError::ModificationApplication {
            source: ModificationError::FunctionNotFound { .. },
            ..
        })
    ));
}

#[test]
fn test_replace_with_sections_is_a_syntax_error() {
    let error = ShaderModification::parse("#replace demo:night\n[UNIFORM]\nuniform float a;\n")
        .unwrap_err();
    assert!(error.line >= 1);
}
