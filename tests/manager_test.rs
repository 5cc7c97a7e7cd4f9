mod common;

use common::{ProjectDir, id, stage};
use shadeweave::{
    Config, HeadlessDevice, MockHotReloader, ShaderError, ShaderKind, ShaderManager, SourceKind,
};

const VERTEX: &str = "void main() {\n    gl_Position = vec4(0.0);\n}\n";
const SKY: &str = "out vec4 color;\n\
                   #ifdef USE_STARS\n\
                   uniform float stars;\n\
                   #endif\n\
                   void main() {\n\
                       color = vec4(0.2, 0.4, 0.8, 1.0);\n\
                   }\n";
const GROUND: &str = "#include demo:noise\nout vec4 color;\nvoid main() {\n    color = vec4(noise());\n}\n";
const NOISE: &str = "float noise() {\n    return 0.5;\n}\n";

fn project() -> ProjectDir {
    let project = ProjectDir::new();
    for name in ["demo:sky", "demo:ground"] {
        project.write_source(name, stage(ShaderKind::Vertex), VERTEX);
    }
    project.write_source("demo:sky", stage(ShaderKind::Fragment), SKY);
    project.write_source("demo:ground", stage(ShaderKind::Fragment), GROUND);
    project.write_source("demo:noise", SourceKind::Include, NOISE);
    project.write_program("demo:sky", "vertex = \"demo:sky\"\nfragment = \"demo:sky\"\n");
    project.write_program("demo:ground", "vertex = \"demo:ground\"\nfragment = \"demo:ground\"\n");
    project
}

fn manager(project: &ProjectDir, extra: &str) -> ShaderManager<HeadlessDevice> {
    let config = Config::load(project.write_config(extra)).expect("Config should load");
    ShaderManager::from_config(&config, HeadlessDevice::new()).expect("Manager should build")
}

#[test]
fn test_load_and_compile_all() {
    let project = project();
    project.write_program("demo:broken", "vertex = \"demo:sky\"\npixel = \"demo:sky\"\n");
    project.write_program("demo:missing", "fragment = \"demo:nowhere\"\n");

    let mut manager = manager(&project, "");
    let ids: Vec<_> = manager.program_ids().cloned().collect();
    assert_eq!(ids, vec![id("demo:ground"), id("demo:missing"), id("demo:sky")]);

    let errors = manager.compile_all();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, id("demo:missing"));
    assert!(matches!(errors[0].1, ShaderError::SourceNotFound { .. }));
    assert!(manager.program(&id("demo:sky")).unwrap().is_linked());
    assert!(manager.program(&id("demo:ground")).unwrap().is_linked());
    assert!(manager.program(&id("demo:missing")).is_none());

    manager.free();
    assert_eq!(manager.device().live_shaders(), 0);
    assert_eq!(manager.device().live_programs(), 0);
    assert_eq!(manager.device().invalid_deletes(), 0);
}

#[test]
fn test_config_definitions_and_modifiers_apply() {
    let project = project();
    project.write_modifier(
        "demo:sky",
        stage(ShaderKind::Fragment),
        "[FUNCTION main TAIL]\n#color.a = 0.5;\n",
    );
    let mut manager = manager(&project, "[definitions]\nUSE_STARS = \"\"\n");
    assert!(manager.compile_all().is_empty());

    let program = manager.program(&id("demo:sky")).unwrap();
    assert!(program.depends_on("USE_STARS"));
    let fragment = program.stage(ShaderKind::Fragment).unwrap();
    let source = manager.device().shader_source_of(fragment.handle()).unwrap();
    assert!(source.contains("color.a = 0.5;"));
}

#[test]
fn test_definition_change_recompiles_dependents() {
    let project = project();
    let mut manager = manager(&project, "");
    assert!(manager.compile_all().is_empty());
    let sky = manager.program(&id("demo:sky")).unwrap().handle();
    let ground = manager.program(&id("demo:ground")).unwrap().handle();

    assert!(manager.set_definition("USE_STARS", ""));
    assert!(manager.recompile_dirty().is_empty());
    assert_ne!(manager.program(&id("demo:sky")).unwrap().handle(), sky);
    assert_eq!(manager.program(&id("demo:ground")).unwrap().handle(), ground);

    assert!(!manager.set_definition("USE_STARS", ""));
    assert!(manager.recompile_dirty().is_empty());
}

#[test]
fn test_failed_definition_recompile_is_retried() {
    let project = project();
    let mut manager = manager(&project, "");
    assert!(manager.compile_all().is_empty());
    let sky = manager.program(&id("demo:sky")).unwrap().handle();

    manager.device_mut().fail_next_link("ERROR: out of resources");
    assert!(manager.set_definition("USE_STARS", ""));
    let errors = manager.recompile_dirty();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, id("demo:sky"));
    assert_eq!(manager.program(&id("demo:sky")).unwrap().handle(), sky);
    assert!(manager.definitions().is_dirty());

    assert!(manager.recompile_dirty().is_empty());
    assert_ne!(manager.program(&id("demo:sky")).unwrap().handle(), sky);
    assert!(!manager.definitions().is_dirty());
}

#[test]
fn test_hot_reload_recompiles_importers_and_keeps_stale_program() {
    let project = project();
    let mut manager = manager(&project, "");
    assert!(manager.compile_all().is_empty());
    let ground = manager.program(&id("demo:ground")).unwrap().handle();
    let sky = manager.program(&id("demo:sky")).unwrap().handle();

    let noise = project.write_source(
        "demo:noise",
        SourceKind::Include,
        "float noise() {\n    return 0.25;\n}\n",
    );
    let reloader = MockHotReloader::new();
    reloader.simulate_file_change(&noise);
    assert!(manager.poll_hot_reload(&reloader).is_empty());
    let reloaded = manager.program(&id("demo:ground")).unwrap().handle();
    assert_ne!(reloaded, ground);
    assert_eq!(manager.program(&id("demo:sky")).unwrap().handle(), sky);

    let broken = project.write_source(
        "demo:noise",
        SourceKind::Include,
        "float noise( {\n",
    );
    reloader.simulate_file_change(&broken);
    let errors = manager.poll_hot_reload(&reloader);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, id("demo:ground"));
    let program = manager.program(&id("demo:ground")).unwrap();
    assert_eq!(program.handle(), reloaded);
    assert!(program.is_linked());
}

#[test]
fn test_hot_reload_of_program_definition() {
    let project = project();
    let mut manager = manager(&project, "");
    assert!(manager.compile_all().is_empty());

    let path = project.write_program(
        "demo:sky",
        "vertex = \"demo:sky\"\nfragment = \"demo:ground\"\n",
    );
    let reloader = MockHotReloader::new();
    reloader.simulate_file_change(&path);
    assert!(manager.poll_hot_reload(&reloader).is_empty());

    let program = manager.program(&id("demo:sky")).unwrap();
    let fragment = program.stage(ShaderKind::Fragment).unwrap();
    assert_eq!(fragment.id(), Some(&id("demo:ground")));
    assert!(program.sources().contains(&id("demo:noise")));
}

#[test]
fn test_invalid_default_version_is_rejected() {
    let project = project();
    let path = project.write_config("[compiler]\ndefault_version = \"latest\"\n");
    assert!(Config::load(path).is_err());
}
