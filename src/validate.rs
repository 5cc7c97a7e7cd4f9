//! Offline GLSL validation with naga, used by the headless device and tests.
//!
//! naga's GLSL frontend accepts `#version 440`/`450`/`460` sources and the
//! vertex, fragment and compute stages; other stages are not checked.

use crate::id::ShaderKind;

fn naga_stage(kind: ShaderKind) -> Option<naga::ShaderStage> {
    match kind {
        ShaderKind::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderKind::Fragment => Some(naga::ShaderStage::Fragment),
        ShaderKind::Compute => Some(naga::ShaderStage::Compute),
        ShaderKind::Geometry | ShaderKind::TessControl | ShaderKind::TessEvaluation => None,
    }
}

/// Parses and validates a pre-processed GLSL source, returning the error log
/// on failure. Stages naga cannot check pass unconditionally.
pub fn validate_glsl(kind: ShaderKind, source: &str) -> Result<(), String> {
    let Some(stage) = naga_stage(kind) else {
        log::debug!("Skipping naga validation of {} shader", kind);
        return Ok(());
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage);
    let module = frontend.parse(&options, source).map_err(|e| {
        e.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    // Bindings are assigned after linking, so unbound resources are expected.
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all() - naga::valid::ValidationFlags::BINDINGS,
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.into_inner().to_string())?;
    Ok(())
}
