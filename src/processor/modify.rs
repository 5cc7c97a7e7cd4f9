use std::rc::Rc;

use super::{PreProcessorContext, ShaderPreProcessor};
use crate::error::{ModificationError, PreProcessorError};
use crate::modifier::{ShaderModification, ShaderModificationManager};
use crate::source::SourceProvider;

/// Applies registered modifications to the file being processed.
///
/// The highest-priority replacement, if any, swaps the source first; further
/// replacements are ignored. Injections then apply in priority order.
pub struct ModifyProcessor {
    modifications: Rc<ShaderModificationManager>,
    provider: Option<Rc<dyn SourceProvider>>,
}

impl ModifyProcessor {
    pub fn new(
        modifications: Rc<ShaderModificationManager>,
        provider: Option<Rc<dyn SourceProvider>>,
    ) -> Self {
        Self {
            modifications,
            provider,
        }
    }
}

impl ShaderPreProcessor for ModifyProcessor {
    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError> {
        let Some(name) = context.name() else {
            return Ok(context.input().to_string());
        };
        let kind = context.source_kind();
        let modifications = self.modifications.get(name, kind);
        if modifications.is_empty() {
            return Ok(context.input().to_string());
        }

        let mut replacements = modifications.iter().filter_map(|modification| match modification {
            ShaderModification::Replace(replace) => Some(replace),
            ShaderModification::Inject(_) => None,
        });
        let mut source = match replacements.next() {
            Some(replace) => {
                let provider = self.provider.as_ref().ok_or_else(|| ModificationError::Replacement {
                    id: replace.shader.clone(),
                    reason: "no source provider".to_string(),
                })?;
                log::debug!("Replacing {} {} with {}", kind, name, replace.shader);
                provider
                    .open(&replace.shader, kind)
                    .map_err(|e| ModificationError::Replacement {
                        id: replace.shader.clone(),
                        reason: e.to_string(),
                    })?
            }
            None => context.input().to_string(),
        };
        for ignored in replacements {
            log::warn!(
                "Ignoring lower priority replacement of {} {} with {}",
                kind,
                name,
                ignored.shader
            );
        }

        for modification in modifications {
            if let ShaderModification::Inject(_) = modification {
                source = modification.inject(&source)?;
            }
        }
        Ok(source)
    }
}
