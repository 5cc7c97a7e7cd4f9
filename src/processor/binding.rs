use std::cell::RefCell;
use std::collections::BTreeSet;

use super::{PreProcessorContext, ShaderPreProcessor};
use crate::error::PreProcessorError;
use crate::glsl::ast::{Declaration, InterfaceBlock, TypeQualifier};
use crate::glsl::{TranslationUnit, print_expr};

const BINDING: &str = "binding";

/// Assigns binding slots to `uniform` and `buffer` blocks.
///
/// Explicit `layout(binding = N)` slots are recorded and removed from the
/// source; the program applies all bindings after linking. Blocks without one
/// receive the smallest slot not yet used by a block of the same kind.
#[derive(Default)]
pub struct BindingProcessor {
    uniform_slots: RefCell<BTreeSet<u32>>,
    storage_slots: RefCell<BTreeSet<u32>>,
}

impl BindingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self, block: &InterfaceBlock) -> &RefCell<BTreeSet<u32>> {
        if block.has_keyword("buffer") {
            &self.storage_slots
        } else {
            &self.uniform_slots
        }
    }
}

fn is_bound_block(declaration: &Declaration) -> Option<&InterfaceBlock> {
    match declaration {
        Declaration::Block(block) if block.has_keyword("uniform") || block.has_keyword("buffer") => {
            Some(block)
        }
        _ => None,
    }
}

fn explicit_binding(block: &InterfaceBlock) -> Result<Option<u32>, PreProcessorError> {
    let Some(entry) = crate::glsl::ast::layout_value(&block.qualifiers, BINDING) else {
        return Ok(None);
    };
    let value = entry.value.as_ref();
    value
        .and_then(|value| value.as_int())
        .map(Some)
        .ok_or_else(|| PreProcessorError::InvalidBinding {
            block: block.name.clone(),
            value: value.map(print_expr).unwrap_or_default(),
        })
}

fn strip_binding(block: &mut InterfaceBlock) {
    for qualifier in &mut block.qualifiers {
        if let TypeQualifier::Layout(entries) = qualifier {
            entries.retain(|entry| entry.name != BINDING);
        }
    }
    block
        .qualifiers
        .retain(|qualifier| !matches!(qualifier, TypeQualifier::Layout(entries) if entries.is_empty()));
}

fn smallest_free(used: &BTreeSet<u32>) -> u32 {
    (0..).find(|slot| !used.contains(slot)).unwrap_or(u32::MAX)
}

impl ShaderPreProcessor for BindingProcessor {
    fn prepare(&self) {
        self.uniform_slots.borrow_mut().clear();
        self.storage_slots.borrow_mut().clear();
    }

    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError> {
        let mut unit = TranslationUnit::parse(context.input())?;
        if !unit.declarations.iter().any(|d| is_bound_block(d).is_some()) {
            return Ok(context.input().to_string());
        }

        // Explicit slots are reserved before any automatic assignment.
        for block in unit.declarations.iter().filter_map(is_bound_block) {
            if context.uniform_binding(&block.name).is_some() {
                continue;
            }
            if let Some(slot) = explicit_binding(block)? {
                self.slots(block).borrow_mut().insert(slot);
                context.add_explicit_binding(&block.name, slot);
            }
        }

        for declaration in &mut unit.declarations {
            let Declaration::Block(block) = declaration else {
                continue;
            };
            if !(block.has_keyword("uniform") || block.has_keyword("buffer")) {
                continue;
            }
            if context.uniform_binding(&block.name).is_none() {
                let slot = {
                    let mut used = self.slots(block).borrow_mut();
                    let slot = smallest_free(&used);
                    used.insert(slot);
                    slot
                };
                log::debug!("Assigned binding {} to block {}", slot, block.name);
                context.add_uniform_binding(&block.name, slot);
            }
            strip_binding(block);
        }
        Ok(unit.to_source())
    }
}
