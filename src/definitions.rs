use std::collections::{BTreeMap, BTreeSet};

/// Named symbolic constants substituted into shaders at pre-processing time.
///
/// Every change is recorded as dirty so that programs depending on the name
/// can be recompiled. An empty value defines a flag (`#define NAME`).
#[derive(Debug, Clone, Default)]
pub struct ShaderPreDefinitions {
    definitions: BTreeMap<String, String>,
    static_definitions: BTreeMap<String, String>,
    dirty: BTreeSet<String>,
}

impl ShaderPreDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map<I, K, V>(definitions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            definitions: definitions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Sets a definition, returning whether its value changed.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.definitions.get(name) == Some(&value) {
            return false;
        }
        log::debug!("Pre-definition {} = '{}'", name, value);
        self.definitions.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self.definitions.remove(name).is_some() {
            self.dirty.insert(name.to_string());
            true
        } else {
            false
        }
    }

    /// Sets a definition emitted at the top of every top-level source.
    pub fn set_static(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.static_definitions.get(name) == Some(&value) {
            return false;
        }
        self.static_definitions.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.definitions.get(name).map(String::as_str)
    }

    pub fn static_definitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.static_definitions
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Names changed since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty)
    }

    /// Marks names dirty again, e.g. after a recompile that did not go through.
    pub fn mark_dirty<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirty.extend(names.into_iter().map(Into::into));
    }
}

pub(crate) fn define_line(name: &str, value: &str) -> String {
    if value.is_empty() {
        format!("#define {}", name)
    } else {
        format!("#define {} {}", name, value)
    }
}
