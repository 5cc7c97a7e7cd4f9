use super::{PreProcessorContext, ShaderPreProcessor};
use crate::error::PreProcessorError;
use crate::glsl::TranslationUnit;
use crate::glsl::ast::{Declaration, Directive};

pub const DEFAULT_VERSION: &str = "410 core";

const PROFILES: &[&str] = &["core", "compatibility", "es"];

/// A parsed `#version` line. An omitted profile means `core`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub number: u32,
    pub profile: Option<String>,
}

impl Version {
    pub fn parse(arguments: &str) -> Option<Self> {
        let mut parts = arguments.split_whitespace();
        let number = parts.next()?.parse().ok()?;
        let profile = match parts.next() {
            Some(profile) if PROFILES.contains(&profile) => Some(profile.to_string()),
            Some(_) => return None,
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { number, profile })
    }

    fn profile_or_core(&self) -> &str {
        self.profile.as_deref().unwrap_or("core")
    }

    fn same_as(&self, other: &Version) -> bool {
        self.number == other.number && self.profile_or_core() == other.profile_or_core()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.profile {
            Some(profile) => write!(f, "#version {} {}", self.number, profile),
            None => write!(f, "#version {}", self.number),
        }
    }
}

/// Ensures exactly one `#version` line, first in the source.
///
/// Repeated identical lines, which imports commonly bring in, collapse into
/// one; differing lines are an error. A source without any gets the
/// configured default.
pub struct VersionProcessor {
    default_version: Version,
}

impl VersionProcessor {
    pub fn new(default_version: &str) -> Result<Self, PreProcessorError> {
        let default_version = Version::parse(default_version)
            .ok_or_else(|| PreProcessorError::InvalidVersion(default_version.to_string()))?;
        Ok(Self { default_version })
    }
}

impl Default for VersionProcessor {
    fn default() -> Self {
        Self {
            default_version: Version {
                number: 410,
                profile: Some("core".to_string()),
            },
        }
    }
}

impl ShaderPreProcessor for VersionProcessor {
    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError> {
        let mut unit = TranslationUnit::parse(context.input())?;

        let mut found: Option<Version> = None;
        let mut declarations = Vec::with_capacity(unit.declarations.len() + 1);
        for declaration in unit.declarations {
            let Declaration::Directive(directive) = &declaration else {
                declarations.push(declaration);
                continue;
            };
            if directive.name() != "version" {
                declarations.push(declaration);
                continue;
            }
            let version = Version::parse(directive.arguments())
                .ok_or_else(|| PreProcessorError::InvalidVersion(directive.text.clone()))?;
            match &found {
                Some(first) if !first.same_as(&version) => {
                    return Err(PreProcessorError::ConflictingVersion {
                        first: first.to_string(),
                        second: version.to_string(),
                    });
                }
                Some(_) => {}
                None => found = Some(version),
            }
        }

        let version = found.unwrap_or_else(|| self.default_version.clone());
        declarations.insert(0, Declaration::Directive(Directive::new(version.to_string())));
        unit.declarations = declarations;
        Ok(unit.to_source())
    }
}
