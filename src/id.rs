use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Namespace used when an identifier is written without one.
pub const DEFAULT_NAMESPACE: &str = "shader";

/// Logical shader identifier of the form `namespace:path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct ShaderId {
    namespace: String,
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid shader identifier '{0}'")]
pub struct InvalidShaderId(pub String);

impl ShaderId {
    pub fn new(namespace: &str, path: &str) -> Result<Self, InvalidShaderId> {
        let valid_namespace = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-.".contains(c));
        let valid_path = !path.is_empty()
            && !path.starts_with('/')
            && !path.split('/').any(|segment| segment.is_empty() || segment == "..")
            && path
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-./".contains(c));
        if !valid_namespace || !valid_path {
            return Err(InvalidShaderId(format!("{}:{}", namespace, path)));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for ShaderId {
    type Err = InvalidShaderId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, s),
        }
        .map_err(|_| InvalidShaderId(s.to_string()))
    }
}

impl TryFrom<String> for ShaderId {
    type Error = InvalidShaderId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// Pipeline stage a shader object is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 6] = [
        ShaderKind::Vertex,
        ShaderKind::TessControl,
        ShaderKind::TessEvaluation,
        ShaderKind::Geometry,
        ShaderKind::Fragment,
        ShaderKind::Compute,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaderKind::Vertex => "vertex",
            ShaderKind::TessControl => "tessellation control",
            ShaderKind::TessEvaluation => "tessellation evaluation",
            ShaderKind::Geometry => "geometry",
            ShaderKind::Fragment => "fragment",
            ShaderKind::Compute => "compute",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ShaderKind::Vertex => "vsh",
            ShaderKind::TessControl => "tcsh",
            ShaderKind::TessEvaluation => "tesh",
            ShaderKind::Geometry => "gsh",
            ShaderKind::Fragment => "fsh",
            ShaderKind::Compute => "csh",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.extension() == extension)
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a source lookup is for: a full stage file or an importable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Shader(ShaderKind),
    Include,
}

impl SourceKind {
    pub const INCLUDE_EXTENSION: &'static str = "glsl";

    pub fn extension(self) -> &'static str {
        match self {
            SourceKind::Shader(kind) => kind.extension(),
            SourceKind::Include => Self::INCLUDE_EXTENSION,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension == Self::INCLUDE_EXTENSION {
            return Some(SourceKind::Include);
        }
        ShaderKind::from_extension(extension).map(SourceKind::Shader)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Shader(kind) => write!(f, "{} shader", kind),
            SourceKind::Include => f.write_str("include"),
        }
    }
}
