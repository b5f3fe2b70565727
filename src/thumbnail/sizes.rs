//! Registry of named sizes and the policy deciding which boxes may be
//! generated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

/// A named size, e.g. `thumbnail=150x150`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl FromStr for NamedSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, dims) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=WIDTHxHEIGHT, got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("size name is empty in '{}'", s));
        }

        let (width, height) = dims
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", dims))?;
        let width = width
            .parse()
            .map_err(|_| format!("invalid width '{}' in '{}'", width, s))?;
        let height = height
            .parse()
            .map_err(|_| format!("invalid height '{}' in '{}'", height, s))?;

        Ok(Self {
            name: name.to_string(),
            width,
            height,
        })
    }
}

impl fmt::Display for NamedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}x{}", self.name, self.width, self.height)
    }
}

/// Read-only set of named sizes, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct SizeRegistry {
    sizes: BTreeMap<String, NamedSize>,
}

impl SizeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list; later entries replace earlier ones with the same name.
    pub fn from_sizes(sizes: impl IntoIterator<Item = NamedSize>) -> Self {
        let sizes = sizes.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { sizes }
    }

    pub fn get(&self, name: &str) -> Option<&NamedSize> {
        self.sizes.get(name)
    }

    /// `true` if some named size declares exactly `width x height`.
    pub fn contains_box(&self, width: u32, height: u32) -> bool {
        self.sizes
            .values()
            .any(|s| s.width == width && s.height == height)
    }

    /// Sizes ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &NamedSize> {
        self.sizes.values()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Which requested boxes may be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SizePolicy {
    /// Any box parsed from the path
    #[default]
    Any,

    /// Only boxes declared by a named size
    Registered,
}

impl SizePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizePolicy::Any => "any",
            SizePolicy::Registered => "registered",
        }
    }

    pub fn allows(&self, registry: &SizeRegistry, width: u32, height: u32) -> bool {
        match self {
            SizePolicy::Any => true,
            SizePolicy::Registered => registry.contains_box(width, height),
        }
    }
}
