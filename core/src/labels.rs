use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::{bail, ensure};
use tract_core::prelude::TractResult;

/// A named category the model can predict.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(name: impl Into<String>) -> ClassLabel {
        ClassLabel(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ordered class list, plus the cosmetic icon of each class.
///
/// Order matches the model output vector: `get(i)` names score `i`.
#[derive(Clone, Debug)]
pub struct Labels {
    names: Vec<ClassLabel>,
    icons: HashMap<String, String>,
    default_icon: String,
}

// Never empty: `new` rejects an empty class list.
#[allow(clippy::len_without_is_empty)]
impl Labels {
    pub fn new<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        icons: HashMap<String, String>,
        default_icon: impl Into<String>,
    ) -> TractResult<Labels> {
        let names: Vec<ClassLabel> = names.into_iter().map(ClassLabel::new).collect();
        ensure!(!names.is_empty(), "Class list is empty");
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                bail!("Class {} appears more than once in the class list", name)
            }
        }
        for key in icons.keys() {
            if !seen.contains(key.as_str()) {
                warn!("Icon mapping for unknown class {key:?} is ignored");
            }
        }
        Ok(Labels { names, icons, default_icon: default_icon.into() })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, index: usize) -> Option<&ClassLabel> {
        self.names.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
        self.names.iter()
    }

    /// Icon for a class, falling back to the default icon for unmapped ones.
    pub fn icon_for(&self, label: &ClassLabel) -> &str {
        self.icons.get(label.as_str()).map(|s| s.as_str()).unwrap_or(self.default_icon.as_str())
    }

    pub fn default_icon(&self) -> &str {
        &self.default_icon
    }
}
