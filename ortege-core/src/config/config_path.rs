use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::sync::Arc;

use convert_case::{Case, Casing};
use itertools::Itertools;

/// Prefix of every environment variable the agents read configuration from.
pub const ENV_PREFIX: &str = "ORT";

/// Path within a config tree.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigPath(Vec<Arc<String>>);

impl Display for ConfigPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.json_name())
    }
}

impl<S: Into<String>> Add<S> for &ConfigPath {
    type Output = ConfigPath;

    fn add(self, rhs: S) -> Self::Output {
        self.join(rhs)
    }
}

impl ConfigPath {
    /// Add a new part to the path.
    pub fn join(&self, part: impl Into<String>) -> Self {
        let part = part.into();
        debug_assert!(!part.contains('.'));
        let mut new = self.clone();
        new.0.push(Arc::new(part));
        new
    }

    /// Path of the `index`th element of the list at this path.
    pub fn index(&self, index: usize) -> Self {
        self.join(index.to_string())
    }

    /// Get the JSON formatted path.
    pub fn json_name(&self) -> String {
        self.0
            .iter()
            .map(|s| s.as_str().to_case(Case::Camel))
            .join(".")
    }

    /// Get the environment variable formatted path. Nested keys are separated
    /// by a double underscore so snake_case keys survive.
    pub fn env_name(&self) -> String {
        std::iter::once(ENV_PREFIX.to_owned())
            .chain(
                std::iter::once(
                    self.0
                        .iter()
                        .map(|s| s.as_str().to_case(Case::Snake).to_uppercase())
                        .join("__"),
                )
                .filter(|s| !s.is_empty()),
            )
            .join("_")
    }
}
