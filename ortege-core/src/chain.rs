use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::H160;

/// Name of a chain, used as the key of every per-chain table.
///
/// Names are compared case-sensitively; configuration is expected to use the
/// lowercase form (`ethereum`, `polygon`, ...).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainName(String);

impl ChainName {
    /// Create a chain name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The chain name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for ChainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ChainName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for ChainName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A table with one entry per chain. Ordered so that anything built from it
/// is deterministic.
pub type ChainMap<T> = BTreeMap<ChainName, T>;

/// Owner address of the deployed modules on each chain.
pub type OwnerMap = ChainMap<H160>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_name_serializes_as_plain_string() {
        let name = ChainName::from("ethereum");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"ethereum\"");
        let parsed: ChainName = serde_json::from_str("\"polygon\"").unwrap();
        assert_eq!(parsed.as_str(), "polygon");
    }

    #[test]
    fn chain_map_is_ordered_by_name() {
        let mut map: ChainMap<u32> = ChainMap::new();
        map.insert("polygon".into(), 2);
        map.insert("avalanche".into(), 1);
        map.insert("ethereum".into(), 3);
        let keys: Vec<_> = map.keys().map(ChainName::as_str).collect();
        assert_eq!(keys, vec!["avalanche", "ethereum", "polygon"]);
    }
}
