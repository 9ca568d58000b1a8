//! Access levels and trustee keys

use crate::error::{Error, Result};
use crate::identity::PlayerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access level granted to a trustee
///
/// `Build` implies `Inventory` implies `Access`. `Manage` is independent: it
/// lets a trustee grant permissions but not build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimPermission {
    /// Open doors, use buttons and beds
    Access,
    /// Open containers
    Inventory,
    /// Place and break blocks
    Build,
    /// Grant permissions to others
    Manage,
}

impl ClaimPermission {
    fn rank(&self) -> Option<u8> {
        match self {
            ClaimPermission::Access => Some(1),
            ClaimPermission::Inventory => Some(2),
            ClaimPermission::Build => Some(3),
            ClaimPermission::Manage => None,
        }
    }

    /// Whether holding `self` satisfies a check for `required`
    pub fn grants(&self, required: ClaimPermission) -> bool {
        match (self.rank(), required.rank()) {
            (Some(have), Some(need)) => have >= need,
            (None, None) => true,
            _ => false,
        }
    }

    /// Persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimPermission::Access => "Access",
            ClaimPermission::Inventory => "Inventory",
            ClaimPermission::Build => "Build",
            ClaimPermission::Manage => "Manage",
        }
    }
}

impl fmt::Display for ClaimPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimPermission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Access" => Ok(ClaimPermission::Access),
            "Inventory" | "Containers" => Ok(ClaimPermission::Inventory),
            "Build" => Ok(ClaimPermission::Build),
            "Manage" => Ok(ClaimPermission::Manage),
            other => Err(Error::InvalidPermission(other.to_string())),
        }
    }
}

/// Who a permission entry applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trustee {
    /// A single player
    Player(PlayerId),
    /// Everyone
    Public,
    /// Holders of a host permission node, written `[node]`
    Group(String),
}

impl fmt::Display for Trustee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trustee::Player(id) => write!(f, "{}", id),
            Trustee::Public => f.write_str("public"),
            Trustee::Group(node) => write!(f, "[{}]", node),
        }
    }
}

impl FromStr for Trustee {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "public" {
            return Ok(Trustee::Public);
        }
        if let Some(node) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return Ok(Trustee::Group(node.to_string()));
        }
        Ok(Trustee::Player(PlayerId::parse(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants() {
        assert!(ClaimPermission::Build.grants(ClaimPermission::Access));
        assert!(ClaimPermission::Build.grants(ClaimPermission::Inventory));
        assert!(ClaimPermission::Inventory.grants(ClaimPermission::Access));
        assert!(!ClaimPermission::Access.grants(ClaimPermission::Build));
        assert!(!ClaimPermission::Manage.grants(ClaimPermission::Build));
        assert!(!ClaimPermission::Build.grants(ClaimPermission::Manage));
        assert!(ClaimPermission::Manage.grants(ClaimPermission::Manage));
    }

    #[test]
    fn test_trustee_parse() {
        assert_eq!("public".parse::<Trustee>().unwrap(), Trustee::Public);
        assert_eq!(
            "[builders]".parse::<Trustee>().unwrap(),
            Trustee::Group("builders".to_string())
        );
        let id = PlayerId::random();
        assert_eq!(id.to_string().parse::<Trustee>().unwrap(), Trustee::Player(id));
        assert!("nobody".parse::<Trustee>().is_err());
    }

    #[test]
    fn test_permission_names() {
        for p in [
            ClaimPermission::Access,
            ClaimPermission::Inventory,
            ClaimPermission::Build,
            ClaimPermission::Manage,
        ] {
            assert_eq!(p.as_str().parse::<ClaimPermission>().unwrap(), p);
        }
    }
}
