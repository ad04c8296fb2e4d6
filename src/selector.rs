//! Resource selectors: `snap`, `snap.service` and `snap:connector`

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Maximum length of a snap name
pub const MAX_NAME_LEN: usize = 40;

/// Lowercase letters, digits and single inner hyphens, with at least one letter
static SNAP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9]+-?)*[a-z](?:-?[a-z0-9])*$").expect("valid regex")
});

/// Check a snap name against snapd's naming rules
pub fn validate_snap_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN || !SNAP_NAME.is_match(name) {
        return Err(Error::Validation(format!("Invalid snap name '{name}'")));
    }
    Ok(())
}

/// Names one manageable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceSelector {
    /// A whole snap
    Snap(String),
    /// One service of a snap
    Service { snap: String, service: String },
    /// One plug or slot of a snap
    Connector { snap: String, connector: String },
}

impl ResourceSelector {
    /// Select a snap by validated name
    pub fn snap(name: &str) -> Result<Self> {
        validate_snap_name(name)?;
        Ok(Self::Snap(name.to_string()))
    }

    /// Select a snap, or one of its services
    pub fn service(snap: &str, service: Option<&str>) -> Result<Self> {
        validate_snap_name(snap)?;
        Ok(match service {
            Some(service) => Self::Service {
                snap: snap.to_string(),
                service: validate_part(service, "service")?,
            },
            None => Self::Snap(snap.to_string()),
        })
    }

    /// Select a plug or slot of a snap
    pub fn connector(snap: &str, connector: &str) -> Result<Self> {
        validate_snap_name(snap)?;
        Ok(Self::Connector {
            snap: snap.to_string(),
            connector: validate_part(connector, "connector")?,
        })
    }

    /// Parse `snap`, `snap.service` or `snap:connector`
    pub fn parse(spec: &str) -> Result<Self> {
        if let Some((snap, connector)) = spec.split_once(':') {
            return Self::connector(snap, connector);
        }
        match spec.split_once('.') {
            Some((snap, service)) => Self::service(snap, Some(service)),
            None => Self::snap(spec),
        }
    }

    /// The snap this selector belongs to
    pub fn snap_name(&self) -> &str {
        match self {
            Self::Snap(snap)
            | Self::Service { snap, .. }
            | Self::Connector { snap, .. } => snap,
        }
    }
}

fn validate_part(part: &str, what: &str) -> Result<String> {
    let valid = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(Error::Validation(format!("Invalid {what} name '{part}'")));
    }
    Ok(part.to_string())
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snap(snap) => f.write_str(snap),
            Self::Service { snap, service } => write!(f, "{snap}.{service}"),
            Self::Connector { snap, connector } => write!(f, "{snap}:{connector}"),
        }
    }
}

impl FromStr for ResourceSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_snap_names() {
        for name in ["hello", "hello-world", "lxd", "0ad", "go1-17", "a"] {
            assert!(validate_snap_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_snap_names() {
        for name in ["", "Hello", "-hello", "hello-", "hel--lo", "123", "hello_world"] {
            assert!(validate_snap_name(name).is_err(), "{name} should be invalid");
        }
        assert!(validate_snap_name(&"a".repeat(41)).is_err());
        assert!(validate_snap_name(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!(
            ResourceSelector::parse("hello").unwrap(),
            ResourceSelector::Snap("hello".to_string())
        );
        assert_eq!(
            ResourceSelector::parse("hello.daemon").unwrap().to_string(),
            "hello.daemon"
        );
        let connector = ResourceSelector::parse("hello:home").unwrap();
        assert_eq!(connector.snap_name(), "hello");
        assert_eq!(connector.to_string(), "hello:home");
    }

    #[test]
    fn test_parse_rejects_bad_parts() {
        assert!(ResourceSelector::parse("hello:").is_err());
        assert!(ResourceSelector::parse("Hello.daemon").is_err());
        assert!(ResourceSelector::parse("hello.da emon").is_err());
    }

    #[test]
    fn test_service_without_app_selects_snap() {
        assert_eq!(
            ResourceSelector::service("hello", None).unwrap(),
            ResourceSelector::Snap("hello".to_string())
        );
    }
}
