//! Core types for snap management.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Valid channel risk levels, from most to least stable.
pub const RISK_LEVELS: [&str; 4] = ["stable", "candidate", "beta", "edge"];

/// Channel a snap tracks, validated as `<track>/<risk>[/<branch>]`.
///
/// A single component may be either a risk level (`edge`, meaning
/// `latest/edge`) or a track (`3.x`, meaning `3.x/stable`). Both are
/// stored in the long form snapd reports as the tracked channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// Parse and validate a channel string.
    pub fn parse(channel: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidChannel {
            channel: channel.to_string(),
            reason,
        };

        if channel.is_empty() {
            return Err(invalid("must not be empty".to_string()));
        }

        let parts: Vec<&str> = channel.split('/').collect();
        if parts.len() > 3 {
            return Err(invalid(
                "must follow <track>/<risk_level>[/<branch>]".to_string(),
            ));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("contains an empty component".to_string()));
        }

        // A lone component is a risk level or a track that implies stable
        let risk = match parts.as_slice() {
            [_track, risk, ..] => *risk,
            [single] if RISK_LEVELS.contains(single) => *single,
            _ => "stable",
        };
        if !RISK_LEVELS.contains(&risk) {
            return Err(invalid(format!(
                "risk level '{risk}' is not one of: {}",
                RISK_LEVELS.join(", ")
            )));
        }

        Ok(Self(match parts.as_slice() {
            [single] if RISK_LEVELS.contains(single) => format!("latest/{single}"),
            [track] => format!("{track}/stable"),
            _ => channel.to_string(),
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self("latest/stable".to_string())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Channel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

/// Requested revision of a snap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RevisionSpec {
    /// Whatever upgrade is currently available, if any
    Latest,
    /// An exact revision
    Exact(String),
}

impl RevisionSpec {
    /// Create an exact revision.
    pub fn exact(revision: impl ToString) -> Self {
        Self::Exact(revision.to_string())
    }
}

impl FromStr for RevisionSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s == "latest" {
            Self::Latest
        } else {
            Self::Exact(s.to_string())
        })
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(rev) => f.write_str(rev),
        }
    }
}

/// An installed snap as reported by snapd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSnap {
    /// Snap name
    pub name: String,
    /// Version string published by the snap author
    pub version: String,
    /// Installed revision
    pub revision: String,
    /// Tracked channel
    pub channel: String,
    /// Whether the snap is excluded from general refreshes
    pub held: bool,
    /// Whether the snap is enabled
    pub enabled: bool,
    /// Whether the snap runs without security confinement
    pub classic: bool,
}

impl InstalledSnap {
    /// Create an enabled, unheld snap.
    pub fn new(
        name: impl Into<String>,
        channel: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            revision: revision.into(),
            channel: channel.into(),
            held: false,
            enabled: true,
            classic: false,
        }
    }

    /// Set the held flag.
    pub fn with_held(mut self, held: bool) -> Self {
        self.held = held;
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// An available upgrade for an installed snap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    pub name: String,
    pub version: String,
    pub revision: String,
}

/// Which side of an interface connection a connector sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Consumes an interface
    Plug,
    /// Provides an interface
    Slot,
}

impl ConnectorKind {
    /// The kind a connector of this kind connects to.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Plug => Self::Slot,
            Self::Slot => Self::Plug,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plug => "plug",
            Self::Slot => "slot",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Plug => "plugs",
            Self::Slot => "slots",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified connector: `<snap>:<plug or slot>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub snap: String,
    pub name: String,
}

impl Endpoint {
    pub fn new(snap: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            snap: snap.into(),
            name: name.into(),
        }
    }

    /// Parse `<snap>:<name>`, returning `None` for a bare snap name.
    pub fn parse(spec: &str) -> Option<Self> {
        let (snap, name) = spec.split_once(':')?;
        Some(Self::new(snap, name))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.snap, self.name)
    }
}

/// An established connection between a plug and a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub plug: Endpoint,
    pub slot: Endpoint,
    pub interface: String,
}

impl Connection {
    pub fn new(plug: Endpoint, slot: Endpoint, interface: impl Into<String>) -> Self {
        Self {
            plug,
            slot,
            interface: interface.into(),
        }
    }

    /// The endpoint on the given side of the connection.
    pub fn endpoint(&self, kind: ConnectorKind) -> &Endpoint {
        match kind {
            ConnectorKind::Plug => &self.plug,
            ConnectorKind::Slot => &self.slot,
        }
    }
}

/// A plug or slot exposed by a snap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub snap: String,
    pub name: String,
    pub kind: ConnectorKind,
    pub interface: String,
    /// Peers this connector is currently connected to
    pub connections: Vec<Endpoint>,
}

/// Runtime status of a snap service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Starts at boot
    pub enabled: bool,
    /// Currently active
    pub running: bool,
}

impl ServiceStatus {
    pub fn new(enabled: bool, running: bool) -> Self {
        Self { enabled, running }
    }
}

/// Which services a service query covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceSelector {
    /// Every service of a snap
    Snap(String),
    /// A single service, fully qualified as `<snap>.<app>`
    Service(String),
}

impl ServiceSelector {
    /// Select one service of a snap, or all of them.
    pub fn for_snap(snap: &str, service: Option<&str>) -> Self {
        match service {
            Some(app) => Self::Service(format!("{snap}.{app}")),
            None => Self::Snap(snap.to_string()),
        }
    }

    /// Select a fully qualified service.
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    /// The snap this selector belongs to.
    pub fn snap(&self) -> &str {
        match self {
            Self::Snap(snap) => snap,
            Self::Service(name) => name.split_once('.').map_or(name.as_str(), |(s, _)| s),
        }
    }

    /// Whether a fully qualified service name falls under this selector.
    pub fn matches(&self, service: &str) -> bool {
        match self {
            Self::Snap(snap) => service
                .strip_prefix(snap.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
            Self::Service(name) => name == service,
        }
    }
}

impl fmt::Display for ServiceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snap(snap) => f.write_str(snap),
            Self::Service(name) => f.write_str(name),
        }
    }
}

/// Identity of a local `.snap` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapFileInfo {
    /// Snap name declared in the file's metadata
    pub name: String,
    /// SHA3-384 digest, used to look up the snap-revision assertion
    pub sha3_384: String,
}

/// A mutating provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Install a snap (or refresh an installed one)
    Install {
        /// Snap name or absolute path to a `.snap` file
        name: String,
        channel: Option<Channel>,
        revision: Option<String>,
        classic: bool,
        /// Modify an installed snap instead of installing a new one
        refresh: bool,
    },
    Remove {
        name: String,
        /// Do not keep a snapshot of the snap's data
        purge: bool,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    Hold {
        name: String,
    },
    Unhold {
        name: String,
    },
    Connect {
        snap: String,
        plug: String,
        slot: Endpoint,
    },
    /// Disconnect a plug or slot, from one peer or from all of them
    Disconnect {
        snap: String,
        connector: String,
        target: Option<Endpoint>,
    },
    ServiceStart {
        service: String,
        enable: bool,
    },
    ServiceStop {
        service: String,
        disable: bool,
    },
    ServiceRestart {
        service: String,
        reload: bool,
    },
    OptionSet {
        snap: String,
        key: String,
        value: Value,
    },
    OptionUnset {
        snap: String,
        key: String,
    },
    /// Import an assertions file
    Ack {
        path: PathBuf,
    },
}

impl Action {
    /// Short operation name, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Install { refresh: true, .. } => "refresh",
            Action::Install { .. } => "install",
            Action::Remove { .. } => "remove",
            Action::Enable { .. } => "enable",
            Action::Disable { .. } => "disable",
            Action::Hold { .. } => "hold",
            Action::Unhold { .. } => "unhold",
            Action::Connect { .. } => "connect",
            Action::Disconnect { .. } => "disconnect",
            Action::ServiceStart { .. } => "service_start",
            Action::ServiceStop { .. } => "service_stop",
            Action::ServiceRestart { .. } => "service_restart",
            Action::OptionSet { .. } => "option_set",
            Action::OptionUnset { .. } => "option_unset",
            Action::Ack { .. } => "ack",
        }
    }

    /// The resource the action operates on.
    pub fn target(&self) -> String {
        match self {
            Action::Install { name, .. }
            | Action::Remove { name, .. }
            | Action::Enable { name }
            | Action::Disable { name }
            | Action::Hold { name }
            | Action::Unhold { name } => name.clone(),
            Action::Connect { snap, plug, .. } => format!("{snap}:{plug}"),
            Action::Disconnect {
                snap, connector, ..
            } => format!("{snap}:{connector}"),
            Action::ServiceStart { service, .. }
            | Action::ServiceStop { service, .. }
            | Action::ServiceRestart { service, .. } => service.clone(),
            Action::OptionSet { snap, key, .. } | Action::OptionUnset { snap, key } => {
                format!("{snap}:{key}")
            }
            Action::Ack { path } => path.display().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install {
                name,
                channel,
                revision,
                classic,
                ..
            } => {
                write!(f, "{} {name}", self.kind())?;
                let mut details = Vec::new();
                if let Some(channel) = channel {
                    details.push(format!("channel {channel}"));
                }
                if let Some(revision) = revision {
                    details.push(format!("revision {revision}"));
                }
                if *classic {
                    details.push("classic".to_string());
                }
                if !details.is_empty() {
                    write!(f, " ({})", details.join(", "))?;
                }
                Ok(())
            }
            Action::Remove { name, purge } => {
                write!(f, "remove {name}{}", if *purge { " (purge)" } else { "" })
            }
            Action::Enable { name } => write!(f, "enable {name}"),
            Action::Disable { name } => write!(f, "disable {name}"),
            Action::Hold { name } => write!(f, "hold {name}"),
            Action::Unhold { name } => write!(f, "unhold {name}"),
            Action::Connect { snap, plug, slot } => write!(f, "connect {snap}:{plug} to {slot}"),
            Action::Disconnect {
                snap,
                connector,
                target: Some(target),
            } => write!(f, "disconnect {snap}:{connector} from {target}"),
            Action::Disconnect {
                snap,
                connector,
                target: None,
            } => write!(f, "disconnect {snap}:{connector} from all peers"),
            Action::ServiceStart { service, enable } => {
                write!(f, "start {service}{}", if *enable { " and enable it" } else { "" })
            }
            Action::ServiceStop { service, disable } => {
                write!(f, "stop {service}{}", if *disable { " and disable it" } else { "" })
            }
            Action::ServiceRestart { service, reload } => {
                write!(f, "{} {service}", if *reload { "reload" } else { "restart" })
            }
            Action::OptionSet { snap, key, value } => write!(f, "set {snap} option {key}={value}"),
            Action::OptionUnset { snap, key } => write!(f, "unset {snap} option {key}"),
            Action::Ack { path } => write!(f, "import assertions from {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_valid() {
        for channel in ["latest/stable", "edge", "3.x", "3.x/beta", "latest/edge/fix-123"] {
            assert!(Channel::parse(channel).is_ok(), "{channel} should be valid");
        }
    }

    #[test]
    fn test_channel_short_forms_are_expanded() {
        assert_eq!(Channel::parse("edge").unwrap().as_str(), "latest/edge");
        assert_eq!(Channel::parse("3.x").unwrap().as_str(), "3.x/stable");
        assert_eq!(Channel::parse("3.x/beta").unwrap().as_str(), "3.x/beta");
        assert_eq!(
            Channel::parse("latest/edge/fix-123").unwrap().as_str(),
            "latest/edge/fix-123"
        );
    }

    #[test]
    fn test_channel_parse_invalid() {
        assert!(Channel::parse("").is_err());
        assert!(Channel::parse("a/b/c/d").is_err());
        assert!(Channel::parse("latest/unstable").is_err());
        assert!(Channel::parse("latest//fix").is_err());

        let err = Channel::parse("latest/unstable").unwrap_err();
        assert!(err.to_string().contains("risk level 'unstable'"));
    }

    #[test]
    fn test_revision_spec_from_str() {
        assert_eq!("latest".parse::<RevisionSpec>().unwrap(), RevisionSpec::Latest);
        assert_eq!(
            "42".parse::<RevisionSpec>().unwrap(),
            RevisionSpec::Exact("42".to_string())
        );
        assert_eq!(RevisionSpec::exact(7).to_string(), "7");
    }

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("core:network"),
            Some(Endpoint::new("core", "network"))
        );
        assert_eq!(Endpoint::parse("core"), None);
        assert_eq!(Endpoint::new("a", "b").to_string(), "a:b");
    }

    #[test]
    fn test_connector_kind_opposite() {
        assert_eq!(ConnectorKind::Plug.opposite(), ConnectorKind::Slot);
        assert_eq!(ConnectorKind::Slot.opposite(), ConnectorKind::Plug);
        assert_eq!(ConnectorKind::Slot.plural(), "slots");
    }

    #[test]
    fn test_service_selector() {
        let all = ServiceSelector::for_snap("hello", None);
        assert!(all.matches("hello.daemon"));
        assert!(!all.matches("hello-world.daemon"));
        assert_eq!(all.snap(), "hello");

        let one = ServiceSelector::for_snap("hello", Some("daemon"));
        assert_eq!(one.to_string(), "hello.daemon");
        assert!(one.matches("hello.daemon"));
        assert!(!one.matches("hello.other"));
        assert_eq!(one.snap(), "hello");
    }

    #[test]
    fn test_action_kind_and_target() {
        let refresh = Action::Install {
            name: "hello".to_string(),
            channel: Some(Channel::default()),
            revision: Some("12".to_string()),
            classic: false,
            refresh: true,
        };
        assert_eq!(refresh.kind(), "refresh");
        assert_eq!(refresh.target(), "hello");
        assert_eq!(
            refresh.to_string(),
            "refresh hello (channel latest/stable, revision 12)"
        );

        let set = Action::OptionSet {
            snap: "hello".to_string(),
            key: "foo.bar".to_string(),
            value: Value::from(1),
        };
        assert_eq!(set.target(), "hello:foo.bar");
        assert_eq!(set.to_string(), "set hello option foo.bar=1");
    }
}
