use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sidetree_observer::{Role, DEFAULT_CACHE_SIZE, DEFAULT_MAX_ATTEMPTS};
use sidetree_protocol::DocumentType;

use crate::error::ConfigError;

/// Node configuration, loaded from TOML.
///
/// ```toml
/// peer_id = "peer0.org1"
/// msp_id = "Org1MSP"
/// clustered = true
/// roles = ["observer", "batch-writer", "resolver"]
/// queue_dir = "/var/sidetree/queue"
///
/// [observer]
/// period_ms = 10000
/// max_attempts = 3
///
/// [[channels]]
/// name = "mychannel"
///
/// [[channels.namespaces]]
/// namespace = "did:sidetree"
/// protocol_file = "protocol.json"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub peer_id: String,
    pub msp_id: String,
    /// Peers of one organization share observer metadata and a lease.
    pub clustered: bool,
    pub roles: BTreeSet<Role>,
    pub queue_dir: PathBuf,
    /// Chaincode namespace anchor records are written under.
    pub sidetree_chaincode: String,
    pub observer: ObserverSection,
    pub channels: Vec<ChannelConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: "peer0".into(),
            msp_id: "Org1MSP".into(),
            clustered: false,
            roles: [Role::Observer, Role::BatchWriter, Role::Resolver].into_iter().collect(),
            queue_dir: PathBuf::from("./data/queue"),
            sidetree_chaincode: "sidetreetxn".into(),
            observer: ObserverSection::default(),
            channels: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSection {
    pub period_ms: u64,
    pub max_attempts: u32,
}

impl Default for ObserverSection {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ObserverSection {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub namespace: String,
    /// JSON map of protocol version to parameters. Relative paths resolve
    /// against the configuration file's directory.
    pub protocol_file: PathBuf,
    #[serde(default = "default_document_type")]
    pub document_type: DocumentType,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_document_type() -> DocumentType {
    DocumentType::DidDocument
}

fn default_batch_timeout_ms() -> u64 {
    2_000
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

impl NamespaceConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl NodeConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_id.is_empty() {
            return Err(invalid("peer_id must not be empty"));
        }
        if self.msp_id.is_empty() {
            return Err(invalid("msp_id must not be empty"));
        }
        if self.sidetree_chaincode.is_empty() {
            return Err(invalid("sidetree_chaincode must not be empty"));
        }
        if self.observer.max_attempts == 0 {
            return Err(invalid("observer.max_attempts must be at least 1"));
        }

        let mut channels = HashSet::new();
        for channel in &self.channels {
            if channel.name.is_empty() {
                return Err(invalid("channel name must not be empty"));
            }
            if !channels.insert(channel.name.as_str()) {
                return Err(invalid(format!("channel {} configured twice", channel.name)));
            }
            let mut namespaces = HashSet::new();
            for ns in &channel.namespaces {
                if ns.namespace.is_empty() {
                    return Err(invalid(format!("empty namespace on channel {}", channel.name)));
                }
                if !namespaces.insert(ns.namespace.as_str()) {
                    return Err(invalid(format!(
                        "namespace {} configured twice on channel {}",
                        ns.namespace, channel.name
                    )));
                }
                if ns.batch_timeout_ms == 0 {
                    return Err(invalid(format!(
                        "batch_timeout_ms for {} must be non-zero",
                        ns.namespace
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether this peer runs the observer: observers, standbys and
    /// resolvers all keep an operation store current.
    pub fn runs_observer(&self) -> bool {
        [Role::Observer, Role::ObserverStandby, Role::Resolver]
            .iter()
            .any(|r| self.has_role(*r))
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.queue_dir.is_relative() {
            self.queue_dir = base.join(&self.queue_dir);
        }
        for ns in self.channels.iter_mut().flat_map(|c| c.namespaces.iter_mut()) {
            if ns.protocol_file.is_relative() {
                ns.protocol_file = base.join(&ns.protocol_file);
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
peer_id = "peer1.org1"
msp_id = "Org1MSP"
clustered = true
roles = ["observer-standby", "batch-writer"]
queue_dir = "queue"

[observer]
period_ms = 500

[[channels]]
name = "mychannel"

[[channels.namespaces]]
namespace = "did:sidetree"
protocol_file = "protocol.json"

[[channels.namespaces]]
namespace = "file:idx"
protocol_file = "/etc/sidetree/file.json"
document_type = "file-index"
batch_timeout_ms = 100
"#;

    #[test]
    fn defaults_are_valid() {
        let c = NodeConfig::default();
        c.validate().unwrap();
        assert!(c.runs_observer());
        assert_eq!(c.observer.period(), Duration::from_secs(10));
        assert_eq!(c.observer.max_attempts, 3);
    }

    #[test]
    fn parses_sample() {
        let c = NodeConfig::from_toml(SAMPLE).unwrap();
        assert!(c.clustered);
        assert!(c.has_role(Role::ObserverStandby));
        assert!(!c.has_role(Role::Resolver));
        assert!(c.runs_observer());
        assert_eq!(c.observer.period_ms, 500);
        assert_eq!(c.observer.max_attempts, DEFAULT_MAX_ATTEMPTS);

        let ch = c.channel("mychannel").unwrap();
        assert_eq!(ch.namespaces[0].document_type, DocumentType::DidDocument);
        assert_eq!(ch.namespaces[0].batch_timeout(), Duration::from_secs(2));
        assert_eq!(ch.namespaces[0].cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(ch.namespaces[1].document_type, DocumentType::FileIndex);
        assert!(c.channel("other").is_none());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let c = NodeConfig::load(&path).unwrap();
        assert_eq!(c.queue_dir, dir.path().join("queue"));
        let ns = &c.channel("mychannel").unwrap().namespaces;
        assert_eq!(ns[0].protocol_file, dir.path().join("protocol.json"));
        assert_eq!(ns[1].protocol_file, PathBuf::from("/etc/sidetree/file.json"));
    }

    #[test]
    fn rejects_invalid() {
        let dup = format!("{SAMPLE}\n[[channels]]\nname = \"mychannel\"\n");
        assert!(matches!(NodeConfig::from_toml(&dup), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            NodeConfig::from_toml("peer_id = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml("[observer]\nmax_attempts = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml("roles = [\"gossip\"]"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            NodeConfig::load("/nonexistent/node.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
