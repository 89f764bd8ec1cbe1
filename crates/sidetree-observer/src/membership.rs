//! Who is alive on a channel, and in which roles.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Roles a peer can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Observer,
    ObserverStandby,
    BatchWriter,
    Resolver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::ObserverStandby => "observer-standby",
            Self::BatchWriter => "batch-writer",
            Self::Resolver => "resolver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observer" => Ok(Self::Observer),
            "observer-standby" => Ok(Self::ObserverStandby),
            "batch-writer" => Ok(Self::BatchWriter),
            "resolver" => Ok(Self::Resolver),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A peer as seen by membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub endpoint: String,
    pub msp_id: String,
    pub roles: BTreeSet<Role>,
}

impl Member {
    pub fn new(
        endpoint: impl Into<String>,
        msp_id: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            msp_id: msp_id.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Live view of a channel's peers.
pub trait Membership: Send + Sync {
    /// The local peer.
    fn self_member(&self) -> Member;

    /// Every live peer, the local peer included.
    fn live_members(&self) -> Vec<Member>;
}

/// Membership maintained by hand: the local peer plus whatever peers are
/// marked alive.
pub struct StaticMembership {
    local: Member,
    peers: RwLock<BTreeMap<String, Member>>,
}

impl StaticMembership {
    pub fn new(local: Member) -> Self {
        Self {
            local,
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mark a remote peer alive.
    pub fn join(&self, member: Member) {
        self.peers.write().insert(member.endpoint.clone(), member);
    }

    /// Mark a remote peer gone. Returns whether it was alive.
    pub fn leave(&self, endpoint: &str) -> bool {
        self.peers.write().remove(endpoint).is_some()
    }
}

impl Membership for StaticMembership {
    fn self_member(&self) -> Member {
        self.local.clone()
    }

    fn live_members(&self) -> Vec<Member> {
        let peers = self.peers.read();
        std::iter::once(self.local.clone())
            .chain(
                peers
                    .values()
                    .filter(|m| m.endpoint != self.local.endpoint)
                    .cloned(),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names() {
        for role in [Role::Observer, Role::ObserverStandby, Role::BatchWriter, Role::Resolver] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(
                serde_json::to_value(role).unwrap(),
                serde_json::Value::String(role.to_string())
            );
        }
        assert!("gossip".parse::<Role>().is_err());
    }

    #[test]
    fn live_members_include_self_once() {
        let m = StaticMembership::new(Member::new("peer0:7051", "Org1MSP", [Role::Observer]));
        m.join(Member::new("peer0:7051", "Org1MSP", [Role::Observer]));
        m.join(Member::new("peer1:7051", "Org1MSP", [Role::Observer]));
        assert_eq!(m.live_members().len(), 2);

        assert!(m.leave("peer1:7051"));
        assert!(!m.leave("peer1:7051"));
        assert_eq!(m.live_members().len(), 1);
    }
}
