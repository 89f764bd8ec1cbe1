use std::sync::Arc;

use tracing::{debug, info};

use crate::membership::{Member, Membership, Role};

/// Ownership of observer work for a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    local: String,
    owner: String,
}

impl Lease {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_local_peer_owner(&self) -> bool {
        self.owner == self.local
    }
}

/// Elects lease owners from live membership.
///
/// Clustered: the candidates are the live peers of the local MSP holding
/// [`Role::Observer`], or [`Role::ObserverStandby`] when no observer is
/// alive, and block `n` goes to `sorted(candidates)[n % len]`.
/// Non-clustered: the local peer always owns.
pub struct LeaseProvider {
    channel: String,
    membership: Arc<dyn Membership>,
    clustered: bool,
}

impl LeaseProvider {
    pub fn new(
        channel: impl Into<String>,
        membership: Arc<dyn Membership>,
        clustered: bool,
    ) -> Self {
        Self {
            channel: channel.into(),
            membership,
            clustered,
        }
    }

    /// Lease held by `owner`, as recorded in metadata.
    pub fn get_lease(&self, owner: &str) -> Lease {
        Lease {
            local: self.membership.self_member().endpoint,
            owner: owner.to_string(),
        }
    }

    /// Elect the owner for `block`.
    pub fn create_lease(&self, block: u64) -> Lease {
        let local = self.membership.self_member().endpoint;
        if !self.clustered {
            return Lease {
                owner: local.clone(),
                local,
            };
        }

        let candidates = self.candidates();
        let owner = if candidates.is_empty() {
            // Nobody eligible is alive; keep the work local.
            local.clone()
        } else {
            candidates[(block % candidates.len() as u64) as usize].clone()
        };
        debug!(
            channel = %self.channel,
            block,
            owner = %owner,
            candidates = ?candidates,
            "elected lease owner"
        );
        Lease { local, owner }
    }

    /// A lease stays valid while its owner is a live candidate.
    pub fn is_valid(&self, lease: &Lease) -> bool {
        if !self.clustered {
            return lease.is_local_peer_owner();
        }
        self.candidates().iter().any(|c| *c == lease.owner)
    }

    /// Sorted endpoints of the peers eligible to own a lease.
    fn candidates(&self) -> Vec<String> {
        let local = self.membership.self_member();
        let live = self.membership.live_members();

        let mut candidates = in_role(&live, &local, Role::Observer);
        if candidates.is_empty() {
            candidates = in_role(&live, &local, Role::ObserverStandby);
            info!(
                channel = %self.channel,
                standby = ?candidates,
                "no active observers alive, using standby observers"
            );
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }
}

fn in_role(live: &[Member], local: &Member, role: Role) -> Vec<String> {
    live.iter()
        .filter(|m| m.msp_id == local.msp_id && m.has_role(role))
        .map(|m| m.endpoint.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;

    fn cluster(local: &str) -> Arc<StaticMembership> {
        let m = Arc::new(StaticMembership::new(Member::new(local, "Org1MSP", [Role::Observer])));
        for peer in ["peer0", "peer1", "peer2"] {
            m.join(Member::new(peer, "Org1MSP", [Role::Observer]));
        }
        m.join(Member::new("peer9", "Org2MSP", [Role::Observer]));
        m
    }

    #[test]
    fn clustered_owner_rotates_over_sorted_candidates() {
        let leases = LeaseProvider::new("mychannel", cluster("peer1"), true);
        assert_eq!(leases.create_lease(0).owner(), "peer0");
        assert_eq!(leases.create_lease(1).owner(), "peer1");
        assert_eq!(leases.create_lease(5).owner(), "peer2");
        assert!(leases.create_lease(4).is_local_peer_owner());
    }

    #[test]
    fn lease_of_departed_peer_is_invalid() {
        let m = cluster("peer1");
        let leases = LeaseProvider::new("mychannel", m.clone(), true);
        let lease = leases.get_lease("peer2");
        assert!(leases.is_valid(&lease));

        m.leave("peer2");
        assert!(!leases.is_valid(&lease));
        // Other organizations are never candidates.
        assert!(!leases.is_valid(&leases.get_lease("peer9")));
    }

    #[test]
    fn standby_observers_take_over() {
        let m = Arc::new(StaticMembership::new(Member::new(
            "peer1",
            "Org1MSP",
            [Role::ObserverStandby],
        )));
        m.join(Member::new("peer0", "Org1MSP", [Role::Observer]));
        let leases = LeaseProvider::new("mychannel", m.clone(), true);
        assert_eq!(leases.create_lease(1).owner(), "peer0");
        assert!(!leases.is_valid(&leases.get_lease("peer1")));

        m.leave("peer0");
        assert!(leases.create_lease(1).is_local_peer_owner());
        assert!(leases.is_valid(&leases.get_lease("peer1")));
    }

    #[test]
    fn non_clustered_always_local() {
        let leases = LeaseProvider::new("mychannel", cluster("peer1"), false);
        assert!(leases.create_lease(0).is_local_peer_owner());
        assert!(leases.is_valid(&leases.get_lease("peer1")));
        assert!(!leases.is_valid(&leases.get_lease("peer0")));
    }
}
