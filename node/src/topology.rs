//! Hostfile topology.
//!
//! One line per peer, 1-based line index is the peer id:
//!
//! ```text
//! hostname:role1,role2,...
//! ```
//!
//! Role tokens are `proposer<N>`, `acceptor<N>`, `learner<N>`. `N == 0`
//! declares the role inactive and it is ignored. The proposer role number
//! also seeds that proposer's initial proposal number. Learner roles are
//! recorded but drive no behavior.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use decree_paxos::PeerId;
use error_stack::{Report, ResultExt};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct HostEntry {
    pub hostname: String,
    pub proposers: Vec<i64>,
    pub acceptors: Vec<i64>,
    pub learners: Vec<i64>,
}

impl HostEntry {
    #[must_use]
    pub fn hosts_acceptor(&self) -> bool {
        !self.acceptors.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    hosts: BTreeMap<PeerId, HostEntry>,
}

impl Topology {
    /// Read and parse a hostfile.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Hostfile`] report when the file cannot be
    /// read or a line does not parse.
    pub fn load(path: &Path) -> Result<Self, Report<ConfigError>> {
        let text = fs::read_to_string(path)
            .change_context(ConfigError::Hostfile)
            .attach_printable_lazy(|| format!("reading {}", path.display()))?;
        Self::parse(&text)
    }

    /// Parse hostfile text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Hostfile`] report naming the offending line.
    pub fn parse(text: &str) -> Result<Self, Report<ConfigError>> {
        let mut hosts = BTreeMap::new();

        for (index, line) in text.lines().enumerate() {
            let id = index as PeerId + 1;
            let Some((hostname, roles)) = line.split_once(':') else {
                return Err(Report::new(ConfigError::Hostfile)
                    .attach_printable(format!("line {id}: expected hostname:roles, got {line:?}")));
            };

            let mut entry = HostEntry {
                hostname: hostname.trim().to_owned(),
                ..HostEntry::default()
            };
            for role in roles.split(',') {
                let role = role.trim();
                let (list, number) = if let Some(n) = role.strip_prefix("proposer") {
                    (&mut entry.proposers, n)
                } else if let Some(n) = role.strip_prefix("acceptor") {
                    (&mut entry.acceptors, n)
                } else if let Some(n) = role.strip_prefix("learner") {
                    (&mut entry.learners, n)
                } else {
                    return Err(Report::new(ConfigError::Hostfile)
                        .attach_printable(format!("line {id}: unknown role {role:?}")));
                };
                let number: u64 = number.parse().map_err(|_| {
                    Report::new(ConfigError::Hostfile)
                        .attach_printable(format!("line {id}: bad role number in {role:?}"))
                })?;
                // A zero role number means the role is declared but inactive.
                if number != 0 {
                    list.push(number as i64);
                }
            }
            hosts.insert(id, entry);
        }

        if hosts.is_empty() {
            return Err(Report::new(ConfigError::Hostfile).attach_printable("hostfile is empty"));
        }
        Ok(Self { hosts })
    }

    /// The peer id whose hostname matches `name` exactly.
    #[must_use]
    pub fn peer_for_hostname(&self, name: &str) -> Option<PeerId> {
        self.hosts
            .iter()
            .find(|(_, entry)| entry.hostname == name)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn entry(&self, id: PeerId) -> Option<&HostEntry> {
        self.hosts.get(&id)
    }

    /// Every peer except `me`, in id order. These are the peers a node
    /// dials, whatever their roles.
    pub fn remote_peers(&self, me: PeerId) -> impl Iterator<Item = (PeerId, &HostEntry)> {
        self.hosts
            .iter()
            .filter(move |(id, _)| **id != me)
            .map(|(id, entry)| (*id, entry))
    }

    /// The acceptor quorum for a proposer hosted on `me`: every *other*
    /// peer that declares at least one active acceptor role.
    #[must_use]
    pub fn acceptor_quorum(&self, me: PeerId) -> Vec<PeerId> {
        self.remote_peers(me)
            .filter(|(_, entry)| entry.hosts_acceptor())
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTFILE: &str = "\
hostA:proposer1,acceptor1
hostB:acceptor1
hostC:acceptor1,learner1
hostD:learner1";

    #[test]
    fn parses_lines_into_one_based_peers() {
        let topology = Topology::parse(HOSTFILE).unwrap();
        assert_eq!(topology.peer_for_hostname("hostA"), Some(1));
        assert_eq!(topology.peer_for_hostname("hostD"), Some(4));
        assert_eq!(topology.peer_for_hostname("elsewhere"), None);

        let a = topology.entry(1).unwrap();
        assert_eq!(a.proposers, vec![1]);
        assert_eq!(a.acceptors, vec![1]);
        assert!(a.learners.is_empty());

        let c = topology.entry(3).unwrap();
        assert_eq!(c.learners, vec![1]);
    }

    #[test]
    fn quorum_is_every_other_acceptor_host() {
        let topology = Topology::parse(HOSTFILE).unwrap();
        assert_eq!(topology.acceptor_quorum(1), vec![2, 3]);
        assert_eq!(topology.acceptor_quorum(2), vec![1, 3]);
        assert_eq!(topology.acceptor_quorum(4), vec![1, 2, 3]);
    }

    #[test]
    fn zero_role_numbers_are_inactive() {
        let topology = Topology::parse("hostA:proposer0,acceptor2\nhostB:acceptor0").unwrap();
        let a = topology.entry(1).unwrap();
        assert!(a.proposers.is_empty());
        assert_eq!(a.acceptors, vec![2]);
        assert!(!topology.entry(2).unwrap().hosts_acceptor());
        // hostB declares no active acceptor, so it joins nobody's quorum.
        assert!(topology.acceptor_quorum(2) == vec![1]);
        assert!(topology.acceptor_quorum(1).is_empty());
    }

    #[test]
    fn proposer_number_is_kept_as_the_seed() {
        let topology = Topology::parse("hostA:proposer7\nhostB:acceptor1").unwrap();
        assert_eq!(topology.entry(1).unwrap().proposers, vec![7]);
    }

    #[test]
    fn rejects_unknown_roles_and_malformed_lines() {
        assert!(Topology::parse("hostA:listener1").is_err());
        assert!(Topology::parse("no-colon-here").is_err());
        assert!(Topology::parse("hostA:proposerX").is_err());
        assert!(Topology::parse("").is_err());
    }

    #[test]
    fn remote_peers_excludes_self() {
        let topology = Topology::parse(HOSTFILE).unwrap();
        let ids: Vec<PeerId> = topology.remote_peers(2).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }
}
