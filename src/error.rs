//! Error types shared by every protocol layer.
//!
//! Stochastic failures (a heralding draw, a swap, a purification that does
//! not clear its threshold) are ordinary outcomes of the simulation and are
//! reported as values of [`NetError`] so retry loops can inspect them.
//! Structural misuse, such as naming a host that is not in the topology, is
//! never retried.

use std::fmt;

use thiserror::Error;

use crate::topology::HostId;

/// Kind of simulated resource an operation ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Qubit,
    EntangledPair,
    FailedPair,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Qubit => write!(f, "qubits"),
            ResourceKind::EntangledPair => write!(f, "entangled pairs"),
            ResourceKind::FailedPair => write!(f, "failed pairs"),
        }
    }
}

/// Protocol step that produced a [`NetError::ProtocolFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Heralding,
    OnDemand,
    Replay,
    Purification,
    Swapping,
    Teleportation,
    Transport,
    E91,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Heralding => "entanglement heralding",
            Protocol::OnDemand => "on-demand entanglement creation",
            Protocol::Replay => "replay entanglement creation",
            Protocol::Purification => "purification",
            Protocol::Swapping => "entanglement swapping",
            Protocol::Teleportation => "teleportation",
            Protocol::Transport => "transport",
            Protocol::E91 => "E91 key distribution",
        };
        f.write_str(name)
    }
}

/// References to hosts or channels that do not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("host {0} is not part of the topology")]
    UnknownHost(HostId),

    #[error("no channel between hosts {0} and {1}")]
    UnknownChannel(HostId, HostId),

    #[error("host {0} already exists")]
    DuplicateHost(HostId),

    #[error("host {0} cannot be connected to itself")]
    SelfLoop(HostId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    #[error("not enough {resource} at {location}: need {needed}, have {available}")]
    ResourceExhaustion {
        resource: ResourceKind,
        location: String,
        needed: usize,
        available: usize,
    },

    #[error("no resource-feasible route from host {src} to host {dst}")]
    RouteUnavailable { src: HostId, dst: HostId },

    #[error("{protocol} failed: {reason}")]
    ProtocolFailure { protocol: Protocol, reason: String },

    #[error("invalid topology reference: {0}")]
    InvalidTopology(#[from] TopologyError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NetError {
    /// Structural errors indicate misuse of the API and are never retried.
    pub fn is_structural(&self) -> bool {
        matches!(self, NetError::InvalidTopology(_) | NetError::Config(_))
    }

    pub(crate) fn failure(protocol: Protocol, reason: impl Into<String>) -> Self {
        NetError::ProtocolFailure {
            protocol,
            reason: reason.into(),
        }
    }

    pub(crate) fn exhausted(
        resource: ResourceKind,
        location: impl Into<String>,
        needed: usize,
        available: usize,
    ) -> Self {
        NetError::ResourceExhaustion {
            resource,
            location: location.into(),
            needed,
            available,
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;
