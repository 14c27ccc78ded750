//! Structural network graph: which hosts exist and which pairs of hosts share
//! a quantum channel.
//!
//! The topology only records existence. Qubits, entangled pairs and channel
//! parameters live in the resource tables of [`crate::network::QuantumNetwork`].
//! Adjacency is kept in ordered sets so that path enumeration is
//! deterministic: neighbours are always visited in ascending id order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::TopologyError;

/// Identifier of a host (graph node).
pub type HostId = usize;

/// A path through the topology, source first.
pub type Route = Vec<HostId>;

/// Ready-made topology shapes. Hosts are numbered `0..n` row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologySpec {
    /// Path graph 0 - 1 - ... - (n-1).
    Line { hosts: usize },
    /// Line with an extra edge closing the cycle.
    Ring { hosts: usize },
    /// rows × cols lattice with 4-neighbour connectivity.
    Grid { rows: usize, cols: usize },
    /// Explicit edge list.
    Edges(Vec<(HostId, HostId)>),
}

impl TopologySpec {
    pub fn build(&self) -> Result<Topology, TopologyError> {
        match self {
            TopologySpec::Line { hosts } => Ok(Topology::line(*hosts)),
            TopologySpec::Ring { hosts } => Ok(Topology::ring(*hosts)),
            TopologySpec::Grid { rows, cols } => Ok(Topology::grid(*rows, *cols)),
            TopologySpec::Edges(edges) => Topology::from_edges(edges.iter().copied()),
        }
    }
}

/// Label string for a topology shape (for output formatting).
pub fn topology_label(spec: &TopologySpec) -> &'static str {
    match spec {
        TopologySpec::Line { .. } => "line",
        TopologySpec::Ring { .. } => "ring",
        TopologySpec::Grid { .. } => "grid",
        TopologySpec::Edges(_) => "custom",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    adjacency: BTreeMap<HostId, BTreeSet<HostId>>,
}

impl Topology {
    /// Empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(n: usize) -> Self {
        let mut topology = Self::new();
        for host in 0..n {
            topology.adjacency.entry(host).or_default();
        }
        for host in 1..n {
            topology.connect(host - 1, host);
        }
        topology
    }

    /// A ring of fewer than three hosts degenerates to a line.
    pub fn ring(n: usize) -> Self {
        let mut topology = Self::line(n);
        if n >= 3 {
            topology.connect(n - 1, 0);
        }
        topology
    }

    pub fn grid(rows: usize, cols: usize) -> Self {
        let mut topology = Self::new();
        let id = |r: usize, c: usize| r * cols + c;
        for r in 0..rows {
            for c in 0..cols {
                topology.adjacency.entry(id(r, c)).or_default();
                if c + 1 < cols {
                    topology.connect(id(r, c), id(r, c + 1));
                }
                if r + 1 < rows {
                    topology.connect(id(r, c), id(r + 1, c));
                }
            }
        }
        topology
    }

    /// Build from an edge list, registering endpoints as they appear.
    pub fn from_edges<I>(edges: I) -> Result<Self, TopologyError>
    where
        I: IntoIterator<Item = (HostId, HostId)>,
    {
        let mut topology = Self::new();
        for (a, b) in edges {
            topology.add_edge(a, b)?;
        }
        Ok(topology)
    }

    pub fn add_host(&mut self, host: HostId) -> Result<(), TopologyError> {
        if self.adjacency.contains_key(&host) {
            return Err(TopologyError::DuplicateHost(host));
        }
        self.adjacency.insert(host, BTreeSet::new());
        Ok(())
    }

    /// Connect two hosts, registering either endpoint if it is new.
    /// Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, a: HostId, b: HostId) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLoop(a));
        }
        self.connect(a, b);
        Ok(())
    }

    fn connect(&mut self, a: HostId, b: HostId) {
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn contains(&self, host: HostId) -> bool {
        self.adjacency.contains_key(&host)
    }

    pub fn has_edge(&self, a: HostId, b: HostId) -> bool {
        self.adjacency
            .get(&a)
            .map_or(false, |neighbors| neighbors.contains(&b))
    }

    pub fn neighbors(&self, host: HostId) -> impl Iterator<Item = HostId> + '_ {
        self.adjacency
            .get(&host)
            .into_iter()
            .flat_map(|neighbors| neighbors.iter().copied())
    }

    pub fn hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn num_hosts(&self) -> usize {
        self.adjacency.len()
    }

    /// Every undirected edge once, as `(lo, hi)` in ascending order.
    pub fn edges(&self) -> Vec<(HostId, HostId)> {
        self.adjacency
            .iter()
            .flat_map(|(&a, neighbors)| {
                neighbors
                    .iter()
                    .copied()
                    .filter(move |&b| a < b)
                    .map(move |b| (a, b))
            })
            .collect()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Breadth-first hop counts from `origin` to every reachable host.
    pub fn hop_distances(&self, origin: HostId) -> BTreeMap<HostId, usize> {
        let mut dist = BTreeMap::new();
        if !self.contains(origin) {
            return dist;
        }
        dist.insert(origin, 0);
        let mut queue = VecDeque::from([origin]);
        while let Some(current) = queue.pop_front() {
            let next = dist[&current] + 1;
            for neighbor in self.neighbors(current) {
                if !dist.contains_key(&neighbor) {
                    dist.insert(neighbor, next);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }

    /// All minimum-hop paths from `src` to `dst`.
    ///
    /// Paths are produced in lexicographic order of host ids. Returns an
    /// empty list when either endpoint is unknown or `dst` is unreachable.
    pub fn all_shortest_paths(&self, src: HostId, dst: HostId) -> Vec<Route> {
        if !self.contains(src) || !self.contains(dst) {
            return Vec::new();
        }
        // Distances towards the destination let the walk from the source
        // step only onto hosts that are one hop closer.
        let to_dst = self.hop_distances(dst);
        if !to_dst.contains_key(&src) {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut prefix = vec![src];
        self.extend_shortest(&to_dst, &mut prefix, dst, &mut paths);
        paths
    }

    fn extend_shortest(
        &self,
        to_dst: &BTreeMap<HostId, usize>,
        prefix: &mut Route,
        dst: HostId,
        paths: &mut Vec<Route>,
    ) {
        let Some(&current) = prefix.last() else {
            return;
        };
        if current == dst {
            paths.push(prefix.clone());
            return;
        }
        let remaining = to_dst[&current];
        for neighbor in self.neighbors(current) {
            if to_dst.get(&neighbor).copied() == Some(remaining - 1) {
                prefix.push(neighbor);
                self.extend_shortest(to_dst, prefix, dst, paths);
                prefix.pop();
            }
        }
    }
}
