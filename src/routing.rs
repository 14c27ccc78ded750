//! Network layer: topology health checks, resource-aware routing and
//! multi-hop entanglement swapping.

use log::Level;

use crate::error::{NetError, NetResult, Protocol, ResourceKind};
use crate::fidelity::agreement_probability;
use crate::network::QuantumNetwork;
use crate::resource::{ChannelKey, Decoherent, PoolEnd};
use crate::topology::{HostId, Route};

const TARGET: &str = "qnet::network";

/// Qubits every host except the destination must hold for a route to use it.
pub const MIN_RELAY_QUBITS: usize = 2;

/// Result of a completed swap chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapOutcome {
    /// Route the chain was run along, source first.
    pub route: Route,
    /// Number of successful folds (route length minus two for multi-hop).
    pub folds: usize,
    /// Fidelity of the end-to-end pair.
    pub fidelity: f64,
}

pub struct NetworkLayer<'a> {
    net: &'a mut QuantumNetwork,
}

impl<'a> NetworkLayer<'a> {
    pub(crate) fn new(net: &'a mut QuantumNetwork) -> Self {
        Self { net }
    }

    /// True when every topology edge carries at least one pair.
    pub fn verify_channels(&self) -> bool {
        for (a, b) in self.net.topology().edges() {
            if self.net.pair_count(a, b) == 0 {
                self.net.emit(Level::Debug, TARGET, format!("no pairs between {a} and {b}"));
                return false;
            }
        }
        true
    }

    /// True when every host holds at least two qubits.
    pub fn verify_nodes(&self) -> bool {
        for host in self.net.hosts() {
            if host.qubits.len() < MIN_RELAY_QUBITS {
                self.net.emit(
                    Level::Debug,
                    TARGET,
                    format!("{host} holds fewer than {MIN_RELAY_QUBITS} qubits"),
                );
                return false;
            }
        }
        true
    }

    /// First minimum-hop route whose hops all carry a pair and whose hosts,
    /// the destination excepted, hold enough qubits to relay.
    pub fn short_route_valid(&self, src: HostId, dst: HostId) -> Option<Route> {
        let topology = self.net.topology();
        if !topology.contains(src) || !topology.contains(dst) {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("route request for unknown host ({src} or {dst})"),
            );
            return None;
        }

        for path in topology.all_shortest_paths(src, dst) {
            if self.route_is_feasible(&path) {
                self.net.emit(Level::Debug, TARGET, format!("valid route {path:?}"));
                return Some(path);
            }
        }
        self.net.emit(
            Level::Debug,
            TARGET,
            format!("no valid route between {src} and {dst}"),
        );
        None
    }

    fn route_is_feasible(&self, path: &[HostId]) -> bool {
        let hops_ok = path
            .windows(2)
            .all(|hop| self.net.pair_count(hop[0], hop[1]) >= 1);
        let senders = &path[..path.len().saturating_sub(1)];
        let relays_ok = senders
            .iter()
            .all(|&host| self.net.qubit_count(host) >= MIN_RELAY_QUBITS);
        hops_ok && relays_ok
    }

    /// Collapse the route between `src` and `dst` into a single pair by
    /// repeatedly swapping over the first intermediate host.
    ///
    /// Each fold consumes one pair from each of the first two hops and draws
    /// against their agreement probability. A failed draw aborts the chain;
    /// pairs consumed so far stay consumed. Virtual pairs are stored on the
    /// `(src, hop)` channel, created in the resource table if needed.
    pub fn entanglement_swapping(&mut self, src: HostId, dst: HostId) -> NetResult<SwapOutcome> {
        let mut route = self
            .short_route_valid(src, dst)
            .ok_or(NetError::RouteUnavailable { src, dst })?;
        if route.len() < 2 {
            return Err(NetError::failure(
                Protocol::Swapping,
                format!("route {route:?} has no hop"),
            ));
        }
        let full_route = route.clone();
        self.net.counters.route_lengths.push(route.len() - 1);
        let formula = self.net.config().swap_formula;

        let mut folds = 0;
        while route.len() > 2 {
            let (n1, n2, n3) = (route[0], route[1], route[2]);
            // After the first fold the left hop is the virtual pair just made.
            let left_end = if folds == 0 {
                PoolEnd::Oldest
            } else {
                PoolEnd::Newest
            };

            for (a, b) in [(n1, n2), (n2, n3)] {
                if self.net.pair_count(a, b) == 0 {
                    return Err(NetError::exhausted(
                        ResourceKind::EntangledPair,
                        ChannelKey::new(a, b).to_string(),
                        1,
                        0,
                    ));
                }
            }
            let left = self.net.channel_mut(n1, n2)?.pairs.take(left_end);
            let right = self.net.channel_mut(n2, n3)?.pairs.take_oldest();
            let (Some(left), Some(right)) = (left, right) else {
                return Err(NetError::exhausted(
                    ResourceKind::EntangledPair,
                    format!("route {route:?}"),
                    2,
                    0,
                ));
            };
            self.net.counters.swap_pairs_consumed += 2;

            let (f1, f2) = (left.fidelity(), right.fidelity());
            let p = agreement_probability(f1, f2);
            if self.net.rng().uniform() > p {
                self.net.emit(
                    Level::Info,
                    TARGET,
                    format!("swap over {n2} between {n1} and {n3} failed (p = {p:.4})"),
                );
                return Err(NetError::failure(
                    Protocol::Swapping,
                    format!("swap over host {n2} failed with probability {p:.4}"),
                ));
            }

            let fidelity = formula.combine(f1, f2);
            let virtual_pair = self.net.allocate_pair(fidelity);
            self.net.channel_or_virtual(n1, n3)?.pairs.push(virtual_pair);
            route.remove(1);
            folds += 1;
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("swapped over {n2}: virtual pair {n1}-{n3} with fidelity {fidelity:.4}"),
            );
        }

        let fidelity = self
            .net
            .channel(route[0], route[1])?
            .pairs
            .peek_newest()
            .map(Decoherent::fidelity)
            .ok_or_else(|| {
                NetError::exhausted(
                    ResourceKind::EntangledPair,
                    ChannelKey::new(route[0], route[1]).to_string(),
                    1,
                    0,
                )
            })?;
        self.net.emit(
            Level::Info,
            TARGET,
            format!("entanglement swapping between {src} and {dst} completed"),
        );
        Ok(SwapOutcome {
            route: full_route,
            folds,
            fidelity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::random::ScriptedRandom;
    use crate::resource::{EntangledPair, Qubit};
    use crate::topology::Topology;

    fn bare(topology: Topology) -> QuantumNetwork {
        QuantumNetwork::unpopulated(topology, SimConfig::default().with_seed(17)).unwrap()
    }

    fn stock(net: &mut QuantumNetwork, hosts: &[HostId], qubits: usize) {
        for &host in hosts {
            for id in 0..qubits {
                net.host_mut(host).unwrap().qubits.push(Qubit::new(id as u64, 0.9));
            }
        }
    }

    fn pair(net: &mut QuantumNetwork, a: HostId, b: HostId, fidelity: f64) {
        net.channel_mut(a, b)
            .unwrap()
            .pairs
            .push(EntangledPair::new(0, fidelity));
    }

    #[test]
    fn verify_checks_every_pool() {
        let mut net = bare(Topology::line(3));
        assert!(!net.network_layer().verify_channels());
        assert!(!net.network_layer().verify_nodes());

        pair(&mut net, 0, 1, 1.0);
        pair(&mut net, 1, 2, 1.0);
        stock(&mut net, &[0, 1, 2], 2);
        assert!(net.network_layer().verify_channels());
        assert!(net.network_layer().verify_nodes());
    }

    #[test]
    fn route_skips_empty_hops() {
        let mut net = bare(Topology::ring(4));
        stock(&mut net, &[0, 1, 2, 3], 2);
        pair(&mut net, 0, 1, 1.0);
        pair(&mut net, 0, 3, 1.0);
        pair(&mut net, 3, 2, 1.0);
        // 0-1-2 comes first but hop 1-2 is empty
        assert_eq!(net.network_layer().short_route_valid(0, 2), Some(vec![0, 3, 2]));
    }

    #[test]
    fn route_requires_relay_qubits() {
        let mut net = bare(Topology::line(3));
        pair(&mut net, 0, 1, 1.0);
        pair(&mut net, 1, 2, 1.0);
        stock(&mut net, &[0], 2);
        stock(&mut net, &[1], 1);
        assert_eq!(net.network_layer().short_route_valid(0, 2), None);
        stock(&mut net, &[1], 1);
        // the destination needs no qubits
        assert_eq!(net.network_layer().short_route_valid(0, 2), Some(vec![0, 1, 2]));
    }

    #[test]
    fn source_with_one_qubit_has_no_route() {
        let mut net = bare(Topology::line(3));
        pair(&mut net, 0, 1, 1.0);
        pair(&mut net, 1, 2, 1.0);
        stock(&mut net, &[0], 1);
        stock(&mut net, &[1], 2);
        assert_eq!(net.network_layer().short_route_valid(0, 2), None);
        assert_eq!(
            net.transport().teleportation_protocol(0, 2).unwrap_err(),
            NetError::RouteUnavailable { src: 0, dst: 2 }
        );
        assert_eq!(net.pair_count(0, 1), 1);

        stock(&mut net, &[0], 1);
        assert_eq!(net.network_layer().short_route_valid(0, 2), Some(vec![0, 1, 2]));
    }

    #[test]
    fn single_hop_checks_only_the_source() {
        let mut net = bare(Topology::line(2));
        pair(&mut net, 0, 1, 1.0);
        stock(&mut net, &[0], 1);
        assert_eq!(net.network_layer().short_route_valid(0, 1), None);
        stock(&mut net, &[0], 1);
        assert_eq!(net.network_layer().short_route_valid(0, 1), Some(vec![0, 1]));
    }

    #[test]
    fn route_to_unknown_or_unreachable_host_is_none() {
        let mut topology = Topology::line(2);
        topology.add_host(5).unwrap();
        let mut net = bare(topology);
        pair(&mut net, 0, 1, 1.0);
        assert_eq!(net.network_layer().short_route_valid(0, 5), None);
        assert_eq!(net.network_layer().short_route_valid(0, 42), None);
    }

    #[test]
    fn forced_swap_on_three_hosts() {
        let mut net = bare(Topology::line(3)).with_random(Box::new(ScriptedRandom::constant(0.0)));
        stock(&mut net, &[0, 1], 2);
        pair(&mut net, 0, 1, 0.9);
        pair(&mut net, 1, 2, 0.9);

        let outcome = net.network_layer().entanglement_swapping(0, 2).unwrap();
        assert_eq!(outcome.route, vec![0, 1, 2]);
        assert_eq!(outcome.folds, 1);
        assert!((outcome.fidelity - 0.9878).abs() < 1e-4);
        assert_eq!(net.pair_count(0, 2), 1);
        assert_eq!(net.pair_count(0, 1), 0);
        assert_eq!(net.pair_count(1, 2), 0);
        // the topology is untouched
        assert!(!net.topology().has_edge(0, 2));
        assert_eq!(net.metrics().swap_pairs_consumed, 2);
    }

    #[test]
    fn failed_draw_aborts_and_keeps_inputs_consumed() {
        let mut net = bare(Topology::line(4)).with_random(Box::new(ScriptedRandom::constant(0.999)));
        stock(&mut net, &[0, 1, 2], 2);
        pair(&mut net, 0, 1, 0.9);
        pair(&mut net, 1, 2, 0.9);
        pair(&mut net, 2, 3, 0.9);

        let err = net.network_layer().entanglement_swapping(0, 3).unwrap_err();
        assert!(matches!(
            err,
            NetError::ProtocolFailure {
                protocol: Protocol::Swapping,
                ..
            }
        ));
        assert_eq!(net.pair_count(0, 1), 0);
        assert_eq!(net.pair_count(1, 2), 0);
        assert_eq!(net.pair_count(2, 3), 1);
        assert_eq!(net.pair_count(0, 2), 0);
    }

    #[test]
    fn multi_fold_chain_reaches_destination() {
        let mut net = bare(Topology::line(4)).with_random(Box::new(ScriptedRandom::constant(0.0)));
        stock(&mut net, &[0, 1, 2], 2);
        pair(&mut net, 0, 1, 0.9);
        pair(&mut net, 1, 2, 0.9);
        pair(&mut net, 2, 3, 0.9);

        let outcome = net.network_layer().entanglement_swapping(0, 3).unwrap();
        assert_eq!(outcome.folds, 2);
        let first = 0.81 / 0.82;
        let expected = (first * 0.9) / (first * 0.9 + (1.0 - first) * 0.1);
        assert!((outcome.fidelity - expected).abs() < 1e-10);
        assert_eq!(net.pair_count(0, 3), 1);
        // intermediate virtual pair was consumed by the second fold
        assert_eq!(net.pair_count(0, 2), 0);
        assert_eq!(net.metrics().avg_route_length, Some(3.0));
    }

    #[test]
    fn single_hop_needs_no_fold() {
        let mut net = bare(Topology::line(2));
        stock(&mut net, &[0], 2);
        pair(&mut net, 0, 1, 0.95);
        let outcome = net.network_layer().entanglement_swapping(0, 1).unwrap();
        assert_eq!(outcome.folds, 0);
        assert_eq!(outcome.fidelity, 0.95);
        assert_eq!(net.pair_count(0, 1), 1);
    }

    #[test]
    fn no_route_is_route_unavailable() {
        let mut net = bare(Topology::line(3));
        let err = net.network_layer().entanglement_swapping(0, 2).unwrap_err();
        assert_eq!(err, NetError::RouteUnavailable { src: 0, dst: 2 });
        assert!(net.network_layer().entanglement_swapping(1, 1).is_err());
    }
}
