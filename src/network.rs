//! The simulation context.
//!
//! [`QuantumNetwork`] owns the topology, the resource tables (hosts and
//! channels), the failed-pair store, the clock, the random source and the
//! log sink. Protocol layers are short-lived views borrowed from it:
//!
//! ```text
//! net.application() -> net.transport() -> net.network_layer() -> net.link() -> net.physical()
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use log::Level;

use crate::application::ApplicationLayer;
use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::{NetResult, TopologyError};
use crate::link::LinkLayer;
use crate::logging::{LogFacade, SharedLog};
use crate::metrics::{LayerCounters, NetworkMetrics};
use crate::physical::PhysicalLayer;
use crate::random::{RandomSource, SeededRandom};
use crate::resource::{Channel, ChannelKey, EntangledPair, FailedPairs, Host, PairId, Qubit, QubitId};
use crate::routing::NetworkLayer;
use crate::topology::{HostId, Topology};
use crate::transport::{TransmissionRecord, TransportLayer};

const TARGET: &str = "qnet::network";

pub struct QuantumNetwork {
    topology: Topology,
    config: SimConfig,
    hosts: BTreeMap<HostId, Host>,
    channels: BTreeMap<ChannelKey, Channel>,
    failed_pairs: FailedPairs,
    clock: SimulationClock,
    rng: Box<dyn RandomSource>,
    log: SharedLog,
    next_qubit_id: QubitId,
    next_pair_id: PairId,
    pub(crate) counters: LayerCounters,
}

impl QuantumNetwork {
    /// Build the resource tables for `topology` and fill them: every host
    /// receives `qubits-per-host` qubits and every channel `pairs-per-channel`
    /// pairs at fidelity 1. Bootstrap neither advances the clock nor counts
    /// as used resources.
    pub fn new(topology: Topology, config: SimConfig) -> NetResult<Self> {
        let mut net = Self::unpopulated(topology, config)?;
        net.populate();
        Ok(net)
    }

    /// Hosts and channels with empty pools. Channel probabilities are drawn
    /// as in [`QuantumNetwork::new`].
    pub fn unpopulated(topology: Topology, config: SimConfig) -> NetResult<Self> {
        config.validate()?;
        let rng: Box<dyn RandomSource> = match config.seed {
            Some(seed) => Box::new(SeededRandom::new(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        };

        let mut net = Self {
            hosts: topology.hosts().map(|id| (id, Host::new(id))).collect(),
            channels: BTreeMap::new(),
            failed_pairs: FailedPairs::new(config.failed_pair_scope),
            clock: SimulationClock::new(config.decoherence_factor),
            rng,
            log: Arc::new(LogFacade),
            next_qubit_id: 0,
            next_pair_id: 0,
            counters: LayerCounters::default(),
            topology,
            config,
        };

        let range = net.config.channel_probability;
        for (a, b) in net.topology.edges() {
            let key = ChannelKey::new(a, b);
            let on_demand = net.rng.uniform_in(range.min, range.max);
            let replay = net.rng.uniform_in(range.min, range.max);
            net.channels.insert(key, Channel::new(key, on_demand, replay));
        }
        Ok(net)
    }

    fn populate(&mut self) {
        let host_ids: Vec<HostId> = self.hosts.keys().copied().collect();
        for host in host_ids {
            for _ in 0..self.config.qubits_per_host {
                let qubit = self.allocate_qubit();
                if let Some(h) = self.hosts.get_mut(&host) {
                    h.qubits.push(qubit);
                }
            }
        }
        let keys: Vec<ChannelKey> = self.channels.keys().copied().collect();
        for key in keys {
            for _ in 0..self.config.pairs_per_channel {
                let pair = self.allocate_pair(1.0);
                if let Some(channel) = self.channels.get_mut(&key) {
                    channel.pairs.push(pair);
                }
            }
        }
        self.emit(
            Level::Info,
            TARGET,
            format!(
                "bootstrapped {} hosts and {} channels",
                self.hosts.len(),
                self.channels.len()
            ),
        );
    }

    /// Replace the random source used from now on.
    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_logger(mut self, log: SharedLog) -> Self {
        self.log = log;
        self
    }

    pub fn physical(&mut self) -> PhysicalLayer<'_> {
        PhysicalLayer::new(self)
    }

    pub fn link(&mut self) -> LinkLayer<'_> {
        LinkLayer::new(self)
    }

    pub fn network_layer(&mut self) -> NetworkLayer<'_> {
        NetworkLayer::new(self)
    }

    pub fn transport(&mut self) -> TransportLayer<'_> {
        TransportLayer::new(self)
    }

    pub fn application(&mut self) -> ApplicationLayer<'_> {
        ApplicationLayer::new(self)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn timeslot(&self) -> u64 {
        self.clock.timeslot()
    }

    /// Advance one timeslot and decay every held qubit and pair once.
    pub fn advance(&mut self) {
        let factor = self.clock.tick();
        for host in self.hosts.values_mut() {
            host.qubits.decay(factor);
        }
        for channel in self.channels.values_mut() {
            channel.pairs.decay(factor);
        }
        self.failed_pairs.decay(factor);
        self.emit(
            Level::Trace,
            TARGET,
            format!("timeslot {} (decay {factor})", self.clock.timeslot()),
        );
    }

    pub fn host(&self, id: HostId) -> NetResult<&Host> {
        Ok(self.hosts.get(&id).ok_or(TopologyError::UnknownHost(id))?)
    }

    pub fn host_mut(&mut self, id: HostId) -> NetResult<&mut Host> {
        Ok(self.hosts.get_mut(&id).ok_or(TopologyError::UnknownHost(id))?)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> + '_ {
        self.hosts.values()
    }

    pub fn channel(&self, a: HostId, b: HostId) -> NetResult<&Channel> {
        Ok(self
            .channels
            .get(&ChannelKey::new(a, b))
            .ok_or(TopologyError::UnknownChannel(a, b))?)
    }

    pub fn channel_mut(&mut self, a: HostId, b: HostId) -> NetResult<&mut Channel> {
        Ok(self
            .channels
            .get_mut(&ChannelKey::new(a, b))
            .ok_or(TopologyError::UnknownChannel(a, b))?)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.channels.values()
    }

    /// Channel between two known hosts, created as a virtual link if absent.
    pub(crate) fn channel_or_virtual(&mut self, a: HostId, b: HostId) -> NetResult<&mut Channel> {
        self.host(a)?;
        self.host(b)?;
        let key = ChannelKey::new(a, b);
        Ok(self
            .channels
            .entry(key)
            .or_insert_with(|| Channel::virtual_link(key)))
    }

    /// Qubits held by `host`; zero for unknown hosts.
    pub fn qubit_count(&self, host: HostId) -> usize {
        self.hosts.get(&host).map_or(0, |h| h.qubits.len())
    }

    /// Pairs held on the channel between `a` and `b`; zero if none exists.
    pub fn pair_count(&self, a: HostId, b: HostId) -> usize {
        self.channels
            .get(&ChannelKey::new(a, b))
            .map_or(0, |c| c.pairs.len())
    }

    pub fn failed_pairs(&self) -> &FailedPairs {
        &self.failed_pairs
    }

    pub(crate) fn failed_pairs_mut(&mut self) -> &mut FailedPairs {
        &mut self.failed_pairs
    }

    pub(crate) fn rng(&mut self) -> &mut dyn RandomSource {
        self.rng.as_mut()
    }

    /// Fresh qubit with a fidelity drawn from the configured range.
    pub(crate) fn allocate_qubit(&mut self) -> Qubit {
        let range = self.config.qubit_fidelity;
        let fidelity = self.rng.uniform_in(range.min, range.max);
        let id = self.next_qubit_id;
        self.next_qubit_id += 1;
        Qubit::new(id, fidelity)
    }

    pub(crate) fn allocate_pair(&mut self, fidelity: f64) -> EntangledPair {
        let id = self.next_pair_id;
        self.next_pair_id += 1;
        EntangledPair::new(id, fidelity)
    }

    pub(crate) fn emit(&self, level: Level, target: &str, message: String) {
        self.log.log(level, target, &message);
    }

    pub fn metrics(&self) -> NetworkMetrics {
        NetworkMetrics::from_counters(self.clock.timeslot(), &self.counters)
    }

    /// Successful link-layer requests, in order.
    pub fn link_requests(&self) -> &[(HostId, HostId)] {
        &self.counters.link_requests
    }

    /// Failed link-layer attempts, one entry per attempt.
    pub fn failed_link_requests(&self) -> &[(HostId, HostId)] {
        &self.counters.failed_link_requests
    }

    /// Transport ledger: admitted transmissions and completed teleportations.
    pub fn transmissions(&self) -> &[TransmissionRecord] {
        &self.counters.transmissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Decoherent;

    fn seeded(seed: u64) -> SimConfig {
        SimConfig::default().with_seed(seed)
    }

    #[test]
    fn bootstrap_fills_every_pool() {
        let net = QuantumNetwork::new(Topology::line(3), seeded(1)).unwrap();
        for host in net.hosts() {
            assert_eq!(host.qubits.len(), 10);
            assert!(host
                .qubits
                .fidelities()
                .iter()
                .all(|f| (0.2..=1.0).contains(f)));
        }
        assert_eq!(net.channels().count(), 2);
        for channel in net.channels() {
            assert_eq!(channel.pairs.len(), 10);
            assert!(channel.pairs.fidelities().iter().all(|&f| f == 1.0));
            assert!((0.2..=1.0).contains(&channel.on_demand_probability()));
            assert!((0.2..=1.0).contains(&channel.replay_probability()));
        }
        assert_eq!(net.timeslot(), 0);
        assert_eq!(net.metrics().qubits_created, 0);
    }

    #[test]
    fn same_seed_same_bootstrap() {
        let a = QuantumNetwork::new(Topology::ring(4), seeded(99)).unwrap();
        let b = QuantumNetwork::new(Topology::ring(4), seeded(99)).unwrap();
        for (ha, hb) in a.hosts().zip(b.hosts()) {
            assert_eq!(ha.qubits.fidelities(), hb.qubits.fidelities());
        }
    }

    #[test]
    fn advance_decays_all_pools() {
        let mut net = QuantumNetwork::unpopulated(Topology::line(2), seeded(3)).unwrap();
        net.host_mut(0).unwrap().qubits.push(Qubit::new(100, 0.8));
        net.channel_mut(0, 1).unwrap().pairs.push(EntangledPair::new(100, 1.0));

        net.advance();
        net.advance();

        let q = net.host(0).unwrap().qubits.peek_newest().unwrap().fidelity();
        let p = net.channel(0, 1).unwrap().pairs.peek_newest().unwrap().fidelity();
        assert!((q - 0.8 * 0.81).abs() < 1e-10);
        assert!((p - 0.81).abs() < 1e-10);
        assert_eq!(net.timeslot(), 2);
    }

    #[test]
    fn unknown_references_are_structural() {
        let mut net = QuantumNetwork::unpopulated(Topology::line(2), seeded(3)).unwrap();
        assert!(net.host(5).unwrap_err().is_structural());
        assert!(net.channel(0, 5).unwrap_err().is_structural());
        assert!(net.channel_or_virtual(0, 5).is_err());
        assert_eq!(net.pair_count(0, 5), 0);
        assert_eq!(net.qubit_count(5), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SimConfig::default();
        config.decoherence_factor = 1.5;
        let err = QuantumNetwork::new(Topology::line(2), config).err().unwrap();
        assert!(err.is_structural());
    }
}
