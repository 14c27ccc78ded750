//! Physical layer: qubit and pair creation, single-hop entanglement.

use log::Level;

use crate::error::{NetError, NetResult, Protocol, ResourceKind};
use crate::fidelity::HERALDING_THRESHOLD;
use crate::network::QuantumNetwork;
use crate::resource::{ChannelKey, Decoherent, EntangledPair, Qubit, QubitId};
use crate::topology::HostId;

const TARGET: &str = "qnet::physical";

/// Which probability parameter a recreation attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recreation {
    OnDemand,
    Replay,
}

pub struct PhysicalLayer<'a> {
    net: &'a mut QuantumNetwork,
}

impl<'a> PhysicalLayer<'a> {
    pub(crate) fn new(net: &'a mut QuantumNetwork) -> Self {
        Self { net }
    }

    /// Create a qubit in `host`'s pool and return its id.
    pub fn create_qubit(&mut self, host: HostId) -> NetResult<QubitId> {
        self.net.host(host)?;
        let qubit = self.allocate_qubit();
        let id = qubit.id();
        self.net.emit(
            Level::Debug,
            TARGET,
            format!("qubit {id} created at host {host} with fidelity {:.4}", qubit.fidelity()),
        );
        self.net.host_mut(host)?.qubits.push(qubit);
        Ok(id)
    }

    /// Create a qubit that belongs to no host.
    pub fn allocate_qubit(&mut self) -> Qubit {
        self.net.counters.qubits_created += 1;
        self.net.allocate_qubit()
    }

    /// Create an unplaced pair.
    pub fn create_pair(&mut self, fidelity: f64) -> EntangledPair {
        self.net.counters.pairs_created += 1;
        self.net.allocate_pair(fidelity)
    }

    /// Heralded entanglement between neighbours `a` and `b`.
    ///
    /// Spends the newest qubit of each host. The resulting pair goes to the
    /// channel if its fidelity clears the heralding threshold, otherwise to
    /// the failed-pair store and the attempt fails. Returns the fidelity of
    /// the stored pair.
    pub fn heralding_protocol(&mut self, a: HostId, b: HostId) -> NetResult<f64> {
        let (qa, qb) = self.take_qubit_pair(a, b)?;
        let fidelity = qa.fidelity() * qb.fidelity();
        let pair = self.create_pair(fidelity);
        let key = ChannelKey::new(a, b);

        if fidelity >= HERALDING_THRESHOLD {
            self.net.channel_mut(a, b)?.pairs.push(pair);
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("heralded pair on {key} with fidelity {fidelity:.4}"),
            );
            Ok(fidelity)
        } else {
            self.net.failed_pairs_mut().push(key, pair);
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("heralded pair on {key} below threshold ({fidelity:.4})"),
            );
            Err(NetError::failure(
                Protocol::Heralding,
                format!("pair fidelity {fidelity:.4} below {HERALDING_THRESHOLD}"),
            ))
        }
    }

    pub fn echp_on_demand(&mut self, a: HostId, b: HostId) -> NetResult<f64> {
        self.recreate(a, b, Recreation::OnDemand)
    }

    pub fn echp_on_replay(&mut self, a: HostId, b: HostId) -> NetResult<f64> {
        self.recreate(a, b, Recreation::Replay)
    }

    /// Probability-driven single-hop recreation. Success probability is the
    /// channel parameter times both qubit fidelities.
    pub fn recreate(&mut self, a: HostId, b: HostId, kind: Recreation) -> NetResult<f64> {
        let channel = self.net.channel(a, b)?;
        let base = match kind {
            Recreation::OnDemand => channel.on_demand_probability(),
            Recreation::Replay => channel.replay_probability(),
        };
        let protocol = match kind {
            Recreation::OnDemand => Protocol::OnDemand,
            Recreation::Replay => Protocol::Replay,
        };

        let (qa, qb) = self.take_qubit_pair(a, b)?;
        let fidelity = qa.fidelity() * qb.fidelity();
        let p = base * fidelity;

        if self.net.rng().uniform() < p {
            let pair = self.create_pair(fidelity);
            self.net.channel_mut(a, b)?.pairs.push(pair);
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("{protocol} on {} succeeded (p = {p:.4})", ChannelKey::new(a, b)),
            );
            Ok(fidelity)
        } else {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("{protocol} on {} failed (p = {p:.4})", ChannelKey::new(a, b)),
            );
            Err(NetError::failure(protocol, format!("success probability {p:.4} not met")))
        }
    }

    /// Take the newest qubit from both hosts, or neither.
    fn take_qubit_pair(&mut self, a: HostId, b: HostId) -> NetResult<(Qubit, Qubit)> {
        self.net.channel(a, b)?;
        for host in [a, b] {
            let available = self.net.host(host)?.qubits.len();
            if available == 0 {
                return Err(NetError::exhausted(
                    ResourceKind::Qubit,
                    format!("host {host}"),
                    1,
                    available,
                ));
            }
        }
        let qa = self.net.host_mut(a)?.qubits.take_newest();
        let qb = self.net.host_mut(b)?.qubits.take_newest();
        match (qa, qb) {
            (Some(qa), Some(qb)) => {
                self.net.counters.physical_qubits_consumed += 2;
                Ok((qa, qb))
            }
            _ => Err(NetError::exhausted(ResourceKind::Qubit, format!("host {a} or {b}"), 1, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::random::ScriptedRandom;
    use crate::topology::Topology;

    fn bare_line(n: usize) -> QuantumNetwork {
        QuantumNetwork::unpopulated(Topology::line(n), SimConfig::default().with_seed(5)).unwrap()
    }

    fn give(net: &mut QuantumNetwork, host: HostId, fidelity: f64) {
        let id = net.qubit_count(host) as QubitId;
        net.host_mut(host).unwrap().qubits.push(Qubit::new(id, fidelity));
    }

    #[test]
    fn create_qubit_appends_to_host() {
        let mut net = bare_line(2);
        let id = net.physical().create_qubit(1).unwrap();
        assert_eq!(net.qubit_count(1), 1);
        assert_eq!(net.host(1).unwrap().qubits.peek_newest().map(Qubit::id), Some(id));
        assert_eq!(net.metrics().qubits_created, 1);
        assert!(net.physical().create_qubit(9).unwrap_err().is_structural());
    }

    #[test]
    fn heralding_success_stores_pair_in_channel() {
        let mut net = bare_line(2);
        give(&mut net, 0, 0.5);
        give(&mut net, 0, 0.95);
        give(&mut net, 1, 0.9);

        let f = net.physical().heralding_protocol(0, 1).unwrap();
        assert!((f - 0.855).abs() < 1e-10);
        assert_eq!(net.pair_count(0, 1), 1);
        // the newest qubit was spent, the older one remains
        assert_eq!(net.qubit_count(0), 1);
        assert_eq!(net.host(0).unwrap().qubits.fidelities(), vec![0.5]);
        assert_eq!(net.qubit_count(1), 0);
    }

    #[test]
    fn heralding_below_threshold_goes_to_failed_pool() {
        let mut net = bare_line(2);
        give(&mut net, 0, 0.8);
        give(&mut net, 1, 0.8);

        let err = net.physical().heralding_protocol(0, 1).unwrap_err();
        assert!(matches!(
            err,
            NetError::ProtocolFailure {
                protocol: Protocol::Heralding,
                ..
            }
        ));
        assert_eq!(net.pair_count(0, 1), 0);
        assert_eq!(net.failed_pairs().available(ChannelKey::new(0, 1)), 1);
    }

    #[test]
    fn heralding_without_qubits_spends_nothing() {
        let mut net = bare_line(2);
        give(&mut net, 0, 0.9);
        let err = net.physical().heralding_protocol(0, 1).unwrap_err();
        assert!(matches!(err, NetError::ResourceExhaustion { .. }));
        assert_eq!(net.qubit_count(0), 1);
    }

    #[test]
    fn heralding_requires_a_channel() {
        let mut net = bare_line(3);
        give(&mut net, 0, 0.9);
        give(&mut net, 2, 0.9);
        let err = net.physical().heralding_protocol(0, 2).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(net.qubit_count(0), 1);
    }

    #[test]
    fn recreation_uses_channel_probability() {
        let mut net = bare_line(2).with_random(Box::new(ScriptedRandom::new([0.0, 0.999], 0.5)));
        give(&mut net, 0, 0.9);
        give(&mut net, 1, 0.9);
        give(&mut net, 0, 0.9);
        give(&mut net, 1, 0.9);

        let f = net.physical().echp_on_demand(0, 1).unwrap();
        assert!((f - 0.81).abs() < 1e-10);
        assert_eq!(net.pair_count(0, 1), 1);

        let err = net.physical().echp_on_replay(0, 1).unwrap_err();
        assert!(matches!(
            err,
            NetError::ProtocolFailure {
                protocol: Protocol::Replay,
                ..
            }
        ));
        assert_eq!(net.pair_count(0, 1), 1);
        assert_eq!(net.qubit_count(0), 0);
    }
}
