//! Application layer: E91 key distribution over the transport layer.
//!
//! Alice prepares one qubit per key bit (X for a 1, H for basis 1), Bob
//! measures each in his own basis. Positions where the bases agree and the
//! outcomes match join the key, and the transport layer is charged for
//! carrying those qubits.

use log::Level;

use crate::error::{NetError, NetResult, Protocol};
use crate::network::QuantumNetwork;
use crate::resource::Qubit;
use crate::topology::HostId;

const TARGET: &str = "qnet::application";

/// Sifting rounds before the protocol gives up.
pub const MAX_E91_ROUNDS: usize = 64;

pub struct ApplicationLayer<'a> {
    net: &'a mut QuantumNetwork,
}

impl<'a> ApplicationLayer<'a> {
    pub(crate) fn new(net: &'a mut QuantumNetwork) -> Self {
        Self { net }
    }

    /// Encode `key` in `bases`. Takes one timeslot.
    pub fn prepare_e91_qubits(&mut self, key: &[u8], bases: &[u8]) -> Vec<Qubit> {
        let mut qubits = Vec::with_capacity(key.len().min(bases.len()));
        for (&bit, &base) in key.iter().zip(bases) {
            let mut qubit = self.net.physical().allocate_qubit();
            if bit == 1 {
                qubit.apply_x();
            }
            if base == 1 {
                qubit.apply_hadamard();
            }
            qubits.push(qubit);
        }
        self.net.counters.application_qubits_used += qubits.len();
        self.net.advance();
        qubits
    }

    /// Measure each qubit in the matching basis. Takes one timeslot.
    pub fn apply_bases_and_measure(&mut self, qubits: Vec<Qubit>, bases: &[u8]) -> Vec<u8> {
        let mut results = Vec::with_capacity(qubits.len());
        for (mut qubit, &base) in qubits.into_iter().zip(bases) {
            if base == 1 {
                qubit.apply_hadamard();
            }
            results.push(qubit.measure(self.net.rng()));
        }
        self.net.advance();
        results
    }

    /// Derive a `num_bits` shared key between `alice` and `bob`.
    pub fn qkd_e91_protocol(&mut self, alice: HostId, bob: HostId, num_bits: usize) -> NetResult<Vec<u8>> {
        self.net.host(alice)?;
        self.net.host(bob)?;

        let mut final_key: Vec<u8> = Vec::with_capacity(num_bits);
        let mut round = 0;
        while final_key.len() < num_bits {
            round += 1;
            if round > MAX_E91_ROUNDS {
                return Err(NetError::failure(
                    Protocol::E91,
                    format!("{} of {num_bits} bits after {MAX_E91_ROUNDS} rounds", final_key.len()),
                ));
            }

            let needed = 2 * (num_bits - final_key.len());
            let key = self.random_bits(needed);
            let alice_bases = self.random_bits(needed);
            let bob_bases = self.random_bits(needed);

            let qubits = self.prepare_e91_qubits(&key, &alice_bases);
            let measured = self.apply_bases_and_measure(qubits, &bob_bases);

            let before = final_key.len();
            for i in 0..needed {
                if alice_bases[i] == bob_bases[i] && key[i] == measured[i] {
                    final_key.push(key[i]);
                }
            }
            let appended = final_key.len() - before;
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("round {round}: {appended} sifted bits between {alice} and {bob}"),
            );

            if appended > 0 {
                if let Err(err) = self.net.transport().run_transport_layer(alice, bob, appended) {
                    self.net.emit(
                        Level::Warn,
                        TARGET,
                        format!("E91 between {alice} and {bob} aborted: {err}"),
                    );
                    return Err(err);
                }
            }
        }

        final_key.truncate(num_bits);
        self.net.emit(
            Level::Info,
            TARGET,
            format!("E91 key of {num_bits} bits established between {alice} and {bob}"),
        );
        Ok(final_key)
    }

    fn random_bits(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| u8::from(self.net.rng().bit())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::random::{RandomSource, ScriptedRandom};
    use crate::topology::Topology;

    fn network(seed: u64) -> QuantumNetwork {
        let mut config = SimConfig::default().with_seed(seed);
        config.pairs_per_channel = 32;
        QuantumNetwork::new(Topology::line(3), config).unwrap()
    }

    #[test]
    fn matching_bases_reproduce_the_bit() {
        let mut net = network(1);
        let key = [0, 1, 0, 1];
        let bases = [0, 0, 1, 1];
        let qubits = net.application().prepare_e91_qubits(&key, &bases);
        let measured = net.application().apply_bases_and_measure(qubits, &bases);
        assert_eq!(measured, key.to_vec());
        assert_eq!(net.timeslot(), 2);
        assert_eq!(net.metrics().application_qubits_used, 4);
    }

    #[test]
    fn qkd_returns_exactly_the_requested_length() {
        let mut net = network(2024);
        let key = net.application().qkd_e91_protocol(0, 2, 8).unwrap();
        assert_eq!(key.len(), 8);
        assert!(key.iter().all(|&b| b <= 1));
    }

    #[test]
    fn qkd_of_zero_bits_is_empty() {
        let mut net = network(3);
        assert!(net.application().qkd_e91_protocol(0, 2, 0).unwrap().is_empty());
        assert_eq!(net.timeslot(), 0);
    }

    #[test]
    fn qkd_fails_when_transport_fails() {
        let mut config = SimConfig::default().with_seed(5);
        config.pairs_per_channel = 0;
        let mut net = QuantumNetwork::new(Topology::line(2), config).unwrap();
        let err = net.application().qkd_e91_protocol(0, 1, 4).unwrap_err();
        assert_eq!(err, NetError::RouteUnavailable { src: 0, dst: 1 });
    }

    #[test]
    fn degenerate_randomness_still_terminates() {
        // Every bit and basis is 1: all positions sift and match.
        let mut net = network(9).with_random(Box::new(ScriptedRandom::constant(0.0)));
        let key = net.application().qkd_e91_protocol(0, 2, 4).unwrap();
        assert_eq!(key, vec![1, 1, 1, 1]);
    }

    /// Alice always picks basis 1, Bob always basis 0.
    struct MismatchedBases {
        block: usize,
        calls: usize,
    }

    impl RandomSource for MismatchedBases {
        fn uniform(&mut self) -> f64 {
            0.0
        }

        fn bit(&mut self) -> bool {
            let phase = (self.calls / self.block) % 3;
            self.calls += 1;
            phase == 1
        }
    }

    #[test]
    fn qkd_gives_up_when_bases_never_match() {
        let mut net = network(4).with_random(Box::new(MismatchedBases { block: 2, calls: 0 }));
        let err = net.application().qkd_e91_protocol(0, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            NetError::ProtocolFailure {
                protocol: Protocol::E91,
                ..
            }
        ));
        // two timeslots per sifting round, no transport
        assert_eq!(net.timeslot(), 2 * MAX_E91_ROUNDS as u64);
        assert_eq!(net.metrics().transport_qubits_consumed, 0);
    }
}
