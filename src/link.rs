//! Link layer: bounded-retry pair creation and purification of failed pairs.

use log::Level;

use crate::error::{NetError, NetResult, Protocol, ResourceKind};
use crate::fidelity::{
    agreement_probability, PurificationScheme, PURIFICATION_MIN_PROBABILITY,
    PURIFICATION_THRESHOLD,
};
use crate::network::QuantumNetwork;
use crate::resource::{ChannelKey, Decoherent};
use crate::topology::HostId;

const TARGET: &str = "qnet::link";

/// Heralding attempts per request.
pub const REQUEST_ATTEMPTS: usize = 2;

/// Purified fidelity for a numeric scheme code. Codes other than 1, 2 and 3
/// use scheme 1.
pub fn purification_calculator(f1: f64, f2: f64, scheme: u8) -> f64 {
    PurificationScheme::from_code(scheme).combine(f1, f2)
}

pub struct LinkLayer<'a> {
    net: &'a mut QuantumNetwork,
}

impl<'a> LinkLayer<'a> {
    pub(crate) fn new(net: &'a mut QuantumNetwork) -> Self {
        Self { net }
    }

    /// Establish one pair between neighbours `a` and `b`.
    ///
    /// Each failed heralding attempt is recorded and followed by a
    /// purification attempt on the failed pairs. Returns the fidelity of the
    /// heralded pair.
    pub fn request(&mut self, a: HostId, b: HostId) -> NetResult<f64> {
        self.net.host(a)?;
        self.net.host(b)?;

        for attempt in 1..=REQUEST_ATTEMPTS {
            match self.net.physical().heralding_protocol(a, b) {
                Ok(fidelity) => {
                    self.net.counters.link_requests.push((a, b));
                    self.net.counters.link_fidelities.push(fidelity);
                    self.net.emit(
                        Level::Info,
                        TARGET,
                        format!("pair established between {a} and {b} on attempt {attempt}"),
                    );
                    return Ok(fidelity);
                }
                Err(err) if err.is_structural() => return Err(err),
                Err(err) => {
                    self.net.counters.failed_link_requests.push((a, b));
                    self.net.emit(
                        Level::Debug,
                        TARGET,
                        format!("attempt {attempt} between {a} and {b} failed: {err}"),
                    );
                    if let Err(err) = self.purification(a, b, PurificationScheme::default()) {
                        if err.is_structural() {
                            return Err(err);
                        }
                    }
                }
            }
        }

        Err(NetError::failure(
            Protocol::Heralding,
            format!("no pair between {a} and {b} after {REQUEST_ATTEMPTS} attempts"),
        ))
    }

    /// Combine the two most recently failed pairs for channel (`a`, `b`).
    ///
    /// Both inputs are consumed whenever two are available. The purified
    /// pair is stored only if the attempt is likely enough to succeed and
    /// the result clears the purification threshold.
    pub fn purification(&mut self, a: HostId, b: HostId, scheme: PurificationScheme) -> NetResult<f64> {
        self.net.host(a)?;
        self.net.host(b)?;
        let key = ChannelKey::new(a, b);

        let Some((newest, previous)) = self.net.failed_pairs_mut().take_two_newest(key) else {
            let available = self.net.failed_pairs().available(key);
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("not enough failed pairs to purify {key}"),
            );
            return Err(NetError::exhausted(
                ResourceKind::FailedPair,
                key.to_string(),
                2,
                available,
            ));
        };
        self.net.counters.link_pairs_consumed += 2;

        let (f1, f2) = (newest.fidelity(), previous.fidelity());
        let p = agreement_probability(f1, f2);
        if p <= PURIFICATION_MIN_PROBABILITY {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("purification on {key} skipped: success probability {p:.4}"),
            );
            return Err(NetError::failure(
                Protocol::Purification,
                format!("success probability {p:.4} too low"),
            ));
        }

        let fidelity = scheme.combine(f1, f2);
        if fidelity <= PURIFICATION_THRESHOLD {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("purification on {key} produced low fidelity {fidelity:.4}"),
            );
            return Err(NetError::failure(
                Protocol::Purification,
                format!("purified fidelity {fidelity:.4} below {PURIFICATION_THRESHOLD}"),
            ));
        }

        let pair = self.net.allocate_pair(fidelity);
        self.net.channel_or_virtual(a, b)?.pairs.push(pair);
        self.net.counters.link_fidelities.push(fidelity);
        self.net.emit(
            Level::Info,
            TARGET,
            format!(
                "purification (scheme {}) on {key} succeeded with fidelity {fidelity:.4}",
                scheme.code()
            ),
        );
        Ok(fidelity)
    }
}
