//! Resource model: qubits, entangled pairs and the ordered pools that own
//! them.
//!
//! Every layer acquires and releases resources through the pool contracts
//! defined here (`take_oldest`, `take_newest`, `peek_*`). A value taken from a
//! pool is owned by the caller until it is pushed into another pool or
//! dropped by an explicit consume step.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::random::RandomSource;
use crate::topology::HostId;

pub type QubitId = u64;
pub type PairId = u64;

/// Anything whose fidelity decays with time.
pub trait Decoherent {
    fn fidelity(&self) -> f64;
    fn set_fidelity(&mut self, fidelity: f64);

    fn decay(&mut self, factor: f64) {
        let next = self.fidelity() * factor;
        self.set_fidelity(next);
    }
}

fn clamp_unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// A simulated qubit.
///
/// Fidelity is the quantity the network layers reason about. The amplitude
/// pair is only driven by the E91 application, which prepares and measures
/// single qubits; pool-resident qubits stay in |0⟩.
#[derive(Debug, Clone, PartialEq)]
pub struct Qubit {
    id: QubitId,
    initial_fidelity: f64,
    fidelity: f64,
    amplitudes: [Complex64; 2],
}

impl Qubit {
    pub fn new(id: QubitId, fidelity: f64) -> Self {
        let fidelity = clamp_unit(fidelity);
        Self {
            id,
            initial_fidelity: fidelity,
            fidelity,
            amplitudes: [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
        }
    }

    pub fn id(&self) -> QubitId {
        self.id
    }

    pub fn initial_fidelity(&self) -> f64 {
        self.initial_fidelity
    }

    pub fn amplitudes(&self) -> [Complex64; 2] {
        self.amplitudes
    }

    /// Pauli X.
    pub fn apply_x(&mut self) {
        self.amplitudes.swap(0, 1);
    }

    pub fn apply_hadamard(&mut self) {
        let [a, b] = self.amplitudes;
        let s = std::f64::consts::FRAC_1_SQRT_2;
        self.amplitudes = [(a + b) * s, (a - b) * s];
    }

    /// Probability of reading 0.
    pub fn prob_zero(&self) -> f64 {
        let p0 = self.amplitudes[0].norm_sqr();
        let p1 = self.amplitudes[1].norm_sqr();
        let total = p0 + p1;
        if total <= 0.0 {
            return 1.0;
        }
        p0 / total
    }

    /// Computational-basis measurement. Collapses the state.
    pub fn measure(&mut self, rng: &mut dyn RandomSource) -> u8 {
        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        if rng.uniform() < self.prob_zero() {
            self.amplitudes = [one, zero];
            0
        } else {
            self.amplitudes = [zero, one];
            1
        }
    }
}

impl Decoherent for Qubit {
    fn fidelity(&self) -> f64 {
        self.fidelity
    }

    fn set_fidelity(&mut self, fidelity: f64) {
        self.fidelity = clamp_unit(fidelity);
    }
}

/// Shared entanglement between two hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct EntangledPair {
    id: PairId,
    fidelity: f64,
}

impl EntangledPair {
    pub fn new(id: PairId, fidelity: f64) -> Self {
        Self {
            id,
            fidelity: clamp_unit(fidelity),
        }
    }

    pub fn id(&self) -> PairId {
        self.id
    }
}

impl Decoherent for EntangledPair {
    fn fidelity(&self) -> f64 {
        self.fidelity
    }

    fn set_fidelity(&mut self, fidelity: f64) {
        self.fidelity = clamp_unit(fidelity);
    }
}

/// Which end of a pool an operation consumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEnd {
    Oldest,
    Newest,
}

/// Insertion-ordered pool. The front is the oldest entry, the back the newest.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<T> {
    items: VecDeque<T>,
}

pub type QubitPool = Pool<Qubit>;
pub type PairPool = Pool<EntangledPair>;

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn take_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn take_newest(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn take(&mut self, end: PoolEnd) -> Option<T> {
        match end {
            PoolEnd::Oldest => self.take_oldest(),
            PoolEnd::Newest => self.take_newest(),
        }
    }

    pub fn peek_oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn peek_newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }
}

impl<T: Decoherent> Pool<T> {
    /// Current fidelities, oldest first.
    pub fn fidelities(&self) -> Vec<f64> {
        self.items.iter().map(Decoherent::fidelity).collect()
    }

    pub fn decay(&mut self, factor: f64) {
        for item in self.items.iter_mut() {
            item.decay(factor);
        }
    }
}

impl<T> FromIterator<T> for Pool<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    id: HostId,
    pub qubits: QubitPool,
}

impl Host {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            qubits: QubitPool::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host {}", self.id)
    }
}

/// Unordered host pair identifying a channel. Stored as `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey(HostId, HostId);

impl ChannelKey {
    pub fn new(a: HostId, b: HostId) -> Self {
        if a <= b {
            ChannelKey(a, b)
        } else {
            ChannelKey(b, a)
        }
    }

    pub fn endpoints(&self) -> (HostId, HostId) {
        (self.0, self.1)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel ({}, {})", self.0, self.1)
    }
}

/// Resource state of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    key: ChannelKey,
    pub pairs: PairPool,
    on_demand_probability: f64,
    replay_probability: f64,
}

impl Channel {
    pub fn new(key: ChannelKey, on_demand_probability: f64, replay_probability: f64) -> Self {
        Self {
            key,
            pairs: PairPool::new(),
            on_demand_probability: clamp_unit(on_demand_probability),
            replay_probability: clamp_unit(replay_probability),
        }
    }

    /// Channel created by swapping or purification outside the bootstrap
    /// set. It cannot be resupplied by the recreation protocols.
    pub fn virtual_link(key: ChannelKey) -> Self {
        Self::new(key, 0.0, 0.0)
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn on_demand_probability(&self) -> f64 {
        self.on_demand_probability
    }

    pub fn replay_probability(&self) -> f64 {
        self.replay_probability
    }
}

/// Whether failed pairs are pooled per channel or network-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedPairScope {
    #[default]
    PerChannel,
    Global,
}

/// Pairs that missed the heralding threshold, waiting for purification.
#[derive(Debug, Clone, Default)]
pub struct FailedPairs {
    scope: FailedPairScope,
    global: PairPool,
    per_channel: BTreeMap<ChannelKey, PairPool>,
}

impl FailedPairs {
    pub fn new(scope: FailedPairScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn scope(&self) -> FailedPairScope {
        self.scope
    }

    pub fn push(&mut self, key: ChannelKey, pair: EntangledPair) {
        match self.scope {
            FailedPairScope::Global => self.global.push(pair),
            FailedPairScope::PerChannel => self.per_channel.entry(key).or_default().push(pair),
        }
    }

    /// Pairs visible to purification on `key`.
    pub fn available(&self, key: ChannelKey) -> usize {
        match self.scope {
            FailedPairScope::Global => self.global.len(),
            FailedPairScope::PerChannel => self.per_channel.get(&key).map_or(0, Pool::len),
        }
    }

    /// Remove the two most recently failed pairs, newest first.
    /// Leaves the pool untouched when fewer than two are available.
    pub fn take_two_newest(&mut self, key: ChannelKey) -> Option<(EntangledPair, EntangledPair)> {
        let pool = match self.scope {
            FailedPairScope::Global => &mut self.global,
            FailedPairScope::PerChannel => self.per_channel.get_mut(&key)?,
        };
        if pool.len() < 2 {
            return None;
        }
        let newest = pool.take_newest()?;
        let previous = pool.take_newest()?;
        Some((newest, previous))
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_channel.values().map(Pool::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn decay(&mut self, factor: f64) {
        self.global.decay(factor);
        for pool in self.per_channel.values_mut() {
            pool.decay(factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;

    const TOL: f64 = 1e-10;

    fn pool_of(fidelities: &[f64]) -> QubitPool {
        fidelities
            .iter()
            .enumerate()
            .map(|(i, &f)| Qubit::new(i as QubitId, f))
            .collect()
    }

    #[test]
    fn pool_ends_are_distinct() {
        let mut pool = pool_of(&[0.5, 0.6, 0.7]);
        assert_eq!(pool.peek_oldest().map(Qubit::id), Some(0));
        assert_eq!(pool.peek_newest().map(Qubit::id), Some(2));
        assert_eq!(pool.take_newest().map(|q| q.id()), Some(2));
        assert_eq!(pool.take_oldest().map(|q| q.id()), Some(0));
        assert_eq!(pool.take(PoolEnd::Newest).map(|q| q.id()), Some(1));
        assert!(pool.take(PoolEnd::Oldest).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn decay_multiplies_every_entry() {
        let mut pool = pool_of(&[1.0, 0.5]);
        pool.decay(0.9);
        pool.decay(0.9);
        let f = pool.fidelities();
        assert!((f[0] - 0.81).abs() < TOL);
        assert!((f[1] - 0.405).abs() < TOL);
        // initial fidelity is kept
        assert_eq!(pool.peek_newest().map(Qubit::initial_fidelity), Some(0.5));
    }

    #[test]
    fn fidelity_is_clamped() {
        let mut pair = EntangledPair::new(0, 1.3);
        assert_eq!(pair.fidelity(), 1.0);
        pair.set_fidelity(-0.1);
        assert_eq!(pair.fidelity(), 0.0);
    }

    #[test]
    fn hadamard_then_measure_follows_born_rule() {
        let mut q = Qubit::new(0, 1.0);
        q.apply_hadamard();
        assert!((q.prob_zero() - 0.5).abs() < TOL);

        let mut rng = ScriptedRandom::new([0.7], 0.0);
        assert_eq!(q.measure(&mut rng), 1);
        // collapsed
        assert!((q.prob_zero() - 0.0).abs() < TOL);
        assert_eq!(q.measure(&mut rng), 1);
    }

    #[test]
    fn hadamard_is_self_inverse() {
        let mut q = Qubit::new(0, 1.0);
        q.apply_x();
        q.apply_hadamard();
        q.apply_hadamard();
        assert!((q.prob_zero() - 0.0).abs() < TOL);
        let mut rng = ScriptedRandom::constant(0.999);
        assert_eq!(q.measure(&mut rng), 1);
    }

    #[test]
    fn channel_key_is_unordered() {
        assert_eq!(ChannelKey::new(3, 1), ChannelKey::new(1, 3));
        assert_eq!(ChannelKey::new(3, 1).endpoints(), (1, 3));
        assert_eq!(ChannelKey::new(3, 1).to_string(), "channel (1, 3)");
    }

    #[test]
    fn failed_pairs_respect_scope() {
        let a = ChannelKey::new(0, 1);
        let b = ChannelKey::new(1, 2);

        let mut scoped = FailedPairs::new(FailedPairScope::PerChannel);
        scoped.push(a, EntangledPair::new(0, 0.5));
        scoped.push(b, EntangledPair::new(1, 0.6));
        assert_eq!(scoped.available(a), 1);
        assert!(scoped.take_two_newest(a).is_none());
        assert_eq!(scoped.len(), 2);

        let mut global = FailedPairs::new(FailedPairScope::Global);
        global.push(a, EntangledPair::new(0, 0.5));
        global.push(b, EntangledPair::new(1, 0.6));
        assert_eq!(global.available(a), 2);
        let (newest, previous) = global.take_two_newest(a).unwrap();
        assert_eq!((newest.id(), previous.id()), (1, 0));
        assert!(global.is_empty());
    }
}
