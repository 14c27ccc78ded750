//! Discrete simulation time.
//!
//! The clock only counts. The decoherence sweep that accompanies each tick is
//! applied by [`crate::network::QuantumNetwork::advance`], which owns the
//! pools.

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    timeslot: u64,
    decoherence_factor: f64,
}

impl SimulationClock {
    pub fn new(decoherence_factor: f64) -> Self {
        Self {
            timeslot: 0,
            decoherence_factor,
        }
    }

    pub fn timeslot(&self) -> u64 {
        self.timeslot
    }

    pub fn decoherence_factor(&self) -> f64 {
        self.decoherence_factor
    }

    /// Move to the next timeslot and return the factor to apply to every
    /// held resource.
    pub fn tick(&mut self) -> f64 {
        self.timeslot += 1;
        self.decoherence_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_counted_individually() {
        let mut clock = SimulationClock::new(0.9);
        assert_eq!(clock.timeslot(), 0);
        for _ in 0..5 {
            assert_eq!(clock.tick(), 0.9);
        }
        assert_eq!(clock.timeslot(), 5);
    }
}
