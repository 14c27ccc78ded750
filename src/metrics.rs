//! Read-only accounting of what each layer produced and consumed.
//!
//! Formatting and export are left to the caller: [`NetworkMetrics`] is a
//! plain snapshot that serializes with serde.

use serde::Serialize;

use crate::fidelity::mean;
use crate::topology::HostId;
use crate::transport::TransmissionRecord;

/// Running tallies kept by the network while layers operate.
#[derive(Debug, Clone, Default)]
pub(crate) struct LayerCounters {
    pub qubits_created: usize,
    pub pairs_created: usize,
    pub physical_qubits_consumed: usize,
    pub link_pairs_consumed: usize,
    pub link_fidelities: Vec<f64>,
    pub link_requests: Vec<(HostId, HostId)>,
    pub failed_link_requests: Vec<(HostId, HostId)>,
    pub swap_pairs_consumed: usize,
    pub route_lengths: Vec<usize>,
    pub transport_qubits_consumed: usize,
    pub transport_pairs_consumed: usize,
    pub transport_fidelities: Vec<f64>,
    pub transmissions: Vec<TransmissionRecord>,
    pub application_qubits_used: usize,
}

/// Snapshot of the network's counters at one timeslot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkMetrics {
    pub timeslot: u64,
    /// Qubits created by the physical layer after bootstrap.
    pub qubits_created: usize,
    /// Pairs created by the physical layer after bootstrap.
    pub pairs_created: usize,
    /// Qubits spent by heralding and the recreation protocols.
    pub physical_qubits_consumed: usize,
    /// Failed pairs consumed as purification inputs.
    pub link_pairs_consumed: usize,
    pub swap_pairs_consumed: usize,
    pub transport_qubits_consumed: usize,
    pub transport_pairs_consumed: usize,
    pub application_qubits_used: usize,
    /// Mean fidelity of pairs delivered by link requests and purification.
    pub link_avg_fidelity: Option<f64>,
    /// Mean final fidelity of teleported qubits.
    pub transport_avg_fidelity: Option<f64>,
    /// Mean hop count of routes used by swapping and teleportation.
    pub avg_route_length: Option<f64>,
    pub total_qubits_used: usize,
    pub total_pairs_used: usize,
}

impl NetworkMetrics {
    pub(crate) fn from_counters(timeslot: u64, counters: &LayerCounters) -> Self {
        let route_lengths: Vec<f64> = counters.route_lengths.iter().map(|&n| n as f64).collect();
        Self {
            timeslot,
            qubits_created: counters.qubits_created,
            pairs_created: counters.pairs_created,
            physical_qubits_consumed: counters.physical_qubits_consumed,
            link_pairs_consumed: counters.link_pairs_consumed,
            swap_pairs_consumed: counters.swap_pairs_consumed,
            transport_qubits_consumed: counters.transport_qubits_consumed,
            transport_pairs_consumed: counters.transport_pairs_consumed,
            application_qubits_used: counters.application_qubits_used,
            link_avg_fidelity: mean(&counters.link_fidelities),
            transport_avg_fidelity: mean(&counters.transport_fidelities),
            avg_route_length: mean(&route_lengths),
            total_qubits_used: counters.physical_qubits_consumed
                + counters.transport_qubits_consumed
                + counters.application_qubits_used,
            total_pairs_used: counters.link_pairs_consumed
                + counters.swap_pairs_consumed
                + counters.transport_pairs_consumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counters_have_no_averages() {
        let metrics = NetworkMetrics::from_counters(0, &LayerCounters::default());
        assert_eq!(metrics.link_avg_fidelity, None);
        assert_eq!(metrics.avg_route_length, None);
        assert_eq!(metrics.total_pairs_used, 0);
    }

    #[test]
    fn totals_sum_the_layers() {
        let counters = LayerCounters {
            physical_qubits_consumed: 4,
            transport_qubits_consumed: 3,
            application_qubits_used: 16,
            link_pairs_consumed: 2,
            swap_pairs_consumed: 2,
            transport_pairs_consumed: 6,
            route_lengths: vec![2, 3],
            ..LayerCounters::default()
        };
        let metrics = NetworkMetrics::from_counters(7, &counters);
        assert_eq!(metrics.timeslot, 7);
        assert_eq!(metrics.total_qubits_used, 23);
        assert_eq!(metrics.total_pairs_used, 10);
        assert_eq!(metrics.avg_route_length, Some(2.5));
    }
}
