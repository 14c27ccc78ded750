//! Swapping and teleportation along a five-host line.
//!
//! Run with:
//!   cargo run --example line_teleportation

use qnet_sim::prelude::*;

fn main() -> Result<(), NetError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SimConfig::default().with_seed(42);
    let mut net = QuantumNetwork::new(Topology::line(5), config)?;

    println!("channels healthy: {}", net.network_layer().verify_channels());
    println!("hosts healthy:    {}", net.network_layer().verify_nodes());

    match net.network_layer().entanglement_swapping(0, 4) {
        Ok(outcome) => println!(
            "swapped {:?} in {} folds, end-to-end fidelity {:.4}",
            outcome.route, outcome.folds, outcome.fidelity
        ),
        Err(err) => println!("swapping failed: {err}"),
    }

    for _ in 0..3 {
        match net.transport().teleportation_protocol(0, 4) {
            Ok(f) => println!("teleported with fidelity {f:.4}"),
            Err(err) => println!("teleportation failed: {err}"),
        }
        net.advance();
    }

    let metrics = net.metrics();
    println!("timeslot,qubits_used,pairs_used,avg_route_length");
    println!(
        "{},{},{},{:.2}",
        metrics.timeslot,
        metrics.total_qubits_used,
        metrics.total_pairs_used,
        metrics.avg_route_length.unwrap_or(0.0)
    );
    Ok(())
}
