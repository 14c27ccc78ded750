//! # qnet-sim
//!
//! Layered quantum network simulator. Hosts hold qubits, channels hold
//! entangled pairs, and every resource is reduced to a scalar fidelity that
//! decays once per timeslot.
//!
//! ## Layers
//!
//! - **physical**: qubit and pair creation, heralded entanglement, on-demand
//!   and replay recreation
//! - **link**: two-attempt pair requests with purification of failed pairs
//! - **network**: topology health checks, resource-aware shortest routes,
//!   entanglement swapping
//! - **transport**: route admission and teleportation, single and batched
//! - **application**: E91 key distribution
//!
//! ## Usage
//!
//! ```no_run
//! use qnet_sim::prelude::*;
//!
//! let config = SimConfig::default().with_seed(7);
//! let mut net = QuantumNetwork::new(Topology::line(3), config).unwrap();
//! let key = net.application().qkd_e91_protocol(0, 2, 8).unwrap();
//! println!("key: {key:?}, timeslot {}", net.metrics().timeslot);
//! ```

pub mod error;
pub mod topology;
pub mod random;
pub mod logging;
pub mod fidelity;
pub mod resource;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod network;
pub mod physical;
pub mod link;
pub mod routing;
pub mod transport;
pub mod application;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::topology::*;
    pub use crate::random::*;
    pub use crate::logging::*;
    pub use crate::fidelity::*;
    pub use crate::resource::*;
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::metrics::*;
    pub use crate::network::*;
    pub use crate::physical::*;
    pub use crate::link::*;
    pub use crate::routing::*;
    pub use crate::transport::*;
    pub use crate::application::*;
}
