//! Transport layer: route admission and teleportation.

use log::Level;
use serde::Serialize;

use crate::error::{NetError, NetResult, Protocol, ResourceKind};
use crate::fidelity::{mean, teleported_fidelity};
use crate::network::QuantumNetwork;
use crate::resource::{ChannelKey, Decoherent, PoolEnd};
use crate::topology::{HostId, Route};

const TARGET: &str = "qnet::transport";

/// Route discovery rounds per request.
pub const ROUTE_ROUNDS: usize = 2;

/// Fidelities involved in one teleportation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeleportRecord {
    pub fidelity_src: f64,
    pub fidelity_dst: f64,
    /// Mean fidelity of every pair on the route before consumption.
    pub fidelity_route: f64,
    pub final_fidelity: f64,
}

/// Entry of the transport ledger. Admissions carry no teleport data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransmissionRecord {
    pub route: Route,
    pub src: HostId,
    pub dst: HostId,
    pub teleport: Option<TeleportRecord>,
}

pub struct TransportLayer<'a> {
    net: &'a mut QuantumNetwork,
}

impl<'a> TransportLayer<'a> {
    pub(crate) fn new(net: &'a mut QuantumNetwork) -> Self {
        Self { net }
    }

    /// Check that `n` qubits can be sent from `src` to `dst` and record the
    /// admitted routes. Consumes nothing.
    ///
    /// `n` is capped at the number of qubits `src` holds. Returns the number
    /// of admitted transmissions.
    pub fn request_transmission(&mut self, src: HostId, dst: HostId, n: usize) -> NetResult<usize> {
        self.net.host(src)?;
        self.net.host(dst)?;

        let available = self.net.qubit_count(src);
        if available < n {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("host {src} holds {available} of {n} qubits, sending what it has"),
            );
        }
        let n = n.min(available);
        if n == 0 {
            return Err(NetError::exhausted(
                ResourceKind::Qubit,
                format!("host {src}"),
                1,
                0,
            ));
        }

        let routes = self
            .find_routes(src, dst, n)
            .ok_or(NetError::RouteUnavailable { src, dst })?;
        for route in routes {
            self.net.counters.transmissions.push(TransmissionRecord {
                route,
                src,
                dst,
                teleport: None,
            });
        }
        self.net.emit(
            Level::Info,
            TARGET,
            format!("transmission of {n} qubits from {src} to {dst} admitted"),
        );
        Ok(n)
    }

    /// Teleport the oldest qubit of `src` onto `dst`, consuming the newest
    /// qubit of `dst` and one pair per hop. Returns the final fidelity.
    pub fn teleportation_protocol(&mut self, src: HostId, dst: HostId) -> NetResult<f64> {
        self.net.host(src)?;
        self.net.host(dst)?;
        let route = self
            .net
            .network_layer()
            .short_route_valid(src, dst)
            .ok_or(NetError::RouteUnavailable { src, dst })?;
        let record = self.teleport_along(&route, PoolEnd::Newest)?;
        Ok(record.final_fidelity)
    }

    /// Send `n` qubits from `src` to `dst` by teleportation.
    ///
    /// Missing source qubits are created first, one timeslot each. Every
    /// successful teleportation also takes a timeslot. Succeeds only if all
    /// `n` teleportations succeed; returns `n`.
    pub fn run_transport_layer(&mut self, src: HostId, dst: HostId, n: usize) -> NetResult<usize> {
        self.net.host(src)?;
        self.net.host(dst)?;
        if n == 0 {
            return Ok(0);
        }

        let shortfall = n.saturating_sub(self.net.qubit_count(src));
        if shortfall > 0 {
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("creating {shortfall} qubits at host {src}"),
            );
        }
        for _ in 0..shortfall {
            self.net.physical().create_qubit(src)?;
            self.net.advance();
        }
        let available = self.net.qubit_count(src);
        if available < n {
            return Err(NetError::exhausted(
                ResourceKind::Qubit,
                format!("host {src}"),
                n,
                available,
            ));
        }

        let routes = self
            .find_routes(src, dst, n)
            .ok_or(NetError::RouteUnavailable { src, dst })?;

        let mut succeeded = 0;
        for route in &routes {
            match self.teleport_along(route, PoolEnd::Oldest) {
                Ok(_) => {
                    succeeded += 1;
                    self.net.advance();
                }
                Err(err) if err.is_structural() => return Err(err),
                Err(err) => {
                    self.net.emit(
                        Level::Debug,
                        TARGET,
                        format!("teleportation along {route:?} skipped: {err}"),
                    );
                }
            }
        }

        if succeeded == n {
            self.net.emit(
                Level::Info,
                TARGET,
                format!("transported {n} qubits from {src} to {dst}"),
            );
            Ok(n)
        } else {
            Err(NetError::failure(
                Protocol::Transport,
                format!("{succeeded} of {n} teleportations from {src} to {dst} succeeded"),
            ))
        }
    }

    /// Up to [`ROUTE_ROUNDS`] attempts at finding `n` valid routes.
    fn find_routes(&mut self, src: HostId, dst: HostId, n: usize) -> Option<Vec<Route>> {
        for round in 1..=ROUTE_ROUNDS {
            let routes: Vec<Route> = (0..n)
                .map_while(|_| self.net.network_layer().short_route_valid(src, dst))
                .collect();
            let stocked = routes.len() == n
                && routes.iter().all(|route| {
                    route
                        .windows(2)
                        .all(|hop| self.net.pair_count(hop[0], hop[1]) >= 1)
                });
            if stocked {
                return Some(routes);
            }
            self.net.emit(
                Level::Debug,
                TARGET,
                format!("round {round}: no {n} valid routes between {src} and {dst}"),
            );
        }
        None
    }

    /// Teleport along `route`, taking the source qubit from the oldest end
    /// and the destination qubit from `dst_end`. Nothing is consumed unless
    /// every input is present.
    fn teleport_along(&mut self, route: &[HostId], dst_end: PoolEnd) -> NetResult<TeleportRecord> {
        let (Some(&src), Some(&dst)) = (route.first(), route.last()) else {
            return Err(NetError::failure(Protocol::Teleportation, "empty route"));
        };
        if route.len() < 2 {
            return Err(NetError::failure(
                Protocol::Teleportation,
                format!("route {route:?} has no hop"),
            ));
        }
        for host in [src, dst] {
            if self.net.qubit_count(host) == 0 {
                return Err(NetError::exhausted(ResourceKind::Qubit, format!("host {host}"), 1, 0));
            }
        }

        let mut route_fidelities = Vec::new();
        for hop in route.windows(2) {
            let pairs = &self.net.channel(hop[0], hop[1])?.pairs;
            if pairs.is_empty() {
                return Err(NetError::exhausted(
                    ResourceKind::EntangledPair,
                    ChannelKey::new(hop[0], hop[1]).to_string(),
                    1,
                    0,
                ));
            }
            route_fidelities.extend(pairs.fidelities());
        }
        let fidelity_route = mean(&route_fidelities).unwrap_or(0.0);

        let src_qubit = self.net.host_mut(src)?.qubits.take_oldest();
        let dst_qubit = self.net.host_mut(dst)?.qubits.take(dst_end);
        let (Some(mut moved), Some(spent)) = (src_qubit, dst_qubit) else {
            return Err(NetError::exhausted(
                ResourceKind::Qubit,
                format!("host {src} or {dst}"),
                1,
                0,
            ));
        };

        let fidelity_src = moved.fidelity();
        let fidelity_dst = spent.fidelity();
        let final_fidelity = teleported_fidelity(fidelity_src, fidelity_dst, fidelity_route);
        moved.set_fidelity(final_fidelity);
        self.net.host_mut(dst)?.qubits.push(moved);

        for hop in route.windows(2) {
            self.net.channel_mut(hop[0], hop[1])?.pairs.take_newest();
        }

        let hops = route.len() - 1;
        let record = TeleportRecord {
            fidelity_src,
            fidelity_dst,
            fidelity_route,
            final_fidelity,
        };
        let counters = &mut self.net.counters;
        counters.transport_qubits_consumed += 2;
        counters.transport_pairs_consumed += hops;
        counters.transport_fidelities.push(final_fidelity);
        counters.route_lengths.push(hops);
        counters.transmissions.push(TransmissionRecord {
            route: route.to_vec(),
            src,
            dst,
            teleport: Some(record.clone()),
        });
        self.net.emit(
            Level::Info,
            TARGET,
            format!("teleported a qubit from {src} to {dst} with fidelity {final_fidelity:.4}"),
        );
        Ok(record)
    }
}
