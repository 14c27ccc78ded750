use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use qnet_sim::config::{load_config, ConfigFile};
use qnet_sim::network::QuantumNetwork;
use qnet_sim::topology::{topology_label, TopologySpec};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Shape {
    Line,
    Ring,
    Grid,
}

#[derive(Debug, Parser)]
#[command(
    name = "qnet-sim",
    version,
    about = "Run E91 key distribution over a simulated quantum network"
)]
struct Cli {
    /// TOML file with `[simulation]` and optional `[topology]` tables.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Topology shape, ignored when the config file defines one.
    #[arg(long, value_enum, default_value_t = Shape::Line)]
    shape: Shape,
    /// Hosts for line and ring shapes.
    #[arg(long, default_value_t = 3)]
    hosts: usize,
    #[arg(long, default_value_t = 3)]
    rows: usize,
    #[arg(long, default_value_t = 3)]
    cols: usize,
    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Key length to establish.
    #[arg(long, default_value_t = 8)]
    bits: usize,
    #[arg(long, default_value_t = 0)]
    alice: usize,
    /// Defaults to the highest host id.
    #[arg(long)]
    bob: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let spec: TopologySpec = match file.topology {
        Some(section) => section.into(),
        None => match cli.shape {
            Shape::Line => TopologySpec::Line { hosts: cli.hosts },
            Shape::Ring => TopologySpec::Ring { hosts: cli.hosts },
            Shape::Grid => TopologySpec::Grid {
                rows: cli.rows,
                cols: cli.cols,
            },
        },
    };
    let topology = spec.build().context("building topology")?;
    let Some(last) = topology.hosts().last() else {
        bail!("topology has no hosts");
    };
    let bob = cli.bob.unwrap_or(last);

    let mut config = file.simulation;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    log::info!(
        "{} topology with {} hosts and {} channels",
        topology_label(&spec),
        topology.num_hosts(),
        topology.num_edges()
    );

    let mut net = QuantumNetwork::new(topology, config).context("bootstrapping network")?;
    let key = net
        .application()
        .qkd_e91_protocol(cli.alice, bob, cli.bits)
        .with_context(|| format!("E91 between {} and {bob}", cli.alice))?;

    let key_string: String = key.iter().map(|b| char::from(b'0' + b)).collect();
    println!("key ({} bits): {key_string}", key.len());

    let metrics = net.metrics();
    println!("timeslot:                 {}", metrics.timeslot);
    println!("qubits created:           {}", metrics.qubits_created);
    println!("qubits used:              {}", metrics.total_qubits_used);
    println!("pairs used:               {}", metrics.total_pairs_used);
    if let Some(f) = metrics.transport_avg_fidelity {
        println!("mean teleport fidelity:   {f:.4}");
    }
    if let Some(len) = metrics.avg_route_length {
        println!("mean route length (hops): {len:.2}");
    }

    Ok(())
}
