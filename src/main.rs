use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use force_layout::adaptive::{self, ModePreference, PerformanceThresholds};
use force_layout::events::SimulationEvent;
use force_layout::gpu::GpuContext;
use force_layout::graph::{GraphFile, LayoutOutput};
use force_layout::{Simulation, SimulationConfig};

/// Adaptive force-directed graph layout on CPU or GPU.
#[derive(Parser)]
#[command(name = "force-layout")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Auto,
    Cpu,
    Gpu,
}

impl From<ModeArg> for ModePreference {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => ModePreference::Auto,
            ModeArg::Cpu => ModePreference::Cpu,
            ModeArg::Gpu => ModePreference::Gpu,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a graph and write node positions
    Layout {
        /// Input graph file (.json)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for positions (.json)
        #[arg(short, long, default_value = "layout.json")]
        output: PathBuf,

        /// Simulation config (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Backend to start on; overrides the config
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Run exactly this many steps instead of cooling to convergence
        #[arg(short, long)]
        ticks: Option<usize>,
    },
    /// Print the recommended backend for a graph
    Recommend {
        /// Input graph file (.json)
        #[arg(short, long)]
        input: PathBuf,

        /// Skip the GPU probe and assume no adapter is present
        #[arg(long)]
        no_gpu: bool,
    },
    /// Write a random graph for benchmarking
    Generate {
        /// Number of nodes
        #[arg(short, long, default_value = "1000")]
        nodes: usize,

        /// Number of links
        #[arg(short, long, default_value = "2000")]
        links: usize,

        /// Random seed
        #[arg(short, long, default_value = "1")]
        seed: u32,

        /// Output graph file (.json)
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

async fn layout(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    mode: Option<ModeArg>,
    ticks: Option<usize>,
) -> anyhow::Result<()> {
    let graph = GraphFile::load(input)
        .with_context(|| format!("failed to read graph {}", input.display()))?;
    let mut config = match config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(mode) = mode {
        config.adaptive.mode = mode.into();
    }
    // No display to pace against
    config.adaptive.frame_interval_ms = 0;
    config.forces = config.forces_or_default();

    let (nodes, links) = graph.to_simulation()?;
    let mut sim = Simulation::from_config(nodes, &links, &config)?;

    let steps = match ticks {
        Some(n) => {
            sim.tick(n).await?;
            n
        }
        None => {
            let counter = Arc::new(AtomicUsize::new(0));
            let count = Arc::clone(&counter);
            sim.on(
                "tick.cli",
                Some(Box::new(move |_: &SimulationEvent| {
                    count.fetch_add(1, Ordering::Relaxed);
                })),
            )?;
            sim.run().await?;
            counter.load(Ordering::Relaxed)
        }
    };

    let result = LayoutOutput::new(&graph, sim.nodes(), sim.mode(), sim.alpha(), steps);
    std::fs::write(output, serde_json::to_string_pretty(&result)?)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Laid out {} nodes in {} steps on {} (alpha {:.4}) -> {}",
        result.nodes.len(),
        steps,
        result.mode,
        result.alpha,
        output.display()
    );
    sim.destroy();
    Ok(())
}

fn recommend(input: &Path, no_gpu: bool) -> anyhow::Result<()> {
    let graph = GraphFile::load(input)
        .with_context(|| format!("failed to read graph {}", input.display()))?;
    let gpu_available = !no_gpu && GpuContext::request_blocking().is_ok();
    let recommendation = adaptive::recommend_mode(
        graph.nodes.len(),
        graph.links.len(),
        gpu_available,
        &PerformanceThresholds::default(),
    );
    println!("{}: {}", recommendation.mode, recommendation.reason);
    Ok(())
}

fn generate(nodes: usize, links: usize, seed: u32, output: &Path) -> anyhow::Result<()> {
    let graph = GraphFile::generate_random(nodes, links, seed);
    graph
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Generated graph with {} nodes and {} links in {}",
        graph.nodes.len(),
        graph.links.len(),
        output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Layout {
            input,
            output,
            config,
            mode,
            ticks,
        } => {
            layout(&input, &output, config.as_deref(), mode, ticks).await?;
        }
        Commands::Recommend { input, no_gpu } => {
            recommend(&input, no_gpu)?;
        }
        Commands::Generate {
            nodes,
            links,
            seed,
            output,
        } => {
            generate(nodes, links, seed, &output)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_layout_with_defaults() {
        let cli = Cli::try_parse_from(["force-layout", "layout", "--input", "g.json"]).unwrap();
        match cli.command {
            Commands::Layout {
                input,
                output,
                config,
                mode,
                ticks,
            } => {
                assert_eq!(input, PathBuf::from("g.json"));
                assert_eq!(output, PathBuf::from("layout.json"));
                assert!(config.is_none());
                assert!(mode.is_none());
                assert!(ticks.is_none());
            }
            _ => panic!("Expected Layout command"),
        }
    }

    #[test]
    fn cli_parses_layout_mode_and_ticks() {
        let cli = Cli::try_parse_from([
            "force-layout", "layout", "-i", "g.json", "--mode", "gpu", "--ticks", "50",
        ])
        .unwrap();
        match cli.command {
            Commands::Layout { mode, ticks, .. } => {
                assert_eq!(mode, Some(ModeArg::Gpu));
                assert_eq!(ticks, Some(50));
                assert_eq!(ModePreference::from(ModeArg::Gpu), ModePreference::Gpu);
            }
            _ => panic!("Expected Layout command"),
        }
    }

    #[test]
    fn cli_parses_generate_defaults() {
        let cli = Cli::try_parse_from(["force-layout", "generate"]).unwrap();
        match cli.command {
            Commands::Generate {
                nodes,
                links,
                seed,
                output,
            } => {
                assert_eq!((nodes, links, seed), (1000, 2000, 1));
                assert_eq!(output, PathBuf::from("graph.json"));
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_mode() {
        assert!(
            Cli::try_parse_from(["force-layout", "layout", "-i", "g.json", "-m", "tpu"]).is_err()
        );
    }
}
