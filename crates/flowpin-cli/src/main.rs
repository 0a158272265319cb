//! CLI for flowpin — schedule and execute task DAGs across the NUMA
//! topology.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "flowpin")]
#[command(about = "NUMA-aware workflow scheduler and executor")]
#[command(version = flowpin_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow: schedule, execute (or simulate), and write the report
    Run {
        /// Path to the JSON configuration document
        #[arg(long)]
        config: String,
    },

    /// Print the detected core / NUMA topology of this host
    Topo {
        /// Also read each core's live scaling frequency
        #[arg(long)]
        frequencies: bool,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run { config } => commands::run::run(&config),
        Commands::Topo { frequencies } => commands::topo::run(frequencies),
    };

    if let Err(err) = outcome {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
