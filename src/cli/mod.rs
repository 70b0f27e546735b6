//! Command-line interface for conductor.
//!
//! Provides a `run` command driving the built-in demo pipeline and a
//! `config` command printing the resolved run configuration. Flags override
//! fields of an optional YAML config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RunConfig;
use crate::core::{Orchestrator, RunError};
use crate::domain::RunStatistics;

pub mod demo;

/// conductor - deterministic batch event-pipeline engine
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the built-in demo pipeline
    Run {
        /// YAML run configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of events to process
        #[arg(short, long)]
        events: Option<u64>,

        /// Worker count (-1 for hardware concurrency)
        #[arg(short, long)]
        threads: Option<i64>,

        /// Global random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Output directory for the CSV sink and run summary
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Enable diagnostic floating-point-exception tracking
        #[arg(long)]
        track_fpes: bool,
    },

    /// Show the resolved run configuration
    Config {
        /// YAML run configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Resolve the effective configuration: file (if given), then flag
    /// overrides on top.
    pub fn resolved_config(&self) -> Result<RunConfig> {
        let path = match &self.command {
            Commands::Run { config, .. } | Commands::Config { config } => config.as_ref(),
        };

        let mut resolved = match path {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        if let Commands::Run {
            events,
            threads,
            seed,
            output_dir,
            track_fpes,
            ..
        } = &self.command
        {
            if let Some(events) = events {
                resolved.events = Some(*events);
            }
            if let Some(threads) = threads {
                resolved.threads = *threads;
            }
            if let Some(seed) = seed {
                resolved.seed = *seed;
            }
            if let Some(output_dir) = output_dir {
                resolved.output_dir = Some(output_dir.clone());
            }
            if *track_fpes {
                resolved.track_fpes = true;
            }
        }

        Ok(resolved)
    }

    /// Execute the parsed command against the resolved configuration.
    pub async fn execute(self, config: RunConfig) -> Result<()> {
        match self.command {
            Commands::Run { .. } => run_demo(config).await,
            Commands::Config { .. } => {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to render configuration")?;
                print!("{yaml}");
                Ok(())
            }
        }
    }
}

/// Wire and run the demo pipeline.
async fn run_demo(mut config: RunConfig) -> Result<()> {
    // The demo bounds itself; an unset count would otherwise run the
    // reader's full capacity.
    if config.events.is_none() {
        config.events = Some(10);
    }

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("conductor-out"));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    config.output_dir = Some(output_dir.clone());

    let pipeline = demo::build(&config, &output_dir.join("means.csv")).await?;
    let orchestrator = Orchestrator::new(config);

    match orchestrator.run(pipeline).await {
        Ok(statistics) => {
            print_summary(&statistics);
            Ok(())
        }
        Err(RunError::Fatal {
            event,
            stage,
            statistics,
            source,
        }) => {
            print_summary(&statistics);
            Err(source.context(format!("fatal error in stage '{stage}' on event {event}")))
        }
        Err(err) => Err(err.into()),
    }
}

fn print_summary(statistics: &RunStatistics) {
    println!("run        {}", statistics.run_id);
    println!(
        "events     {} attempted, {} succeeded, {} failed (planned {})",
        statistics.events_attempted,
        statistics.events_succeeded,
        statistics.events_failed,
        statistics.events_planned,
    );
    println!(
        "wall time  {} ms ({:.1} events/s)",
        statistics.wall_time_ms,
        statistics.events_per_second(),
    );
    if !statistics.failed_events.is_empty() {
        println!("failed     {:?}", statistics.failed_events);
    }
}
