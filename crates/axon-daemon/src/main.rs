//! Axon Daemon - Main entry point
//!
//! Loads a robot config, builds the robot with the fake drivers and keeps it
//! running until interrupted.

use anyhow::{Context, Result};
use axon_core::Config;
use axon_robot::{FakeConnector, FakeFactory, LocalRobot, Robot};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "axon")]
#[command(about = "Robot runtime with hot reconfiguration")]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "axon.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the config, print the component build order and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Axon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.ensure(false)?;

    info!(
        remotes = config.remotes.len(),
        boards = config.boards.len(),
        components = config.components.len(),
        processes = config.processes.len(),
        "Configuration loaded"
    );

    if args.check {
        println!("Configuration is valid. Build order:");
        for board in &config.boards {
            println!("  - {} (board)", board.name);
        }
        for component in &config.components {
            if component.depends_on.is_empty() {
                println!("  - {} ({})", component.name, component.r#type);
            } else {
                println!(
                    "  - {} ({}) after {}",
                    component.name,
                    component.r#type,
                    component.depends_on.join(", ")
                );
            }
        }
        return Ok(());
    }

    let robot = LocalRobot::new(
        config,
        Arc::new(FakeFactory::new()),
        Arc::new(FakeConnector::new()),
    )
    .await?;
    log_parts(&robot);

    info!("Running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    robot.close().await?;
    Ok(())
}

fn log_parts(robot: &LocalRobot) {
    let kinds = [
        ("remotes", robot.remote_names()),
        ("boards", robot.board_names()),
        ("arms", robot.arm_names()),
        ("bases", robot.base_names()),
        ("grippers", robot.gripper_names()),
        ("cameras", robot.camera_names()),
        ("lidars", robot.lidar_names()),
        ("sensors", robot.sensor_names()),
        ("providers", robot.provider_names()),
        ("functions", robot.function_names()),
    ];
    for (kind, names) in kinds {
        if !names.is_empty() {
            info!(kind, names = %names.join(", "), "Robot parts");
        }
    }
}
