//! fantasee - immersive panoramic photo viewer, headless host.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use fantasee::backend::headless;
use fantasee::config::{ViewerConfig, DEFAULT_FILE_NAME, DEFAULT_PACKAGE_ID};
use fantasee::loader::ProjectionMode;
use fantasee::permission::PermissionPreset;
use fantasee::script::{self, ScriptedEvent};

#[derive(Parser, Debug)]
#[command(name = "fantasee", about = "Immersive panoramic photo viewer")]
struct Cli {
    /// Directory holding the bundled assets
    #[arg(long, default_value = "assets", env = "FANTASEE_ASSETS")]
    assets: PathBuf,

    /// Panorama asset named in the activation intent
    #[arg(long, default_value = DEFAULT_FILE_NAME)]
    file_name: String,

    /// Projection of the panorama: mono or stereo
    #[arg(long, default_value = "mono")]
    mode: String,

    /// Application package id (used for the settings deep link)
    #[arg(long, default_value = DEFAULT_PACKAGE_ID)]
    package_id: String,

    /// Host event script (one s-expression per line)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Simulated permission answer: granted, denied, or never-ask
    #[arg(long, default_value = "granted")]
    permission: String,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Event loop poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fantasee=info".into()),
        )
        .init();

    info!("fantasee v{} starting", env!("CARGO_PKG_VERSION"));

    let projection_mode = match ProjectionMode::from_str(&cli.mode) {
        Some(mode) => mode,
        None => {
            eprintln!("Unknown mode: {}. Use: mono or stereo", cli.mode);
            std::process::exit(1);
        }
    };
    let permission = match PermissionPreset::from_str(&cli.permission) {
        Some(p) => p,
        None => {
            eprintln!(
                "Unknown permission answer: {}. Use: granted, denied, or never-ask",
                cli.permission
            );
            std::process::exit(1);
        }
    };

    let config = ViewerConfig {
        package_id: cli.package_id,
        asset_root: cli.assets,
        file_name: cli.file_name,
        projection_mode,
        permission,
        poll_interval_ms: cli.poll_interval_ms,
        exit_after: cli.exit_after,
    };
    info!(
        assets = %config.asset_root.display(),
        mode = %config.projection_mode,
        "viewer configured"
    );

    let (events, auto_answer) = match &cli.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading host script {}", path.display()))?;
            let events = script::parse_script(&text)
                .with_context(|| format!("parsing host script {}", path.display()))?;
            (events, false)
        }
        None => (
            script::default_script(&config.file_name)
                .into_iter()
                .map(ScriptedEvent::from)
                .collect(),
            true,
        ),
    };

    let report = headless::run(config, events, auto_answer)?;
    println!("{}", report.status);

    if !report.order_ok {
        anyhow::bail!("native engine observed an invalid lifecycle call order");
    }
    Ok(())
}
