use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::{config, FileStore, Metadata, OnnxSource, Recognizer};
use log::info;
use serde_json::json;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "Face identification with a liveness pre-filter")]
struct Cli {
    /// Config file (defaults to the built-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run only the liveness gate on an image
    Liveness { image: PathBuf },
    /// Enroll every face in an image under a label
    Enroll {
        #[arg(short, long)]
        label: String,
        image: PathBuf,
    },
    /// Identify the first face in an image
    Identify {
        /// Distance threshold (defaults to the configured tau)
        #[arg(short, long)]
        tau: Option<f32>,
        image: PathBuf,
    },
    /// Open config file in editor, creating it with defaults if missing
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Liveness { image } => {
            let bytes = read_image(&image)?;
            let report = cfg
                .liveness
                .evaluate(&image::load_from_memory(&bytes).context("decoding image")?);
            println!(
                "{}",
                json!({
                    "live": report.is_live(),
                    "bright_fraction": report.bright_fraction,
                    "laplacian_variance": report.laplacian_variance,
                })
            );
            Ok(())
        }
        Commands::Enroll { label, image } => {
            let recognizer = recognizer(&cfg)?;
            let bytes = read_image(&image)?;
            let mut metadata = Metadata::new();
            if let Some(name) = image.file_name() {
                metadata.insert("filename".to_string(), name.to_string_lossy().into_owned());
            }
            let enrolled = recognizer.enroll_with_metadata(&label, &bytes, &metadata)?;
            println!("{}", json!({ "enrolled": enrolled }));
            Ok(())
        }
        Commands::Identify { tau, image } => {
            let recognizer = recognizer(&cfg)?;
            let bytes = read_image(&image)?;
            let result = recognizer.identify(&bytes, tau.unwrap_or(cfg.matcher.tau))?;
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
        Commands::Config => open_config(config_path.unwrap_or(&config::CONFIG_PATH)),
    }
}

fn recognizer(cfg: &config::Config) -> Result<Recognizer<FileStore, OnnxSource>> {
    let store = FileStore::open(&cfg.store.path).context("Failed to open face store")?;
    let source = OnnxSource::from_config(&cfg.model)?;
    Ok(Recognizer::from_config(cfg, store, source))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading image {}", path.display()))
}

fn open_config(path: &Path) -> Result<()> {
    if !path.exists() {
        info!("Writing default config to {}", path.display());
        config::save_config(&config::Config::default(), Some(path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", path);

    let status = std::process::Command::new(editor)
        .arg(path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
