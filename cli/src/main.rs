// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// This is the main entry point for the Entanglement CLI application.
///
/// The application stores files in a filesystem block store and entangles them, reads back
/// entanglement metadata and shows how a stored file is flattened.
/// It uses the `clap` crate for command-line argument parsing and `stderrlog` for logging.
use clap::{Args, Parser, Subcommand};
use stderrlog::Timestamp;

use entangler::{Client, Config, Event};
use storage::dag::{DagConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS};
use storage::fs::FsStorage;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of the block store.
    #[arg(long, env)]
    store_path: Option<String>,

    /// Number of parity chains per file. 0 stores files without entangling them.
    #[arg(long, default_value_t = Config::default().alpha)]
    alpha: u8,

    /// Lattice height.
    #[arg(short, default_value_t = Config::default().s)]
    s: u8,

    /// Helical period of the lattice.
    #[arg(short, default_value_t = Config::default().p)]
    p: u8,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_LINKS)]
    max_links: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    Upload(UploadArgs),
    Metadata(CidArgs),
    Flatten(CidArgs),
}

impl Cli {
    fn store_path(&self) -> Result<&str, ConfigError> {
        self.store_path.as_deref().ok_or(ConfigError::MissingConfig)
    }

    fn entanglement_config(&self) -> Result<Config, entangler::Error> {
        let config = Config::new(self.alpha, self.s, self.p);
        config.validate()?;
        Ok(config)
    }

    fn dag_config(&self) -> Result<DagConfig, storage::Error> {
        let config = DagConfig::new(self.chunk_size, self.max_links);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
struct UploadArgs {
    #[arg(short, long)]
    file: String,
}

#[derive(Args)]
struct CidArgs {
    #[arg(long)]
    cid: String,
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("Missing storage configuration: set --store-path or STORE_PATH")]
    MissingConfig,
}

fn format_sequence(pre_order: &[usize]) -> String {
    pre_order
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    stderrlog::new()
        .module(module_path!())
        .module("merkle_entangler")
        .module("merkle_entangler_storage")
        .quiet(cli.quiet)
        .verbosity(cli.verbose as usize + 1)
        .timestamp(Timestamp::Millisecond)
        .init()?;

    let config = cli.entanglement_config()?;
    let storage = FsStorage::with_config(cli.store_path()?, cli.dag_config()?).await?;
    let mut client = Client::new(storage, config)?;

    match cli.command {
        Commands::Upload(ref args) => {
            if cli.verbose > 0 {
                client = client.with_progress(|event| {
                    if let Event::TreeFlattened { pre_order, .. } = event {
                        println!("flattened: {}", format_sequence(pre_order));
                    }
                });
            }
            let bytes = tokio::fs::read(&args.file).await?;
            let result = client.upload(bytes).await?;
            match result.metadata_cid {
                Some(meta) => println!("uploaded file. Cid: {}, Meta: {}", result.root_cid, meta),
                None => println!("uploaded file. Cid: {}", result.root_cid),
            }
        }
        Commands::Metadata(ref args) => {
            let metadata = client.download_metadata(&args.cid).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Commands::Flatten(ref args) => {
            let (tree, sequence) = client.flatten_file(&args.cid).await?;
            let pre_order = sequence
                .iter()
                .map(|id| tree.node(id).map(|node| node.pre_order_idx()))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", format_sequence(&pre_order));
            log::info!("{} nodes, {} swaps", sequence.len(), sequence.swaps().len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "entanglement",
            "--store-path",
            "/tmp/x",
            "metadata",
            "--cid",
            "c",
        ])
        .unwrap();
        assert_eq!(cli.entanglement_config().unwrap(), Config::default());
        assert_eq!(cli.dag_config().unwrap(), DagConfig::default());
        assert_eq!(cli.store_path().unwrap(), "/tmp/x");
        assert!(matches!(cli.command, Commands::Metadata(ref args) if args.cid == "c"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "entanglement",
            "--store-path",
            "/tmp/x",
            "--alpha",
            "2",
            "-s",
            "3",
            "-p",
            "4",
            "--chunk-size",
            "256",
            "--max-links",
            "8",
            "-vv",
            "upload",
            "--file",
            "data.bin",
        ])
        .unwrap();
        assert_eq!(cli.entanglement_config().unwrap(), Config::new(2, 3, 4));
        assert_eq!(cli.dag_config().unwrap(), DagConfig::new(256, 8));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Upload(ref args) if args.file == "data.bin"));
    }

    #[test]
    fn test_invalid_config() {
        let cli =
            Cli::try_parse_from(["entanglement", "--alpha", "4", "flatten", "--cid", "c"]).unwrap();
        assert!(matches!(
            cli.entanglement_config(),
            Err(entangler::Error::TooManyStrands(4, _))
        ));

        let args = ["entanglement", "--max-links", "1", "flatten", "--cid", "c"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.dag_config().is_err());
    }

    #[test]
    fn test_format_sequence() {
        assert_eq!(format_sequence(&[0, 3, 1]), "0 3 1");
        assert_eq!(format_sequence(&[]), "");
    }
}
