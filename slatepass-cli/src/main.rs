use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use slatepass_core::codec::{compress_schema, decompress_schema, parse_schema, ParamRecord};
use slatepass_core::crypto::{derive_from_params, random_from_params, MasterSecret};
use slatepass_core::storage::{BlobStore, FileStore, Reconciler};
use slatepass_core::{RecordParams, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SlatePass CLI - deterministic passwords from a master secret
#[derive(Parser)]
#[command(name = "slatepass")]
#[command(about = "Deterministic password generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a password from the master secret and a salt
    Derive {
        /// Salt, usually the site name
        #[arg(long, default_value = "")]
        salt: String,

        /// Record version; negative versions use the legacy scheme
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        version: i32,

        #[command(flatten)]
        charset: CharsetArgs,
    },

    /// Generate a random password
    Random {
        #[command(flatten)]
        charset: CharsetArgs,
    },

    /// Decode a packed parameter record
    Inspect {
        /// Packed record (`schema|payload`)
        packed: String,
    },

    /// Compress or decompress a schema
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Load both stores and run one reconciliation pass
    Sync {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// Compress a description such as `bit,bool,s12,timestamp`
    Compress { description: String },
    /// Decompress base64 schema text
    Decompress { encoded: String },
}

#[derive(Args)]
struct CharsetArgs {
    /// Password length
    #[arg(short, long, default_value_t = 40)]
    length: i32,

    /// Leave out digits
    #[arg(long)]
    no_numbers: bool,

    /// Leave out upper-case letters
    #[arg(long)]
    no_uppercase: bool,

    /// Leave out lower-case letters
    #[arg(long)]
    no_lowercase: bool,

    /// Leave out symbols
    #[arg(long)]
    no_symbols: bool,

    /// Symbol alphabet
    #[arg(long)]
    symbols: Option<String>,
}

impl CharsetArgs {
    fn apply(self, params: &mut RecordParams) {
        params.pw_length = self.length;
        params.numbers_checked = !self.no_numbers;
        params.uppercase_checked = !self.no_uppercase;
        params.lowercase_checked = !self.no_lowercase;
        params.symbols_checked = !self.no_symbols;
        if let Some(symbols) = self.symbols {
            params.symbols = symbols;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Derive {
            salt,
            version,
            charset,
        } => {
            let mut params = RecordParams::defaults_at(0);
            params.salt = salt;
            params.version = version;
            charset.apply(&mut params);

            let secret = MasterSecret::from(rpassword::prompt_password("Master secret: ")?);
            let derived = derive_from_params(secret.expose(), &params)?;
            eprintln!("Fingerprint: {}", derived.fingerprint);
            println!("{}", derived.password);
        }
        Commands::Random { charset } => {
            let mut params = RecordParams::defaults_at(0);
            charset.apply(&mut params);
            println!("{}", random_from_params(&params)?.password);
        }
        Commands::Inspect { packed } => {
            let record = ParamRecord::from_packed(packed.trim())
                .context("Failed to decode packed record")?;
            println!("{}", serde_json::to_string_pretty(record.params())?);
        }
        Commands::Schema { action } => match action {
            SchemaAction::Compress { description } => {
                println!("{}", compress_schema(&parse_schema(&description)?)?);
            }
            SchemaAction::Decompress { encoded } => {
                let names: Vec<String> = decompress_schema(encoded.trim())?
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("{}", names.join(","));
            }
        },
        Commands::Sync { config } => {
            let config = ServiceConfig::load_or_default(config.as_deref())?;
            info!(
                "Syncing {} with {}",
                config.local_store.display(),
                config.remote_store.display()
            );

            let local: Arc<dyn BlobStore> = Arc::new(FileStore::new(&config.local_store));
            let remote: Arc<dyn BlobStore> = Arc::new(FileStore::new(&config.remote_store));
            let (mut reconciler, report) = Reconciler::load(local, remote)?;
            info!("Load resolution: {:?}", report.resolution);

            let outcome = reconciler.sync_pass();
            println!("{}", serde_json::to_string(&outcome)?);
        }
    }

    Ok(())
}
