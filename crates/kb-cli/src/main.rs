use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "kb",
    about = "kube-bundler — register, configure and ship application bundles",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to kb.toml
    #[arg(long, global = true, default_value = "kb.toml")]
    config: PathBuf,
    /// Namespace override (default: from kb.toml)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Register bundles and their dependencies.
    ///
    /// Bundles are given as `name` (latest) or `name:version` and fetched
    /// from --source-dir, or from the sources listed in kb.toml.
    Register {
        #[arg(required = true)]
        bundles: Vec<String>,
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },
    /// Read and edit install parameters
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Describe one install, or all of them
    Describe {
        install: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Manage HA sizing profiles
    Flavor {
        #[command(subcommand)]
        action: FlavorAction,
    },
    /// Build a bundle from an application document and store it
    Publish {
        /// Application document (YAML or JSON)
        app: PathBuf,
        /// Optional image tarball to embed
        #[arg(long)]
        images: Option<PathBuf>,
        #[arg(long)]
        source_dir: PathBuf,
    },
    /// Copy bundles between directory sources
    Copy {
        #[arg(required = true)]
        bundles: Vec<String>,
        #[arg(long)]
        from: PathBuf,
        #[arg(long)]
        to: PathBuf,
    },
    /// Manage manifests
    Manifest {
        #[command(subcommand)]
        action: ManifestAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one merged parameter
    Get { install: String, key: String },
    /// Override a parameter
    Set {
        install: String,
        key: String,
        value: String,
    },
    /// Drop a parameter override
    Remove { install: String, key: String },
    /// Print every merged parameter
    List { install: String },
}

#[derive(Subcommand)]
enum FlavorAction {
    /// Create a flavor unless one with the same name exists
    Create {
        name: String,
        #[arg(long, default_value = "1")]
        quorum_replicas: u32,
        #[arg(long, default_value = "1")]
        replication_replicas: u32,
        #[arg(long, default_value = "1")]
        stateless_replicas: u32,
        /// required or optional
        #[arg(long, default_value = "optional")]
        anti_affinity: String,
        #[arg(long, default_value = "1")]
        minimum_nodes: u32,
    },
    Get { name: String },
    List,
}

#[derive(Subcommand)]
enum ManifestAction {
    /// Store a manifest document
    Apply { file: PathBuf },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive("kb=info".parse()?);
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        config,
        namespace,
        log_format,
        command,
    } = Cli::parse();
    init_tracing(log_format)?;

    // publish and copy work on directories only; everything else needs the store
    let open = || commands::Context::open(&config, namespace.clone());

    match command {
        Commands::Register { bundles, source_dir } => {
            let ctx = open()?;
            commands::register::register(&ctx, &bundles, source_dir.as_deref()).await
        }
        Commands::Config { action } => {
            let ctx = open()?;
            match action {
                ConfigAction::Get { install, key } => commands::config::get(&ctx, &install, &key).await,
                ConfigAction::Set {
                    install,
                    key,
                    value,
                } => commands::config::set(&ctx, &install, &key, &value).await,
                ConfigAction::Remove { install, key } => {
                    commands::config::remove(&ctx, &install, &key).await
                }
                ConfigAction::List { install } => commands::config::list(&ctx, &install).await,
            }
        }
        Commands::Describe { install, format } => {
            let ctx = open()?;
            commands::config::describe(&ctx, install.as_deref(), &format).await
        }
        Commands::Flavor { action } => {
            let ctx = open()?;
            match action {
                FlavorAction::Create {
                    name,
                    quorum_replicas,
                    replication_replicas,
                    stateless_replicas,
                    anti_affinity,
                    minimum_nodes,
                } => {
                    let flavor = commands::flavor::build(
                        &name,
                        quorum_replicas,
                        replication_replicas,
                        stateless_replicas,
                        &anti_affinity,
                        minimum_nodes,
                    )?;
                    commands::flavor::create(&ctx, &flavor).await
                }
                FlavorAction::Get { name } => commands::flavor::get(&ctx, &name).await,
                FlavorAction::List => commands::flavor::list(&ctx).await,
            }
        }
        Commands::Publish {
            app,
            images,
            source_dir,
        } => commands::bundle::publish(&app, images.as_deref(), &source_dir).await,
        Commands::Copy { bundles, from, to } => commands::bundle::copy(&bundles, &from, &to).await,
        Commands::Manifest { action } => match action {
            ManifestAction::Apply { file } => commands::manifest::apply(&open()?, &file).await,
        },
    }
}
