mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use imgrelay::config::{self, Config};
use imgrelay::context::AppContext;
use imgrelay::images::UploadRequest;
use imgrelay::maintenance::RunResult;
use imgrelay::remote::MemoryBackend;
use imgrelay::token::TokenCodec;
use imgrelay_core::ImageId;
use imgrelay_db::models::{ListQuery, RequestInfo};
use serde::Serialize;

fn build_context(config: Config, dry_remote: bool) -> Result<AppContext> {
    let ctx = if dry_remote {
        tracing::warn!("Using in-memory remote store; nothing is uploaded");
        let backend = MemoryBackend::new(config.remote.url.clone());
        AppContext::with_backend(config, Arc::new(backend))?
    } else {
        AppContext::init(config)?
    };
    Ok(ctx)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn start(ctx: AppContext) -> Result<()> {
    tracing::info!("Starting imgrelay maintenance scheduler");
    ctx.prepare().await?;
    ctx.scheduler.start();

    shutdown_signal().await;

    ctx.scheduler.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

async fn run_job(ctx: AppContext, name: &str) -> Result<()> {
    let result = ctx.scheduler.trigger(name).await?;
    print_json(&result)?;
    if let RunResult::Failed { error } = result {
        anyhow::bail!("Job {name} failed: {error}");
    }
    Ok(())
}

async fn upload(
    ctx: AppContext,
    file: &Path,
    mime: Option<String>,
    name: Option<String>,
) -> Result<()> {
    ctx.prepare().await?;
    let original_name = name
        .or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "upload".to_string());

    let uploaded = ctx
        .images
        .upload_image(UploadRequest {
            temp_path: file.to_path_buf(),
            original_name,
            mime_type: mime,
        })
        .await?;
    print_json(&uploaded)
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(path)?;
    match path {
        Some(p) => println!("Validating config: {:?}", p),
        None => println!("Validating default config locations"),
    }

    config.require_secrets()?;
    TokenCodec::from_config(&config.token)?;

    let warnings = config.validate();
    println!("✓ Configuration is valid");
    println!("  Database: {}", config.storage.db_path.display());
    println!("  Cache dir: {}", config.storage.cache_dir.display());
    println!("  Remote: {}{}", config.remote.url, config.remote.prefix);
    println!("  Maintenance enabled: {}", config.maintenance.enabled);
    for warning in &warnings {
        println!("  ! {warning}");
    }
    Ok(())
}

async fn dispatch(command: Commands, config: Config, dry_remote: bool) -> Result<()> {
    match command {
        Commands::Start => start(build_context(config, dry_remote)?).await,
        Commands::RunJob { name } => run_job(build_context(config, dry_remote)?, &name).await,
        Commands::Jobs => {
            let ctx = build_context(config, dry_remote)?;
            print_json(&ctx.scheduler.status())
        }
        Commands::Upload { file, mime, name } => {
            let mut config = config;
            // The operator's file is not a temp file.
            config.upload.remove_temp_file = false;
            upload(build_context(config, dry_remote)?, &file, mime, name).await
        }
        Commands::Get { token } => {
            let ctx = build_context(config, dry_remote)?;
            let view = ctx.images.get_image(&token, RequestInfo::default()).await?;
            print_json(&view)
        }
        Commands::Delete { id } => {
            let ctx = build_context(config, dry_remote)?;
            let changed = ctx.images.delete_image(id).await?;
            println!("Deleted image {id} (changed: {changed})");
            Ok(())
        }
        Commands::Purge { id } => purge(build_context(config, dry_remote)?, id).await,
        Commands::List {
            page,
            limit,
            sort,
            order,
            include_deleted,
        } => {
            let ctx = build_context(config, dry_remote)?;
            let mut query = ListQuery::from_params(page, limit, &sort, &order);
            query.include_deleted = include_deleted;
            print_json(&ctx.images.list_images(query).await?)
        }
        Commands::Check { id } => {
            let ctx = build_context(config, dry_remote)?;
            print_json(&ctx.images.check_remote(id).await?)
        }
        Commands::Validate { .. } | Commands::GenerateKeys | Commands::Version => Ok(()),
    }
}

async fn purge(ctx: AppContext, id: ImageId) -> Result<()> {
    if ctx.images.purge_image(id).await? {
        println!("Purged image {id}");
    } else {
        println!("Image {id} does not exist");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "imgrelay=trace,imgrelay_db=debug,reqwest=debug".to_string()
        } else {
            "imgrelay=info,imgrelay_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::GenerateKeys => {
            let (key, iv) = TokenCodec::generate_keys();
            println!("IMGRELAY_ENCRYPTION_KEY={key}");
            println!("IMGRELAY_ENCRYPTION_IV={iv}");
            Ok(())
        }
        Commands::Version => {
            println!("imgrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(dispatch(command, config, cli.dry_remote))
        }
    }
}
