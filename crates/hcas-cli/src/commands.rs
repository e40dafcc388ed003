use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use colored::Colorize;
use hcas_crypto::{ContentHasher, HashAlgorithm};
use hcas_server::{Backend, CasServer, ServerConfig};
use hcas_store::{CasService, InMemoryStore};
use hcas_sync::{
    set_label_checked, HttpConfig, HttpTransport, LocalTransport, RetryPolicy, SyncOptions,
    SyncReport, Synchronizer,
};
use serde::Serialize;
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Route(args) => cmd_route(args),
        Command::Sync(args) => cmd_sync(args, format),
        Command::SetLabel(args) => cmd_set_label(args, format),
        Command::Hash(args) => cmd_hash(args, format),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = server_config(&args)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let server = CasServer::new(config).context("failed to start server")?;
    println!(
        "{} Starting hcas on {} ({:?} backend, {})",
        "✓".green().bold(),
        server.config().bind_addr.to_string().bold(),
        server.config().backend,
        server.config().hash_algorithm
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_route(args: RouteArgs) -> anyhow::Result<()> {
    let mut config = server_config(&args.serve)?;
    if let Some(bind) = args.serve.bind {
        config.route.bind_addr = bind;
    }
    if !args.extractors.is_empty() {
        config.route.extractors = args.extractors;
    }
    if args.domain.is_some() {
        config.route.domain = args.domain;
    }

    let server = CasServer::new(config).context("failed to start router")?;
    println!(
        "{} Routing distribution files on {} ({:?})",
        "✓".green().bold(),
        server.config().route.bind_addr.to_string().bold(),
        server.config().route.extractors
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve_route())?;
    Ok(())
}

/// Configuration file plus the storage overrides shared by `serve` and `route`.
fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = &args.root {
        if args.sites_root.is_none() {
            config.storage.sites_root = root.join("sites");
        }
        config.storage.root = root.clone();
    }
    if let Some(sites_root) = &args.sites_root {
        config.storage.sites_root = sites_root.clone();
    }
    if args.memory {
        config.backend = Backend::Memory;
    }
    if let Some(algorithm) = args.algorithm {
        config.hash_algorithm = algorithm;
    }
    Ok(config)
}

fn cmd_sync(args: SyncArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = existing_dir(&args.path)?;
    let transport = HttpTransport::new(&HttpConfig {
        base_url: args.api_url.clone(),
        upload_timeout: Duration::from_millis(args.timeout_ms),
        manifest_timeout: Duration::from_millis(args.distro_timeout_ms),
        retry: RetryPolicy::new(args.request_retries),
    })?;
    let mut options = SyncOptions::new(&root).with_workers(args.workers);
    if let Some(label) = &args.label {
        options = options.with_label(label.clone());
    }
    info!(root = %root.display(), url = %args.api_url, workers = args.workers, "starting sync");

    let synchronizer = Synchronizer::new(Arc::new(transport), ContentHasher::new(args.algorithm), options);
    let report = synchronizer
        .run_with_retries(args.retries)
        .with_context(|| format!("failed to sync {} to {}", root.display(), args.api_url))?;
    print_report(&report, format)
}

fn cmd_set_label(args: SetLabelArgs, format: OutputFormat) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&HttpConfig {
        base_url: args.api_url.clone(),
        ..HttpConfig::default()
    })?;
    set_label_checked(&transport, &args.name, &args.hash, args.retries).with_context(|| {
        format!("distribution {} could not be set to label {}", args.hash, args.name)
    })?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "label": args.name,
            "hash": args.hash,
        })),
        OutputFormat::Text => {
            println!(
                "{} Label {} now points at {}",
                "✓".green().bold(),
                args.name.yellow(),
                args.hash.to_hex().cyan()
            );
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct HashOutput {
    path: String,
    kind: &'static str,
    algorithm: HashAlgorithm,
    hash: String,
}

/// Hash files directly; hash directories as the distribution a sync would
/// publish, without contacting a server.
fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hasher = ContentHasher::new(args.algorithm);
    let mut outputs = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let (kind, hash) = if path.is_dir() {
            let transport = LocalTransport::new(CasService::new(Arc::new(InMemoryStore::default()), hasher));
            let report = Synchronizer::new(Arc::new(transport), hasher, SyncOptions::new(path)).run()?;
            ("distro", report.distro.hash)
        } else {
            let hash = hasher
                .hash_file(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ("file", hash)
        };
        outputs.push(HashOutput {
            path: path.display().to_string(),
            kind,
            algorithm: args.algorithm,
            hash: hash.to_hex(),
        });
    }

    match format {
        OutputFormat::Json => print_json(&outputs),
        OutputFormat::Text => {
            for out in &outputs {
                println!("{}  {} {}", out.hash.cyan(), out.path, format!("({})", out.kind).dimmed());
            }
            Ok(())
        }
    }
}

fn print_report(report: &SyncReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }
    println!(
        "{} Synced {} files ({} uploaded, {} already stored) in {}ms",
        "✓".green().bold(),
        report.files.len().to_string().bold(),
        report.uploaded(),
        report.deduplicated(),
        report.duration_ms
    );
    println!("  Distro: {}", report.distro.hash.to_hex().cyan());
    if let Some(label) = &report.label {
        println!("  Label:  {} → {}", label.label.yellow(), label.hash.short_hex());
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn existing_dir(path: &Path) -> anyhow::Result<PathBuf> {
    if !path.exists() {
        bail!("folder {} does not exist", path.display());
    }
    ensure!(path.is_dir(), "{} is not a directory", path.display());
    path.canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_overrides_apply_to_storage() {
        let args = ServeArgs {
            config: None,
            bind: None,
            root: Some(PathBuf::from("/srv/cas")),
            sites_root: None,
            memory: true,
            algorithm: Some(HashAlgorithm::Blake3),
        };
        let config = server_config(&args).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/srv/cas"));
        assert_eq!(config.storage.sites_root, PathBuf::from("/srv/cas/sites"));
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
    }

    #[test]
    fn existing_dir_rejects_files_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "x").unwrap();
        assert!(existing_dir(dir.path()).is_ok());
        assert!(existing_dir(&file).is_err());
        assert!(existing_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn hash_of_directory_matches_sync_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/c.txt"), "world").unwrap();

        let hasher = ContentHasher::SHA256;
        let h1 = hasher.hash(b"hello");
        let h2 = hasher.hash(b"world");
        let expected = hasher.hash_pair(&hasher.hash_entry("a.txt", &h1), &hasher.hash_entry("b/c.txt", &h2));

        let args = HashArgs {
            paths: vec![dir.path().to_path_buf(), dir.path().join("a.txt")],
            algorithm: HashAlgorithm::Sha256,
        };
        assert!(cmd_hash(args, OutputFormat::Json).is_ok());

        let transport = LocalTransport::new(CasService::new(Arc::new(InMemoryStore::default()), hasher));
        let report = Synchronizer::new(Arc::new(transport), hasher, SyncOptions::new(dir.path()))
            .run()
            .unwrap();
        assert_eq!(report.distro.hash, expected);
    }
}
