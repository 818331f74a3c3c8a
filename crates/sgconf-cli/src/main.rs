//! sgconf: command-line front end for the sgconf config engine
//!
//! Commands:
//!   show                       - print the stored config
//!   auth <url> --require ...   - resolve tokens for a host
//!   hash <file>                - tagged digest of a file (key hashes)
//!   merge <patch.json>...      - apply config patches to the stored config
//!   export <path>              - write the config, optionally password-encrypted
//!   import <source>            - load a config from a file or URL into storage
//!   prune                      - re-verify trusted keys against their links

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

use sgconf_core::settings::EngineSettings;
use sgconf_core::{
    export_config_to_file, is_update_empty, load_config, load_config_sync, merge_updates,
    prune_old_trusted_keys, resolve_auth_info, save_config, update_config, AuthQuery, Config,
    ConfigInput, ConfigSource, FileStorage, HttpTransport, LoadOptions, PruneRequest,
};
use sgconf_crypto::{hash_tagged, HashAlgorithm};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sgconf",
    version,
    about = "Client-side config store for secret graph hosts",
    long_about = "sgconf: inspect, merge, export and verify an encrypted secret graph client config"
)]
struct Cli {
    /// Path to sgconf.toml settings file
    #[arg(long, short = 's', env = "SGCONF_SETTINGS")]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings)
    #[arg(long, env = "SGCONF_LOG")]
    log: Option<String>,

    /// Log format: text or json (overrides settings)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the stored config as JSON
    Show,

    /// List the tokens a host accepts for the given actions
    Auth {
        /// Host URL (a key of the config's hosts)
        url: String,
        /// Required actions, e.g. view, update, manage
        #[arg(long, short = 'r', required = true)]
        require: Vec<String>,
        /// Restrict to these clusters
        #[arg(long)]
        cluster: Vec<String>,
        /// Restrict to these contents (takes precedence over --cluster)
        #[arg(long)]
        content: Vec<String>,
        /// Skip these clusters
        #[arg(long)]
        exclude_cluster: Vec<String>,
    },

    /// Print the tagged digest of a file
    Hash {
        file: PathBuf,
        /// sha256, sha384 or sha512 (default: settings crypto.hash_algorithm)
        #[arg(long, short = 'a')]
        algorithm: Option<String>,
    },

    /// Apply JSON patches to the stored config, in order
    Merge {
        #[arg(required = true)]
        patches: Vec<PathBuf>,
        /// Show the change count without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Export the stored config to a file
    Export {
        path: PathBuf,
        /// Encrypt the export; prompts for a password
        #[arg(long)]
        encrypt: bool,
    },

    /// Load a config from an export file or URL and store it
    Import {
        /// File path or http(s) URL (URL credentials go in the query string)
        source: String,
        /// Prompt for a password to unlock encrypted exports and pre-keys
        #[arg(long)]
        password: bool,
    },

    /// Re-check trusted keys and drop links that no longer vouch for them
    Prune {
        /// Only these key hashes
        #[arg(long)]
        key: Vec<String>,
        /// Check every key, not only stale ones
        #[arg(long)]
        all: bool,
        /// Require link content to hash to the key hash
        #[arg(long)]
        validate_hash: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = EngineSettings::load_or_default(cli.settings.as_deref())
        .context("loading settings")?;

    let level = cli.log.as_deref().unwrap_or(&settings.log.level);
    let format = cli.log_format.as_deref().unwrap_or(&settings.log.format);
    init_logging(level, format);

    let storage = FileStorage::new(expand_tilde(&settings.storage.dir));

    match cli.command {
        Commands::Show => cmd_show(&settings, &storage),
        Commands::Auth { url, require, cluster, content, exclude_cluster } => {
            cmd_auth(&settings, &storage, url, require, cluster, content, exclude_cluster)
        }
        Commands::Hash { file, algorithm } => cmd_hash(&settings, &file, algorithm.as_deref()),
        Commands::Merge { patches, dry_run } => cmd_merge(&settings, &storage, &patches, dry_run),
        Commands::Export { path, encrypt } => cmd_export(&settings, &storage, &path, encrypt).await,
        Commands::Import { source, password } => {
            cmd_import(&settings, &storage, &source, password).await
        }
        Commands::Prune { key, all, validate_hash } => {
            cmd_prune(&settings, &storage, key, all, validate_hash).await
        }
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // logs go to stderr so command output stays pipeable
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config access ─────────────────────────────────────────────────────────────

fn stored_config(settings: &EngineSettings, storage: &FileStorage) -> Result<Config> {
    let (config, migrated) = load_config_sync(storage, &settings.storage.key, None)
        .with_context(|| format!("reading config from {}", storage.dir().display()))?;
    let config = config.with_context(|| {
        format!(
            "no usable config under {}; import one with `sgconf import`",
            storage.dir().display()
        )
    })?;
    if migrated {
        save_config(storage, &settings.storage.key, &config).context("saving migrated config")?;
    }
    Ok(config)
}

/// Apply `patch` and persist when anything changed. Returns the change count.
fn apply_and_save(
    settings: &EngineSettings,
    storage: &FileStorage,
    config: &Config,
    patch: &ConfigInput,
) -> Result<usize> {
    if is_update_empty(patch) {
        return Ok(0);
    }
    let (updated, changes) = update_config(config, patch).context("applying config patch")?;
    if changes > 0 {
        save_config(storage, &settings.storage.key, &updated).context("saving config")?;
    }
    Ok(changes)
}

fn prompt_password(prompt: &str) -> Result<SecretString> {
    let password = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(password))
}

// ── `sgconf show` / `sgconf auth` ─────────────────────────────────────────────

fn cmd_show(settings: &EngineSettings, storage: &FileStorage) -> Result<()> {
    let config = stored_config(settings, storage)?;
    let rendered = serde_json::to_string_pretty(&config).context("serializing config")?;
    println!("{rendered}");
    Ok(())
}

fn cmd_auth(
    settings: &EngineSettings,
    storage: &FileStorage,
    url: String,
    require: Vec<String>,
    clusters: Vec<String>,
    contents: Vec<String>,
    exclude_clusters: Vec<String>,
) -> Result<()> {
    let config = stored_config(settings, storage)?;
    let mut query = AuthQuery::new(url, require)
        .exclude_clusters(exclude_clusters)
        .limit(settings.auth.limit);
    if !clusters.is_empty() {
        query = query.clusters(clusters);
    }
    if !contents.is_empty() {
        query = query.contents(contents);
    }
    let info = resolve_auth_info(&config, &query);
    println!(
        "{}",
        serde_json::to_string_pretty(&info).context("serializing auth info")?
    );
    Ok(())
}

// ── `sgconf hash` ─────────────────────────────────────────────────────────────

fn cmd_hash(settings: &EngineSettings, file: &Path, algorithm: Option<&str>) -> Result<()> {
    let algorithm = match algorithm {
        Some(name) => HashAlgorithm::from_name(name)?,
        None => settings.crypto.hash_algorithm,
    };
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    println!("{}", hash_tagged(&data, algorithm));
    Ok(())
}

// ── `sgconf merge` ────────────────────────────────────────────────────────────

fn cmd_merge(
    settings: &EngineSettings,
    storage: &FileStorage,
    paths: &[PathBuf],
    dry_run: bool,
) -> Result<()> {
    let patches = paths
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<ConfigInput>(&text)
                .with_context(|| format!("parsing patch {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let patch = merge_updates(&patches);

    let config = stored_config(settings, storage)?;
    if dry_run {
        let (_, changes) = update_config(&config, &patch).context("applying config patch")?;
        println!("{changes} change(s) (dry run)");
        return Ok(());
    }
    let changes = apply_and_save(settings, storage, &config, &patch)?;
    println!("{changes} change(s)");
    Ok(())
}

// ── `sgconf export` / `sgconf import` ─────────────────────────────────────────

async fn cmd_export(
    settings: &EngineSettings,
    storage: &FileStorage,
    path: &Path,
    encrypt: bool,
) -> Result<()> {
    let config = stored_config(settings, storage)?;
    let passwords = if encrypt {
        let password = prompt_password("Export password: ")?;
        let confirm = prompt_password("Confirm password: ")?;
        if password.expose_secret() != confirm.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
        vec![password]
    } else {
        Vec::new()
    };

    let written = export_config_to_file(
        &config,
        &passwords,
        settings.crypto.pbkdf2_iterations,
        settings.crypto.hash_algorithm,
        path,
    )
    .await
    .with_context(|| format!("exporting to {}", path.display()))?;
    println!("exported: {}", written.display());
    Ok(())
}

async fn cmd_import(
    settings: &EngineSettings,
    storage: &FileStorage,
    source: &str,
    ask_password: bool,
) -> Result<()> {
    let passwords = if ask_password {
        vec![prompt_password("Password: ")?]
    } else {
        Vec::new()
    };
    let transport = HttpTransport::new(&settings.http)?;
    let mut options = LoadOptions::new(&passwords);
    options.hash = settings.crypto.hash_algorithm;

    info!(source, "importing config");
    let source = if source.starts_with("http://") || source.starts_with("https://") {
        ConfigSource::RemoteUrl(source.to_string())
    } else {
        ConfigSource::File(PathBuf::from(source))
    };
    let (config, _) = load_config(source, &options, &transport)
        .await
        .context("loading config")?;
    let config = config.context("could not load a config with the given credentials")?;

    save_config(storage, &settings.storage.key, &config).context("saving config")?;
    println!(
        "imported config for {} ({} host(s), {} token(s))",
        config.base_url(),
        config.hosts().len(),
        config.tokens().len()
    );
    Ok(())
}

// ── `sgconf prune` ────────────────────────────────────────────────────────────

async fn cmd_prune(
    settings: &EngineSettings,
    storage: &FileStorage,
    keys: Vec<String>,
    all: bool,
    validate_hash: bool,
) -> Result<()> {
    let config = stored_config(settings, storage)?;
    let transport = HttpTransport::new(&settings.http)?;

    let mut request = PruneRequest::new(&config);
    request.validate_hash = validate_hash;
    if !keys.is_empty() {
        request.target_hashes = Some(keys.into_iter().collect::<BTreeSet<_>>());
    }
    if all {
        request.last_checked_before = i64::MAX;
    }

    let patch = prune_old_trusted_keys(request, &transport).await;
    let removed = patch
        .trusted_keys
        .as_ref()
        .map_or(0, |keys| keys.values().filter(|entry| entry.is_none()).count());
    let changes = apply_and_save(settings, storage, &config, &patch)?;
    info!(changes, removed, "trusted keys pruned");
    println!("{changes} change(s), {removed} trusted key(s) removed");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
