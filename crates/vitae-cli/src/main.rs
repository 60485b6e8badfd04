//! vitae: secure resume ledger CLI
//!
//! Commands:
//!   status                         - chain summary and record counts
//!   verify                         - full hash-chain validation
//!   config show                    - display the active configuration
//!   keygen                         - print a fresh master key
//!   resume store|get|list          - field-encrypted resumes
//!   job store|get                  - field-encrypted job descriptions
//!   user register|login            - salted password credentials
//!   search <term>                  - case-insensitive payload search
//!   export <out>                   - write the chain with plaintext payloads

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vitae_chain::LoadOutcome;

use vitae_core::config::VitaeConfig;
use vitae_core::{JobDescriptionRecord, ResumeRecord, VitaeError};
use vitae_crypto::MasterSecret;
use vitae_storage::SecureStorage;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vitae",
    version,
    about = "Secure resume ledger",
    long_about = "vitae: store resumes, job descriptions and credentials on an encrypted, hash-chained ledger"
)]
struct Cli {
    /// Path to vitae.toml configuration file
    #[arg(long, short = 'c', env = "VITAE_CONFIG", default_value = "vitae.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides [logging].level)
    #[arg(long, env = "VITAE_LOG")]
    log: Option<String>,

    /// Log format (overrides [logging].format)
    #[arg(long, env = "VITAE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show chain status and record counts
    Status,

    /// Validate every block's hash and linkage
    Verify,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate a new random master key
    Keygen,

    /// Resume records
    Resume {
        #[command(subcommand)]
        action: ResumeAction,
    },

    /// Job description records
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// User credentials
    ///
    /// The password is read from VITAE_PASSWORD, or prompted for.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Case-insensitive search over block payloads
    Search {
        term: String,
        /// Only search blocks of this record type (e.g. resume, job_description)
        #[arg(long = "type", short = 't')]
        record_type: Option<String>,
    },

    /// Write the chain with plaintext payloads to a file
    Export {
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Subcommand, Debug)]
enum ResumeAction {
    /// Store a resume given as inline JSON or a path to a JSON file
    Store {
        json: String,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Decrypt and print the resume stored at a block index
    Get { index: u64 },
    /// List every resume stored for a user
    List { user_id: String },
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// Store a job description given as inline JSON or a path to a JSON file
    Store {
        json: String,
        #[arg(long)]
        company: Option<String>,
    },
    /// Decrypt and print the job description stored at a block index
    Get { index: u64 },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Register a user; a `user_id` is generated unless given via --data
    Register {
        username: String,
        /// Extra user data as key=value (value parsed as JSON when possible)
        #[arg(long = "data", short = 'd', value_parser = parse_key_val)]
        data: Vec<(String, Value)>,
    },
    /// Check a password and print the user's data
    Login { username: String },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VitaeConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Status => cmd_status(&config),
        Commands::Verify => cmd_verify(&config),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Keygen => cmd_keygen(),
        Commands::Resume { action } => match action {
            ResumeAction::Store { json, user_id } => {
                cmd_resume_store(&config, &json, user_id.as_deref())
            }
            ResumeAction::Get { index } => cmd_resume_get(&config, index),
            ResumeAction::List { user_id } => cmd_resume_list(&config, &user_id),
        },
        Commands::Job { action } => match action {
            JobAction::Store { json, company } => cmd_job_store(&config, &json, company.as_deref()),
            JobAction::Get { index } => cmd_job_get(&config, index),
        },
        Commands::User { action } => match action {
            UserAction::Register { username, data } => cmd_user_register(&config, &username, data),
            UserAction::Login { username } => cmd_user_login(&config, &username),
        },
        Commands::Search { term, record_type } => {
            cmd_search(&config, &term, record_type.as_deref())
        }
        Commands::Export { out } => cmd_export(&config, &out),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn open_storage(config: &VitaeConfig) -> Result<SecureStorage> {
    SecureStorage::open(config)
        .with_context(|| format!("opening ledger: {}", config.ledger.path.display()))
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Inline JSON, or the contents of the file it names.
fn read_json_arg(arg: &str) -> Result<Value> {
    let path = Path::new(arg);
    let text = if path.is_file() {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).context("parsing record JSON")
}

fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn read_password(confirm: bool) -> Result<String> {
    if let Ok(password) = std::env::var("VITAE_PASSWORD") {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        anyhow::ensure!(password == again, "passwords do not match");
    }
    Ok(password)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── `vitae status` / `verify` / `config show` / `keygen` ─────────────────────

fn cmd_status(config: &VitaeConfig) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.get_stats();

    println!("ledger:            {}", stats.chain.chain_file);
    println!("load:              {}", describe_load(&stats.load_outcome));
    println!("blocks:            {}", stats.chain.total_blocks);
    println!("valid:             {}", stats.chain.is_valid);
    println!("difficulty:        {}", stats.chain.difficulty);
    println!("genesis hash:      {}", stats.chain.genesis_block_hash);
    println!("latest hash:       {}", stats.chain.latest_block_hash);
    println!("resumes:           {}", stats.resume_count);
    println!("job descriptions:  {}", stats.job_description_count);
    println!("credentials:       {}", stats.credential_count);
    Ok(())
}

/// One-line summary of how the ledger was opened
fn describe_load(outcome: &LoadOutcome) -> String {
    match outcome {
        LoadOutcome::Created => "created (new ledger)".to_string(),
        LoadOutcome::Loaded { blocks } => format!("loaded {blocks} blocks"),
        LoadOutcome::Recovered { reason, quarantined } => match quarantined {
            Some(path) => format!("RECOVERED ({reason}); previous ledger moved to {}", path.display()),
            None => format!("RECOVERED ({reason}); previous ledger could not be moved"),
        },
    }
}

/// Fails when the stored ledger was rejected and replaced on open
fn check_load_outcome(outcome: &LoadOutcome) -> Result<()> {
    if outcome.is_recovered() {
        anyhow::bail!("stored ledger was rejected: {}", describe_load(outcome));
    }
    Ok(())
}

fn cmd_verify(config: &VitaeConfig) -> Result<()> {
    let storage = open_storage(config)?;
    check_load_outcome(storage.load_outcome())?;
    storage.ledger().verify().context("ledger verification failed")?;
    println!("ledger valid: {} blocks", storage.ledger().len());
    Ok(())
}

fn cmd_config_show(config: &VitaeConfig, config_path: &Path) -> Result<()> {
    println!("# config: {}", config_path.display());
    println!("{}", toml::to_string_pretty(config).context("serializing config")?);
    Ok(())
}

fn cmd_keygen() -> Result<()> {
    let secret = MasterSecret::generate();
    println!("{}", secret.expose_secret());
    eprintln!("store this as [crypto].master_key or in $VITAE_MASTER_KEY; it cannot be recovered");
    Ok(())
}

// ── `vitae resume` / `job` ────────────────────────────────────────────────────

fn cmd_resume_store(config: &VitaeConfig, json: &str, user_id: Option<&str>) -> Result<()> {
    let resume: ResumeRecord =
        serde_json::from_value(read_json_arg(json)?).context("invalid resume record")?;
    let mut storage = open_storage(config)?;

    let pb = make_spinner("seal");
    pb.set_message(format!("difficulty {}", storage.ledger().difficulty()));
    let receipt = storage.store_resume(&resume, user_id);
    pb.finish_and_clear();

    print_json(&receipt.context("storing resume")?)
}

fn cmd_resume_get(config: &VitaeConfig, index: u64) -> Result<()> {
    let storage = open_storage(config)?;
    let resume = storage
        .retrieve_resume(index)?
        .ok_or_else(|| VitaeError::NotFound(format!("resume at block {index}")))?;
    print_json(&resume)
}

fn cmd_resume_list(config: &VitaeConfig, user_id: &str) -> Result<()> {
    let storage = open_storage(config)?;
    let records = storage.get_user_records(user_id)?;
    print_json(&records)
}

fn cmd_job_store(config: &VitaeConfig, json: &str, company: Option<&str>) -> Result<()> {
    let job: JobDescriptionRecord =
        serde_json::from_value(read_json_arg(json)?).context("invalid job description record")?;
    let mut storage = open_storage(config)?;

    let pb = make_spinner("seal");
    pb.set_message(format!("difficulty {}", storage.ledger().difficulty()));
    let receipt = storage.store_job_description(&job, company);
    pb.finish_and_clear();

    print_json(&receipt.context("storing job description")?)
}

fn cmd_job_get(config: &VitaeConfig, index: u64) -> Result<()> {
    let storage = open_storage(config)?;
    let job = storage
        .retrieve_job_description(index)?
        .ok_or_else(|| VitaeError::NotFound(format!("job description at block {index}")))?;
    print_json(&job)
}

// ── `vitae user` ──────────────────────────────────────────────────────────────

fn cmd_user_register(config: &VitaeConfig, username: &str, data: Vec<(String, Value)>) -> Result<()> {
    let mut user_data: BTreeMap<String, Value> = data.into_iter().collect();
    user_data
        .entry("user_id".to_string())
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));

    let password = read_password(true)?;
    let mut storage = open_storage(config)?;

    let pb = make_spinner("seal");
    let receipt = storage.store_credentials(username, &password, Some(&user_data));
    pb.finish_and_clear();

    print_json(&receipt.context("storing credentials")?)
}

fn cmd_user_login(config: &VitaeConfig, username: &str) -> Result<()> {
    let password = read_password(false)?;
    let storage = open_storage(config)?;
    let user = storage
        .verify_credentials(username, &password)?
        .ok_or(VitaeError::InvalidCredentials)?;
    print_json(&user)
}

// ── `vitae search` / `export` ─────────────────────────────────────────────────

fn cmd_search(config: &VitaeConfig, term: &str, record_type: Option<&str>) -> Result<()> {
    let storage = open_storage(config)?;
    let hits = storage.search(term, record_type);
    if hits.is_empty() {
        println!("no matches for {term:?}");
        return Ok(());
    }
    for block in hits {
        println!("{:>6}  {:<16}  {}", block.index(), block.record_type(), block.hash());
    }
    Ok(())
}

fn cmd_export(config: &VitaeConfig, out: &Path) -> Result<()> {
    let storage = open_storage(config)?;
    storage
        .ledger()
        .export(out)
        .with_context(|| format!("exporting to {}", out.display()))?;
    println!("exported {} blocks to {}", storage.ledger().len(), out.display());
    Ok(())
}
