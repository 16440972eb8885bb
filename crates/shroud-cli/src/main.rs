//! shroud: encrypted-content toolkit CLI
//!
//! Commands:
//!   encode <text>            - split text into 32-bit units
//!   decode <unit>...         - reassemble text from units
//!   access-code new          - issue a fresh access code and its ledger hash
//!   access-code hash <code>  - hash an existing access code
//!   config show              - display the effective configuration
//!   demo <text>              - full report round trip against in-memory services

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use shroud_codec::NulPolicy;
use shroud_core::config::ShroudConfig;
use shroud_core::{Address, Category, Severity, ShroudError, Status};
use shroud_crypto::AccessCode;
use shroud_session::memory::{MemoryBackend, MemoryLedger, MemorySigner};
use shroud_session::{
    EncryptionSession, FheBackend, Progress, Records, ReportDraft, SessionOptions,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "shroud",
    version,
    about = "Encrypted content and anonymous access codes",
    long_about = "shroud: encode text for homomorphic encryption, manage access codes, and run the report workflow"
)]
struct Cli {
    /// Path to shroud.toml configuration file
    #[arg(long, short = 'c', env = "SHROUD_CONFIG", default_value = "shroud.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "SHROUD_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "SHROUD_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split text into little-endian 32-bit units
    Encode {
        text: String,
        /// Print units as 0x-prefixed hex instead of decimal
        #[arg(long)]
        hex: bool,
    },

    /// Reassemble text from units (decimal or 0x hex; wider values are truncated)
    Decode {
        #[arg(required = true)]
        units: Vec<String>,
        /// Keep interior NUL bytes, trimming only final-unit padding
        #[arg(long)]
        keep_nul: bool,
    },

    /// Access code management
    #[command(name = "access-code")]
    AccessCode {
        #[command(subcommand)]
        action: AccessCodeAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Submit, track, decrypt, and answer a report using in-memory services
    Demo {
        /// Report content
        text: String,
        /// Feedback the organization attaches
        #[arg(long, default_value = "Thank you. We have opened an investigation.")]
        feedback: String,
    },
}

#[derive(Subcommand, Debug)]
enum AccessCodeAction {
    /// Generate a new access code
    New,
    /// Print the ledger hash of an access code
    Hash { code: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration as TOML
    Show,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ShroudError>() {
                Some(err) => eprintln!("error: {}", err.user_message()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config, from_file) = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| parse_log_format(&config.log.format));
    init_logging(&level, &format);

    if !from_file {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Encode { text, hex } => cmd_encode(&text, hex),
        Commands::Decode { units, keep_nul } => cmd_decode(&units, keep_nul),
        Commands::AccessCode { action: AccessCodeAction::New } => cmd_access_code_new(),
        Commands::AccessCode { action: AccessCodeAction::Hash { code } } => cmd_access_code_hash(&code),
        Commands::Config { action: ConfigAction::Show } => {
            cmd_config_show(&config, &cli.config, from_file)
        }
        Commands::Demo { text, feedback } => cmd_demo(&config, &text, &feedback).await,
    }
}

// ── Config + logging ──────────────────────────────────────────────────────────

/// Load the config file, falling back to defaults when it does not exist.
/// Returns whether the file was read.
fn load_config(path: &Path) -> Result<(ShroudConfig, bool)> {
    if !path.exists() {
        return Ok((ShroudConfig::default(), false));
    }
    let config = ShroudConfig::load(path)
        .with_context(|| format!("loading config: {}", path.display()))?;
    Ok((config, true))
}

fn parse_log_format(s: &str) -> LogFormat {
    if s.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
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

// ── `shroud encode` / `shroud decode` ─────────────────────────────────────────

fn cmd_encode(text: &str, hex: bool) -> Result<()> {
    for unit in shroud_codec::encode(text) {
        if hex {
            println!("{unit:#010x}");
        } else {
            println!("{unit}");
        }
    }
    Ok(())
}

fn parse_unit(s: &str) -> Result<u128> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => s.parse::<u128>(),
    };
    parsed.with_context(|| format!("not an unsigned integer: {s}"))
}

fn cmd_decode(units: &[String], keep_nul: bool) -> Result<()> {
    let values = units
        .iter()
        .map(|u| parse_unit(u))
        .collect::<Result<Vec<_>>>()?;
    let policy = if keep_nul {
        NulPolicy::TrimPadding
    } else {
        NulPolicy::StripAll
    };
    println!("{}", shroud_codec::decode_with(&values, policy));
    Ok(())
}

// ── `shroud access-code` ──────────────────────────────────────────────────────

fn cmd_access_code_new() -> Result<()> {
    let code = shroud_crypto::generate_access_code()?;
    println!("Access code: {}", code.expose());
    println!("Ledger hash: {}", code.hash());
    println!();
    println!("Keep this code safe. It is the only way to track the report and cannot be recovered.");
    Ok(())
}

fn cmd_access_code_hash(input: &str) -> Result<()> {
    let code = AccessCode::parse(input)?;
    println!("{}", code.hash());
    Ok(())
}

// ── `shroud config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &ShroudConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `shroud demo` ─────────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

async fn cmd_demo(config: &ShroudConfig, text: &str, feedback: &str) -> Result<()> {
    let organization = Address::from_bytes([0x0a; 20]);
    let reply_to = Address::from_bytes([0x0b; 20]);
    let mut options = SessionOptions::from_config(config);
    if options.contract == Address::ZERO {
        options.contract = Address::from_bytes([0xc0; 20]);
    }

    let backend = shroud_session::global()
        .init(|| async { Ok(Arc::new(MemoryBackend::new()) as Arc<dyn FheBackend>) })
        .await?;

    let (progress, mut rx) = Progress::channel();
    let pb = make_spinner("demo");
    let watcher = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let stage = *rx.borrow_and_update();
                pb.set_message(stage.label());
            }
        })
    };

    let session = EncryptionSession::new(backend, options).with_progress(progress);
    let records = Records::new(
        Arc::new(session),
        Arc::new(MemoryLedger::new()),
        config.ledger.clone(),
    );
    let org = MemorySigner::new(organization);
    let reporter = MemorySigner::new(reply_to);

    let submitted = records
        .submit_report(ReportDraft {
            organization,
            category: Category::Ethics,
            severity: Severity::Medium,
            content: text.to_string(),
            reply_to: Some(reply_to),
        })
        .await?;
    let code = submitted.access_code.expose().to_string();

    let tracked = records.track(&code).await?;
    let decrypted = records.decrypt_report(submitted.id, &org).await?;
    records
        .update_status(submitted.id, Status::Investigating, Some(feedback))
        .await?;
    let status = records
        .track(&code)
        .await?
        .status()
        .map(|s| format!("{s:?}"))
        .unwrap_or_default();
    let answer = records.read_feedback(&code, &reporter).await?;

    pb.finish_and_clear();
    watcher.abort();

    println!("Report id:       {}", submitted.id);
    println!("Access code:     {code}");
    println!("Ledger hash:     {}", submitted.access_code.hash());
    println!("Ciphertext:      {} handles", tracked.handles.len());
    for handle in tracked.handles.iter().take(3) {
        println!("                 {handle}");
    }
    println!("Decrypted:       {decrypted}");
    println!("Status:          {status}");
    println!("Feedback:        {}", answer.unwrap_or_default());
    Ok(())
}
