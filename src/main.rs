//! saavy-license - issue and validate license credentials

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use chrono::{TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use saavy_license::engine::AUDIT_TARGET;
use saavy_license::kdf::{self, DEFAULT_GROUP_SIZE, DEFAULT_LENGTH, DEFAULT_SEPARATOR};
use saavy_license::secrets::LICENSE_KEY;
use saavy_license::status::parse_datetime;
use saavy_license::{
    Config, HttpAuthority, LicenseEngine, NoAuthority, OfflineLicensePayload, ProductKeyVerifier,
    SecretChain, TokenPayload, offline, token,
};

/// saavy-license - issue and validate license credentials
#[derive(Parser, Debug)]
#[command(name = "saavy-license")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Offline licenses ===
    /// Generate a new offline license
    Generate(GenerateArgs),

    /// Verify an offline license and print its payload
    Inspect {
        /// License string to inspect
        license_key: String,

        /// Signing secret (defaults to $LICENSE_SIGNING_SECRET)
        #[arg(long)]
        signing_secret: Option<String>,
    },

    // === Validation ===
    /// Show the most recent license status
    Status,

    /// Validate the configured license
    Validate {
        /// Credential to validate (defaults to $LICENSE_KEY or the license files)
        #[arg(long)]
        license_key: Option<String>,
    },

    // === Product keys ===
    /// Derive a product key
    DeriveKey {
        /// Identifier (email, machine id, GLOBAL, ...)
        #[arg(long)]
        identifier: String,

        #[arg(long)]
        salt: Option<String>,

        /// Key length in Base32 characters
        #[arg(long, default_value_t = DEFAULT_LENGTH)]
        length: usize,

        #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
        group_size: usize,

        #[arg(long, default_value = DEFAULT_SEPARATOR)]
        separator: String,

        /// Derivation secret (defaults to $LICENSE_PRODUCT_SECRET or the embedded secret)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Check a product key against this install's expected key
    CheckKey {
        /// Candidate product key
        candidate: String,

        /// Identifier used when generating (defaults to the configured one)
        #[arg(long)]
        identifier: Option<String>,

        #[arg(long)]
        salt: Option<String>,

        #[arg(long, default_value_t = kdf::PRODUCT_KEY_LENGTH)]
        length: usize,

        #[arg(long)]
        secret: Option<String>,
    },

    // === Signed tokens ===
    /// Generate an Ed25519 key pair for signing tokens
    MakeKeys {
        /// Directory to write license_private.pem / license_public.pem into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Sign a license token
    SignToken {
        /// Path to the private PEM file
        #[arg(long, default_value = "license_private.pem")]
        private_key: PathBuf,

        /// License identifier (user or device)
        #[arg(long)]
        id: String,

        #[arg(long, default_value = "ShopSaavy")]
        product: String,

        #[arg(long = "version", default_value = "1.0.0")]
        product_version: String,

        /// Days until expiry
        #[arg(long, default_value = "365")]
        days: i64,
    },

    /// Verify a license token
    VerifyToken {
        /// Path to the public PEM file
        public_key: PathBuf,

        /// Raw or grouped Base32 token
        token: String,

        expected_product: Option<String>,

        expected_version: Option<String>,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Customer or recipient name
    customer: String,

    /// Days until the license expires
    #[arg(long, default_value = "365")]
    expires_in_days: i64,

    /// Explicit ISO 8601 expiry (overrides --expires-in-days)
    #[arg(long)]
    expires_at: Option<String>,

    /// Plan or SKU name
    #[arg(long)]
    plan: Option<String>,

    /// Seat count or activation limit
    #[arg(long)]
    seats: Option<i64>,

    /// Internal notes stored in the payload
    #[arg(long)]
    notes: Option<String>,

    /// Enabled feature (repeatable)
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Extra metadata as key=value; values parse as JSON when possible (repeatable)
    #[arg(long)]
    metadata: Vec<String>,

    /// Signing secret (defaults to $LICENSE_SIGNING_SECRET)
    #[arg(long)]
    signing_secret: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    if let Err(e) = init_tracing(config.log_path.as_deref()) {
        eprintln!("warning: audit log unavailable: {e:#}");
    }

    let result = match cli.command {
        Commands::Generate(args) => generate(&config, args),
        Commands::Inspect {
            license_key,
            signing_secret,
        } => inspect(&config, signing_secret, &license_key),
        Commands::Status => status(&config),
        Commands::Validate { license_key } => validate(&config, license_key),
        Commands::DeriveKey {
            identifier,
            salt,
            length,
            group_size,
            separator,
            secret,
        } => derive_key(&config, secret, &identifier, salt.as_deref(), length, group_size, &separator),
        Commands::CheckKey {
            candidate,
            identifier,
            salt,
            length,
            secret,
        } => check_key(&config, &candidate, identifier, salt, length, secret),
        Commands::MakeKeys { out_dir } => make_keys(&out_dir),
        Commands::SignToken {
            private_key,
            id,
            product,
            product_version,
            days,
        } => token_expiry(Utc::now().timestamp(), days).and_then(|expiry| {
            sign_token(&private_key, TokenPayload::new(id, product, product_version, expiry))
        }),
        Commands::VerifyToken {
            public_key,
            token,
            expected_product,
            expected_version,
        } => Ok(verify_token(
            &public_key,
            &token,
            expected_product.as_deref(),
            expected_version.as_deref(),
        )),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_path: Option<&Path>) -> Result<()> {
    let audit_layer = match log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(Targets::new().with_target(AUDIT_TARGET, Level::INFO)),
            )
        }
        None => None,
    };

    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(stderr_filter))
        .with(audit_layer)
        .try_init()?;
    Ok(())
}

fn signing_secret(config: &Config, flag: Option<String>) -> Result<String> {
    match flag.filter(|s| !s.is_empty()).or_else(|| config.signing_secret.clone()) {
        Some(secret) => Ok(secret),
        None => bail!("Set --signing-secret or the LICENSE_SIGNING_SECRET environment variable."),
    }
}

fn resolve_expiry(expires_at: Option<String>, expires_in_days: i64) -> Result<chrono::DateTime<Utc>> {
    match expires_at {
        Some(raw) => {
            parse_datetime(&raw).with_context(|| format!("Invalid --expires-at value: {raw}"))
        }
        None => TimeDelta::try_days(expires_in_days)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .with_context(|| format!("--expires-in-days {expires_in_days} is out of range")),
    }
}

/// Unix expiry `days` after `now`.
fn token_expiry(now: i64, days: i64) -> Result<i64> {
    days.checked_mul(24 * 3600)
        .and_then(|secs| now.checked_add(secs))
        .with_context(|| format!("--days {days} is out of range"))
}

fn parse_metadata(items: &[String]) -> Result<Map<String, Value>> {
    let mut metadata = Map::new();
    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            bail!("Metadata must be in key=value form: {item}");
        };
        let value = value.trim();
        let parsed =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        metadata.insert(key.trim().to_string(), parsed);
    }
    Ok(metadata)
}

fn generate(config: &Config, args: GenerateArgs) -> Result<ExitCode> {
    let secret = signing_secret(config, args.signing_secret)?;
    let mut payload = OfflineLicensePayload::new(
        args.customer,
        resolve_expiry(args.expires_at, args.expires_in_days)?,
    );
    payload.plan = args.plan;
    payload.seats = args.seats;
    payload.notes = args.notes;
    payload.features = args.features;
    payload.metadata = parse_metadata(&args.metadata)?;

    let license_key = offline::generate(&secret, &payload)?;
    let output = json!({
        "license_key": license_key,
        "payload": payload.to_map(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn inspect(config: &Config, flag: Option<String>, license_key: &str) -> Result<ExitCode> {
    if !offline::is_offline_format(license_key) {
        bail!("Provided license is not in offline format. Use the remote validation tooling instead.");
    }
    let secret = signing_secret(config, flag)?;
    let payload = offline::verify(&secret, license_key)?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(ExitCode::SUCCESS)
}

fn build_engine(config: &Config, credential: String) -> saavy_license::Result<LicenseEngine> {
    let engine = LicenseEngine::new(credential, config.engine_config()?);
    if config.offline_only {
        return Ok(engine.with_authority(NoAuthority));
    }
    Ok(engine.with_authority(HttpAuthority::new(&config.validation_url)?))
}

fn resolve_credential(flag: Option<String>) -> String {
    flag.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| SecretChain::default_credential_chain().get(LICENSE_KEY))
        .unwrap_or_default()
}

fn status(config: &Config) -> Result<ExitCode> {
    let engine = build_engine(config, resolve_credential(None))?;
    println!("{}", json!({ "status": engine.status_report() }));
    Ok(ExitCode::SUCCESS)
}

fn validate(config: &Config, flag: Option<String>) -> Result<ExitCode> {
    let mut engine = match build_engine(config, resolve_credential(flag)) {
        Ok(engine) => engine,
        Err(e) => {
            println!("{}", json!({ "valid": false, "error": e.message }));
            return Ok(ExitCode::FAILURE);
        }
    };

    match engine.validate() {
        Ok(_) => {
            println!("{}", json!({ "valid": true, "status": engine.status_report() }));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!(
                "{}",
                json!({ "valid": false, "error": e.message, "status": engine.status_report() })
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn derive_key(
    config: &Config,
    secret: Option<String>,
    identifier: &str,
    salt: Option<&str>,
    length: usize,
    group_size: usize,
    separator: &str,
) -> Result<ExitCode> {
    let secret = match secret {
        Some(secret) if !secret.is_empty() => secret,
        _ => config.product_secret()?,
    };
    if identifier.trim().is_empty() {
        bail!("Identifier cannot be empty.");
    }
    let raw = kdf::derive(&secret, identifier, salt, length)?;
    println!("{}", kdf::format_key(&raw, group_size, separator));
    Ok(ExitCode::SUCCESS)
}

fn check_key(
    config: &Config,
    candidate: &str,
    identifier: Option<String>,
    salt: Option<String>,
    length: usize,
    secret: Option<String>,
) -> Result<ExitCode> {
    let secret = match secret {
        Some(secret) if !secret.is_empty() => secret,
        _ => config.product_secret()?,
    };
    let verifier = ProductKeyVerifier::new(
        secret,
        identifier.unwrap_or_else(|| config.product_identifier.clone()),
    )
    .with_salt(salt.or_else(|| config.product_salt.clone()))
    .with_length(length);

    if verifier.verify(candidate) {
        println!("VALID");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("INVALID");
        Ok(ExitCode::FAILURE)
    }
}

fn make_keys(out_dir: &Path) -> Result<ExitCode> {
    fs::create_dir_all(out_dir)?;
    let signing_key = token::generate_keypair();
    let (private_path, public_path) = token::write_keypair(&signing_key, out_dir)?;
    println!(
        "Keypair generated: {} (keep secure), {} (embed in app)",
        private_path.display(),
        public_path.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn sign_token(private_key: &Path, payload: TokenPayload) -> Result<ExitCode> {
    let signing_key = token::load_signing_key(private_key)?;
    let signed = token::sign(&signing_key, &payload)?;
    println!("RAW TOKEN:\n{signed}\n");
    println!("HUMAN-FRIENDLY (BASE32 GROUPED):\n{}", token::human_readable(&signed));
    Ok(ExitCode::SUCCESS)
}

fn verify_token(
    public_key: &Path,
    raw: &str,
    expected_product: Option<&str>,
    expected_version: Option<&str>,
) -> ExitCode {
    let result = token::load_verifying_key(public_key).and_then(|key| {
        token::verify(&key, &token::normalize(raw), expected_product, expected_version)
    });
    match result {
        Ok(payload) if payload.is_expired(Utc::now().timestamp()) => {
            println!("INVALID: License expired.");
            ExitCode::FAILURE
        }
        Ok(_) => {
            println!("VALID");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("INVALID: {}", e.message);
            ExitCode::FAILURE
        }
    }
}
