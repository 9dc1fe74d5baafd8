//! warden CLI - command line access to the security primitives.
//!
//! Encrypts and decrypts payloads and tokens, signs and verifies messages,
//! and issues and checks rate-limit tokens.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use warden_common::SystemClock;
use warden_crypto::{
    EncryptedMessage, MessageAuthenticationService, PayloadEncryptionService, SignedMessage,
    TokenEncryptionService,
};
use warden_ratelimit::{RateLimitingService, SecurityConfig, DEFAULT_TOKEN_MINUTES};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "warden - payload encryption, signing and rate-limit tokens")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a payload into an encrypted-message JSON object.
    Encrypt {
        /// Payload text (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Shared secret (prompted if absent).
        #[arg(short, long, env = "WARDEN_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Decrypt an encrypted-message JSON object.
    Decrypt {
        /// Encrypted message JSON (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Shared secret (prompted if absent).
        #[arg(short, long, env = "WARDEN_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Sign a message.
    Sign {
        /// Message text (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Signing key (prompted if absent).
        #[arg(short, long, env = "WARDEN_SIGNING_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Verify a signed-message JSON object.
    Verify {
        /// Signed message JSON (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Signing key (prompted if absent).
        #[arg(short, long, env = "WARDEN_SIGNING_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Encrypt a long-lived token under a password.
    SealToken {
        /// Token text (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Password (prompted if absent).
        #[arg(short, long, env = "WARDEN_TOKEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt a sealed token.
    OpenToken {
        /// Sealed token (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Password (prompted if absent).
        #[arg(short, long, env = "WARDEN_TOKEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Issue a signed rate-limit token for a JSON payload.
    IssueToken {
        /// Payload JSON (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Token lifetime in minutes.
        #[arg(short, long, default_value_t = DEFAULT_TOKEN_MINUTES)]
        minutes: f64,

        /// Signing key (prompted if absent).
        #[arg(short, long, env = "WARDEN_SIGNING_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Check a rate-limit token.
    CheckToken {
        /// Token JSON (default: stdin).
        #[arg(short, long)]
        input: Option<String>,

        /// Signing key (prompted if absent).
        #[arg(short, long, env = "WARDEN_SIGNING_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Encrypt { input, secret } => cmd_encrypt(&config, input, secret),
        Commands::Decrypt { input, secret } => cmd_decrypt(&config, input, secret),
        Commands::Sign { input, key } => cmd_sign(&config, input, key),
        Commands::Verify { input, key } => cmd_verify(&config, input, key),
        Commands::SealToken { input, password } => cmd_seal_token(&config, input, password),
        Commands::OpenToken { input, password } => cmd_open_token(&config, input, password),
        Commands::IssueToken {
            input,
            minutes,
            key,
        } => cmd_issue_token(&config, input, minutes, key),
        Commands::CheckToken { input, key } => cmd_check_token(&config, input, key),
    }
}

/// Load configuration, falling back to defaults.
fn load_config(path: Option<&PathBuf>) -> Result<SecurityConfig> {
    let Some(path) = path else {
        return Ok(SecurityConfig::default());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = SecurityConfig::from_json(&json).context("Invalid config file")?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Use the given input or read all of stdin, minus one trailing newline.
fn read_input(input: Option<String>) -> Result<String> {
    if let Some(input) = input {
        return Ok(input);
    }

    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    if buffer.ends_with('\n') {
        buffer.pop();
        if buffer.ends_with('\r') {
            buffer.pop();
        }
    }
    Ok(buffer)
}

/// Use the given secret or prompt for it without echo.
fn resolve_secret(given: Option<String>, prompt: &str) -> Result<Zeroizing<String>> {
    let secret = match given {
        Some(secret) => secret,
        None => rpassword::prompt_password(prompt).context("Failed to read secret")?,
    };
    if secret.is_empty() {
        anyhow::bail!("Secret cannot be empty");
    }
    Ok(Zeroizing::new(secret))
}

fn payload_service(config: &SecurityConfig) -> Result<PayloadEncryptionService> {
    let mut service = PayloadEncryptionService::new().with_kdf_params(config.kdf);
    service.set_expiration_time(config.payload_expiration_ms)?;
    Ok(service)
}

fn signing_service(config: &SecurityConfig, key: &str) -> Result<MessageAuthenticationService> {
    let mut service = MessageAuthenticationService::with_key(key)?;
    service.set_expiration_time(config.signing_expiration_ms)?;
    Ok(service)
}

fn rate_limit_service(config: &SecurityConfig, key: &str) -> Result<RateLimitingService> {
    Ok(RateLimitingService::from_config(
        key,
        config,
        Arc::new(SystemClock::new()),
    )?)
}

/// Encrypt a payload.
fn cmd_encrypt(
    config: &SecurityConfig,
    input: Option<String>,
    secret: Option<String>,
) -> Result<()> {
    let payload = read_input(input)?;
    let secret = resolve_secret(secret, "Secret: ")?;

    let message = payload_service(config)?
        .encrypt_payload(&payload, &secret)
        .context("Encryption failed")?;

    println!("{}", message.to_json()?);
    Ok(())
}

/// Decrypt a payload.
fn cmd_decrypt(
    config: &SecurityConfig,
    input: Option<String>,
    secret: Option<String>,
) -> Result<()> {
    let json = read_input(input)?;
    let secret = resolve_secret(secret, "Secret: ")?;

    let message = EncryptedMessage::from_json(&json)?;
    let payload = payload_service(config)?.decrypt_payload(&message, &secret)?;

    println!("{}", payload);
    Ok(())
}

/// Sign a message.
fn cmd_sign(config: &SecurityConfig, input: Option<String>, key: Option<String>) -> Result<()> {
    let message = read_input(input)?;
    let key = resolve_secret(key, "Signing key: ")?;

    let signed = signing_service(config, &key)?.sign_message(&message)?;

    println!("{}", signed.to_json()?);
    Ok(())
}

/// Verify a signed message.
fn cmd_verify(config: &SecurityConfig, input: Option<String>, key: Option<String>) -> Result<()> {
    let json = read_input(input)?;
    let key = resolve_secret(key, "Signing key: ")?;

    let signed = SignedMessage::from_json(&json)?;
    if signing_service(config, &key)?.verify_message(&signed)? {
        println!("valid");
        Ok(())
    } else {
        anyhow::bail!("Signature is invalid or expired");
    }
}

/// Encrypt a token.
fn cmd_seal_token(
    config: &SecurityConfig,
    input: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let token = Zeroizing::new(read_input(input)?);
    let password = resolve_secret(password, "Password: ")?;

    let sealed = TokenEncryptionService::new()
        .with_kdf_params(config.kdf)
        .encrypt_token(&token, &password)?;

    println!("{}", sealed);
    Ok(())
}

/// Decrypt a token.
fn cmd_open_token(
    config: &SecurityConfig,
    input: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let sealed = read_input(input)?;
    let password = resolve_secret(password, "Password: ")?;

    let token = Zeroizing::new(
        TokenEncryptionService::new()
            .with_kdf_params(config.kdf)
            .decrypt_token(&sealed, &password)?,
    );

    println!("{}", token.as_str());
    Ok(())
}

/// Issue a rate-limit token.
fn cmd_issue_token(
    config: &SecurityConfig,
    input: Option<String>,
    minutes: f64,
    key: Option<String>,
) -> Result<()> {
    let json = read_input(input)?;
    let key = resolve_secret(key, "Signing key: ")?;

    let payload: serde_json::Value =
        serde_json::from_str(&json).context("Token payload must be JSON")?;
    let token = rate_limit_service(config, &key)?.create_rate_limit_token(&payload, minutes)?;

    println!("{}", token);
    Ok(())
}

/// Check a rate-limit token.
fn cmd_check_token(
    config: &SecurityConfig,
    input: Option<String>,
    key: Option<String>,
) -> Result<()> {
    let token = read_input(input)?;
    let key = resolve_secret(key, "Signing key: ")?;

    if rate_limit_service(config, &key)?.validate_rate_limit_token(&token) {
        println!("valid");
        Ok(())
    } else {
        anyhow::bail!("Token is invalid or expired");
    }
}
