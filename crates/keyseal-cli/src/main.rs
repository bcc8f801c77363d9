//! keyseal: sealed envelopes and API-key session tokens from the shell
//!
//! Commands:
//!   seal <plaintext>       - encrypt into an envelope
//!   open <envelope>        - verify and decrypt an envelope
//!   issue                  - mint a session token for an API key
//!   redeem <token>         - verify a session token and print its claims
//!   header <token>         - render the `APIKey <mac> <token>` header value
//!   verify <header-value>  - validate an authorization header value
//!   random                 - print CSPRNG bytes
//!   config show            - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use keyseal_core::config::KeysealConfig;
use keyseal_core::Encoding;
use keyseal_crypto::{EnvelopeKeys, DEFAULT_RANDOM_SIZE, DEFAULT_SIZE};
use keyseal_token::{Metadata, SessionTokens};
use secrecy::SecretString;
use serde_json::Value;
use std::path::{Path, PathBuf};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyseal",
    version,
    about = "Sealed envelopes and API-key session tokens",
    long_about = "keyseal: seal and open authenticated envelopes, issue and verify API-key session tokens"
)]
struct Cli {
    /// Path to keyseal.toml configuration file
    #[arg(long, short = 'c', env = "KEYSEAL_CONFIG", default_value = "keyseal.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "KEYSEAL_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides the config file
    #[arg(long, env = "KEYSEAL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(clap::Args, Debug)]
struct EnvelopeArgs {
    /// Encryption key
    #[arg(long, env = "KEYSEAL_KEY", hide_env_values = true)]
    key: String,
    /// Pepper mixed into the KDF salt
    #[arg(long, env = "KEYSEAL_PEPPER", hide_env_values = true)]
    pepper: String,
    /// HMAC key authenticating the envelope
    #[arg(long, env = "KEYSEAL_HMAC_KEY", hide_env_values = true)]
    hmac_key: String,
    /// AES key size in bits (128, 192, 256)
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    size: u32,
    /// Envelope text encoding (hex, base64, base64url)
    #[arg(long, default_value_t = Encoding::Hex)]
    encoding: Encoding,
}

impl EnvelopeArgs {
    fn keys(&self) -> EnvelopeKeys<'_> {
        EnvelopeKeys::new(&self.key, &self.pepper, &self.hmac_key)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt plaintext into an authenticated envelope
    Seal {
        plaintext: String,
        #[command(flatten)]
        args: EnvelopeArgs,
    },

    /// Verify and decrypt an envelope
    Open {
        envelope: String,
        #[command(flatten)]
        args: EnvelopeArgs,
    },

    /// Issue a session token for an API key
    Issue {
        #[arg(long)]
        apikey: String,
        /// Per-key secret bound into the token and the request MAC
        #[arg(long, env = "KEYSEAL_KEY_SECRET", hide_env_values = true)]
        key_secret: String,
        #[arg(long, env = "KEYSEAL_MASTER_SECRET", hide_env_values = true)]
        master_secret: String,
        /// Lifetime in milliseconds
        #[arg(long)]
        ttl_ms: u64,
        /// Extra claim carried in the token headers (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
        meta: Vec<(String, Value)>,
        #[arg(long, default_value_t = Encoding::Utf8)]
        encoding: Encoding,
    },

    /// Verify a session token and print its claims as JSON
    Redeem {
        token: String,
        #[arg(long, env = "KEYSEAL_MASTER_SECRET", hide_env_values = true)]
        master_secret: String,
        #[arg(long, default_value_t = Encoding::Utf8)]
        encoding: Encoding,
    },

    /// Print the authorization header value for a token
    Header { token: String },

    /// Validate an authorization header value and print its claims as JSON
    Verify {
        value: String,
        #[arg(long, env = "KEYSEAL_MASTER_SECRET", hide_env_values = true)]
        master_secret: String,
        #[arg(long, default_value_t = Encoding::Utf8)]
        encoding: Encoding,
    },

    /// Print random bytes from the OS CSPRNG
    Random {
        /// Number of bytes
        #[arg(long, default_value_t = DEFAULT_RANDOM_SIZE)]
        size: usize,
        #[arg(long, default_value_t = Encoding::Hex)]
        encoding: Encoding,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    if !found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Seal { plaintext, args } => cmd_seal(config, plaintext, args).await,
        Commands::Open { envelope, args } => cmd_open(config, envelope, args).await,
        Commands::Issue {
            apikey,
            key_secret,
            master_secret,
            ttl_ms,
            meta,
            encoding,
        } => cmd_issue(
            &config,
            &apikey,
            &key_secret,
            master_secret,
            ttl_ms,
            meta,
            encoding,
        ),
        Commands::Redeem {
            token,
            master_secret,
            encoding,
        } => cmd_redeem(&config, &token, master_secret, encoding),
        Commands::Header { token } => cmd_header(&token),
        Commands::Verify {
            value,
            master_secret,
            encoding,
        } => cmd_verify(&config, &value, master_secret, encoding),
        Commands::Random { size, encoding } => cmd_random(size, encoding),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Load `path`, falling back to defaults when it does not exist. The flag is
/// `false` on fallback so the caller can warn once logging is up.
async fn load_config(path: &Path) -> Result<(KeysealConfig, bool)> {
    if !path.exists() {
        return Ok((KeysealConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config =
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))?;
    Ok((config, true))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

fn parse_meta(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in {raw:?}"));
    }
    // JSON scalars and objects pass through; anything else is a plain string.
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn session_tokens(config: &KeysealConfig, master_secret: String) -> SessionTokens {
    SessionTokens::new(SecretString::from(master_secret), config.token.clone())
}

// ── `keyseal seal` / `keyseal open` ──────────────────────────────────────────

async fn cmd_seal(config: KeysealConfig, plaintext: String, args: EnvelopeArgs) -> Result<()> {
    // PBKDF2 at full strength takes a while; keep it off the runtime threads.
    let value = tokio::task::spawn_blocking(move || {
        keyseal_crypto::seal(
            &plaintext,
            &args.keys(),
            args.size,
            args.encoding,
            &config.envelope,
        )
        .map(|sealed| sealed.value)
    })
    .await
    .context("seal task panicked")??;

    println!("{value}");
    Ok(())
}

async fn cmd_open(config: KeysealConfig, envelope: String, args: EnvelopeArgs) -> Result<()> {
    let plaintext = tokio::task::spawn_blocking(move || {
        keyseal_crypto::open(
            &envelope,
            &args.keys(),
            args.size,
            args.encoding,
            &config.envelope,
        )
    })
    .await
    .context("open task panicked")??;

    println!("{plaintext}");
    Ok(())
}

// ── `keyseal issue` / `keyseal redeem` ───────────────────────────────────────

fn cmd_issue(
    config: &KeysealConfig,
    apikey: &str,
    key_secret: &str,
    master_secret: String,
    ttl_ms: u64,
    meta: Vec<(String, Value)>,
    encoding: Encoding,
) -> Result<()> {
    let metadata: Metadata = meta.into_iter().collect();
    let token = session_tokens(config, master_secret)
        .issue(apikey, key_secret, ttl_ms, metadata, encoding)
        .context("issuing session token")?;
    println!("{token}");
    Ok(())
}

fn cmd_redeem(
    config: &KeysealConfig,
    token: &str,
    master_secret: String,
    encoding: Encoding,
) -> Result<()> {
    let claims = session_tokens(config, master_secret).redeem(token, encoding)?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}

// ── `keyseal header` / `keyseal verify` ──────────────────────────────────────

fn cmd_header(token: &str) -> Result<()> {
    println!("{}", keyseal_token::build_authorization_header(token)?);
    Ok(())
}

fn cmd_verify(
    config: &KeysealConfig,
    value: &str,
    master_secret: String,
    encoding: Encoding,
) -> Result<()> {
    let tokens = session_tokens(config, master_secret);
    let claims = keyseal_token::validate_authorization_header(&tokens, Some(value), encoding)?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}

// ── `keyseal random` ─────────────────────────────────────────────────────────

fn cmd_random(size: usize, encoding: Encoding) -> Result<()> {
    println!("{}", keyseal_crypto::random_value(size, encoding)?);
    Ok(())
}

// ── `keyseal config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &KeysealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("foo=bar").unwrap(),
            ("foo".to_string(), Value::String("bar".into()))
        );
        assert_eq!(parse_meta("n=42").unwrap().1, Value::from(42));
        assert_eq!(parse_meta("eq=a=b").unwrap().1, Value::String("a=b".into()));
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn test_cli_parses_seal() {
        let cli = Cli::try_parse_from([
            "keyseal", "seal", "hello", "--key", "k", "--pepper", "p", "--hmac-key", "h",
            "--size", "128", "--encoding", "base64",
        ])
        .unwrap();
        match cli.command {
            Commands::Seal { plaintext, args } => {
                assert_eq!(plaintext, "hello");
                assert_eq!(args.size, 128);
                assert_eq!(args.encoding, Encoding::Base64);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_issue_meta() {
        let cli = Cli::try_parse_from([
            "keyseal", "issue", "--apikey", "123", "--key-secret", "0", "--master-secret",
            "456", "--ttl-ms", "10000", "--meta", "foo=bar", "--meta", "n=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Issue { meta, encoding, .. } => {
                assert_eq!(meta.len(), 2);
                assert_eq!(encoding, Encoding::Utf8);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_encoding() {
        let err = Cli::try_parse_from(["keyseal", "random", "--encoding", "rot13"]).unwrap_err();
        assert!(err.to_string().contains("unknown encoding"));
    }

    #[tokio::test]
    async fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[envelope]\niterations = 10\n\n[log]\nformat = \"json\"").unwrap();

        let (config, found) = load_config(file.path()).await.unwrap();
        assert!(found);
        assert_eq!(config.envelope.iterations, 10);
        assert_eq!(config.envelope.salt_length, 512);
        assert_eq!(config.log.format, "json");
    }

    #[tokio::test]
    async fn test_load_config_missing_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, found) = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(!found, "missing file must be reported for the warning");
        assert_eq!(config.envelope.iterations, 100_000);
        assert_eq!(config.token.kdf_iterations, 100);
    }

    #[test]
    fn test_issue_redeem_through_header() {
        let config = KeysealConfig::default();
        let tokens = session_tokens(&config, "456".into());
        let token = tokens
            .issue("123", "0", 10_000, Metadata::new(), Encoding::Utf8)
            .unwrap();
        let header = keyseal_token::build_authorization_header(&token).unwrap();
        let claims =
            keyseal_token::validate_authorization_header(&tokens, Some(&header), Encoding::Utf8)
                .unwrap();
        assert_eq!(claims.apikey, "123");
    }
}
