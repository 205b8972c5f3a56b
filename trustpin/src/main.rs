//! trustpin: offline diagnostics for TLS peer trust decisions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use trustpin_lib::{
    ChainCandidates, ChainCertInfo, CustomCa, Fingerprint, PeerVerification, PolicyOptions,
    TrustConfig, TrustContext, TrustMode, VerificationOutcome,
};

#[derive(Parser)]
#[command(
    name = "trustpin",
    about = "Inspect how certificate pins and trust pools decide TLS peer trust",
    long_about = "trustpin computes certificate pins, shows how the trust pool is\n\
                  composed, and replays the trust decision a TLS client would make\n\
                  for a PEM chain, without opening a connection.\n\n\
                  DISABLE_SYSTEM_CA and DISABLE_EMBED_CA are honored. All commands\n\
                  read from stdin when no file is given. Set RUST_LOG=debug to trace\n\
                  each decision.",
    after_help = "EXAMPLES:\n\
                  \n  trustpin fingerprint cert.pem\
                  \n  trustpin verify chain.pem\
                  \n  trustpin verify --fingerprint AB:CD:...:EF chain.pem\
                  \n  trustpin verify --pin 3f2a... --ca-file ca.pem chain.pem\
                  \n  trustpin roots --json\
                  \n  cat chain.pem | trustpin verify"
)]
struct Cli {
    #[command(flatten)]
    pool: PoolArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Debug, Default)]
struct PoolArgs {
    /// Leave the operating system root store out (same as DISABLE_SYSTEM_CA=1)
    #[arg(long, global = true)]
    no_system_ca: bool,
    /// Leave the compiled-in root bundle out (same as DISABLE_EMBED_CA=1)
    #[arg(long, global = true)]
    no_embedded_ca: bool,
    /// Directory that relative certificate and CA paths resolve against
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 pin of every certificate in a PEM file
    #[command(after_help = "EXAMPLES:\n\
                      \n  trustpin fingerprint cert.pem\
                      \n  trustpin fingerprint --hex chain.pem\
                      \n  trustpin fingerprint --json chain.pem")]
    Fingerprint {
        /// PEM file. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Print plain lowercase hex instead of colon-separated uppercase
        #[arg(long)]
        hex: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Decide whether a presented chain would be trusted (exit 0 = accept, 2 = reject)
    #[command(
        after_help = "FILE is a PEM bundle in the order a peer would present it.\n\
                      \nMODES:\n\
                      \n  --fingerprint      pin-only: accept iff a certificate matches\
                      \n  --pin (any count)  chain validation, then the pins as fallback\
                      \n  --insecure         accept anything (explicit opt-out)\
                      \n  (none)             chain validation only\
                      \n\nEXAMPLES:\n\
                      \n  trustpin verify chain.pem\
                      \n  trustpin verify --add-cert private-root.pem chain.pem\
                      \n  trustpin verify --ca-file corp-ca.pem chain.pem\
                      \n  trustpin verify --pin 3f2a... --json chain.pem"
    )]
    Verify {
        /// PEM file with the presented chain. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Pin for this connection only (pin-only mode)
        #[arg(long, value_name = "SHA256")]
        fingerprint: Option<String>,
        /// Global pin; may be repeated
        #[arg(long = "pin", value_name = "SHA256")]
        pins: Vec<String>,
        /// Certificate added to the shared pool before verifying; may be repeated
        #[arg(long = "add-cert", value_name = "FILE")]
        add_certs: Vec<PathBuf>,
        /// CA file used instead of the shared pool for this verification
        #[arg(long, value_name = "FILE")]
        ca_file: Option<PathBuf>,
        /// Inline PEM CA bundle used instead of the shared pool (--ca-file wins)
        #[arg(long, value_name = "PEM")]
        ca_string: Option<String>,
        /// Skip verification entirely
        #[arg(long)]
        insecure: bool,
        /// Only let the first presented certificate validate
        #[arg(long)]
        leaf_only: bool,
        /// Verify at a specific Unix timestamp instead of current time
        #[arg(long, value_name = "EPOCH")]
        attime: Option<i64>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show where the composed trust pool's certificates come from
    Roots {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Maximum file size for certificate inputs (10 MiB).
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn input_label(file: Option<&PathBuf>) -> String {
    file.map_or("stdin".to_string(), |f| f.display().to_string())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Environment flags, then command-line switches on top.
fn trust_config(args: &PoolArgs) -> TrustConfig {
    let mut config = TrustConfig::from_env();
    config.disable_system_ca |= args.no_system_ca;
    config.disable_embedded_ca |= args.no_embedded_ca;
    config.base_dir = args.base_dir.clone();
    config
}

#[derive(Serialize)]
struct FingerprintLine {
    index: usize,
    subject: String,
    fingerprint: String,
}

fn fingerprint_lines(input: &[u8], hex: bool) -> Result<Vec<FingerprintLine>> {
    let certs = trustpin_lib::parse_pem_chain(input).context("Failed to decode PEM input")?;
    let mut lines = Vec::with_capacity(certs.len());
    for (index, der) in certs.iter().enumerate() {
        let info = ChainCertInfo::from_der(index, der)
            .with_context(|| format!("Failed to parse certificate {}", index))?;
        let fp = Fingerprint::of_der(der);
        lines.push(FingerprintLine {
            index,
            subject: info.subject,
            fingerprint: if hex { fp.to_hex() } else { fp.to_string() },
        });
    }
    Ok(lines)
}

#[derive(Serialize)]
struct VerifyReport {
    file: String,
    mode: TrustMode,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted_by: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl VerifyReport {
    /// `outcome` is `None` when verification was skipped.
    fn new(file: String, mode: TrustMode, outcome: Option<VerificationOutcome>) -> Self {
        let mut report = Self {
            file,
            mode,
            accepted: outcome.as_ref().map_or(true, VerificationOutcome::is_accepted),
            accepted_by: None,
            index: None,
            fingerprint: None,
            error: None,
        };
        let Some(outcome) = outcome else {
            return report;
        };
        match outcome {
            VerificationOutcome::AcceptedByChain { index } => {
                report.accepted_by = Some("chain");
                report.index = Some(index);
            }
            VerificationOutcome::AcceptedByPin(found) => {
                report.accepted_by = Some("pin");
                report.index = Some(found.index);
                report.fingerprint = Some(found.fingerprint.to_string());
            }
            VerificationOutcome::Rejected(e) => report.error = Some(e.to_string()),
        }
        report
    }
}

impl std::fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.file)?;
        if !self.accepted {
            return write!(
                f,
                "FAIL ({}, {})",
                self.mode,
                self.error.as_deref().unwrap_or("rejected")
            );
        }
        write!(f, "OK ({}", self.mode)?;
        match (self.accepted_by, self.index) {
            (Some("pin"), Some(i)) => write!(
                f,
                ", pinned certificate {} {}",
                i,
                self.fingerprint.as_deref().unwrap_or_default()
            )?,
            (Some(_), Some(i)) => write!(f, ", chain validated from certificate {}", i)?,
            _ => write!(f, ", verification skipped")?,
        }
        write!(f, ")")
    }
}

/// `None` means the settings carry no verifier (explicit opt-out).
fn evaluate(
    settings: &PeerVerification,
    chain: &[Vec<u8>],
    attime: Option<i64>,
) -> Option<VerificationOutcome> {
    let verifier = settings.verifier.as_ref()?;
    Some(match attime {
        Some(at) => verifier.evaluate_at(chain, at),
        None => verifier.evaluate(chain),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = trust_config(&cli.pool);
    tracing::debug!(?config, "trust configuration");

    match &cli.command {
        Commands::Fingerprint { file, hex, json } => {
            let input = read_input(file.as_ref())?;
            let lines = fingerprint_lines(&input, *hex)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                for line in &lines {
                    println!("{}  {}", line.fingerprint, line.subject);
                }
            }
        }
        Commands::Roots { json } => {
            let ctx = TrustContext::new(config);
            let summary = ctx.pool().summary();
            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("system:   {}", summary.system);
                println!("embedded: {}", summary.embedded);
                println!("custom:   {}", summary.custom);
                println!("total:    {}", summary.total);
            }
        }
        Commands::Verify {
            file,
            fingerprint,
            pins,
            add_certs,
            ca_file,
            ca_string,
            insecure,
            leaf_only,
            attime,
            json,
        } => {
            let ctx = TrustContext::new(config);
            for pin in pins {
                ctx.pins()
                    .add_global_fingerprint_text(pin)
                    .with_context(|| format!("Invalid --pin value: {}", pin))?;
            }
            for path in add_certs {
                let resolved = ctx.config().resolve_path(path);
                let pem = std::fs::read_to_string(&resolved)
                    .with_context(|| format!("Failed to read file: {}", resolved.display()))?;
                ctx.pool()
                    .add_certificate(&pem)
                    .with_context(|| format!("Failed to add certificate: {}", resolved.display()))?;
            }

            let options = PolicyOptions {
                fingerprint: fingerprint.clone(),
                custom_ca: CustomCa {
                    file: ca_file.clone(),
                    pem: ca_string.clone(),
                },
                insecure_skip_verify: *insecure,
                chain_candidates: if *leaf_only {
                    ChainCandidates::LeafOnly
                } else {
                    ChainCandidates::AnyPresented
                },
            };
            let settings = ctx
                .peer_verification(&options)
                .context("Failed to set up verification")?;

            let input = read_input(file.as_ref())?;
            let chain =
                trustpin_lib::parse_pem_chain(&input).context("Failed to decode PEM input")?;
            let outcome = evaluate(&settings, &chain, *attime);
            let report = VerifyReport::new(input_label(file.as_ref()), settings.mode, outcome);

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.accepted {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
