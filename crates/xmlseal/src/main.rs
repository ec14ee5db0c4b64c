#![forbid(unsafe_code)]

//! xmlseal CLI: sign XML documents with a PKCS#12 key store, fetch and
//! verify the results, and clean up expired output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use xmlseal::crypto::SigningKey;
use xmlseal::dsig::VerifyResult;
use xmlseal::{Error, Signer, SignerConfig};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(
    name = "xmlseal",
    about = "Enveloped XML-DSig signing with keys from PKCS#12 stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log pipeline steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON signer configuration; flags below override it
    #[arg(long, global = true, env = "XMLSEAL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding signed documents
    #[arg(long, global = true, env = "XMLSEAL_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// How long signed documents stay downloadable (e.g. "15m")
    #[arg(long, global = true, env = "XMLSEAL_RETENTION")]
    retention: Option<humantime::Duration>,

    /// Period of the expiry sweep (e.g. "60s")
    #[arg(long, global = true, env = "XMLSEAL_SWEEP_INTERVAL")]
    sweep_interval: Option<humantime::Duration>,

    /// Verify each signature before reporting success
    #[arg(long, global = true, env = "XMLSEAL_VERIFY_AFTER_SIGN")]
    verify_after_sign: Option<bool>,

    /// Embed CA certificates from the key store
    #[arg(long, global = true, env = "XMLSEAL_EMBED_CA_CHAIN")]
    embed_ca_chain: Option<bool>,

    /// Refuse certificates outside their validity period
    #[arg(long, global = true, env = "XMLSEAL_REQUIRE_VALID_CERTIFICATE")]
    require_valid_certificate: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign an XML document and print the result as JSON
    Sign {
        /// XML document to sign
        #[arg(long)]
        xml: PathBuf,

        /// PKCS#12 key store (.p12/.pfx)
        #[arg(long)]
        pfx: PathBuf,

        /// Key store passphrase; empty means none
        #[arg(long, env = "XMLSEAL_PASSPHRASE", default_value = "", hide_env_values = true)]
        passphrase: String,
    },

    /// Fetch a signed document by handle
    Download {
        handle: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a signed XML document
    Verify {
        /// Signed XML file
        file: PathBuf,

        /// DER certificate to verify with instead of the embedded one
        #[arg(long)]
        cert: Option<PathBuf>,
    },

    /// Delete expired signed documents
    Sweep {
        /// Keep sweeping every sweep interval until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Show supported algorithms and the effective configuration, or
    /// describe the certificates in a key store
    Info {
        #[arg(long)]
        pfx: Option<PathBuf>,

        #[arg(long, env = "XMLSEAL_PASSPHRASE", default_value = "", hide_env_values = true)]
        passphrase: String,
    },
}

#[derive(Serialize)]
struct ErrorReport {
    error: String,
    code: xmlseal::ErrorCode,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(&cli).and_then(|config| match cli.command {
        Commands::Sign {
            xml,
            pfx,
            passphrase,
        } => cmd_sign(config, &xml, &pfx, Zeroizing::new(passphrase)),
        Commands::Download { handle, output } => cmd_download(config, &handle, output),
        Commands::Verify { file, cert } => cmd_verify(&file, cert),
        Commands::Sweep { watch } => cmd_sweep(config, watch),
        Commands::Info { pfx, passphrase } => cmd_info(config, pfx, Zeroizing::new(passphrase)),
    });

    if let Err(e) = result {
        let report = ErrorReport {
            error: e.to_string(),
            code: e.code(),
        };
        match serde_json::to_string(&report) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("Error: {e}"),
        }
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<SignerConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => SignerConfig::from_json_file(path)?,
        None => SignerConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(retention) = &cli.retention {
        config.retention = **retention;
    }
    if let Some(interval) = &cli.sweep_interval {
        config.sweep_interval = **interval;
    }
    if let Some(verify) = cli.verify_after_sign {
        config.verify_after_sign = verify;
    }
    if let Some(embed) = cli.embed_ca_chain {
        config.embed_ca_chain = embed;
    }
    if let Some(require) = cli.require_valid_certificate {
        config.require_valid_certificate = require;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_sign(
    config: SignerConfig,
    xml_path: &Path,
    pfx_path: &Path,
    passphrase: Zeroizing<String>,
) -> Result<(), Error> {
    let xml = read_file(xml_path)?;
    let pfx = Zeroizing::new(read_file(pfx_path)?);
    let signer = Signer::new(config)?;
    let result = signer.sign(&xml, &pfx, &passphrase)?;
    print_json(&result)
}

fn cmd_download(config: SignerConfig, handle: &str, output: Option<PathBuf>) -> Result<(), Error> {
    let signer = Signer::new(config)?;
    let data = signer.download(handle)?;
    write_output(output, &data)
}

fn cmd_verify(file: &Path, cert: Option<PathBuf>) -> Result<(), Error> {
    let xml = String::from_utf8(read_file(file)?)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", file.display())))?;
    let key = match cert {
        Some(path) => {
            let der = read_file(&path)?;
            Some(SigningKey::RsaPublic(xmlseal::keys::certificate_public_key(&der)?))
        }
        None => None,
    };

    match xmlseal::dsig::verify(&xml, key.as_ref())? {
        VerifyResult::Valid => {
            println!("OK");
            Ok(())
        }
        VerifyResult::Invalid { reason } => {
            eprintln!("INVALID: {reason}");
            process::exit(1);
        }
    }
}

fn cmd_sweep(config: SignerConfig, watch: bool) -> Result<(), Error> {
    let signer = Signer::new(config)?;
    let removed = signer.store().sweep()?;
    println!("removed {removed} expired signed document(s)");
    if !watch {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let sweeper = signer.spawn_sweeper();
        tracing::info!(
            dir = %signer.store().dir().display(),
            interval = %humantime::format_duration(signer.config().sweep_interval),
            "sweeping until interrupted"
        );
        let interrupted = tokio::signal::ctrl_c().await;
        sweeper.abort();
        interrupted.map_err(Error::from)
    })
}

#[derive(Serialize)]
struct Capabilities<'a> {
    canonicalization: &'static [&'static str],
    digest: &'static [&'static str],
    signature: &'static [&'static str],
    transforms: &'static [&'static str],
    config: &'a SignerConfig,
}

fn cmd_info(config: SignerConfig, pfx: Option<PathBuf>, passphrase: Zeroizing<String>) -> Result<(), Error> {
    use xmlseal::core::algorithm;

    let Some(pfx_path) = pfx else {
        return print_json(&Capabilities {
            canonicalization: &[algorithm::C14N, algorithm::C14N_WITH_COMMENTS],
            digest: &[algorithm::SHA256],
            signature: &[algorithm::RSA_SHA256],
            transforms: &[algorithm::ENVELOPED_SIGNATURE, algorithm::C14N],
            config: &config,
        });
    };

    let pfx = Zeroizing::new(read_file(&pfx_path)?);
    let key = xmlseal::keys::extract(&pfx, &passphrase)?;
    let summaries = std::iter::once(&key.certificate)
        .chain(key.ca_certificates.iter())
        .map(Vec::as_slice)
        .map(xmlseal::keys::summarize)
        .collect::<Result<Vec<_>, _>>()?;
    print_json(&summaries)
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::InvalidInput(format!("cannot serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", p.display())))
        }),
        None => Ok(std::io::stdout().write_all(data)?),
    }
}
