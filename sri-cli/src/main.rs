use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sri_core::access_key::{compute_check_digit, AccessKey, AccessKeyFields, NumericCode};
use sri_core::config::Environment;
use sri_core::document::validation::{validate_model, validate_xml, ValidationIssue};
use sri_core::document::xml::{self, XmlFormat};
use sri_core::document::{Document, NORMAL_EMISSION};
use sri_core::pipeline::{Artifact, ArtifactKind};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sri-cli")]
#[command(about = "Offline tooling for SRI electronic documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a 49-digit access key.
    AccessKey {
        /// Emission date, `YYYY-MM-DD`.
        #[arg(long)]
        emission_date: NaiveDate,
        #[arg(long, default_value = "01")]
        document_type: String,
        #[arg(long)]
        ruc: String,
        /// `1`/`test` or `2`/`production`.
        #[arg(long, default_value = "1")]
        environment: String,
        #[arg(long, default_value = "001")]
        establishment: String,
        #[arg(long, default_value = "001")]
        emission_point: String,
        #[arg(long)]
        sequential: String,
        /// Random when omitted.
        #[arg(long)]
        numeric_code: Option<String>,
    },
    /// Modulus-11 check digit of 48 digits.
    CheckDigit {
        #[arg(long)]
        digits: String,
    },
    /// Build and validate the canonical XML of a JSON document.
    Build {
        #[arg(long)]
        document: PathBuf,
        /// Random when omitted.
        #[arg(long)]
        numeric_code: Option<String>,
        /// Indent the printed XML. Never written as an artifact.
        #[arg(long, conflicts_with = "output_dir")]
        pretty: bool,
        /// Write `unsigned-<key>.xml` here instead of printing the XML.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Check a rendered document XML.
    Validate {
        #[arg(long)]
        xml: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn numeric_code(value: Option<String>) -> Result<NumericCode> {
    match value {
        Some(code) => NumericCode::new(code).context("invalid numeric code"),
        None => Ok(NumericCode::random()),
    }
}

fn report(issues: &[ValidationIssue]) {
    for issue in issues {
        eprintln!("{issue}");
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::AccessKey {
            emission_date,
            document_type,
            ruc,
            environment,
            establishment,
            emission_point,
            sequential,
            numeric_code: code,
        } => {
            let environment = Environment::from_str(&environment)?;
            let code = numeric_code(code)?;
            let key = AccessKey::generate(&AccessKeyFields {
                emission_date: emission_date.format("%d%m%Y").to_string(),
                document_type,
                ruc,
                environment: environment.code().to_string(),
                series: format!("{establishment}{emission_point}"),
                sequential,
                numeric_code: code.as_str().to_string(),
                emission_type: NORMAL_EMISSION.to_string(),
            })?;
            println!("{key}");
        }
        Commands::CheckDigit { digits } => {
            println!("{}", compute_check_digit(&digits)?);
        }
        Commands::Build {
            document,
            numeric_code: code,
            pretty,
            output_dir,
        } => {
            let json = read(&document)?;
            let mut parsed: Document = serde_json::from_str(&json)
                .with_context(|| format!("{} is not a valid document", document.display()))?;
            let key = parsed.assign_access_key(&numeric_code(code)?)?.clone();
            debug!(access_key = %key, "access key assigned");

            let model_issues = validate_model(&parsed);
            if !model_issues.is_empty() {
                report(&model_issues);
                bail!("document failed validation with {} issue(s)", model_issues.len());
            }
            let canonical = xml::build(&parsed)?;
            let xml_issues = validate_xml(canonical.as_str());
            if !xml_issues.is_empty() {
                report(&xml_issues);
                bail!("document failed validation with {} issue(s)", xml_issues.len());
            }

            match output_dir {
                Some(dir) => {
                    let artifact = Artifact {
                        kind: ArtifactKind::Unsigned,
                        access_key: key,
                        xml: canonical.into_string(),
                    };
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("failed to create {}", dir.display()))?;
                    let path = dir.join(artifact.file_name());
                    fs::write(&path, artifact.xml.as_bytes())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "unsigned document written");
                    println!("{}", path.display());
                }
                None if pretty => {
                    let rendered = xml::build_with_format(
                        &parsed,
                        XmlFormat::Pretty {
                            indent_char: ' ',
                            indent_size: 2,
                        },
                    )?;
                    println!("{}", rendered.into_string());
                }
                None => println!("{}", canonical.into_string()),
            }
        }
        Commands::Validate { xml } => {
            let issues = validate_xml(&read(&xml)?);
            if !issues.is_empty() {
                report(&issues);
                bail!("{} issue(s) found", issues.len());
            }
            println!("OK");
        }
    }

    Ok(())
}
