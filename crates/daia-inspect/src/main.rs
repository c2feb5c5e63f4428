//! DAIA Inspect CLI
//!
//! Command-line interface for published agreements:
//! - Verify: Check one or more agreement transactions
//! - Inspect: Display an agreement requirement by requirement
//! - Summarize: Show what an offer asks for

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daia_core::{AgreementVerifier, PaymentPolicy, VerifierConfig};
use daia_inspect::{
    inspect_transaction, load_ledger_snapshot, summarize_offer_file, verify_transactions,
    AgreementInspection, TransactionVerdict,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "daia-inspect")]
#[command(about = "DAIA agreement verification and inspection tool")]
#[command(version)]
struct Cli {
    /// Payment comparison: at-least or exact (overrides DAIA_PAYMENT_POLICY)
    #[arg(long, global = true)]
    payment_policy: Option<PaymentPolicy>,

    /// Deepest agreement reference chain to follow (overrides DAIA_MAX_REFERENCE_DEPTH)
    #[arg(long, global = true)]
    max_reference_depth: Option<usize>,

    /// Offer type to accept; repeat for several (overrides DAIA_ACCEPTED_OFFER_TYPES)
    #[arg(long = "accept-offer-type", global = true)]
    accepted_offer_types: Vec<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify agreement transactions; exits non-zero unless all pass
    Verify {
        /// Path to the ledger snapshot JSON file
        #[arg(long)]
        ledger: PathBuf,
        /// Transactions to verify
        #[arg(required = true)]
        tx_ids: Vec<String>,
        /// Transactions verified at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
    /// Inspect the agreement in one transaction
    Inspect {
        /// Path to the ledger snapshot JSON file
        #[arg(long)]
        ledger: PathBuf,
        tx_id: String,
    },
    /// Summarize an offer JSON file
    Summarize {
        /// Path to the offer JSON file
        file: PathBuf,
    },
}

impl Cli {
    fn verifier_config(&self) -> VerifierConfig {
        let mut config = VerifierConfig::from_env();
        if let Some(policy) = self.payment_policy {
            config = config.with_payment_policy(policy);
        }
        if let Some(depth) = self.max_reference_depth {
            config = config.with_max_reference_depth(depth);
        }
        if !self.accepted_offer_types.is_empty() {
            config = config.with_accepted_offer_types(self.accepted_offer_types.iter().cloned());
        }
        config
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("DAIA_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn open_verifier(cli: &Cli, ledger: &Path) -> anyhow::Result<AgreementVerifier> {
    let ledger = load_ledger_snapshot(ledger)
        .await
        .with_context(|| format!("loading ledger snapshot {}", ledger.display()))?;
    let config = cli.verifier_config();
    tracing::debug!(
        payment_policy = %config.payment_policy,
        max_reference_depth = config.max_reference_depth,
        "Verifier configured"
    );
    Ok(AgreementVerifier::new(Arc::new(ledger)).with_config(config))
}

fn print_verdict(verdict: &TransactionVerdict) {
    let mark = if verdict.verified { "✓" } else { "✗" };
    println!("{} {}  {}", mark, verdict.tx_id, verdict.status.to_uppercase());
    for error in &verdict.errors {
        println!("    - {}", error);
    }
}

fn print_inspection(inspection: &AgreementInspection) {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                  Agreement Inspection                    ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
    println!("Transaction:  {}", inspection.tx_id);
    println!(
        "Offer Type:   {}",
        inspection.offer_type.as_deref().unwrap_or("(unreadable)")
    );
    if let Some(text) = &inspection.natural_language {
        println!("Terms:        {}", text);
    }
    println!(
        "Verified:     {}",
        if inspection.verdict.verified { "✓ Yes" } else { "✗ No" }
    );

    println!();
    println!("Requirements:");
    for line in &inspection.requirements {
        let mark = if line.satisfied { "✓" } else { "✗" };
        let proof = line
            .proof
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "no proof".to_string());
        println!("  {} {} [{}] {} ({})", mark, line.id, line.kind, line.detail, proof);
    }

    if !inspection.verdict.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &inspection.verdict.errors {
            println!("  - {}", error);
        }
    }

    if !inspection.summary.total_payments.is_empty() {
        println!();
        println!("Payments:");
        for (to, amount) in &inspection.summary.total_payments {
            println!("  {} -> {}", amount, to);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match &cli.command {
        Commands::Verify {
            ledger,
            tx_ids,
            concurrency,
        } => {
            let verifier = open_verifier(&cli, ledger).await?;
            let verdicts = verify_transactions(&verifier, tx_ids.clone(), *concurrency).await;
            let all_verified = verdicts.iter().all(|v| v.verified);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&verdicts)?);
            } else {
                for verdict in &verdicts {
                    print_verdict(verdict);
                }
            }

            tracing::info!(
                total = verdicts.len(),
                verified = verdicts.iter().filter(|v| v.verified).count(),
                "Verification finished"
            );
            if !all_verified {
                std::process::exit(1);
            }
        }
        Commands::Inspect { ledger, tx_id } => {
            let verifier = open_verifier(&cli, ledger).await?;
            let inspection = inspect_transaction(&verifier, tx_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                print_inspection(&inspection);
            }
        }
        Commands::Summarize { file } => {
            let summary = summarize_offer_file(file)
                .with_context(|| format!("summarizing {}", file.display()))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Offer Type:  {}", summary.offer_type_identifier);
                println!("Signers:     {}", summary.signers.len());
                for signer in &summary.signers {
                    println!("  {}", signer);
                }
                println!("Payments:");
                for (to, amount) in &summary.total_payments {
                    println!("  {} -> {}", amount, to);
                }
                if !summary.reference_types.is_empty() {
                    println!("References:  {}", summary.reference_types.join(", "));
                }
            }
        }
    }

    Ok(())
}
