//! Offline verification of a structured audit export
//!
//! Regulators run this against the `data` of a JSON export without any access
//! to the live store.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info};

use bridge_audit::audit::{
    detect_forks, find_tampered_entries, merkle_root, parse_structured, prove_inclusion,
    verify_entries, verify_merkle_root, LogEntry, MerkleProof, PublicKeyVerifier,
    SignatureVerifier, VerificationScope,
};

#[derive(Parser)]
#[command(name = "verify-audit-log")]
#[command(about = "Verify a bridge audit log export offline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Structured (JSON) export file
    #[arg(short, long)]
    export: PathBuf,

    /// Hex public key of the signing authority; enables signature checks
    #[arg(short, long)]
    public_key: Option<String>,

    /// Expected Merkle root published alongside the export
    #[arg(short, long)]
    merkle_root: Option<String>,

    /// Print an inclusion proof for the entry with this sequence number
    #[arg(long, value_name = "SEQ")]
    prove: Option<i64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(&cli) {
        error!("Audit log verification failed: {:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }

    println!("✓ Audit log verification completed successfully");
}

fn run(cli: &Cli) -> Result<()> {
    info!("Verifying audit export: {}", cli.export.display());

    let data = std::fs::read_to_string(&cli.export)
        .with_context(|| format!("Failed to read export {}", cli.export.display()))?;
    let entries = parse_structured(&data)?;
    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(anyhow!("Export contains no entries")),
    };

    if cli.verbose {
        println!("Loaded {} audit log entries", entries.len());
    }

    // An export that starts at the genesis can be checked as a full chain.
    let scope = if first.seq == 1 && first.previous_hash.is_none() {
        VerificationScope::Full
    } else {
        VerificationScope::Detached
    };

    let verifier = cli
        .public_key
        .as_deref()
        .map(PublicKeyVerifier::from_hex)
        .transpose()?;
    let result = verify_entries(
        &entries,
        scope,
        verifier.as_ref().map(|v| v as &dyn SignatureVerifier),
    );

    let root = merkle_root(&entries).unwrap_or_default();
    if cli.verbose {
        println!("\nAudit Log Summary:");
        println!("  Total entries: {}", entries.len());
        println!("  First entry: #{} at {}", first.seq, first.timestamp);
        println!("  Last entry: #{} at {}", last.seq, last.timestamp);
        println!("  Head hash: {}", last.hash);
        println!("  Merkle root: {}", root);
        println!(
            "  Signatures: {}",
            if result.signatures_checked { "checked" } else { "not checked" }
        );
    }
    if let Some(limitation) = result.limitation() {
        println!("⚠ {}", limitation);
    }

    if !result.valid {
        report_forensics(&entries);
        return Err(anyhow!(result.summary()));
    }
    println!("{}", result.summary());

    if let Some(expected) = &cli.merkle_root {
        if !verify_merkle_root(&entries, expected) {
            return Err(anyhow!(
                "Merkle root mismatch. Expected: {}, Got: {}",
                expected,
                root
            ));
        }
        println!("✓ Merkle root matches expected value");
    }

    if let Some(seq) = cli.prove {
        let proof = inclusion_proof(&entries, seq, cli.merkle_root.as_deref())?;
        println!("\nInclusion proof for entry #{}:", seq);
        println!("  Leaf: {}", proof.leaf_hash);
        for (depth, step) in proof.steps.iter().enumerate() {
            let side = if step.sibling_on_left { "left" } else { "right" };
            println!("  {:>2}. {} ({})", depth + 1, step.hash, side);
        }
        println!("  Root: {}", proof.root_hash);
        println!("✓ Inclusion proof verifies");
    }

    Ok(())
}

/// Build and check the proof for `seq`, optionally against a published root.
fn inclusion_proof(entries: &[LogEntry], seq: i64, expected_root: Option<&str>) -> Result<MerkleProof> {
    let proof = prove_inclusion(entries, seq)?;
    if !proof.verify() {
        return Err(anyhow!("Inclusion proof for entry #{} does not verify", seq));
    }
    if let Some(expected) = expected_root {
        if proof.root_hash != expected {
            return Err(anyhow!(
                "Inclusion proof root mismatch. Expected: {}, Got: {}",
                expected,
                proof.root_hash
            ));
        }
    }
    Ok(proof)
}

fn report_forensics(entries: &[LogEntry]) {
    let tampered = find_tampered_entries(entries);
    if !tampered.is_empty() {
        println!("Entries whose contents no longer match their hash:");
        for index in tampered {
            println!("  #{} ({})", entries[index].seq, entries[index].id);
        }
    }

    for fork in detect_forks(entries) {
        let seqs: Vec<String> = fork.entries.iter().map(|e| format!("#{}", e.seq)).collect();
        println!(
            "Fork: entries {} all follow {}",
            seqs.join(", "),
            fork.previous_hash.as_deref().unwrap_or("<genesis>")
        );
    }
}
