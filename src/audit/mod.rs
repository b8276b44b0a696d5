//! Audit Log System
//!
//! Tamper-evident logging for banking operations: every entry is hashed over
//! its canonical form, linked to its predecessor and signed.

pub mod entry;
pub mod export;
pub mod logger;
pub mod merkle;
pub mod range;
pub mod signer;
pub mod verify;

pub use entry::{Details, EntryRef, LogEntry, NewEvent, FORMAT_VERSION};
pub use export::{parse_structured, ExportFormat, ExportPayload};
pub use logger::AuditLogger;
pub use merkle::{build_merkle_tree, merkle_root, prove_inclusion, verify_merkle_root, MerkleProof};
pub use range::TimeRange;
pub use signer::{PublicKeyVerifier, Secp256k1Signer, SignatureVerifier, Signer};
pub use verify::{
    detect_forks, find_tampered_entries, verify_entries, BreakKind, ChainBreak,
    VerificationResult, VerificationScope,
};
