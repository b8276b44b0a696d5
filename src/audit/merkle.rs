//! Merkle Commitment for Exports
//!
//! A compact fingerprint over the hashes of an exported slice, in chain order,
//! so a regulator can confirm two copies of an export cover the same entries
//! without diffing them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::audit::entry::{LogEntry, HASH_PREFIX};
use crate::error::{AuditError, AuditResult};

fn combine(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

/// Every level of the tree, leaves first. An odd node is paired with itself.
fn build_levels(leaves: Vec<String>) -> Vec<Vec<String>> {
    let mut levels = vec![leaves];
    loop {
        let next: Vec<String> = match levels.last() {
            Some(level) if level.len() > 1 => level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    combine(left, pair.get(1).unwrap_or(left))
                })
                .collect(),
            _ => break,
        };
        levels.push(next);
    }
    levels
}

/// Merkle tree over entry hashes
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    pub fn root(&self) -> &str {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> AuditResult<MerkleProof> {
        if index >= self.leaf_count() {
            return Err(AuditError::SerializationError(format!(
                "Leaf index {} out of range ({} leaves)",
                index,
                self.leaf_count()
            )));
        }

        let mut steps = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if position % 2 == 0 {
                level.get(position + 1).unwrap_or(&level[position])
            } else {
                &level[position - 1]
            };
            steps.push(ProofStep {
                hash: sibling.clone(),
                sibling_on_left: position % 2 == 1,
            });
            position /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.levels[0][index].clone(),
            steps,
            root_hash: self.root().to_string(),
        })
    }
}

/// Build Merkle tree from audit log entries
pub fn build_merkle_tree(entries: &[LogEntry]) -> AuditResult<MerkleTree> {
    if entries.is_empty() {
        return Err(AuditError::SerializationError(
            "Cannot build Merkle tree from empty entries".to_string(),
        ));
    }

    let tree = MerkleTree {
        levels: build_levels(entries.iter().map(|e| e.hash.clone()).collect()),
    };
    debug!(leaves = entries.len(), root = %tree.root(), "Built Merkle tree");
    Ok(tree)
}

/// Root over the entries, or `None` for an empty slice.
pub fn merkle_root(entries: &[LogEntry]) -> Option<String> {
    build_merkle_tree(entries)
        .ok()
        .map(|tree| tree.root().to_string())
}

/// Inclusion proof for the entry at `seq` within an exported slice.
pub fn prove_inclusion(entries: &[LogEntry], seq: i64) -> AuditResult<MerkleProof> {
    let index = entries
        .iter()
        .position(|entry| entry.seq == seq)
        .ok_or_else(|| AuditError::SerializationError(format!("Entry #{} is not in the export", seq)))?;
    build_merkle_tree(entries)?.proof(index)
}

/// Verify Merkle root against entries
pub fn verify_merkle_root(entries: &[LogEntry], claimed_root: &str) -> bool {
    merkle_root(entries).as_deref() == Some(claimed_root)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: String,
    pub sibling_on_left: bool,
}

/// Merkle inclusion proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub steps: Vec<ProofStep>,
    pub root_hash: String,
}

impl MerkleProof {
    /// Verify this proof
    pub fn verify(&self) -> bool {
        let computed = self.steps.iter().fold(self.leaf_hash.clone(), |acc, step| {
            if step.sibling_on_left {
                combine(&step.hash, &acc)
            } else {
                combine(&acc, &step.hash)
            }
        });
        computed == self.root_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::digest;

    fn create_test_entries(count: usize) -> Vec<LogEntry> {
        (0..count)
            .map(|i| {
                let mut entry = LogEntry::candidate(
                    crate::audit::entry::NewEvent::new("test_type", "act", "res"),
                    i as i64 + 1,
                    chrono::Utc::now(),
                    None,
                );
                entry.hash = digest(&format!("entry-{}", i));
                entry
            })
            .collect()
    }

    #[test]
    fn test_merkle_tree_construction() {
        let entries = create_test_entries(4);
        let tree = build_merkle_tree(&entries).unwrap();
        assert!(tree.root().starts_with("sha256:"));
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_single_entry_root_is_its_hash() {
        let entries = create_test_entries(1);
        assert_eq!(merkle_root(&entries).unwrap(), entries[0].hash);
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn test_merkle_root_verification() {
        let entries = create_test_entries(8);
        let root = merkle_root(&entries).unwrap();
        assert!(verify_merkle_root(&entries, &root));
        assert!(!verify_merkle_root(&entries, "sha256:invalid"));

        let mut reordered = entries.clone();
        reordered.swap(2, 3);
        assert!(!verify_merkle_root(&reordered, &root));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for count in [1, 2, 3, 5, 8] {
            let entries = create_test_entries(count);
            let tree = build_merkle_tree(&entries).unwrap();
            for index in 0..count {
                let proof = tree.proof(index).unwrap();
                assert_eq!(proof.leaf_hash, entries[index].hash);
                assert!(proof.verify(), "proof for leaf {} of {}", index, count);
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let entries = create_test_entries(5);
        let tree = build_merkle_tree(&entries).unwrap();
        let mut proof = tree.proof(3).unwrap();
        proof.leaf_hash = digest("forged");
        assert!(!proof.verify());
        assert!(tree.proof(5).is_err());
    }

    #[test]
    fn test_prove_inclusion_by_seq() {
        let mut entries = create_test_entries(6);
        for entry in &mut entries {
            entry.seq += 40;
        }
        let root = merkle_root(&entries).unwrap();

        for entry in &entries {
            let proof = prove_inclusion(&entries, entry.seq).unwrap();
            assert_eq!(proof.leaf_hash, entry.hash);
            assert_eq!(proof.root_hash, root);
            assert!(proof.verify());
        }

        assert!(prove_inclusion(&entries, 1).is_err());
        assert!(prove_inclusion(&[], 41).is_err());
    }
}
