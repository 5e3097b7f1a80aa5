//! Block generator selection.
//!
//! A fixed, administrator-curated set of validators takes turns drafting
//! blocks. The strategy is pluggable; the default walks the ordered
//! validator set round-robin by block id.

use pkchain_core::BlockId;

/// Chooses which validator drafts the block with a given id.
pub trait GeneratorSelector: Send + Sync {
    /// Return the generator for `block_id`, or `None` when the set is empty.
    fn select<'a>(&self, validators: &'a [String], block_id: BlockId) -> Option<&'a str>;
}

/// Round-robin selection: `block_id % validator_count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl GeneratorSelector for RoundRobin {
    fn select<'a>(&self, validators: &'a [String], block_id: BlockId) -> Option<&'a str> {
        if validators.is_empty() {
            return None;
        }
        let index = (block_id % validators.len() as u64) as usize;
        Some(validators[index].as_str())
    }
}

/// A single fixed generator, for single-authority deployments.
#[derive(Debug, Clone)]
pub struct FixedGenerator(pub String);

impl GeneratorSelector for FixedGenerator {
    fn select<'a>(&self, validators: &'a [String], _block_id: BlockId) -> Option<&'a str> {
        validators
            .iter()
            .find(|v| **v == self.0)
            .map(String::as_str)
    }
}
