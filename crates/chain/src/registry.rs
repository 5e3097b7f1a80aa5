//! Name ↔ public key bindings derived from the committed chain.
//!
//! The registry is never stored on its own: it is folded from successful
//! transactions in chain order, so every validator holding the same chain
//! resolves operations identically.

use crate::ledger::Ledger;
use pkchain_core::{Block, InputError, Operation, OperationResult, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const MSG_ALREADY_REGISTERED: &str = "This name is already registered.";
pub const MSG_NAME_NOT_FOUND: &str = "Name not found.";
pub const MSG_CANNOT_VALIDATE: &str = "Cannot validate name and public key";
pub const MSG_UPDATE_NOT_FOUND: &str = "cannot find the name and old public key";
pub const MSG_KEY_IN_USE: &str = "The new public key is already in use.";

/// Current bindings plus the set of revoked keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    by_name: HashMap<String, String>,
    by_key: HashMap<String, String>,
    revoked: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key currently bound to `name`.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Name currently bound to `key`.
    pub fn owner_of(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn is_revoked(&self, key: &str) -> bool {
        self.revoked.contains(key)
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn key_available(&self, key: &str) -> bool {
        !self.by_key.contains_key(key) && !self.revoked.contains(key)
    }

    /// Work out what `op` yields against the current bindings.
    pub fn resolve(&self, op: &Operation) -> OperationResult {
        match op {
            Operation::Register { name, public_key } => {
                if self.by_name.contains_key(name) || !self.key_available(public_key) {
                    OperationResult::failure(MSG_ALREADY_REGISTERED)
                } else {
                    OperationResult::success()
                }
            }
            Operation::Query { name } => match self.lookup(name) {
                Some(key) => OperationResult::success_with_key(key),
                None => OperationResult::failure(MSG_NAME_NOT_FOUND),
            },
            Operation::Validate { name, public_key } => {
                if self.lookup(name) == Some(public_key.as_str()) {
                    OperationResult::success_with_key(public_key.as_str())
                } else {
                    OperationResult::failure(MSG_CANNOT_VALIDATE)
                }
            }
            Operation::Update {
                name,
                old_key,
                new_key,
            } => {
                if self.lookup(name) != Some(old_key.as_str()) {
                    OperationResult::failure(MSG_UPDATE_NOT_FOUND)
                } else if !self.key_available(new_key) {
                    OperationResult::failure(MSG_KEY_IN_USE)
                } else {
                    OperationResult::success_with_key(new_key.as_str())
                }
            }
            Operation::Revoke { public_key } => {
                if self.by_key.contains_key(public_key) {
                    OperationResult::success()
                } else {
                    OperationResult::silent_failure()
                }
            }
        }
    }

    /// Fold one committed transaction into the bindings.
    ///
    /// Failed transactions are part of the record but change nothing, and so
    /// does a recorded success that no longer resolves against the current
    /// bindings (two registers resolved against the same older chain).
    pub fn apply(&mut self, tx: &Transaction) {
        if !tx.result().success {
            return;
        }
        if !self.resolve(tx.operation()).success {
            debug!(
                kind = %tx.operation().kind(),
                hash = %tx.hash(),
                "committed transaction no longer applies"
            );
            return;
        }
        match tx.operation() {
            Operation::Register { name, public_key } => {
                self.by_name.insert(name.clone(), public_key.clone());
                self.by_key.insert(public_key.clone(), name.clone());
            }
            Operation::Update {
                name,
                old_key,
                new_key,
            } => {
                self.by_key.remove(old_key);
                self.revoked.insert(old_key.clone());
                self.by_name.insert(name.clone(), new_key.clone());
                self.by_key.insert(new_key.clone(), name.clone());
            }
            Operation::Revoke { public_key } => {
                if let Some(name) = self.by_key.remove(public_key) {
                    self.by_name.remove(&name);
                }
                self.revoked.insert(public_key.clone());
            }
            Operation::Query { .. } | Operation::Validate { .. } => {}
        }
    }

    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply(tx);
        }
    }
}

/// Validate `op`, resolve it against `ledger` and wrap it in a transaction
/// submitted by `generator`.
pub fn build_transaction(
    ledger: &Ledger,
    generator: &str,
    op: Operation,
) -> Result<Transaction, InputError> {
    op.validate()?;
    let result = ledger.registry().resolve(&op);
    Ok(Transaction::new(generator, op, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(op: Operation) -> Transaction {
        let registry = Registry::new();
        let result = registry.resolve(&op);
        Transaction::new("client", op, result)
    }

    fn apply_resolved(registry: &mut Registry, op: Operation) -> OperationResult {
        let result = registry.resolve(&op);
        registry.apply(&Transaction::new("client", op, result.clone()));
        result
    }

    fn register(name: &str, key: &str) -> Operation {
        Operation::Register {
            name: name.into(),
            public_key: key.into(),
        }
    }

    #[test]
    fn test_register_then_query() {
        let mut registry = Registry::new();
        assert!(apply_resolved(&mut registry, register("alice", "PK1")).success);

        let result = registry.resolve(&Operation::Query {
            name: "alice".into(),
        });
        assert_eq!(result, OperationResult::success_with_key("PK1"));
        assert_eq!(registry.owner_of("PK1"), Some("alice"));
    }

    #[test]
    fn test_duplicate_register_fails() {
        let mut registry = Registry::new();
        apply_resolved(&mut registry, register("alice", "PK1"));

        let same_name = registry.resolve(&register("alice", "PK2"));
        let same_key = registry.resolve(&register("bob", "PK1"));
        assert_eq!(same_name, OperationResult::failure(MSG_ALREADY_REGISTERED));
        assert_eq!(same_key, OperationResult::failure(MSG_ALREADY_REGISTERED));
    }

    #[test]
    fn test_query_unknown_name() {
        let registry = Registry::new();
        assert_eq!(
            registry.resolve(&Operation::Query { name: "eve".into() }),
            OperationResult::failure(MSG_NAME_NOT_FOUND)
        );
    }

    #[test]
    fn test_validate_binding() {
        let mut registry = Registry::new();
        apply_resolved(&mut registry, register("alice", "PK1"));

        let ok = registry.resolve(&Operation::Validate {
            name: "alice".into(),
            public_key: "PK1".into(),
        });
        let wrong = registry.resolve(&Operation::Validate {
            name: "alice".into(),
            public_key: "PK2".into(),
        });
        assert!(ok.success);
        assert_eq!(wrong, OperationResult::failure(MSG_CANNOT_VALIDATE));
    }

    #[test]
    fn test_update_rotates_key() {
        let mut registry = Registry::new();
        apply_resolved(&mut registry, register("alice", "PK1"));

        let result = apply_resolved(
            &mut registry,
            Operation::Update {
                name: "alice".into(),
                old_key: "PK1".into(),
                new_key: "PK2".into(),
            },
        );
        assert_eq!(result, OperationResult::success_with_key("PK2"));
        assert_eq!(registry.lookup("alice"), Some("PK2"));
        assert!(registry.is_revoked("PK1"));
        assert_eq!(registry.owner_of("PK1"), None);
    }

    #[test]
    fn test_update_with_wrong_old_key() {
        let mut registry = Registry::new();
        apply_resolved(&mut registry, register("alice", "PK1"));

        let result = registry.resolve(&Operation::Update {
            name: "alice".into(),
            old_key: "PK9".into(),
            new_key: "PK2".into(),
        });
        assert_eq!(result, OperationResult::failure(MSG_UPDATE_NOT_FOUND));
    }

    #[test]
    fn test_revoke_frees_name_but_not_key() {
        let mut registry = Registry::new();
        apply_resolved(&mut registry, register("alice", "PK1"));

        let revoked = apply_resolved(
            &mut registry,
            Operation::Revoke {
                public_key: "PK1".into(),
            },
        );
        assert!(revoked.success);
        assert!(registry.is_empty());

        assert!(registry.resolve(&register("alice", "PK2")).success);
        assert!(!registry.resolve(&register("alice", "PK1")).success);
    }

    #[test]
    fn test_revoke_unknown_key_is_silent() {
        let registry = Registry::new();
        assert_eq!(
            registry.resolve(&Operation::Revoke {
                public_key: "PK1".into()
            }),
            OperationResult::silent_failure()
        );
    }

    #[test]
    fn test_failed_transactions_do_not_apply() {
        let mut registry = Registry::new();
        let failed = Transaction::new(
            "client",
            register("alice", "PK1"),
            OperationResult::failure(MSG_ALREADY_REGISTERED),
        );
        registry.apply(&failed);
        assert!(registry.is_empty());

        registry.apply(&committed(register("alice", "PK1")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_committed_registers_keep_maps_inverse() {
        let mut registry = Registry::new();
        // Both resolved against an empty chain, so both carry success.
        registry.apply(&committed(register("alice", "PK1")));
        registry.apply(&committed(register("alice", "PK2")));
        registry.apply(&committed(register("bob", "PK1")));

        assert_eq!(registry.lookup("alice"), Some("PK1"));
        assert_eq!(registry.owner_of("PK1"), Some("alice"));
        assert_eq!(registry.owner_of("PK2"), None);
        assert_eq!(registry.lookup("bob"), None);

        apply_resolved(
            &mut registry,
            Operation::Revoke {
                public_key: "PK1".into(),
            },
        );
        assert_eq!(registry.lookup("alice"), None);
        assert_eq!(registry.owner_of("PK1"), None);
        assert_eq!(registry.owner_of("PK2"), None);
        assert!(registry.is_empty());

        // PK2 was never bound, so it is still free to register.
        assert!(apply_resolved(&mut registry, register("alice", "PK2")).success);
        assert_eq!(registry.owner_of("PK2"), Some("alice"));
    }

    #[test]
    fn test_build_transaction_rejects_bad_name() {
        let ledger = Ledger::new();
        let long = "x".repeat(256);
        let result = build_transaction(&ledger, "client", register(&long, "PK1"));
        assert_eq!(result, Err(InputError::InvalidName(256)));

        let empty = build_transaction(&ledger, "client", register("", "PK1"));
        assert_eq!(empty, Err(InputError::InvalidName(0)));
    }

    #[test]
    fn test_build_transaction_resolves_against_ledger() {
        let ledger = Ledger::new();
        let tx = build_transaction(&ledger, "client", Operation::Query { name: "bob".into() })
            .unwrap();
        assert_eq!(tx.result(), &OperationResult::failure(MSG_NAME_NOT_FOUND));
        assert_eq!(tx.generator_address(), "client");
        assert!(tx.is_hash_valid());
    }
}
