//! PKI transactions: one name/key operation plus its resolved result.

use crate::encoding::CanonicalEncoder;
use crate::hash::{hash, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current transaction format version.
pub const TRANSACTION_VERSION: u32 = 0;

/// Longest accepted name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Largest accepted key material, in bytes.
pub const MAX_KEY_LEN: usize = 16 * 1024;

/// Errors raised when client-supplied operation inputs are malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("the name value must be between 1-255 characters (got {0})")]
    InvalidName(usize),

    #[error("{field} is incorrectly formatted: {reason}")]
    InvalidKey { field: &'static str, reason: String },

    #[error("malformed operation payload: {0}")]
    Payload(String),
}

/// Category of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Standard,
    Admin,
}

impl TransactionType {
    fn tag(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Admin => 1,
        }
    }
}

/// Discriminant of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Register,
    Query,
    Validate,
    Update,
    Revoke,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::Query => "QUERY",
            Self::Validate => "VALIDATE",
            Self::Update => "UPDATE",
            Self::Revoke => "REVOKE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The PKI operation a transaction records.
///
/// Its JSON form has a single upper-case top-level key naming the operation,
/// e.g. `{"REGISTER":{"name":"alice","public_key":"..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum Operation {
    Register { name: String, public_key: String },
    Query { name: String },
    Validate { name: String, public_key: String },
    Update { name: String, old_key: String, new_key: String },
    Revoke { public_key: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Register { .. } => OperationKind::Register,
            Self::Query { .. } => OperationKind::Query,
            Self::Validate { .. } => OperationKind::Validate,
            Self::Update { .. } => OperationKind::Update,
            Self::Revoke { .. } => OperationKind::Revoke,
        }
    }

    /// The name this operation refers to, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Register { name, .. }
            | Self::Query { name }
            | Self::Validate { name, .. }
            | Self::Update { name, .. } => Some(name),
            Self::Revoke { .. } => None,
        }
    }

    /// Check name length and key material well-formedness.
    pub fn validate(&self) -> Result<(), InputError> {
        if let Some(name) = self.name() {
            validate_name(name)?;
        }
        match self {
            Self::Register { public_key, .. } | Self::Validate { public_key, .. } => {
                validate_key("public key", public_key)
            }
            Self::Update {
                old_key, new_key, ..
            } => {
                validate_key("old public key", old_key)?;
                validate_key("new public key", new_key)
            }
            Self::Revoke { public_key } => validate_key("public key", public_key),
            Self::Query { .. } => Ok(()),
        }
    }

    /// Encode as the logical JSON payload.
    pub fn to_json(&self) -> Result<String, InputError> {
        serde_json::to_string(self).map_err(|e| InputError::Payload(e.to_string()))
    }

    /// Decode the logical JSON payload, rejecting unknown operation kinds.
    pub fn from_json(s: &str) -> Result<Self, InputError> {
        serde_json::from_str(s).map_err(|e| InputError::Payload(e.to_string()))
    }

    fn encode(&self, enc: &mut CanonicalEncoder) {
        match self {
            Self::Register { name, public_key } => {
                enc.put_u8(0).put_str(name).put_str(public_key);
            }
            Self::Query { name } => {
                enc.put_u8(1).put_str(name);
            }
            Self::Validate { name, public_key } => {
                enc.put_u8(2).put_str(name).put_str(public_key);
            }
            Self::Update {
                name,
                old_key,
                new_key,
            } => {
                enc.put_u8(3).put_str(name).put_str(old_key).put_str(new_key);
            }
            Self::Revoke { public_key } => {
                enc.put_u8(4).put_str(public_key);
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), InputError> {
    let len = name.chars().count();
    if len < 1 || len > MAX_NAME_LEN {
        return Err(InputError::InvalidName(len));
    }
    Ok(())
}

fn validate_key(field: &'static str, key: &str) -> Result<(), InputError> {
    let invalid = |reason: &str| InputError::InvalidKey {
        field,
        reason: reason.to_string(),
    };

    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(invalid("key material is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key material is too large"));
    }
    if key.contains('\0') {
        return Err(invalid("key material contains NUL bytes"));
    }
    if let Some(rest) = trimmed.strip_prefix("-----BEGIN ") {
        let label = rest.split("-----").next().unwrap_or_default();
        let footer = format!("-----END {label}-----");
        if label.is_empty() || !trimmed.ends_with(&footer) {
            return Err(invalid("PEM header without matching footer"));
        }
    }
    Ok(())
}

/// Outcome of resolving an operation against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    /// Key returned by a successful query/validate/update.
    pub public_key: Option<String>,
    /// Human readable detail, usually on failure.
    pub message: Option<String>,
}

impl OperationResult {
    pub fn success() -> Self {
        Self {
            success: true,
            public_key: None,
            message: None,
        }
    }

    pub fn success_with_key(public_key: impl Into<String>) -> Self {
        Self {
            success: true,
            public_key: Some(public_key.into()),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            public_key: None,
            message: Some(message.into()),
        }
    }

    /// A failure without detail (revocation of an unknown key).
    pub fn silent_failure() -> Self {
        Self {
            success: false,
            public_key: None,
            message: None,
        }
    }

    fn encode(&self, enc: &mut CanonicalEncoder) {
        enc.put_bool(self.success)
            .put_opt_str(self.public_key.as_deref())
            .put_opt_str(self.message.as_deref());
    }
}

/// A transaction on the ledger.
///
/// Immutable once built: fields are read through accessors and the builder
/// methods consume the value and re-hash it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    version: u32,
    transaction_id: u64,
    transaction_type: TransactionType,
    generator_address: String,
    operation: Operation,
    result: OperationResult,
    timestamp: u64,
    lock_time: u64,
    hash: Hash,
}

impl Transaction {
    /// Create a standard transaction with a random id, stamped with the current time.
    pub fn new(
        generator_address: impl Into<String>,
        operation: Operation,
        result: OperationResult,
    ) -> Self {
        let mut tx = Self {
            version: TRANSACTION_VERSION,
            transaction_id: rand::random(),
            transaction_type: TransactionType::Standard,
            generator_address: generator_address.into(),
            operation,
            result,
            timestamp: current_timestamp(),
            lock_time: 0,
            hash: Hash::ZERO,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    pub fn with_id(mut self, transaction_id: u64) -> Self {
        self.transaction_id = transaction_id;
        self.rehash()
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self.rehash()
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self.rehash()
    }

    pub fn with_lock_time(mut self, lock_time: u64) -> Self {
        self.lock_time = lock_time;
        self.rehash()
    }

    fn rehash(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }

    /// Hash over every field except the stored hash.
    pub fn compute_hash(&self) -> Hash {
        let mut enc = CanonicalEncoder::new();
        enc.put_u32(self.version)
            .put_u64(self.transaction_id)
            .put_u8(self.transaction_type.tag())
            .put_str(&self.generator_address);
        self.operation.encode(&mut enc);
        self.result.encode(&mut enc);
        enc.put_u64(self.timestamp).put_u64(self.lock_time);
        hash(&enc.finish())
    }

    /// The stored hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Check that the stored hash matches the contents (detects tampering in transit).
    pub fn is_hash_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn generator_address(&self) -> &str {
        &self.generator_address
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn result(&self) -> &OperationResult {
        &self.result
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn lock_time(&self) -> u64 {
        self.lock_time
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (id {}, success {}) {}",
            self.operation.kind(),
            self.operation.name().unwrap_or("-"),
            self.transaction_id,
            self.result.success,
            self.hash
        )
    }
}

/// Get the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
