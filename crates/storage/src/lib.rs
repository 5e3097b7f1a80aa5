//! Persistent storage layer for pkchain.
//!
//! A validator started with a data directory keeps its confirmed blocks
//! here and replays them into a ledger at start-up.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Validator runtime              │
//! └──────────────────────┬──────────────────────┘
//!                        │
//! ┌──────────────────────▼──────────────────────┐
//! │                Storage Layer                │
//! │  ┌─────────────────┐  ┌──────────────────┐  │
//! │  │ ChainStore      │  │ Storage (DB)     │  │
//! │  │  - Blocks       │  │  - sled wrapper  │  │
//! │  │  - Id index     │  │  - serialization │  │
//! │  │  - Head pointer │  │  - key helpers   │  │
//! │  └─────────────────┘  └──────────────────┘  │
//! └──────────────────────┬──────────────────────┘
//!                        │
//! ┌──────────────────────▼──────────────────────┐
//! │                sled Database                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use pkchain_storage::{ChainStore, Storage};
//! use pkchain_core::Block;
//!
//! let storage = Storage::open("./pkchain_data").unwrap();
//! let chain = ChainStore::new(storage);
//! if !chain.is_initialized().unwrap() {
//!     chain.init_genesis(&Block::genesis()).unwrap();
//! }
//! let blocks = chain.load_chain().unwrap();
//! ```

pub mod chain;
pub mod db;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{BatchOp, Result, Storage, StorageError};
