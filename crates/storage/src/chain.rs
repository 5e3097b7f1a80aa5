//! Confirmed block storage and chain head tracking.

use crate::db::{BatchOp, Result, Storage, StorageError};
use pkchain_core::{Block, BlockId, Hash};
use tracing::debug;

/// Keys for chain metadata.
const CHAIN_HEAD_KEY: &[u8] = b"chain:head";
const CHAIN_HEIGHT_KEY: &[u8] = b"chain:height";

/// Stores confirmed blocks by hash, with an id index and a head pointer.
#[derive(Clone)]
pub struct ChainStore {
    storage: Storage,
}

impl ChainStore {
    /// Create a new ChainStore over the given storage.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Write a block, its id index entry and the new head in one batch.
    ///
    /// - Primary: `block:hash:{hash}` → full block data
    /// - Secondary: `block:height:{id}` → hash
    fn write_block(&self, block: &Block) -> Result<()> {
        let hash = block.hash();
        self.storage.batch(vec![
            BatchOp::Insert {
                key: Storage::block_hash_key(&hash),
                value: Storage::encode(block)?,
            },
            BatchOp::Insert {
                key: Storage::block_height_key(block.id),
                value: Storage::encode(&hash)?,
            },
            BatchOp::Insert {
                key: CHAIN_HEAD_KEY.to_vec(),
                value: Storage::encode(&hash)?,
            },
            BatchOp::Insert {
                key: CHAIN_HEIGHT_KEY.to_vec(),
                value: Storage::encode(&block.id)?,
            },
        ])
    }

    /// Get a block by its hash.
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        self.storage.get(Storage::block_hash_key(hash))
    }

    /// Get a block by its id.
    pub fn get_block_by_height(&self, height: BlockId) -> Result<Option<Block>> {
        let hash: Option<Hash> = self.storage.get(Storage::block_height_key(height))?;

        match hash {
            Some(h) => self.get_block_by_hash(&h),
            None => Ok(None),
        }
    }

    /// Check if a block exists by hash.
    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        self.storage.contains(Storage::block_hash_key(hash))
    }

    /// Get the current chain head hash.
    pub fn get_head(&self) -> Result<Option<Hash>> {
        self.storage.get(CHAIN_HEAD_KEY)
    }

    /// Get the current chain height.
    /// Returns 0 if the chain is not initialized.
    pub fn get_height(&self) -> Result<BlockId> {
        Ok(self.storage.get::<_, u64>(CHAIN_HEIGHT_KEY)?.unwrap_or(0))
    }

    /// Get the latest block.
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        match self.get_head()? {
            Some(hash) => self.get_block_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// Initialize the store with the genesis block.
    pub fn init_genesis(&self, genesis: &Block) -> Result<()> {
        if !genesis.is_genesis() {
            return Err(StorageError::InvalidGenesis(format!(
                "block {} is not a genesis block",
                genesis.id
            )));
        }

        if self.is_initialized()? {
            return Err(StorageError::InvalidGenesis(
                "Chain already initialized".into(),
            ));
        }

        self.write_block(genesis)
    }

    /// Check if the chain is initialized (has a genesis block).
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.get_head()?.is_some())
    }

    /// Append a confirmed block.
    ///
    /// Only the id sequence and the previous-hash link are checked here; the
    /// ledger validates proofs before a block reaches storage.
    pub fn append_block(&self, block: &Block) -> Result<()> {
        let head = self
            .get_head()?
            .ok_or_else(|| StorageError::ChainMismatch("chain not initialized".into()))?;
        let height = self.get_height()?;

        if block.id != height + 1 {
            return Err(StorageError::ChainMismatch(format!(
                "expected block id {}, got {}",
                height + 1,
                block.id
            )));
        }

        if block.previous_hash != head {
            return Err(StorageError::ChainMismatch(format!(
                "previous hash {} doesn't match chain head {}",
                block.previous_hash, head
            )));
        }

        self.write_block(block)?;
        debug!(block_id = block.id, hash = %block.hash(), "block stored");
        Ok(())
    }

    /// Get blocks in a range [from_height, to_height].
    pub fn get_blocks_range(&self, from_height: BlockId, to_height: BlockId) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for height in from_height..=to_height {
            match self.get_block_by_height(height)? {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        Ok(blocks)
    }

    /// Load the whole stored chain, genesis first.
    ///
    /// Returns an empty list for an uninitialized store.
    pub fn load_chain(&self) -> Result<Vec<Block>> {
        if !self.is_initialized()? {
            return Ok(Vec::new());
        }
        self.get_blocks_range(0, self.get_height()?)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkchain_core::{BlockStatus, Operation, OperationResult, Transaction};

    fn setup() -> ChainStore {
        ChainStore::new(Storage::open_temporary().unwrap())
    }

    fn confirmed_child(parent: &Block, name: &str) -> Block {
        let tx = Transaction::new(
            "client",
            Operation::Register {
                name: name.into(),
                public_key: format!("{name}-key"),
            },
            OperationResult::success(),
        );
        let mut block = Block::draft(parent, vec![tx], "v1").unwrap();
        let proof = block.compute_hash();
        block.set_hash(proof);
        block.generation_proof = Some(proof);
        block.status = BlockStatus::Confirmed;
        block
    }

    #[test]
    fn test_genesis_init() {
        let chain = setup();
        assert!(!chain.is_initialized().unwrap());

        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        assert!(chain.is_initialized().unwrap());
        assert_eq!(chain.get_height().unwrap(), 0);
        assert_eq!(chain.get_head().unwrap(), Some(genesis.hash()));
    }

    #[test]
    fn test_genesis_double_init_fails() {
        let chain = setup();
        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        let result = chain.init_genesis(&genesis);
        assert!(matches!(result, Err(StorageError::InvalidGenesis(_))));
    }

    #[test]
    fn test_non_genesis_as_genesis_fails() {
        let chain = setup();
        let block = confirmed_child(&Block::genesis(), "alice");

        let result = chain.init_genesis(&block);
        assert!(matches!(result, Err(StorageError::InvalidGenesis(_))));
    }

    #[test]
    fn test_block_lookup() {
        let chain = setup();
        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        let by_hash = chain.get_block_by_hash(&genesis.hash()).unwrap().unwrap();
        let by_height = chain.get_block_by_height(0).unwrap().unwrap();
        assert_eq!(by_hash, genesis);
        assert_eq!(by_height, genesis);
        assert!(chain.get_block_by_height(1).unwrap().is_none());
        assert!(chain.has_block(&genesis.hash()).unwrap());
        assert!(!chain.has_block(&Hash::ZERO).unwrap());
    }

    #[test]
    fn test_append_block() {
        let chain = setup();
        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        let block1 = confirmed_child(&genesis, "alice");
        chain.append_block(&block1).unwrap();
        let block2 = confirmed_child(&block1, "bob");
        chain.append_block(&block2).unwrap();

        assert_eq!(chain.get_height().unwrap(), 2);
        assert_eq!(chain.get_head().unwrap(), Some(block2.hash()));
        assert_eq!(chain.get_latest_block().unwrap(), Some(block2));
    }

    #[test]
    fn test_append_before_genesis_fails() {
        let chain = setup();
        let block = confirmed_child(&Block::genesis(), "alice");
        assert!(matches!(
            chain.append_block(&block),
            Err(StorageError::ChainMismatch(_))
        ));
    }

    #[test]
    fn test_append_wrong_id_fails() {
        let chain = setup();
        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        let mut block = confirmed_child(&genesis, "alice");
        block.id = 5;
        assert!(matches!(
            chain.append_block(&block),
            Err(StorageError::ChainMismatch(_))
        ));
    }

    #[test]
    fn test_append_wrong_prev_hash_fails() {
        let chain = setup();
        let genesis = Block::genesis();
        chain.init_genesis(&genesis).unwrap();

        let block1 = confirmed_child(&genesis, "alice");
        let orphan = confirmed_child(&block1, "bob");
        let mut wrong = orphan.clone();
        wrong.id = 1;

        assert!(matches!(
            chain.append_block(&wrong),
            Err(StorageError::ChainMismatch(_))
        ));
    }

    #[test]
    fn test_load_chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = Block::genesis();
        let block1 = confirmed_child(&genesis, "alice");

        {
            let chain = ChainStore::new(Storage::open(dir.path()).unwrap());
            assert!(chain.load_chain().unwrap().is_empty());
            chain.init_genesis(&genesis).unwrap();
            chain.append_block(&block1).unwrap();
            chain.flush().unwrap();
        }

        let chain = ChainStore::new(Storage::open(dir.path()).unwrap());
        let blocks = chain.load_chain().unwrap();
        assert_eq!(blocks, vec![genesis, block1]);
        assert_eq!(blocks[1].cached_hash(), blocks[1].generation_proof);
    }
}
