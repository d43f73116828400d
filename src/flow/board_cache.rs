use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FlowLensError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: u64,
    pub name: String,
    /// Parent board, when the source reports it
    pub board_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub id: u64,
    pub name: String,
}

/// Secondary lookups needed by the legacy column-addressed board scheme.
#[allow(async_fn_in_trait)]
pub trait BoardDirectory {
    async fn column(&self, id: u64) -> Result<ColumnInfo>;
    async fn board(&self, id: u64) -> Result<BoardInfo>;
}

/// Backing storage for resolved names.
pub trait NameStore {
    fn column(&self, id: u64) -> Option<ColumnInfo>;
    fn board(&self, id: u64) -> Option<BoardInfo>;
    fn remember_column(&mut self, column: ColumnInfo);
    fn remember_board(&mut self, board: BoardInfo);

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    columns: HashMap<u64, ColumnInfo>,
    boards: HashMap<u64, BoardInfo>,
}

impl NameStore for MemoryStore {
    fn column(&self, id: u64) -> Option<ColumnInfo> {
        self.columns.get(&id).cloned()
    }

    fn board(&self, id: u64) -> Option<BoardInfo> {
        self.boards.get(&id).cloned()
    }

    fn remember_column(&mut self, column: ColumnInfo) {
        self.columns.insert(column.id, column);
    }

    fn remember_board(&mut self, board: BoardInfo) {
        self.boards.insert(board.id, board);
    }
}

/// Name store persisted as JSON between runs.
///
/// Lives in the platform cache directory:
/// - Linux: `~/.cache/flowlens/github/{org}.json`
/// - macOS: `~/Library/Caches/flowlens/github/{org}.json`
pub struct FileStore {
    path: PathBuf,
    names: MemoryStore,
}

impl FileStore {
    /// Opens the per-organization store in the platform cache directory.
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory cannot be determined or created.
    pub fn for_org(org: &str) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| FlowLensError::Cache("No cache directory found".into()))?
            .join("flowlens")
            .join("github");

        fs::create_dir_all(&cache_dir)?;
        Ok(Self::at(cache_dir.join(format!("{org}.json"))))
    }

    /// Opens a store at an explicit path, starting empty if it is unreadable.
    pub fn at(path: PathBuf) -> Self {
        let names = if path.exists() {
            fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .inspect(|_| debug!("Loaded board names from: {}", path.display()))
                .unwrap_or_else(|| {
                    warn!("Failed to load board name cache, starting empty");
                    MemoryStore::default()
                })
        } else {
            MemoryStore::default()
        };

        Self { path, names }
    }
}

impl NameStore for FileStore {
    fn column(&self, id: u64) -> Option<ColumnInfo> {
        self.names.column(id)
    }

    fn board(&self, id: u64) -> Option<BoardInfo> {
        self.names.board(id)
    }

    fn remember_column(&mut self, column: ColumnInfo) {
        self.names.remember_column(column);
    }

    fn remember_board(&mut self, board: BoardInfo) {
        self.names.remember_board(board);
    }

    fn persist(&self) -> Result<()> {
        let content = serde_json::to_string(&self.names)?;
        fs::write(&self.path, content)?;
        info!("Board name cache saved: {}", self.path.display());
        Ok(())
    }
}

/// Read-through cache in front of a [`BoardDirectory`].
///
/// Failed lookups are remembered for the rest of the run so an unknown id
/// costs at most one request, but they are never persisted.
pub struct BoardNameCache<S = MemoryStore> {
    store: S,
    missing_columns: HashSet<u64>,
    missing_boards: HashSet<u64>,
    lookups: usize,
}

impl Default for BoardNameCache<MemoryStore> {
    fn default() -> Self {
        Self::new(MemoryStore::default())
    }
}

impl<S: NameStore> BoardNameCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            missing_columns: HashSet::new(),
            missing_boards: HashSet::new(),
            lookups: 0,
        }
    }

    /// Number of directory requests issued so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub async fn column<D: BoardDirectory>(
        &mut self,
        directory: &D,
        id: u64,
    ) -> Result<Option<ColumnInfo>> {
        if let Some(column) = self.store.column(id) {
            debug!("Cache hit for column {id}");
            return Ok(Some(column));
        }
        if self.missing_columns.contains(&id) {
            return Ok(None);
        }

        self.lookups += 1;
        match directory.column(id).await {
            Ok(column) => {
                self.store.remember_column(column.clone());
                Ok(Some(column))
            }
            Err(err) if recoverable(&err) => {
                warn!("Could not resolve column {id}: {err}");
                self.missing_columns.insert(id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn board<D: BoardDirectory>(
        &mut self,
        directory: &D,
        id: u64,
    ) -> Result<Option<BoardInfo>> {
        if let Some(board) = self.store.board(id) {
            debug!("Cache hit for board {id}");
            return Ok(Some(board));
        }
        if self.missing_boards.contains(&id) {
            return Ok(None);
        }

        self.lookups += 1;
        match directory.board(id).await {
            Ok(board) => {
                self.store.remember_board(board.clone());
                Ok(Some(board))
            }
            Err(err) if recoverable(&err) => {
                warn!("Could not resolve board {id}: {err}");
                self.missing_boards.insert(id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn persist(&self) -> Result<()> {
        self.store.persist()
    }
}

fn recoverable(err: &FlowLensError) -> bool {
    !matches!(err, FlowLensError::Cancelled | FlowLensError::RateLimited)
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeDirectory;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hit_is_served_without_second_lookup() {
        let directory = FakeDirectory::default().with_column(10, "In Progress", 3);
        let mut cache: BoardNameCache = BoardNameCache::default();

        let first = cache.column(&directory, 10).await.unwrap();
        let second = cache.column(&directory, 10).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().name, "In Progress");
        assert_eq!(directory.column_calls.get(), 1);
        assert_eq!(cache.lookups(), 1);
    }

    #[tokio::test]
    async fn miss_is_remembered_for_the_run() {
        let directory = FakeDirectory::default();
        let mut cache: BoardNameCache = BoardNameCache::default();

        assert!(cache.board(&directory, 99).await.unwrap().is_none());
        assert!(cache.board(&directory, 99).await.unwrap().is_none());
        assert_eq!(directory.board_calls.get(), 1);
    }

    struct RateLimitedDirectory;

    impl BoardDirectory for RateLimitedDirectory {
        async fn column(&self, _id: u64) -> Result<ColumnInfo> {
            Err(FlowLensError::RateLimited)
        }

        async fn board(&self, _id: u64) -> Result<BoardInfo> {
            Err(FlowLensError::Cancelled)
        }
    }

    #[tokio::test]
    async fn quota_and_cancellation_are_not_swallowed() {
        let mut cache: BoardNameCache = BoardNameCache::default();
        assert!(matches!(
            cache.column(&RateLimitedDirectory, 1).await,
            Err(FlowLensError::RateLimited)
        ));
        assert!(matches!(
            cache.board(&RateLimitedDirectory, 1).await,
            Err(FlowLensError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn file_store_persists_hits_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.json");
        let directory = FakeDirectory::default().with_board(5, "Delivery");

        let mut cache = BoardNameCache::new(FileStore::at(path.clone()));
        cache.board(&directory, 5).await.unwrap();
        cache.persist().unwrap();

        let mut warm = BoardNameCache::new(FileStore::at(path));
        let board = warm.board(&directory, 5).await.unwrap().unwrap();
        assert_eq!(board.name, "Delivery");
        assert_eq!(directory.board_calls.get(), 1);
        assert_eq!(warm.lookups(), 0);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::at(path);
        assert!(store.column(1).is_none());
    }
}
