//! Append-only position log in SQLite.
//!
//! Rows are only ever inserted. Ordering is by rowid, which matches
//! insertion order.

use crate::db::DbPool;
use crate::error::StoreError;

use super::Position;

/// Handle to the position log. Cheap to clone.
#[derive(Clone)]
pub struct PositionStore {
    db: DbPool,
}

impl PositionStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// The underlying connection.
    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Append a fix.
    pub fn insert(&self, position: &Position) -> Result<(), StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO positions (latitude, longitude, timestamp) VALUES (?1, ?2, ?3)",
            rusqlite::params![position.latitude, position.longitude, position.timestamp],
        )?;
        Ok(())
    }

    /// All fixes, oldest first. Rows that fail to decode are skipped.
    pub fn list_all(&self) -> Result<Vec<Position>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT latitude, longitude, timestamp FROM positions ORDER BY id")?;

        let positions = stmt
            .query_map([], row_to_position)?
            .filter_map(|row| match row {
                Ok(position) => Some(position),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable position row");
                    None
                }
            })
            .collect();

        Ok(positions)
    }

    /// The most recently inserted fix, if any.
    pub fn last_one(&self) -> Result<Option<Position>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT latitude, longitude, timestamp FROM positions ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map([], row_to_position)?;

        Ok(rows.next().transpose()?)
    }

    /// Run a store operation on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&PositionStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }
}

fn row_to_position(row: &rusqlite::Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        latitude: row.get(0)?,
        longitude: row.get(1)?,
        timestamp: row.get(2)?,
    })
}
