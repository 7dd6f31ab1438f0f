use crate::error::Result;
use crate::storage::Storage;
use crate::types::{SettlementKind, SettlementRecord, SettlementState};
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

/// Audit log of settlement events. The room layer owns the authoritative
/// room/seat records; this store only answers "what did the engine do and
/// which txids came out of it".
pub struct SettlementStore<'a> {
    storage: &'a Storage,
}

impl<'a> SettlementStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn record_event(&self, record: &SettlementRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO settlements
             (id, room_id, kind, state, txid, failure, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.room_id,
                serde_json::to_string(&record.kind)?,
                serde_json::to_string(&record.state)?,
                record.txid,
                record.failure,
                record.created_at.timestamp(),
                record.updated_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn update_state(
        &self,
        id: Uuid,
        state: &SettlementState,
        txid: Option<&str>,
        failure: Option<&str>,
    ) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE settlements
             SET state = ?2, txid = COALESCE(?3, txid), failure = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(state)?,
                txid,
                failure,
                Utc::now().timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Option<SettlementRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, room_id, kind, state, txid, failure, created_at, updated_at
             FROM settlements WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id.to_string()], row_to_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn events_for_room(&self, room_id: &str) -> Result<Vec<SettlementRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, room_id, kind, state, txid, failure, created_at, updated_at
             FROM settlements WHERE room_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![room_id], row_to_record)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SettlementRecord> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(2)?;
    let state_str: String = row.get(3)?;
    let created_ts: i64 = row.get(6)?;
    let updated_ts: i64 = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, "id".to_string(), rusqlite::types::Type::Text)
    })?;

    let kind: SettlementKind = serde_json::from_str(&kind_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, "kind".to_string(), rusqlite::types::Type::Text)
    })?;

    let state: SettlementState = serde_json::from_str(&state_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(3, "state".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(SettlementRecord {
        id,
        room_id: row.get(1)?,
        kind,
        state,
        txid: row.get(4)?,
        failure: row.get(5)?,
        created_at: DateTime::from_timestamp(created_ts, 0).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp(updated_ts, 0).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("potline.db")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_record_and_fetch_roundtrip() {
        let (_dir, storage) = storage().await;
        let store = SettlementStore::new(&storage);

        let record = SettlementRecord::new("room-1", SettlementKind::Payout);
        store.record_event(&record).await.unwrap();

        let fetched = store.get_event(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.room_id, "room-1");
        assert_eq!(fetched.kind, SettlementKind::Payout);
        assert_eq!(fetched.state, SettlementState::Collecting);
        assert!(fetched.txid.is_none());
    }

    #[tokio::test]
    async fn test_state_updates_keep_txid() {
        let (_dir, storage) = storage().await;
        let store = SettlementStore::new(&storage);

        let record = SettlementRecord::new("room-1", SettlementKind::Refund);
        store.record_event(&record).await.unwrap();

        store
            .update_state(record.id, &SettlementState::Submitted, Some("txid-abc"), None)
            .await
            .unwrap();
        store
            .update_state(record.id, &SettlementState::Confirmed, None, None)
            .await
            .unwrap();

        let fetched = store.get_event(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, SettlementState::Confirmed);
        assert_eq!(fetched.txid.as_deref(), Some("txid-abc"));
    }

    #[tokio::test]
    async fn test_events_for_room_filters() {
        let (_dir, storage) = storage().await;
        let store = SettlementStore::new(&storage);

        store
            .record_event(&SettlementRecord::new("room-1", SettlementKind::Payout))
            .await
            .unwrap();
        store
            .record_event(&SettlementRecord::new("room-2", SettlementKind::Payout))
            .await
            .unwrap();

        let events = store.events_for_room("room-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].room_id, "room-1");

        assert!(store.events_for_room("room-3").await.unwrap().is_empty());
    }
}
