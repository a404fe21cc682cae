// ── Archive: hashing, append, queries ──────────────────────────────────────
//
// Event hash: sha256 over the canonical JSON array
//   [parent_hash|null, timestamp, session_key, event_type, agent_id, channel, peer, payload]
// with object keys sorted at every depth. Because parent_hash is part of the
// input, altering any historical event changes its hash and orphans every
// descendant that points at the old value.

use super::ArchiveStore;
use crate::atoms::constants::TIMESTAMP_FORMAT;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{Event, EventRecord, EventType};
use crate::engine::{now_timestamp, sha256_hex};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

const EVENT_COLUMNS: &str =
    "event_hash, parent_hash, timestamp, session_key, event_type, agent_id, channel, peer, payload";

// ═════════════════════════════════════════════════════════════════════════════
// Hashing
// ═════════════════════════════════════════════════════════════════════════════

/// Serialize a JSON value with object keys sorted at every depth.
/// Independent of serde_json's map ordering features.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Recompute an event's hash from every field except `event_hash`.
pub fn hash_event(event: &Event) -> String {
    let record = serde_json::json!([
        event.parent_hash,
        event.timestamp,
        event.session_key,
        event.event_type.to_string(),
        event.agent_id,
        event.channel,
        event.peer,
        event.payload,
    ]);
    sha256_hex(canonical_json(&record).as_bytes())
}

fn normalize_timestamp(raw: &str) -> EngineResult<String> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
        EngineError::validation(vec![format!("timestamp {:?} is not RFC 3339: {}", raw, e)])
    })?;
    Ok(parsed.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string())
}

fn format_bound(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

// ═════════════════════════════════════════════════════════════════════════════
// Append
// ═════════════════════════════════════════════════════════════════════════════

impl ArchiveStore {
    /// Hash and persist a new event. Returns the hydrated event.
    ///
    /// A non-null `parent_hash` must name the current head of the same
    /// session, and a null one is only accepted for the session's first
    /// event. The archive never stores a dangling or forked parent of its
    /// own accord.
    pub fn append_event(&self, record: EventRecord) -> EngineResult<Event> {
        let conn = self.conn.lock();
        Self::append_locked(&conn, record)
    }

    /// Append with `parent_hash` set to the session's current head.
    pub fn append_to_session(&self, mut record: EventRecord) -> EngineResult<Event> {
        let conn = self.conn.lock();
        record.parent_hash = Self::session_head_locked(&conn, &record.session_key)?;
        Self::append_locked(&conn, record)
    }

    fn append_locked(conn: &Connection, record: EventRecord) -> EngineResult<Event> {
        if let Some(ref parent) = record.parent_hash {
            let parent_session: Option<String> = conn
                .query_row(
                    "SELECT session_key FROM events WHERE event_hash = ?1",
                    params![parent],
                    |row| row.get(0),
                )
                .optional()?;
            if parent_session.as_deref() != Some(record.session_key.as_str()) {
                return Err(EngineError::UnknownParent {
                    parent_hash: parent.clone(),
                    session_key: record.session_key,
                });
            }
        }

        let head = Self::session_head_locked(conn, &record.session_key)?;
        if head != record.parent_hash {
            return Err(EngineError::StaleParent {
                actual: record.parent_hash,
                head,
                session_key: record.session_key,
            });
        }

        let timestamp = match record.timestamp {
            Some(ref raw) => normalize_timestamp(raw)?,
            None => now_timestamp(),
        };

        let mut event = Event {
            event_hash: String::new(),
            parent_hash: record.parent_hash,
            timestamp,
            session_key: record.session_key,
            event_type: record.event_type,
            agent_id: record.agent_id,
            channel: record.channel,
            peer: record.peer,
            payload: record.payload,
        };
        event.event_hash = hash_event(&event);

        conn.execute(
            "INSERT INTO events (event_hash, parent_hash, timestamp, session_key, event_type,
                                 agent_id, channel, peer, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.event_hash,
                event.parent_hash,
                event.timestamp,
                event.session_key,
                event.event_type.to_string(),
                event.agent_id,
                event.channel,
                event.peer,
                canonical_json(&event.payload),
            ],
        )?;

        debug!(
            "[archive] Appended {} {} (session {})",
            event.event_type, event.event_hash, event.session_key
        );
        Ok(event)
    }

    fn session_head_locked(conn: &Connection, session_key: &str) -> EngineResult<Option<String>> {
        let head = conn
            .query_row(
                "SELECT event_hash FROM events WHERE session_key = ?1 ORDER BY seq DESC LIMIT 1",
                params![session_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(head)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Queries
// ═════════════════════════════════════════════════════════════════════════════

impl ArchiveStore {
    pub fn get_event_by_hash(&self, hash: &str) -> EngineResult<Option<Event>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM events WHERE event_hash = ?1", EVENT_COLUMNS);
        let event = conn
            .query_row(&sql, params![hash], Self::event_from_row)
            .optional()?;
        Ok(event)
    }

    /// All events of a session in insertion (chronological) order.
    pub fn get_events_by_session(&self, session_key: &str) -> EngineResult<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE session_key = ?1 ORDER BY seq ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_key], Self::event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The latest `n` events, oldest first.
    pub fn get_recent_events(&self, n: usize) -> EngineResult<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events ORDER BY seq DESC LIMIT ?1",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
            .query_map(params![n as i64], Self::event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// The latest `n` events written by `agent_id`, oldest first.
    pub fn get_recent_events_for_agent(&self, agent_id: &str, n: usize) -> EngineResult<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE agent_id = ?1 ORDER BY seq DESC LIMIT ?2",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
            .query_map(params![agent_id, n as i64], Self::event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Events with `start <= timestamp <= end`, chronological.
    pub fn get_events_by_time_range(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> EngineResult<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp ASC, seq ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![format_bound(start), format_bound(end)], Self::event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_event_count(&self) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Hash of the newest event in a session, if the session exists.
    pub fn get_session_head(&self, session_key: &str) -> EngineResult<Option<String>> {
        let conn = self.conn.lock();
        Self::session_head_locked(&conn, session_key)
    }

    // ── Event row mapper (column order must match EVENT_COLUMNS) ──

    fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
        let event_type_str: String = row.get(4)?;
        let event_type = event_type_str.parse::<EventType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;
        let payload_str: String = row.get(8)?;
        let payload = serde_json::from_str(&payload_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Event {
            event_hash: row.get(0)?,
            parent_hash: row.get(1)?,
            timestamp: row.get(2)?,
            session_key: row.get(3)?,
            event_type,
            agent_id: row.get(5)?,
            channel: row.get(6)?,
            peer: row.get(7)?,
            payload,
        })
    }
}
