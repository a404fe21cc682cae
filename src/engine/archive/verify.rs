// ── Archive: hash-chain verification ───────────────────────────────────────
//
// Walk every event in insertion order, recompute its hash from stored
// columns, and check that each parent is the previous event of the same
// session (null only for the session's first event). Faults are collected,
// never fatal: the positional list tells an operator how far the damage
// reaches. Nothing is repaired.

use super::events::hash_event;
use super::ArchiveStore;
use crate::atoms::error::EngineResult;
use crate::atoms::soul_types::{ChainFault, ChainFaultKind, Event, EventType, HashChainReport};
use log::{info, warn};
use std::collections::HashMap;

/// Raw row as stored. Parsed leniently so a tampered row still gets checked.
struct StoredRow {
    event_hash: String,
    parent_hash: Option<String>,
    timestamp: String,
    session_key: String,
    event_type: String,
    agent_id: String,
    channel: String,
    peer: String,
    payload: String,
}

impl StoredRow {
    /// Hash the row would have if its fields were untouched. A payload or
    /// event type that no longer parses is hashed in its raw form, which
    /// can never match the original.
    fn expected_hash(&self) -> String {
        let payload = serde_json::from_str(&self.payload)
            .unwrap_or_else(|_| serde_json::Value::String(self.payload.clone()));
        match self.event_type.parse::<EventType>() {
            Ok(event_type) => hash_event(&Event {
                event_hash: String::new(),
                parent_hash: self.parent_hash.clone(),
                timestamp: self.timestamp.clone(),
                session_key: self.session_key.clone(),
                event_type,
                agent_id: self.agent_id.clone(),
                channel: self.channel.clone(),
                peer: self.peer.clone(),
                payload,
            }),
            Err(_) => crate::engine::sha256_hex(
                format!("{}|{}|{}", self.event_type, self.timestamp, self.payload).as_bytes(),
            ),
        }
    }
}

impl ArchiveStore {
    pub fn verify_hash_chain(&self) -> EngineResult<HashChainReport> {
        let rows: Vec<StoredRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT event_hash, parent_hash, timestamp, session_key, event_type,
                        agent_id, channel, peer, payload
                 FROM events ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(StoredRow {
                        event_hash: row.get(0)?,
                        parent_hash: row.get(1)?,
                        timestamp: row.get(2)?,
                        session_key: row.get(3)?,
                        event_type: row.get(4)?,
                        agent_id: row.get(5)?,
                        channel: row.get(6)?,
                        peer: row.get(7)?,
                        payload: row.get(8)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        // event_hash → session_key of every event seen so far
        let mut seen: HashMap<String, String> = HashMap::with_capacity(rows.len());
        // session_key → stored hash of its latest event
        let mut heads: HashMap<String, String> = HashMap::new();
        let mut errors = Vec::new();

        for (position, row) in rows.iter().enumerate() {
            let expected = row.expected_hash();
            if expected != row.event_hash {
                errors.push(ChainFault {
                    position,
                    event_hash: row.event_hash.clone(),
                    kind: ChainFaultKind::HashMismatch {
                        expected,
                        actual: row.event_hash.clone(),
                    },
                });
            }

            let head = heads.get(&row.session_key);
            let parent_fault = match row.parent_hash {
                Some(ref parent) => match seen.get(parent) {
                    None => Some(ChainFaultKind::MissingParent { parent_hash: parent.clone() }),
                    Some(parent_session) if *parent_session != row.session_key => {
                        Some(ChainFaultKind::CrossSessionParent {
                            parent_hash: parent.clone(),
                            parent_session: parent_session.clone(),
                        })
                    }
                    Some(_) if head != Some(parent) => Some(ChainFaultKind::ParentMismatch {
                        expected: head.cloned(),
                        actual: Some(parent.clone()),
                    }),
                    Some(_) => None,
                },
                None => head.map(|h| ChainFaultKind::ParentMismatch {
                    expected: Some(h.clone()),
                    actual: None,
                }),
            };
            if let Some(kind) = parent_fault {
                errors.push(ChainFault {
                    position,
                    event_hash: row.event_hash.clone(),
                    kind,
                });
            }

            seen.insert(row.event_hash.clone(), row.session_key.clone());
            heads.insert(row.session_key.clone(), row.event_hash.clone());
        }

        let report = HashChainReport {
            ok: errors.is_empty(),
            checked: rows.len(),
            errors,
        };

        if report.ok {
            info!("[archive] Hash chain verified ({} events)", report.checked);
        } else {
            warn!(
                "[archive] Hash chain verification found {} fault(s) across {} events",
                report.errors.len(),
                report.checked
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::soul_types::EventRecord;
    use rusqlite::params;
    use serde_json::json;

    fn message(session: &str, text: &str) -> EventRecord {
        EventRecord::new(session, EventType::Message, "soul").with_payload(json!({ "text": text }))
    }

    #[test]
    fn empty_archive_verifies() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let report = archive.verify_hash_chain().unwrap();
        assert_eq!(report, HashChainReport { ok: true, checked: 0, errors: vec![] });
    }

    #[test]
    fn root_and_child_verify() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let a = archive.append_event(message("s1", "a")).unwrap();
        archive
            .append_event(message("s1", "b").with_parent(Some(a.event_hash)))
            .unwrap();
        let report = archive.verify_hash_chain().unwrap();
        assert!(report.ok);
        assert_eq!(report.checked, 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn tampered_payload_is_reported_at_its_position() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        archive.append_to_session(message("s1", "a")).unwrap();
        let b = archive.append_to_session(message("s1", "b")).unwrap();
        archive.append_to_session(message("s1", "c")).unwrap();

        {
            let conn = archive.conn.lock();
            conn.execute_batch("DROP TRIGGER events_append_only_update;").unwrap();
            conn.execute(
                "UPDATE events SET payload = ?1 WHERE event_hash = ?2",
                params![r#"{"text":"forged"}"#, b.event_hash],
            )
            .unwrap();
        }

        let report = archive.verify_hash_chain().unwrap();
        assert!(!report.ok);
        assert_eq!(report.checked, 3);
        assert!(report.errors.iter().all(|f| f.position >= 1));
        assert!(matches!(
            report.errors[0].kind,
            ChainFaultKind::HashMismatch { .. }
        ));
        assert_eq!(report.errors[0].event_hash, b.event_hash);
    }

    #[test]
    fn unparseable_payload_still_mismatches() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let a = archive.append_event(message("s1", "a")).unwrap();
        {
            let conn = archive.conn.lock();
            conn.execute_batch("DROP TRIGGER events_append_only_update;").unwrap();
            conn.execute(
                "UPDATE events SET payload = 'not json' WHERE event_hash = ?1",
                params![a.event_hash],
            )
            .unwrap();
        }
        let report = archive.verify_hash_chain().unwrap();
        assert_eq!(report.errors.len(), 1);
    }

    fn insert_raw(archive: &ArchiveStore, parent_hash: Option<String>, timestamp: &str) -> String {
        let mut forged = Event {
            event_hash: String::new(),
            parent_hash,
            timestamp: timestamp.into(),
            session_key: "s1".into(),
            event_type: EventType::Message,
            agent_id: "soul".into(),
            channel: String::new(),
            peer: String::new(),
            payload: json!(null),
        };
        forged.event_hash = hash_event(&forged);
        let conn = archive.conn.lock();
        conn.execute(
            "INSERT INTO events (event_hash, parent_hash, timestamp, session_key, event_type, agent_id, payload)
             VALUES (?1, ?2, ?3, 's1', 'message', 'soul', 'null')",
            params![forged.event_hash, forged.parent_hash, forged.timestamp],
        )
        .unwrap();
        forged.event_hash
    }

    #[test]
    fn fork_off_an_older_event_is_reported() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let a = archive.append_to_session(message("s1", "a")).unwrap();
        let b = archive.append_to_session(message("s1", "b")).unwrap();
        let c = insert_raw(&archive, Some(a.event_hash.clone()), "2030-01-01T00:00:00.000Z");

        let report = archive.verify_hash_chain().unwrap();
        assert!(!report.ok);
        assert_eq!(report.checked, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].position, 2);
        assert_eq!(report.errors[0].event_hash, c);
        assert_eq!(
            report.errors[0].kind,
            ChainFaultKind::ParentMismatch {
                expected: Some(b.event_hash),
                actual: Some(a.event_hash),
            }
        );
    }

    #[test]
    fn second_root_in_a_session_is_reported() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let a = archive.append_to_session(message("s1", "a")).unwrap();
        insert_raw(&archive, None, "2030-01-01T00:00:00.000Z");

        let report = archive.verify_hash_chain().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].kind,
            ChainFaultKind::ParentMismatch { expected: Some(a.event_hash), actual: None }
        );
    }

    #[test]
    fn cross_session_parent_is_reported() {
        let archive = ArchiveStore::open_in_memory().unwrap();
        let a = archive.append_event(message("s1", "a")).unwrap();
        let mut forged = Event {
            event_hash: String::new(),
            parent_hash: Some(a.event_hash.clone()),
            timestamp: "2025-01-01T00:00:00.000Z".into(),
            session_key: "s2".into(),
            event_type: EventType::Message,
            agent_id: "soul".into(),
            channel: String::new(),
            peer: String::new(),
            payload: json!(null),
        };
        forged.event_hash = hash_event(&forged);
        {
            let conn = archive.conn.lock();
            conn.execute(
                "INSERT INTO events (event_hash, parent_hash, timestamp, session_key, event_type, agent_id, payload)
                 VALUES (?1, ?2, ?3, ?4, 'message', 'soul', 'null')",
                params![forged.event_hash, forged.parent_hash, forged.timestamp, forged.session_key],
            )
            .unwrap();
        }
        let report = archive.verify_hash_chain().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0].kind,
            ChainFaultKind::CrossSessionParent { .. }
        ));
    }
}
