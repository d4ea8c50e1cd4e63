use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::debug;

use crate::model::{Tracker, TrackerError, TrackerId};

const TRACKER_COLUMNS: &str = "id, description, start, stop";

/// Get a connection to the journal database, creating it if it does
/// not exist.
pub fn open_journal(journal_path: &Path) -> Result<Connection, TrackerError> {
    let journal_exists = journal_path.exists();
    let db = Connection::open(journal_path)?;
    if !journal_exists {
        debug!(path = %journal_path.display(), "creating journal");
        init_journal(&db)?;
    }
    Ok(db)
}

/// Initialize the journal database.
pub fn init_journal(db: &Connection) -> Result<(), TrackerError> {
    db.execute(
        "CREATE TABLE if not exists tracker (
                  seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                  id              TEXT NOT NULL UNIQUE,
                  description     TEXT NOT NULL,
                  start           TEXT NOT NULL,
                  stop            TEXT
                  )",
        [],
    )?;
    db.execute(
        "CREATE INDEX if not exists running_index ON tracker (stop)",
        [],
    )?;
    Ok(())
}

/// All trackers, oldest first.
pub fn trackers(db: &Connection) -> Result<Vec<Tracker>, TrackerError> {
    let mut stmt = db.prepare(&format!(
        "SELECT {} FROM tracker ORDER BY seq",
        TRACKER_COLUMNS
    ))?;
    let rows = stmt.query_map([], tracker_from_row)?;
    let mut trackers = Vec::new();
    for tracker in rows {
        trackers.push(tracker?);
    }
    Ok(trackers)
}

/// Trackers without a stop time, oldest first.
pub fn running_trackers(db: &Connection) -> Result<Vec<Tracker>, TrackerError> {
    let mut stmt = db.prepare(&format!(
        "SELECT {} FROM tracker WHERE stop IS NULL ORDER BY seq",
        TRACKER_COLUMNS
    ))?;
    let rows = stmt.query_map([], tracker_from_row)?;
    let mut trackers = Vec::new();
    for tracker in rows {
        trackers.push(tracker?);
    }
    Ok(trackers)
}

/// Find a tracker by its id or by a prefix of it. A full id always wins,
/// otherwise the prefix has to be unique.
pub fn tracker(db: &Connection, id: &str) -> Result<Tracker, TrackerError> {
    if id.is_empty() {
        return Err(TrackerError::NotFound(id.to_string()));
    }
    let mut stmt = db.prepare(&format!(
        "SELECT {} FROM tracker WHERE substr(id, 1, length(?1)) = ?1 ORDER BY seq",
        TRACKER_COLUMNS
    ))?;
    let rows = stmt.query_map(params![id], tracker_from_row)?;
    let mut candidates = Vec::new();
    for tracker in rows {
        candidates.push(tracker?);
    }

    if let Some(exact) = candidates.iter().position(|t| t.id().as_str() == id) {
        return Ok(candidates.swap_remove(exact));
    }
    match candidates.len() {
        0 => Err(TrackerError::NotFound(id.to_string())),
        1 => Ok(candidates.remove(0)),
        _ => Err(TrackerError::AmbiguousId(id.to_string())),
    }
}

/// Append a tracker to the journal.
pub fn insert_tracker(db: &Connection, tracker: &Tracker) -> Result<(), TrackerError> {
    debug!(id = %tracker.id(), "inserting tracker");
    db.execute(
        "INSERT INTO tracker (id, description, start, stop) VALUES (?1, ?2, ?3, ?4)",
        params![
            tracker.id().as_str(),
            tracker.description(),
            tracker.start(),
            tracker.stop_time()
        ],
    )?;
    Ok(())
}

/// Write back the mutable parts of a tracker.
pub fn update_tracker(db: &Connection, tracker: &Tracker) -> Result<(), TrackerError> {
    debug!(id = %tracker.id(), state = %tracker.state(), "updating tracker");
    let changed = db.execute(
        "UPDATE tracker SET description = ?2, start = ?3, stop = ?4 WHERE id = ?1",
        params![
            tracker.id().as_str(),
            tracker.description(),
            tracker.start(),
            tracker.stop_time()
        ],
    )?;
    if changed == 0 {
        return Err(TrackerError::NotFound(tracker.id().to_string()));
    }
    Ok(())
}

pub fn remove_tracker(db: &Connection, id: &TrackerId) -> Result<(), TrackerError> {
    debug!(%id, "removing tracker");
    let changed = db.execute("DELETE FROM tracker WHERE id = ?1", params![id.as_str()])?;
    if changed == 0 {
        return Err(TrackerError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Replace the whole journal content. Either every tracker lands or none
/// does.
pub fn replace_all(db: &mut Connection, trackers: &[Tracker]) -> Result<(), TrackerError> {
    let tx = db.transaction()?;
    tx.execute("DELETE FROM tracker", [])?;
    for tracker in trackers {
        insert_tracker(&tx, tracker)?;
    }
    tx.commit()?;
    debug!(count = trackers.len(), "journal replaced");
    Ok(())
}

/// Write back stopped trackers and insert a started one in a single
/// transaction.
pub fn save_changes(
    db: &mut Connection,
    stopped: &[Tracker],
    started: Option<&Tracker>,
) -> Result<(), TrackerError> {
    let tx = db.transaction()?;
    for tracker in stopped {
        update_tracker(&tx, tracker)?;
    }
    if let Some(tracker) = started {
        insert_tracker(&tx, tracker)?;
    }
    tx.commit()?;
    Ok(())
}

/// Return a tracker from a row in this order: [id, description, start, stop]
fn tracker_from_row(row: &Row) -> rusqlite::Result<Tracker> {
    let id: String = row.get(0)?;
    let description: String = row.get(1)?;
    let start = row.get::<_, DateTime<Utc>>(2)?;
    let stop = row.get::<_, Option<DateTime<Utc>>>(3)?;
    Tracker::from_parts(TrackerId::from(id), description, Some(start), stop)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn journal() -> Connection {
        let db = Connection::open_in_memory().unwrap();
        init_journal(&db).unwrap();
        db
    }

    #[test]
    fn insert_and_read_back_in_order() {
        let db = journal();
        let first = Tracker::new("first", at("2024-01-01T10:00:00Z"));
        let mut second = Tracker::new("second", at("2024-01-01T09:00:00Z"));
        second.stop(at("2024-01-01T09:45:30.250Z")).unwrap();
        insert_tracker(&db, &first).unwrap();
        insert_tracker(&db, &second).unwrap();

        let all = trackers(&db).unwrap();
        assert_eq!(all, vec![first.clone(), second]);

        let running = running_trackers(&db).unwrap();
        assert_eq!(running, vec![first]);
    }

    #[test]
    fn update_persists_stop_and_description() {
        let db = journal();
        let mut tracker = Tracker::new("draft", at("2024-01-01T10:00:00Z"));
        insert_tracker(&db, &tracker).unwrap();

        tracker.set_description("final");
        tracker.stop(at("2024-01-01T10:30:00Z")).unwrap();
        update_tracker(&db, &tracker).unwrap();

        let stored = super::tracker(&db, tracker.id().as_str()).unwrap();
        assert_eq!(stored.description(), "final");
        assert_eq!(stored.stop_time(), Some(at("2024-01-01T10:30:00Z")));
        assert!(running_trackers(&db).unwrap().is_empty());
    }

    #[test]
    fn update_of_unknown_tracker_fails() {
        let db = journal();
        let tracker = Tracker::new("ghost", at("2024-01-01T10:00:00Z"));
        let err = update_tracker(&db, &tracker).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[test]
    fn lookup_by_prefix() {
        let db = journal();
        let a = Tracker::from_parts(
            TrackerId::from("abc-1".to_string()),
            "a".into(),
            Some(at("2024-01-01T10:00:00Z")),
            None,
        )
        .unwrap();
        let b = Tracker::from_parts(
            TrackerId::from("abd-2".to_string()),
            "b".into(),
            Some(at("2024-01-01T10:00:00Z")),
            None,
        )
        .unwrap();
        let c = Tracker::from_parts(
            TrackerId::from("abd".to_string()),
            "c".into(),
            Some(at("2024-01-01T10:00:00Z")),
            None,
        )
        .unwrap();
        insert_tracker(&db, &a).unwrap();
        insert_tracker(&db, &b).unwrap();
        insert_tracker(&db, &c).unwrap();

        assert_eq!(tracker(&db, "abc").unwrap().description(), "a");
        assert_eq!(tracker(&db, "abd").unwrap().description(), "c");
        assert_eq!(tracker(&db, "abd-").unwrap().description(), "b");
        assert!(matches!(
            tracker(&db, "ab").unwrap_err(),
            TrackerError::AmbiguousId(_)
        ));
        assert!(matches!(
            tracker(&db, "zzz").unwrap_err(),
            TrackerError::NotFound(_)
        ));
    }

    #[test]
    fn remove_deletes_only_the_given_tracker() {
        let db = journal();
        let keep = Tracker::new("keep", at("2024-01-01T10:00:00Z"));
        let gone = Tracker::new("gone", at("2024-01-01T11:00:00Z"));
        insert_tracker(&db, &keep).unwrap();
        insert_tracker(&db, &gone).unwrap();

        remove_tracker(&db, gone.id()).unwrap();
        assert_eq!(trackers(&db).unwrap(), vec![keep]);
        assert!(matches!(
            remove_tracker(&db, gone.id()).unwrap_err(),
            TrackerError::NotFound(_)
        ));
    }

    #[test]
    fn replace_all_swaps_the_content() {
        let mut db = journal();
        insert_tracker(&db, &Tracker::new("old", at("2024-01-01T08:00:00Z"))).unwrap();

        let fresh = vec![
            Tracker::new("one", at("2024-01-02T08:00:00Z")),
            Tracker::new("two", at("2024-01-02T09:00:00Z")),
        ];
        replace_all(&mut db, &fresh).unwrap();
        assert_eq!(trackers(&db).unwrap(), fresh);
    }

    #[test]
    fn replace_all_is_atomic() {
        let mut db = journal();
        let old = Tracker::new("old", at("2024-01-01T08:00:00Z"));
        insert_tracker(&db, &old).unwrap();

        let dup = Tracker::new("dup", at("2024-01-02T08:00:00Z"));
        let err = replace_all(&mut db, &[dup.clone(), dup]).unwrap_err();
        assert!(matches!(err, TrackerError::Journal(_)));
        assert_eq!(trackers(&db).unwrap(), vec![old]);
    }

    #[test]
    fn empty_id_matches_nothing() {
        let db = journal();
        insert_tracker(&db, &Tracker::new("only", at("2024-01-01T10:00:00Z"))).unwrap();
        assert!(matches!(
            tracker(&db, "").unwrap_err(),
            TrackerError::NotFound(_)
        ));
    }

    #[test]
    fn save_changes_rolls_back_on_failure() {
        let mut db = journal();
        let running = Tracker::new("running", at("2024-01-01T10:00:00Z"));
        insert_tracker(&db, &running).unwrap();

        let mut stopped = running.clone();
        stopped.stop(at("2024-01-01T10:30:00Z")).unwrap();
        let ghost = Tracker::new("never inserted", at("2024-01-01T09:00:00Z"));
        let err = save_changes(&mut db, &[stopped, ghost], None).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
        assert_eq!(running_trackers(&db).unwrap(), vec![running]);
    }

    #[test]
    fn open_journal_creates_the_schema_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.sqlite");

        let db = open_journal(&path).unwrap();
        insert_tracker(&db, &Tracker::new("persisted", at("2024-01-01T10:00:00Z"))).unwrap();
        drop(db);

        let db = open_journal(&path).unwrap();
        let all = trackers(&db).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description(), "persisted");
    }
}
