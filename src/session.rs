use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::model::{Elapsed, Tracker, TrackerError};

/// A whole tracker list as it travels in and out of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub trackers: Vec<Tracker>,
}

impl Session {
    pub fn new(trackers: Vec<Tracker>) -> Self {
        Session {
            id: Uuid::new_v4().to_string(),
            trackers,
        }
    }

    /// Fill in the derived elapsed value of every tracker.
    pub fn refresh_elapsed(&mut self, now: DateTime<Utc>) {
        for tracker in self.trackers.iter_mut() {
            tracker.refresh_elapsed(now);
        }
    }

    pub fn total_elapsed(&self, now: DateTime<Utc>) -> Elapsed {
        self.trackers.iter().map(|t| t.elapsed_at(now)).sum()
    }

    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a session. Every tracker is validated and ids must be unique.
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let session: Session = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        for tracker in &session.trackers {
            if !seen.insert(tracker.id()) {
                return Err(TrackerError::InvalidState(format!(
                    "tracker {} appears more than once in session {}",
                    tracker.id(),
                    session.id
                )));
            }
        }
        Ok(session)
    }
}
