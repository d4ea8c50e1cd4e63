use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use thiserror::Error;
use uuid::Uuid;

/// Everything that can go wrong while handling trackers or the journal.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid tracker state: {0}")]
    InvalidState(String),
    #[error("Tracker {0} is already stopped.")]
    AlreadyStopped(TrackerId),
    #[error("No tracker matches '{0}'.")]
    NotFound(String),
    #[error("More than one tracker matches '{0}', use a longer id.")]
    AmbiguousId(String),
    #[error("Journal error: {0}")]
    Journal(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque tracker identifier. Never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    pub fn generate() -> Self {
        TrackerId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters, enough to pick a tracker on the command line.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<String> for TrackerId {
    fn from(id: String) -> Self {
        TrackerId(id)
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-negative duration, serialized as a number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Elapsed(Duration);

impl Elapsed {
    pub fn zero() -> Self {
        Elapsed(Duration::zero())
    }

    /// Time between two instants, zero if `end` is before `start`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Elapsed(std::cmp::max(Duration::zero(), end - start))
    }

    pub fn from_millis(millis: i64) -> Self {
        Elapsed(Duration::milliseconds(millis.max(0)))
    }

    pub fn as_millis(&self) -> i64 {
        self.0.num_milliseconds()
    }

    /// Seconds precision, which is what people want to read.
    pub fn to_std_secs(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.0.num_seconds().max(0) as u64)
    }
}

impl Add for Elapsed {
    type Output = Elapsed;

    fn add(self, other: Elapsed) -> Elapsed {
        Elapsed(self.0 + other.0)
    }
}

impl std::iter::Sum for Elapsed {
    fn sum<I: Iterator<Item = Elapsed>>(iter: I) -> Elapsed {
        iter.fold(Elapsed::zero(), Add::add)
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.num_seconds() == 0 {
            return f.write_str("0s");
        }
        write!(f, "{}", humantime::format_duration(self.to_std_secs()))
    }
}

impl Serialize for Elapsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for Elapsed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Elapsed::from_millis)
    }
}

/// A tracker is running until it gets a stop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Running,
    Stopped,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Running => f.write_str("running"),
            TrackerState::Stopped => f.write_str("stopped"),
        }
    }
}

/// One tracked activity interval.
///
/// `elapsed` is a cache of the derived duration, filled by
/// [`Tracker::refresh_elapsed`] before the tracker leaves the process. It is
/// dropped whenever the interval changes and ignored when reading trackers
/// back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrackerRecord")]
pub struct Tracker {
    id: TrackerId,
    description: String,
    start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed: Option<Elapsed>,
}

/// Wire shape of a tracker, before its invariants are checked.
#[derive(Deserialize)]
struct TrackerRecord {
    id: TrackerId,
    description: String,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    stop: Option<DateTime<Utc>>,
    #[serde(default)]
    #[allow(dead_code)]
    elapsed: Option<Elapsed>,
}

impl TryFrom<TrackerRecord> for Tracker {
    type Error = TrackerError;

    fn try_from(record: TrackerRecord) -> Result<Self, Self::Error> {
        Tracker::from_parts(record.id, record.description, record.start, record.stop)
    }
}

impl Tracker {
    /// Create a running tracker with a fresh id.
    pub fn new(description: impl Into<String>, start: DateTime<Utc>) -> Self {
        Tracker {
            id: TrackerId::generate(),
            description: description.into(),
            start,
            stop: None,
            elapsed: None,
        }
    }

    /// Rebuild a tracker from stored data, checking that it has a start and
    /// that it does not stop before it starts.
    pub fn from_parts(
        id: TrackerId,
        description: String,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) -> Result<Self, TrackerError> {
        let start = start.ok_or_else(|| {
            TrackerError::InvalidState(format!("tracker {} has no start time", id))
        })?;
        if let Some(stop) = stop {
            check_order(start, stop)?;
        }
        Ok(Tracker {
            id,
            description,
            start,
            stop,
            elapsed: None,
        })
    }

    /// A new running tracker for the same activity.
    pub fn resume_from(&self, start: DateTime<Utc>) -> Tracker {
        Tracker::new(self.description.clone(), start)
    }

    pub fn id(&self) -> &TrackerId {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.stop
    }

    /// Stop the tracker. A tracker only stops once.
    pub fn stop(&mut self, at: DateTime<Utc>) -> Result<(), TrackerError> {
        if self.stop.is_some() {
            return Err(TrackerError::AlreadyStopped(self.id.clone()));
        }
        check_order(self.start, at)?;
        self.stop = Some(at);
        self.elapsed = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_none()
    }

    pub fn state(&self) -> TrackerState {
        if self.is_running() {
            TrackerState::Running
        } else {
            TrackerState::Stopped
        }
    }

    /// Duration from start to stop, or to `now` while running.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Elapsed {
        Elapsed::between(self.start, self.stop.unwrap_or(now))
    }

    pub fn elapsed(&self) -> Elapsed {
        self.elapsed_at(Utc::now())
    }

    pub fn refresh_elapsed(&mut self, now: DateTime<Utc>) {
        self.elapsed = Some(self.elapsed_at(now));
    }
}

fn check_order(start: DateTime<Utc>, stop: DateTime<Utc>) -> Result<(), TrackerError> {
    if stop < start {
        return Err(TrackerError::InvalidState(format!(
            "stop time {} is earlier than start time {}",
            stop.to_rfc3339(),
            start.to_rfc3339()
        )));
    }
    Ok(())
}
