use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use prettytable::Table;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration as STDDuration;
use tracing::info;

use crate::journal;
use crate::model::{Tracker, TrackerState};
use crate::session::Session;
use crate::settings::Settings;

pub fn start(
    db: &mut Connection,
    settings: &Settings,
    description: String,
    ago: Option<STDDuration>,
) -> Result<()> {
    let at = backdated(Utc::now(), ago)?;
    begin(db, settings, Tracker::new(description, at))
}

pub fn resume(db: &mut Connection, settings: &Settings, id: String) -> Result<()> {
    let source = journal::tracker(db, &id)
        .with_context(|| format!("Failed to find tracker '{}' in the journal.", id))?;
    begin(db, settings, source.resume_from(Utc::now()))
}

fn begin(db: &mut Connection, settings: &Settings, tracker: Tracker) -> Result<()> {
    let (tracker, stopped) = start_at(db, settings.single_running, tracker)?;
    for previous in stopped {
        print_stopped(&previous);
    }
    println!(
        "Started {} {} at {}.",
        tracker.id().short(),
        tracker.description(),
        fmt_time(tracker.start(), &settings.time_format)
    );
    Ok(())
}

pub fn stop(db: &mut Connection, id: Option<String>, ago: Option<STDDuration>) -> Result<()> {
    let at = backdated(Utc::now(), ago)?;
    let stopped = stop_at(db, id.as_deref(), at)?;
    if stopped.is_empty() {
        println!("Not running.");
    }
    for tracker in stopped {
        print_stopped(&tracker);
    }
    Ok(())
}

pub fn rename(db: &Connection, id: String, description: String) -> Result<()> {
    let mut tracker = journal::tracker(db, &id)
        .with_context(|| format!("Failed to find tracker '{}' in the journal.", id))?;
    tracker.set_description(description);
    journal::update_tracker(db, &tracker).context("Failed to update tracker in the journal.")?;
    println!("{} {}", tracker.id().short(), tracker.description());
    Ok(())
}

pub fn remove_tracker(db: &Connection, id: String) -> Result<()> {
    let tracker = journal::tracker(db, &id)
        .with_context(|| format!("Failed to find tracker '{}' in the journal.", id))?;
    journal::remove_tracker(db, tracker.id())
        .context("Failed to remove tracker from the journal.")?;
    info!(id = %tracker.id(), "tracker removed");
    println!("Removed {} {}", tracker.id().short(), tracker.description());
    Ok(())
}

pub fn list(db: &Connection, settings: &Settings) -> Result<()> {
    let trackers = journal::trackers(db).context("Failed to read trackers from the journal.")?;
    let now = Utc::now();

    if trackers.is_empty() {
        println!("No trackers yet! use 'tracker start' to begin.");
        return Ok(());
    }

    list_table(&trackers, settings, now).printstd();

    let session = Session::new(trackers);
    println!("Total: {}", session.total_elapsed(now));
    if session.trackers.iter().any(Tracker::is_running) {
        println!("Current state: Running.");
    } else {
        println!("Current state: Stopped.");
    }
    Ok(())
}

pub fn export(db: &Connection, output: Option<&Path>) -> Result<()> {
    let trackers = journal::trackers(db).context("Failed to read trackers from the journal.")?;
    let mut session = Session::new(trackers);
    session.refresh_elapsed(Utc::now());
    let json = session.to_json().context("Failed to serialize the session.")?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write session to {}.", path.display()))?;
            info!(session = %session.id, count = session.trackers.len(), "session exported");
            eprintln!(
                "Exported {} trackers to {}.",
                session.trackers.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub fn import(db: &mut Connection, file: &Path) -> Result<()> {
    let count = import_file(db, file)?;
    println!("Imported {} trackers.", count);
    Ok(())
}

/// Record a freshly started tracker. With `single_running`, trackers that
/// are still running get stopped at its start (or at their own start if they
/// began later). Nothing is written unless every change is valid. Returns the
/// new tracker and the ones that were stopped.
fn start_at(
    db: &mut Connection,
    single_running: bool,
    tracker: Tracker,
) -> Result<(Tracker, Vec<Tracker>)> {
    let at = tracker.start();
    let mut stopped = Vec::new();
    if single_running {
        let running = journal::running_trackers(db)
            .context("Failed to obtain running trackers from the journal.")?;
        for mut previous in running {
            let stop = std::cmp::max(at, previous.start());
            previous.stop(stop)?;
            stopped.push(previous);
        }
    }

    journal::save_changes(db, &stopped, Some(&tracker))
        .context("Failed to insert tracker to the journal.")?;
    info!(id = %tracker.id(), stopped = stopped.len(), "tracker started");
    Ok((tracker, stopped))
}

/// Stop the given tracker, or all running ones. Either all of them stop or
/// none does.
fn stop_at(db: &mut Connection, id: Option<&str>, at: DateTime<Utc>) -> Result<Vec<Tracker>> {
    let targets = match id {
        Some(id) => vec![journal::tracker(db, id)
            .with_context(|| format!("Failed to find tracker '{}' in the journal.", id))?],
        None => journal::running_trackers(db)
            .context("Failed to obtain running trackers from the journal.")?,
    };

    let mut stopped = Vec::new();
    for mut tracker in targets {
        tracker.stop(at)?;
        stopped.push(tracker);
    }

    journal::save_changes(db, &stopped, None).context("Failed to stop trackers in the journal.")?;
    for tracker in &stopped {
        info!(id = %tracker.id(), "tracker stopped");
    }
    Ok(stopped)
}

fn import_file(db: &mut Connection, file: &Path) -> Result<usize> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read session from {}.", file.display()))?;
    let session = Session::from_json(&json)
        .with_context(|| format!("Failed to parse session in {}.", file.display()))?;
    journal::replace_all(db, &session.trackers).context("Failed to replace the journal.")?;
    info!(session = %session.id, count = session.trackers.len(), "session imported");
    Ok(session.trackers.len())
}

fn list_table(trackers: &[Tracker], settings: &Settings, now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table.add_row(row!["id", "description", "state", "start", "stop", "elapsed"]);
    for tracker in trackers {
        let stop = match tracker.state() {
            TrackerState::Running => "-".to_string(),
            TrackerState::Stopped => tracker
                .stop_time()
                .map(|t| fmt_time(t, &settings.time_format))
                .unwrap_or_default(),
        };
        table.add_row(row![
            tracker.id().short(),
            textwrap::fill(tracker.description(), settings.description_width),
            tracker.state(),
            fmt_time(tracker.start(), &settings.time_format),
            stop,
            tracker.elapsed_at(now)
        ]);
    }
    table
}

fn print_stopped(tracker: &Tracker) {
    println!(
        "Stopped {} {} ({}).",
        tracker.id().short(),
        tracker.description(),
        tracker.elapsed()
    );
}

fn backdated(now: DateTime<Utc>, ago: Option<STDDuration>) -> Result<DateTime<Utc>> {
    match ago {
        None => Ok(now),
        Some(ago) => {
            let ago = Duration::from_std(ago).map_err(|_| anyhow!("Duration is too long."))?;
            now.checked_sub_signed(ago)
                .ok_or_else(|| anyhow!("Duration is too long."))
        }
    }
}

fn fmt_time(time: DateTime<Utc>, format: &str) -> String {
    time.with_timezone(&Local).format(format).to_string()
}
