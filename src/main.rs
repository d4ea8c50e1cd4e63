#[macro_use] extern crate prettytable;

use anyhow::{anyhow, Context};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod interface;
mod journal;
mod model;
mod session;
mod settings;

use cli::{Command::*, CommandLineArgs};
use settings::Settings;

fn find_default_journal_file() -> Option<PathBuf> {
    let base_dirs = settings::project_dirs()?;
    let root_dir = base_dirs.data_dir();
    if !root_dir.exists() {
        std::fs::create_dir_all(root_dir).ok()?;
    }
    Some(root_dir.join("journal.sqlite"))
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        journal_file,
    } = CommandLineArgs::from_args();

    let settings = Settings::load().context("Failed to load settings.")?;
    settings.validate().map_err(|e| anyhow!("Invalid settings: {}", e))?;
    init_logging(&settings);

    // Unpack the journal file.
    let journal_file = journal_file
        .or_else(|| settings.journal_file.clone())
        .or_else(find_default_journal_file)
        .ok_or_else(|| anyhow!("Failed to find journal file."))?;
    debug!(journal = %journal_file.display(), "opening journal");

    let mut database = journal::open_journal(&journal_file)
        .with_context(|| format!("Failed to open journal {}.", journal_file.display()))?;

    // Perform the action.
    match action {
        Start { description, ago } => interface::start(&mut database, &settings, description, ago),
        Stop { id, ago } => interface::stop(&mut database, id, ago),
        Resume { id } => interface::resume(&mut database, &settings, id),
        Rename { id, description } => interface::rename(&database, id, description),
        Rm { id } => interface::remove_tracker(&database, id),
        List => interface::list(&database, &settings),
        Export { output } => interface::export(&database, output.as_deref()),
        Import { file } => interface::import(&mut database, &file),
    }?;
    Ok(())
}
