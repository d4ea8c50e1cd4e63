use humantime::parse_duration;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Start tracking a new activity.
    Start {
        /// What you are working on.
        #[structopt()]
        description: String,

        /// Backdate the start, e.g. "15m" (parse_duration)
        #[structopt(long, parse(try_from_str=parse_duration))]
        ago: Option<Duration>,
    },
    /// Stop a tracker, or every running tracker when no id is given.
    Stop {
        #[structopt()]
        id: Option<String>,

        /// Backdate the stop, e.g. "5m" (parse_duration)
        #[structopt(long, parse(try_from_str=parse_duration))]
        ago: Option<Duration>,
    },
    /// Start a new tracker with the description of an existing one.
    Resume {
        #[structopt()]
        id: String,
    },
    /// Change the description of a tracker.
    Rename {
        #[structopt()]
        id: String,

        #[structopt()]
        description: String,
    },
    /// Remove a tracker from the journal.
    Rm {
        #[structopt()]
        id: String,
    },
    /// List all trackers in the journal.
    List,
    /// Write the journal as a JSON session.
    Export {
        /// Write to a file instead of stdout.
        #[structopt(parse(from_os_str), short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the journal with the trackers of a JSON session.
    Import {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(name = "tracker", about = "A hyper-minimalistic activity tracker.")]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Use a different journal file.
    #[structopt(parse(from_os_str), short, long)]
    pub journal_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_with_backdate() {
        let args =
            CommandLineArgs::from_iter(&["tracker", "start", "write docs", "--ago", "15m"]);
        match args.action {
            Command::Start { description, ago } => {
                assert_eq!(description, "write docs");
                assert_eq!(ago, Some(Duration::from_secs(15 * 60)));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.journal_file, None);
    }

    #[test]
    fn stop_without_id() {
        let args = CommandLineArgs::from_iter(&["tracker", "-j", "/tmp/j.sqlite", "stop"]);
        assert!(matches!(args.action, Command::Stop { id: None, ago: None }));
        assert_eq!(args.journal_file, Some(PathBuf::from("/tmp/j.sqlite")));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let res = CommandLineArgs::from_iter_safe(&["tracker", "start", "x", "--ago", "soon"]);
        assert!(res.is_err());
    }
}
