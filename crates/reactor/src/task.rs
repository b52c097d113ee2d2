//! # Task Composition Root
//!
//! Startup helper shared by every bus process: command-line parsing for
//! the standard options (help, version, process name, log verbosity and
//! annotation toggles) with a hook for application-specific options.
//!
//! Parsing runs in passes over the same argv slice, sharing a per-index
//! consumed mask. The standard options are scanned first; the
//! application hook then sees only what is left, so it can never shadow
//! a standard option. Tokens no pass claimed are positional arguments;
//! an unclaimed `-x` is a usage error.

use crate::logctl::{LogControl, SharedLogSettings};
use thiserror::Error;
use tracing::debug;

/// A malformed command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Option '{option}' requires a value")]
    MissingValue { option: String },

    #[error("Invalid value '{value}' for option '{option}'")]
    InvalidValue { option: String, value: String },

    #[error("Unknown option '{option}'")]
    UnknownOption { option: String },
}

/// What the caller should do after [`Task::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Start normally; carries the positional (non-option) arguments in
    /// command-line order.
    Run { positionals: Vec<String> },
    /// An informational option (`-h`, `-version`) was handled; exit
    /// without starting.
    Exit,
}

/// Application-specific option hook, run after the standard pass.
pub trait AppOptions {
    /// Usage lines appended below the standard options block.
    fn usage(&self) -> String {
        String::new()
    }

    /// Scan `args` and mark every index belonging to an application
    /// option in `consumed`. Indices already marked were claimed by the
    /// standard pass and must be skipped; indices left unmarked fall
    /// through to the positional pass.
    fn parse(&mut self, args: &[String], consumed: &mut [bool]) -> Result<(), UsageError>;
}

/// Hook for processes without application options.
#[derive(Debug, Default)]
pub struct NoAppOptions;

impl AppOptions for NoAppOptions {
    fn parse(&mut self, _args: &[String], _consumed: &mut [bool]) -> Result<(), UsageError> {
        Ok(())
    }
}

/// Per-process startup state: registered name and logging configuration.
pub struct Task {
    proc_name: String,
    log_settings: SharedLogSettings,
    stdout_level_given: bool,
    logfile_level_given: bool,
}

impl Task {
    /// Create the task with its compiled-in default name; `-n` overrides
    /// it at startup.
    #[must_use]
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            proc_name: default_name.into(),
            log_settings: SharedLogSettings::new(),
            stdout_level_given: false,
            logfile_level_given: false,
        }
    }

    /// Name this process registers under.
    #[must_use]
    pub fn proc_name(&self) -> &str {
        &self.proc_name
    }

    /// Shared handle to the logging configuration, for wiring into the
    /// debug-command handler.
    #[must_use]
    pub fn log_settings(&self) -> SharedLogSettings {
        self.log_settings.clone()
    }

    /// Whether `-v` was given, so startup code can tell an explicit
    /// choice from the default.
    #[must_use]
    pub fn stdout_level_given(&self) -> bool {
        self.stdout_level_given
    }

    /// Whether `-l` was given.
    #[must_use]
    pub fn logfile_level_given(&self) -> bool {
        self.logfile_level_given
    }

    /// Parse the command line (without the program name) and apply the
    /// standard options.
    ///
    /// Standard options are claimed first, then the application hook
    /// runs over what is left, then everything still unclaimed becomes
    /// a positional argument or a usage error.
    pub fn init(
        &mut self,
        args: &[String],
        app: &mut dyn AppOptions,
    ) -> Result<TaskOutcome, UsageError> {
        let mut consumed = vec![false; args.len()];

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-h" => {
                    println!("{}", self.usage_text(app));
                    return Ok(TaskOutcome::Exit);
                }
                "-version" => {
                    println!("{} v{}", self.proc_name, env!("CARGO_PKG_VERSION"));
                    return Ok(TaskOutcome::Exit);
                }
                "-n" => {
                    consumed[i] = true;
                    self.proc_name = self.take_value(args, &mut i)?;
                    consumed[i] = true;
                    debug!(proc = %self.proc_name, "Process name set from command line");
                }
                "-v" => {
                    consumed[i] = true;
                    let level = self.take_level(args, &mut i)?;
                    consumed[i] = true;
                    self.log_settings.set_stdout_level(level);
                    self.stdout_level_given = true;
                }
                "-l" => {
                    consumed[i] = true;
                    let level = self.take_level(args, &mut i)?;
                    consumed[i] = true;
                    self.log_settings.set_logfile_level(level);
                    self.logfile_level_given = true;
                }
                "-noDate" => {
                    consumed[i] = true;
                    self.log_settings.set_print_date(false);
                }
                "-noFileLine" => {
                    consumed[i] = true;
                    self.log_settings.set_print_file_line(false);
                }
                _ => {}
            }
            i += 1;
        }

        app.parse(args, &mut consumed)?;

        let mut positionals = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            if arg.starts_with('-') && arg.len() > 1 {
                return Err(UsageError::UnknownOption { option: arg.clone() });
            }
            positionals.push(arg.clone());
        }
        Ok(TaskOutcome::Run { positionals })
    }

    /// The value following the option at `*i`; advances past it.
    fn take_value(&self, args: &[String], i: &mut usize) -> Result<String, UsageError> {
        let option = args[*i].clone();
        *i += 1;
        args.get(*i).cloned().ok_or(UsageError::MissingValue { option })
    }

    fn take_level(&self, args: &[String], i: &mut usize) -> Result<i32, UsageError> {
        let option = args[*i].clone();
        let value = self.take_value(args, i)?;
        value
            .parse::<i32>()
            .map_err(|_| UsageError::InvalidValue { option, value })
    }

    fn usage_text(&self, app: &dyn AppOptions) -> String {
        let mut text = format!(
            "Usage: {} [OPTIONS]\nStandard options:\n\
             \t-h             print this help and exit\n\
             \t-version       print the version number and exit\n\
             \t-n <name>      set the process name\n\
             \t-v <level>     set the stdout verbosity level (1..5)\n\
             \t-l <level>     set the logfile verbosity level (1..5)\n\
             \t-noDate        omit the date in log lines\n\
             \t-noFileLine    omit file and line in log lines\n",
            self.proc_name
        );
        let extra = app.usage();
        if !extra.is_empty() {
            text.push_str("Application options:\n");
            text.push_str(&extra);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// `-port <n>` as a typical application option.
    #[derive(Default)]
    struct PortOption {
        port: Option<u16>,
    }

    impl AppOptions for PortOption {
        fn usage(&self) -> String {
            "\t-port <port>   listen port\n".to_string()
        }

        fn parse(&mut self, args: &[String], consumed: &mut [bool]) -> Result<(), UsageError> {
            let mut i = 0;
            while i < args.len() {
                if !consumed[i] && args[i] == "-port" {
                    consumed[i] = true;
                    let value = args.get(i + 1).ok_or(UsageError::MissingValue {
                        option: "-port".to_string(),
                    })?;
                    self.port = Some(value.parse().map_err(|_| UsageError::InvalidValue {
                        option: "-port".to_string(),
                        value: value.clone(),
                    })?);
                    consumed[i + 1] = true;
                    i += 1;
                }
                i += 1;
            }
            Ok(())
        }
    }

    /// Claims every index the earlier passes left unconsumed.
    #[derive(Default)]
    struct GreedyOptions {
        seen: Vec<String>,
    }

    impl AppOptions for GreedyOptions {
        fn parse(&mut self, args: &[String], consumed: &mut [bool]) -> Result<(), UsageError> {
            for (i, arg) in args.iter().enumerate() {
                if !consumed[i] {
                    self.seen.push(arg.clone());
                    consumed[i] = true;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_standard_options_applied() {
        let mut task = Task::new("msgManager");
        let outcome = task
            .init(
                &argv(&["-n", "mgr2", "-v", "5", "-noDate"]),
                &mut NoAppOptions,
            )
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Run { positionals: vec![] });
        assert_eq!(task.proc_name(), "mgr2");
        let snap = task.log_settings().snapshot();
        assert_eq!(snap.stdout_level, 5);
        assert!(!snap.print_date);
        assert!(snap.print_file_line);
        assert!(task.stdout_level_given());
        assert!(!task.logfile_level_given());
    }

    #[test]
    fn test_app_options_parsed_from_unconsumed_indices() {
        let mut task = Task::new("msgManager");
        let mut app = PortOption::default();
        let outcome = task
            .init(&argv(&["-port", "9900", "-l", "2"]), &mut app)
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Run { positionals: vec![] });
        assert_eq!(app.port, Some(9900));
        assert_eq!(task.log_settings().snapshot().logfile_level, 2);
    }

    #[test]
    fn test_standard_options_claimed_before_app_hook() {
        let mut task = Task::new("msgManager");
        let mut app = GreedyOptions::default();
        let outcome = task
            .init(&argv(&["-v", "3", "-n", "mgr2", "leftover"]), &mut app)
            .unwrap();

        // The hook only ever sees what the standard pass left behind.
        assert_eq!(app.seen, vec!["leftover".to_string()]);
        assert_eq!(task.proc_name(), "mgr2");
        assert!(task.stdout_level_given());
        assert_eq!(task.log_settings().snapshot().stdout_level, 3);
        assert_eq!(outcome, TaskOutcome::Run { positionals: vec![] });
    }

    #[test]
    fn test_positionals_collected_in_order() {
        let mut task = Task::new("tool");
        let outcome = task
            .init(&argv(&["first", "-v", "4", "second"]), &mut NoAppOptions)
            .unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Run {
                positionals: vec!["first".to_string(), "second".to_string()]
            }
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut task = Task::new("tool");
        let err = task.init(&argv(&["-bogus"]), &mut NoAppOptions).unwrap_err();
        assert_eq!(
            err,
            UsageError::UnknownOption {
                option: "-bogus".to_string()
            }
        );
    }

    #[test]
    fn test_missing_and_invalid_level_values() {
        let mut task = Task::new("tool");
        assert_eq!(
            task.init(&argv(&["-v"]), &mut NoAppOptions).unwrap_err(),
            UsageError::MissingValue {
                option: "-v".to_string()
            }
        );
        assert_eq!(
            task.init(&argv(&["-l", "high"]), &mut NoAppOptions).unwrap_err(),
            UsageError::InvalidValue {
                option: "-l".to_string(),
                value: "high".to_string()
            }
        );
    }

    #[test]
    fn test_help_exits_without_running() {
        let mut task = Task::new("tool");
        let outcome = task.init(&argv(&["-h", "ignored"]), &mut NoAppOptions).unwrap();
        assert_eq!(outcome, TaskOutcome::Exit);
    }
}
