//! # Debug Command Handler
//!
//! Every bus process answers the `DEBUG` command: it adjusts the logging
//! configuration at runtime without restarting the process. All four
//! parameters are optional; only the ones present in the body are
//! applied.

use crate::dispatch::ReactorContext;
use crate::handler::{Callback, CallbackResult};
use crate::logctl::{LogControl, SharedLogSettings};
use cmdschema::{Command, Param, ParamType, SchemaError};
use msg_proto::Envelope;
use tracing::debug;

/// Name of the runtime log-configuration command.
pub const DEBUG_CMD: &str = "DEBUG";

/// Declare the `DEBUG` schema: two integer verbosity levels bounded to
/// 1..5 and two logical annotation toggles, all optional.
#[must_use]
pub fn debug_command_schema() -> Command {
    let mut scratch = errstack::ErrorStack::new("schema");
    let mut cmd = Command::new(DEBUG_CMD);
    let build = (|| -> Result<(), SchemaError> {
        cmd.add_param(Param::new(
            "stdoutLevel",
            "level for logs printed on stdout",
            ParamType::Integer,
            "",
            true,
        ))?;
        cmd.add_param(Param::new(
            "logfileLevel",
            "level for logs written to the logfile",
            ParamType::Integer,
            "",
            true,
        ))?;
        cmd.add_param(Param::new(
            "printDate",
            "switch on/off printing of date",
            ParamType::Logical,
            "",
            true,
        ))?;
        cmd.add_param(Param::new(
            "printFileLine",
            "switch on/off printing of file name and line number",
            ParamType::Logical,
            "",
            true,
        ))?;
        for level in ["stdoutLevel", "logfileLevel"] {
            if let Some(p) = cmd.param_mut(level) {
                p.set_min_value("1", &mut scratch)?;
                p.set_max_value("5", &mut scratch)?;
            }
        }
        Ok(())
    })();
    // Literal names and bounds; cannot fail.
    build.expect("DEBUG schema is well-formed");
    cmd
}

fn apply(
    cmd: &Command,
    settings: &SharedLogSettings,
    ctx: &mut ReactorContext<'_>,
) -> Result<(), SchemaError> {
    if let Some(p) = cmd.param("stdoutLevel").filter(|p| p.is_defined()) {
        settings.set_stdout_level(p.user_value::<i32>(ctx.stack)?);
    }
    if let Some(p) = cmd.param("logfileLevel").filter(|p| p.is_defined()) {
        settings.set_logfile_level(p.user_value::<i32>(ctx.stack)?);
    }
    if let Some(p) = cmd.param("printDate").filter(|p| p.is_defined()) {
        settings.set_print_date(p.user_value::<bool>(ctx.stack)?);
    }
    if let Some(p) = cmd.param("printFileLine").filter(|p| p.is_defined()) {
        settings.set_print_file_line(p.user_value::<bool>(ctx.stack)?);
    }
    Ok(())
}

/// Build the `DEBUG` callback over the process log settings, ready to
/// register under `EventKey::command(DEBUG_CMD)`. On success the handler
/// sends its own "OK" reply and returns Deferred.
#[must_use]
pub fn make_debug_callback(settings: SharedLogSettings) -> Callback {
    let schema = debug_command_schema();
    Box::new(move |envelope: &Envelope, ctx: &mut ReactorContext<'_>| {
        let mut cmd = schema.clone();
        if cmd.parse(&envelope.body_text(), ctx.stack).is_err() {
            return CallbackResult::FailedWithReply;
        }
        debug!(body = %cmd.body(), "Applying DEBUG command");
        match apply(&cmd, &settings, ctx) {
            Ok(()) => {
                ctx.reply_ok(envelope, b"OK".to_vec());
                CallbackResult::Deferred
            }
            Err(_) => CallbackResult::FailedWithReply,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use errstack::ErrorStack;

    fn run(
        body: &str,
        settings: &SharedLogSettings,
    ) -> (CallbackResult, ErrorStack, Vec<Envelope>) {
        let mut stack = ErrorStack::new("testProc");
        let mut cb = make_debug_callback(settings.clone());
        let env = Envelope::command("gui", "testProc", DEBUG_CMD, body.as_bytes().to_vec());
        let mut ctx = ReactorContext::new("testProc", &mut stack);
        let result = cb(&env, &mut ctx);
        let outbox = ctx.into_outbox();
        (result, stack, outbox)
    }

    #[test]
    fn test_applies_only_present_params() {
        let settings = SharedLogSettings::new();
        let (result, stack, outbox) = run("-stdoutLevel 5 -printDate false", &settings);

        // The handler replies itself and keeps the reactor silent.
        assert_eq!(result, CallbackResult::Deferred);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].body, b"OK");
        assert_eq!(outbox[0].recipient, "gui");
        assert!(stack.is_empty());
        let snap = settings.snapshot();
        assert_eq!(snap.stdout_level, 5);
        assert!(!snap.print_date);
        // Untouched parameters keep their defaults.
        assert_eq!(snap.logfile_level, 3);
        assert!(snap.print_file_line);
    }

    #[test]
    fn test_out_of_range_level_fails_with_diagnostics() {
        let settings = SharedLogSettings::new();
        let (result, stack, outbox) = run("-stdoutLevel 9", &settings);

        assert_eq!(result, CallbackResult::FailedWithReply);
        assert!(outbox.is_empty());
        assert!(!stack.is_empty());
        assert_eq!(settings.snapshot().stdout_level, 3);
    }

    #[test]
    fn test_unknown_param_fails() {
        let settings = SharedLogSettings::new();
        let (result, stack, outbox) = run("-verbosity 2", &settings);

        assert_eq!(result, CallbackResult::FailedWithReply);
        assert!(outbox.is_empty());
        assert!(!stack.is_empty());
    }

    #[test]
    fn test_empty_body_is_a_no_op_success() {
        let settings = SharedLogSettings::new();
        let (result, stack, outbox) = run("", &settings);

        assert_eq!(result, CallbackResult::Deferred);
        assert_eq!(outbox.len(), 1);
        assert!(stack.is_empty());
        assert_eq!(settings.snapshot(), crate::logctl::LogSettings::default());
    }

    #[test]
    fn test_schema_help_lists_all_params() {
        let help = debug_command_schema().help();
        assert!(help.contains("-stdoutLevel <integer>"));
        assert!(help.contains("-logfileLevel <integer>"));
        assert!(help.contains("-printDate <logical>"));
        assert!(help.contains("-printFileLine <logical>"));
        assert!(help.contains("(range from '1' to '5')"));
    }
}
