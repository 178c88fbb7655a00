//! Schedules command: print the built-in retention schedules.

use std::io::Write;

use super::CommandResult;
use crate::cli::DEFAULT_SCHEDULE;
use crate::config::SCHEDULES;

/// Execute the schedules command, writing to `out`.
pub fn execute_schedules<W: Write>(out: &mut W) -> CommandResult<()> {
    for schedule in SCHEDULES {
        let marker = if schedule.name == DEFAULT_SCHEDULE { " (default)" } else { "" };
        writeln!(out, "{}{}: {}", schedule.name, marker, schedule.describe())?;
    }
    Ok(())
}
