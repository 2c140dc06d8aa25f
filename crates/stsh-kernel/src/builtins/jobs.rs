//! jobs: list every job and its processes.

use crate::control::JobControl;
use crate::error::ShellResult;

/// The `jobs` listing, in id order.
pub fn listing(control: &JobControl<'_>) -> ShellResult<String> {
    let blocked = control.block()?;
    Ok(control.jobs().get(&blocked).to_string())
}

pub(super) fn print(control: &JobControl<'_>) -> ShellResult<()> {
    print!("{}", listing(control)?);
    Ok(())
}
