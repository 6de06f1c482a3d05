//! The `--find-port` command.

use calwidget_providers::port::{DEFAULT_PORT_RANGE, DEFAULT_PREFERRED_PORT, find_free_port};

use crate::error::{CliError, CliResult};

/// Prints a free callback port on stdout, or fails with no stdout output.
pub fn find_port() -> CliResult<()> {
    match find_free_port(DEFAULT_PREFERRED_PORT, DEFAULT_PORT_RANGE) {
        Some(port) => {
            println!("{}", port);
            Ok(())
        }
        None => Err(CliError::Config(format!(
            "could not find a free port (tried ports {}-{} on localhost)",
            DEFAULT_PREFERRED_PORT,
            DEFAULT_PREFERRED_PORT + DEFAULT_PORT_RANGE - 1
        ))),
    }
}
