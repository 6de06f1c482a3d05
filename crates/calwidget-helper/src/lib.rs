//! calwidget-helper: CLI surface of the OAuth helper.
//!
//! The binary is invoked by the widget, which parses stdout as JSON; every
//! diagnostic goes to stderr and the process exits 0 on success, 1 on any
//! failure.

pub mod cli;
pub mod commands;
pub mod error;
pub mod paths;
