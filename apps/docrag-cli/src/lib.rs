//! Library side of the `docrag` binary: argument parsing, logging setup and
//! the command implementations.

pub mod app;
pub mod cli;
pub mod logging;

pub use app::App;
pub use cli::{Cli, Command};
