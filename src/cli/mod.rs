//! Interactive CLI: slash command interpreter and REPL

pub mod commands;
pub mod repl;

pub use commands::{help_text, parse, Command, ParsedLine};
pub use repl::ChatRepl;
