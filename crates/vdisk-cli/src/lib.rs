#![forbid(unsafe_code)]
//! Front-end for the VDisk layout engine: the `-key=value` command surface,
//! an interactive shell / script runner, and confirmation prompts.

pub mod command;
pub mod shell;

pub use command::Command;
pub use shell::{AutoConfirm, Confirmation, Confirmer, LineOutcome, Shell, StdinConfirmer};
