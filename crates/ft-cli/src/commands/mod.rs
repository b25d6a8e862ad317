//! CLI subcommand implementations.

pub mod history;
pub mod ignore;
pub mod track;
pub mod util;
pub mod window;
