pub mod cli;
pub mod host;
pub mod session;
pub mod shell;
