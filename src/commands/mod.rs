//! CLI subcommands

pub mod list;
pub mod newsletter;
pub mod render;
pub mod show;
