//! CLI module

pub mod commands;

pub fn run() -> anyhow::Result<i32> {
    commands::run()
}
