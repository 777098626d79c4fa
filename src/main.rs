use crate::cli::run;

pub mod cache;
pub mod catalog;
pub mod cli;
mod config;
pub mod context;
pub mod domain;
pub mod downloads;
pub mod http;
pub mod lyrics;
pub mod playback;
pub mod range;
pub mod resolver;
pub mod storage;
#[cfg(test)]
mod test_support;

fn main() -> anyhow::Result<()> {
    run()
}
