pub mod build;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod flock;
pub mod git;
pub mod model;

mod api;
#[cfg(test)]
mod testing;

pub use api::{GrammarFetch, GrammarFetchBuilder};
