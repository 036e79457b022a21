pub mod cache;
pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod github;
pub mod model;
pub mod output;
pub mod stats;
