pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod types;

// Fetch adapters behind the PayloadFetcher seam
pub mod infra;
