// Public API - engines, data types and export functions
pub mod config;
pub mod error;
pub mod export;
pub mod ping;
pub mod probe;
pub mod state;
pub mod trace;

// Command-line surface and name lookups
pub mod cli;
pub mod lookup;
