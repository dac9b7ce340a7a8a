pub mod archive;
pub mod config;
pub mod constants;
pub mod diff;
pub mod file;
pub mod gitlab;
pub mod http;
pub mod reporters;
pub mod runner;
pub mod types;
