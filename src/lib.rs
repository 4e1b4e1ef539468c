pub mod cache;
pub mod config;
pub mod eras;
pub mod logging;
pub mod profile;
pub mod version;
