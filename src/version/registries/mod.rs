//! Registry implementations for fetching package data

pub mod npm;

pub use npm::NpmRegistry;
