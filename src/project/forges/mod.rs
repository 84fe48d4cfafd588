//! Forge client implementations

pub mod github;

pub use github::GitHubForge;
