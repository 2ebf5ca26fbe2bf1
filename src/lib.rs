/// Family Records - family health record backend
///
/// Child profiles and medical records with share-code access control: an
/// owner shares a child through an 8-character code, and every read or
/// write passes through the visibility resolver.

pub mod api;
pub mod children;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod rate_limit;
pub mod records;
pub mod server;
pub mod sharing;
