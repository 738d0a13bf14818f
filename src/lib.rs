pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod firebase;
pub mod reading_cache;
pub mod sensors;
pub mod session;
pub mod source;
pub mod weather;
