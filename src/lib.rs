// Library exports for Wren
// This allows integration tests and external code to use Wren modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod posts;
pub mod profiles;
pub mod routes;
pub mod state;
pub mod storage;
