pub mod analysis;
pub mod config;
pub mod error;
pub mod imaging;
pub mod models;
pub mod routes;
