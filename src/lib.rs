pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod integrations;
pub mod locks;
pub mod middleware_layer;
pub mod models;
pub mod repositories;
pub mod scheduling;
pub mod services;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validation;
