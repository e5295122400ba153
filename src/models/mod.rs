pub mod account;
pub mod auth_session;
pub mod availability;
pub mod purchase;
pub mod session;
pub mod slot;
