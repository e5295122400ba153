pub mod account;
pub mod availability;
pub mod notification;
pub mod purchase;
pub mod session;
