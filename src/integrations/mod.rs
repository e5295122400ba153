pub mod accounts;
pub mod email;
pub mod meetings;
pub mod notifications;
