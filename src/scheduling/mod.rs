pub mod effects;
pub mod lifecycle;
pub mod slots;
