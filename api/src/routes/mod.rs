//! API Routes

pub mod docs;
pub mod health;
pub mod members;
pub mod quota;
