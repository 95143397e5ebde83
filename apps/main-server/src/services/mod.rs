//! Server-side services.

pub mod identity;
pub mod relay;
pub mod storage;
