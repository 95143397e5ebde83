//! Wire types for Taskboard server/client communication.
//!
//! This crate defines the JSON envelope every HTTP endpoint answers with, the
//! request and response bodies of the HTTP API, and the named events carried
//! over the real-time relay connection.

mod envelope;
mod events;
mod requests;
mod responses;

pub use envelope::*;
pub use events::*;
pub use requests::*;
pub use responses::*;
