//! Session management.
//!
//! A [`Session`] owns one conversation log and its tutor configuration.
//! Sessions live in a [`SessionRegistry`] and are shared as
//! [`SessionHandle`]s; all access goes through the handle's lock.

mod registry;
mod state;

pub use registry::{SessionHandle, SessionRegistry};
pub use state::Session;
