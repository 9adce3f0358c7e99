//! Router Module Index
//!
//! Splits the routes by who may call them. Access control is attached at the router level
//! (middleware layers), never left to individual handlers.

/// Routes open to everyone, signed in or not.
pub mod public;

/// Routes for any signed-in account; anonymous callers are redirected to sign-in.
pub mod student;

/// Staff routes under `/manage`, each group behind a ViewGuard.
pub mod manage;
