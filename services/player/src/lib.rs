//! Classroom Player Library Crate
//!
//! Terminal host for the lesson engine: configuration, lesson content and
//! audio manifest loading, the progress store, and the runtime that executes
//! engine commands. The `classroom` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod content;
pub mod manifest;
pub mod render;
pub mod runtime;
pub mod store;
