//! Sandbox module for remote execution environments.
//!
//! This module provides the [`SandboxProvider`] and [`SandboxSession`] traits
//! that concrete backends implement, the [`SessionManager`] that caches one
//! session per agent, and a [`LocalSandboxProvider`] that runs commands on
//! the host.

mod local;
mod provider;
mod session;

pub use local::{LocalSandbox, LocalSandboxProvider};
pub use provider::{
    CommandOutput, CreateSandbox, OutputChannel, OutputChunk, RunOptions, SandboxProvider,
    SandboxSession,
};
pub use session::{SessionManager, SessionState};
