//! Playbook execution for freckles
//!
//! The engine:
//! 1. Workspace - writes the playbook, inventory and roles of one run
//! 2. Process - runs `ansible-playbook` and streams its event lines
//! 3. Archive - keeps every run's working directory for inspection

pub mod process;
pub mod workspace;

pub use process::ProcessEngine;
