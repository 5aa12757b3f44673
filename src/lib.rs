//! Staged approval workflow for wire manufacturing.
//!
//! A process instance walks a fixed sequence of stages, each made of
//! ordered steps signed off by a specific role. The crate provides the
//! workflow definition, the transition engine, role and field-level
//! permission checks, persistence, and the service that ties them into
//! start / approve / reject with an append-only audit trail.

pub mod cli;
pub mod config;
pub mod error;
pub mod permission;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod ui;
pub mod workflow;

pub use error::{ErrorClass, Result, WorkflowError};
pub use permission::{Actor, PermissionGate};
pub use service::{ManufacturingWorkflowService, ProcessEvent};
pub use state_machine::{Action, TransitionEngine};
pub use workflow::WorkflowDefinition;
