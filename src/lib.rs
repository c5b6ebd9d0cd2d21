// src/lib.rs: Library root for verite

pub mod cli;
pub mod harness;
pub mod infra;
pub mod pricing;
pub mod reconcile;
pub mod tools;
pub mod verify;
