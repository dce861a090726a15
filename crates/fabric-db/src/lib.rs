//! Durable persistence for the task orchestration core.
//!
//! This crate owns every row that outlives a process: tasks, plans, runs,
//! audit events, LLM usage, pricing, and per-tenant quotas. Callers in
//! `fabric-core` hold only identifiers and go through the functions here to
//! read or mutate state -- there is no in-process cache of entity state.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
