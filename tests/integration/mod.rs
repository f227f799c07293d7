//! Integration test suite for foreman.
//!
//! These tests drive full runs through the scheduler, agents and service
//! facade using scripted providers, and check the observable behavior:
//! final task statuses, the lifecycle event stream, and provider calls.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Full runs from task list to report
//! - `failure_propagation`: Failed tasks and their dependents
//! - `fallback`: Primary/fallback provider routing
//! - `concurrency`: Per-role bounds and dispatch order
//! - `cancellation`: Abort and per-task timeouts
//! - `performance`: Scaling thresholds

mod fixtures;

mod failure_propagation;
