//! Testing utilities for retry scenarios.
//!
//! This module provides:
//! - Scenario operations with explicit invocation counters
//! - Assertions for deferred results

mod assertions;
mod fixtures;

pub use assertions::{
    assert_exhausted_after, assert_failed, assert_fulfilled_with, assert_pending,
};
pub use fixtures::{
    simulated_task, FailurePlan, InvocationCounter, ScenarioClient, SIMULATED_ERROR, SUCCESS,
    TASK_LATENCY,
};
