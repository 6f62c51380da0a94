//! Scenario-level tests exercising the system end to end rather than one
//! module at a time. Unit tests for individual invariants live alongside
//! the code they cover.

mod action_scenarios;
mod queue_scenarios;
