//! Study planner client: calendar scheduling and a focus/break timer over
//! the task backend, plus model-written schedule and progress feedback.

pub mod application;
pub mod domain;
pub mod infrastructure;
