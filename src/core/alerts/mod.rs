// Alert visibility rules.
//
// Architecture:
// - model.rs: Stored alert record and its typed filter bag
// - filters.rs: Filter adapters compiling filter specs into predicates
// - evaluator.rs: The can_display decision
// - engine.rs: Collects what to render for a page request
// - conditions.rs: Human readable condition listings

pub mod conditions;
pub mod engine;
pub mod evaluator;
pub mod filters;
pub mod model;
