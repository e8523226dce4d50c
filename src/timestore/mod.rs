//! Timestore subsystem: schema-evolving, time-partitioned dataset ingestion
//! and query planning (spec §4.6–§4.8, components C6–C8). [`ingest`] is the
//! write path ([`TimestoreService`]); [`query_plan`] is the read-side planner
//! ([`QueryPlanner`]); [`spool`], [`statistics`], and [`flush`] are their
//! shared machinery.

pub mod flush;
pub mod ingest;
pub mod query_plan;
pub mod spool;
pub mod statistics;

pub use ingest::{IngestOutcome, IngestRequest, TimestoreService};
pub use query_plan::{Filter, Predicate, QueryPlan, QueryPlanner, QueryRequest};
pub use spool::Spool;
