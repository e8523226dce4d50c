//! Filestore subsystem: the metadata tree over registered backend mounts
//! (spec §4.2–§4.4, components C2–C4). [`mutations::FilestoreService`] is
//! the entry point the rest of the crate (and an embedding HTTP layer)
//! drives; [`rollup`], [`rollup_cache`], and [`rollup_worker`] are its
//! aggregate-maintenance machinery, and [`reconcile`] is the drift-detection
//! counterpart (spec §4.5, component C5).

pub mod mutations;
pub mod reconcile;
pub mod rollup;
pub mod rollup_cache;
pub mod rollup_worker;

pub use mutations::FilestoreService;
pub use reconcile::ReconciliationManager;
