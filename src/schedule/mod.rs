//! Scheduled task deletion
//!
//! - `spec` - frequency, schedule and job-name value types
//! - `policy` - frequency to schedule resolution
//! - `catalog` - the registry of named periodic jobs
//! - `scheduler` - keeps one deletion job per user in the catalog

pub mod catalog;
pub mod policy;
pub mod scheduler;
pub mod spec;

pub use catalog::{
    ActionRef, CatalogError, JobHandle, MemoryCatalog, NewScheduledJob, ScheduleCatalog, ScheduledJob,
};
pub use policy::resolve;
pub use scheduler::PerUserScheduler;
pub use spec::{DeletionFrequency, IntervalUnit, InvalidFrequency, JobName, ScheduleSpec};
