//! Day-partitioned archive layout and retrieval.
//!
//! Archived objects live under `<topic>/year=YYYY/month=MM/day=DD/<object-name>`.
//! A [`DateRange`] yields one [`DatePartition`] per calendar day and the
//! [`ArchiveRetriever`] lists and downloads the objects of one partition.

mod partition;
mod retriever;

pub use partition::{DatePartition, DateRange, Days};
pub use retriever::{ArchiveObjectRef, ArchiveRetriever, ObjectBuffer};
