//! Staging-to-star-schema transforms: the dimension builder and the fact
//! merge engine. Both read only committed staging data and may run in either
//! order.

pub mod dimensions;
pub mod fact;
pub mod time;

pub use dimensions::{DimensionBuilder, DimensionReport};
pub use fact::{FactMerger, MergeReport};
