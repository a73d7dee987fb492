//! Typed clients for the downstream services.
//!
//! Each client is a thin set of [`Method`](crate::pipeline::Method) handles
//! over one [`LogicalService`](crate::pipeline::LogicalService); all
//! resilience behaviour lives in the pipeline.

pub mod feed;
pub mod profile;
pub mod topic;

pub use feed::FeedClient;
pub use profile::ProfileClient;
pub use topic::TopicClient;
