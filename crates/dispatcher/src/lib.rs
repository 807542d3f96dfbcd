//! 中心服务侧的集群能力视图

pub mod capability_aggregator;

pub use capability_aggregator::{CacheUpdate, CapabilityAggregator};
