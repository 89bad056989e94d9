#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod error;
pub mod pool;
pub mod publisher;
pub mod subscriber;
pub mod topics;

mod connect;
mod counters;
mod timer;

pub use aggregate::aggregate;
pub use error::{AggregateError, RunError, WorkerError};
pub use pool::{ClientPool, PoolRun};
pub use publisher::Publisher;
pub use subscriber::Subscriber;

pub use mqbench_core as types;

pub mod prelude {
    pub use crate::aggregate::aggregate;
    pub use crate::pool::{ClientPool, PoolRun};
    pub use mqbench_core::{
        ClientResult, Connector, ErrorPolicy, Mode, Qos, RunConfig, RunMetadata, TotalResult,
    };
}
