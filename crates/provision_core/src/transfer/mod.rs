//! Transfer tracking for payload sub-steps.
//!
//! One [`TransferResult`] per [`TransferCategory`] is created when a device
//! run starts. Each result leaves `Pending` exactly once and is terminal
//! afterwards; the tracker is consumed at the end of the run to build the
//! [`TransferSummary`] line.

mod tracker;

pub use tracker::{
    TransferCategory, TransferFailure, TransferResult, TransferStatus, TransferSummary,
    TransferTracker,
};
