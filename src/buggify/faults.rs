//! Fault identifiers
//!
//! Every injection site names its fault with one of these constants so that
//! statistics and per-fault overrides line up across runs.

/// Backing store faults
pub mod datastore {
    /// Opening a store handle fails
    pub const OPEN_FAIL: &str = "datastore.open_fail";
    /// A `get` fails with a transient error
    pub const GET_FAIL: &str = "datastore.get_fail";
    /// A `set` fails with a transient error
    pub const SET_FAIL: &str = "datastore.set_fail";
    /// Any request times out (reported as transient)
    pub const TIMEOUT: &str = "datastore.timeout";
    /// Request is rejected by the rate limiter (reported as transient)
    pub const THROTTLED: &str = "datastore.throttled";
}

/// Every known fault id, for reporting
pub const ALL_FAULTS: &[&str] = &[
    datastore::OPEN_FAIL,
    datastore::GET_FAIL,
    datastore::SET_FAIL,
    datastore::TIMEOUT,
    datastore::THROTTLED,
];
