//! Request dispatch pipeline.
//!
//! The [`Dispatcher`] ties the pieces together for one request: build the
//! per-request match tree, run conflict resolution, gate the HTTP method
//! against the terminal route's method set, resolve an action through the
//! cached resolver chain, execute it against the data source, and wrap the
//! outcome in a [`ResponseEnvelope`]. Every failure mode is a typed
//! [`DispatchError`] variant with a fixed HTTP-equivalent status.

mod core;

pub use self::core::{
    CancelToken, DispatchError, Dispatcher, HeaderVec, ResponseEnvelope, RouteInfo,
    MAX_INLINE_HEADERS,
};
