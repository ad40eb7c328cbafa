//! Tracker module
//!
//! HTTP announce and compact peer list decoding.

pub mod http;

pub use http::{AnnounceRequest, AnnounceResponse, HttpTracker, PeerSource, DEFAULT_TRACKER_TIMEOUT};
