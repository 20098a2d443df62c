//! Social feed sources.
//!
//! Each source implements `pipeline::FeedClient`. X recent search is the
//! only one shipped.

pub mod x;

pub use x::XFeedClient;
