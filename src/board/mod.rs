//! Task board integrations.
//!
//! Boards implement `pipeline::BoardClient`; a `BoardConnector` turns the
//! credentials carried by each request into a bound client.

pub mod trello;

pub use trello::{TrelloClient, TrelloConnector};
