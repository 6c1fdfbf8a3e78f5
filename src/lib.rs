//! Offline sync engine for an e-commerce client.
//!
//! Reads go through [`router::RequestRouter`], which serves from the network
//! or the response cache depending on the path. Writes go through
//! [`sync::Submitter`]; anything the server does not acknowledge lands in the
//! [`outbox::Outbox`] and is drained later by [`sync::SyncCoordinator`].

pub mod actions;
pub mod app;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod event;
pub mod net;
pub mod notify;
pub mod outbox;
pub mod router;
pub mod sync;

#[cfg(test)]
mod testing;
