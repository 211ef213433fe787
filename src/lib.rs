//! An RPKI relying-party validator and RPKI-to-Router (RTR) server.
//!
//! Trust anchor locators under a configured directory are each walked by
//! their own [`dispatcher`] worker to build a [`payload::Table`] of
//! validated ROAs and router keys; the merged result is published into a
//! [`payload::SharedHistory`], which [`rtr::server`] sessions consult to
//! answer Serial Query and Reset Query PDUs.

pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod log;
pub mod operation;
pub mod payload;
pub mod rtr;
pub mod tal;
pub mod uri;
pub mod utils;
