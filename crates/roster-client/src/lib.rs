//! Client side of the personnel record protocol.
//!
//! A [`Client`] identifies itself on connect and can ask the server to create
//! or send records. Pushed messages are applied to a local [`PersonnelStore`]
//! mirror by [`spawn_inbound`].
//!
//! [`PersonnelStore`]: roster_core::store::PersonnelStore

pub mod client;

pub use client::{Client, apply, run_inbound, spawn_inbound};
