//! Registry protocol driver: bearer auth, manifest negotiation, blob
//! transfers, and the push upload protocol

pub mod auth;
pub mod blob;
pub mod client;
pub mod manifest;
pub mod upload;

pub use client::RegistryClient;
