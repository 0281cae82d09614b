//! Docker Image Courier
//!
//! `docker-image-courier` is a command-line tool and library for moving
//! Docker/OCI images between registries and the local filesystem without a
//! container daemon. It pulls a manifest and its blobs into a
//! `docker load`-compatible directory and tar, and pushes such a directory
//! or tar back to any Distribution-spec registry.
//!
//! ## Features
//! - **Daemonless pull and push**: talks the registry HTTP API directly.
//! - **Schema negotiation**: handles manifest schema 1, schema 2, and
//!   manifest lists with platform selection.
//! - **Resumable downloads**: partial blobs continue from their current
//!   size on the next run.
//! - **Mirror support**: Docker Hub blobs can be fetched through a mirror,
//!   with optional reverse-proxy rewriting of CDN redirects.
//! - **Gzip/zstd layers**: compressed layers are streamed to plain
//!   tarballs; uncompressed layers are gzip-normalized before push.
//! - **Blob dedup**: push skips blobs the registry already holds.
//!
//! ## Main Modules
//! - [`cli`] - Command-line interface and argument parsing.
//! - [`digest`] - SHA-256 digests and synthesized layer ids.
//! - [`error`] - Error types.
//! - [`image`] - References, sessions, layout, and the transfer pipelines.
//! - [`logging`] - Output control.
//! - [`registry`] - Registry protocol driver.
//! - [`tar_utils`] - Deterministic tar packaging.
//!
//! ## Example Usage
//!
//! ```sh
//! docker-image-courier pull node:20
//! docker-image-courier push registry-1.docker.io---library---node:20-amd64.tar \
//!     my-registry.example.com/mirror/node:20 --username user --password pass
//! ```

pub mod cli;
pub mod digest;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod tar_utils;

pub use error::{Result, TransferError};
pub use image::reference::ImageRef;
pub use image::session::{ImageSession, Platform};
pub use logging::Logger;
pub use registry::RegistryClient;
