//! Command line argument parsing and validation
//!
//! This module defines the clap argument structs for the `pull` and `push`
//! subcommands and their validation logic.

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{Result, TransferError};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "docker-image-courier",
    version,
    about = "Transfer Docker/OCI images between registries and the local filesystem",
    long_about = "Pulls images from a registry into a docker-load compatible directory and tar, \
                  and pushes such directories or tars back to a registry, without a container daemon."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Pull an image into a docker-load compatible directory and tar
    Pull(PullArgs),
    /// Push an image directory or tar to a registry
    Push(PushArgs),
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Commands::Pull(args) => args.validate(),
            Commands::Push(args) => args.validate(),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PullArgs {
    /// Image reference, e.g. `node:20` or `host:5000/ns/image@sha256:...`
    pub image: String,

    /// Output directory (defaults to the current directory)
    pub dir: Option<PathBuf>,

    /// Registry username (falls back to GO_DOCKER_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Registry password (falls back to GO_DOCKER_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Target operating system
    #[arg(long, default_value = "linux")]
    pub os: String,

    /// Target CPU architecture
    #[arg(long, default_value = "amd64")]
    pub architecture: String,

    /// CPU variant such as `v8`; empty matches any
    #[arg(long, default_value = "")]
    pub variant: String,

    /// Pull-through mirror base URL for Docker Hub blobs
    #[arg(long)]
    pub mirror: Option<String>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long, action = ArgAction::SetTrue)]
    pub insecure_registry: bool,

    /// Enable verbose output
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

impl PullArgs {
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(TransferError::InvalidReference(
                "image reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PushArgs {
    /// Image directory or tar produced by pull or `docker save`
    pub file: PathBuf,

    /// Target image reference
    pub image: String,

    /// Registry username (falls back to GO_DOCKER_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Registry password (falls back to GO_DOCKER_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Target operating system
    #[arg(long, default_value = "linux")]
    pub os: String,

    /// Target CPU architecture
    #[arg(long, default_value = "amd64")]
    pub architecture: String,

    /// CPU variant such as `v8`
    #[arg(long, default_value = "")]
    pub variant: String,

    /// Use plain HTTP instead of HTTPS
    #[arg(long, action = ArgAction::SetTrue)]
    pub insecure_registry: bool,

    /// Enable verbose output
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

impl PushArgs {
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(TransferError::InvalidReference(
                "image reference cannot be empty".to_string(),
            ));
        }
        if !self.file.exists() {
            return Err(TransferError::Upload(format!(
                "image file '{}' does not exist",
                self.file.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pull_defaults() {
        let args = Args::parse_from(["docker-image-courier", "pull", "node:20"]);
        match args.command {
            Commands::Pull(pull) => {
                assert_eq!(pull.image, "node:20");
                assert!(pull.dir.is_none());
                assert_eq!(pull.os, "linux");
                assert_eq!(pull.architecture, "amd64");
                assert_eq!(pull.variant, "");
                assert!(!pull.insecure_registry);
            }
            _ => panic!("expected pull"),
        }
    }

    #[test]
    fn test_parse_pull_with_flags() {
        let args = Args::parse_from([
            "docker-image-courier",
            "pull",
            "localhost:5000/user/image:tag",
            "/tmp/out",
            "--architecture",
            "arm64",
            "--variant",
            "v8",
            "--mirror",
            "https://mirror.example.com",
            "--insecure-registry",
        ]);
        match args.command {
            Commands::Pull(pull) => {
                assert_eq!(pull.dir, Some(PathBuf::from("/tmp/out")));
                assert_eq!(pull.architecture, "arm64");
                assert_eq!(pull.variant, "v8");
                assert_eq!(pull.mirror.as_deref(), Some("https://mirror.example.com"));
                assert!(pull.insecure_registry);
            }
            _ => panic!("expected pull"),
        }
    }

    #[test]
    fn test_parse_push() {
        let args = Args::parse_from([
            "docker-image-courier",
            "push",
            "image.tar",
            "localhost:5000/user/image:tag",
            "--username",
            "user",
            "--password",
            "secret",
        ]);
        match args.command {
            Commands::Push(push) => {
                assert_eq!(push.file, PathBuf::from("image.tar"));
                assert_eq!(push.image, "localhost:5000/user/image:tag");
                assert_eq!(push.username.as_deref(), Some("user"));
                assert_eq!(push.password.as_deref(), Some("secret"));
            }
            _ => panic!("expected push"),
        }
    }

    #[test]
    fn test_validate_missing_push_file() {
        let args = Args::parse_from([
            "docker-image-courier",
            "push",
            "/no/such/file.tar",
            "user/image:tag",
        ]);
        assert!(args.validate().is_err());
    }
}
