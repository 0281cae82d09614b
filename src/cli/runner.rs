//! Command dispatch: builds the session and drives the pipelines

use std::env;

use crate::cli::args::{Args, Commands, PullArgs, PushArgs};
use crate::error::Result;
use crate::image::reference::ImageRef;
use crate::image::session::{ImageSession, Platform};
use crate::image::{pull, push};
use crate::logging::Logger;
use crate::registry::RegistryClient;

pub const USERNAME_ENV: &str = "GO_DOCKER_USERNAME";
pub const PASSWORD_ENV: &str = "GO_DOCKER_PASSWORD";
const DEBUG_ENV: &str = "DEBUG";

pub struct Runner {
    args: Args,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub async fn run(self) -> Result<()> {
        self.args.validate()?;
        match self.args.command {
            Commands::Pull(args) => run_pull(args).await,
            Commands::Push(args) => run_push(args).await,
        }
    }
}

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

/// CLI credentials fall back to the environment
fn credential(flag: Option<String>, env_key: &str) -> String {
    flag.unwrap_or_else(|| env::var(env_key).unwrap_or_default())
}

async fn run_pull(args: PullArgs) -> Result<()> {
    let logger = Logger::new(args.verbose || debug_enabled());
    let reference = ImageRef::parse(&args.image)?;
    let platform = Platform::new(&args.os, &args.architecture, &args.variant);
    let username = credential(args.username, USERNAME_ENV);
    let password = credential(args.password, PASSWORD_ENV);
    if username.is_empty() != password.is_empty() {
        logger.warning("credentials are only used when both username and password are set");
    }
    let session = ImageSession::new(
        reference,
        username,
        password,
        args.insecure_registry,
        args.mirror,
        platform,
    );

    let dir = match args.dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };

    let mut client = RegistryClient::new(session)?;
    pull::pull_image(&mut client, &dir, &logger).await?;
    Ok(())
}

async fn run_push(args: PushArgs) -> Result<()> {
    let logger = Logger::new(args.verbose || debug_enabled());
    let reference = ImageRef::parse(&args.image)?;
    let platform = Platform::new(&args.os, &args.architecture, &args.variant);
    let username = credential(args.username, USERNAME_ENV);
    let password = credential(args.password, PASSWORD_ENV);
    if username.is_empty() != password.is_empty() {
        logger.warning("credentials are only used when both username and password are set");
    }
    let session = ImageSession::new(
        reference,
        username,
        password,
        args.insecure_registry,
        None,
        platform,
    );

    let mut client = RegistryClient::new(session)?;
    push::push_image(&mut client, &args.file, &logger).await
}
