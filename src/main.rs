//! Binary entry point

use clap::Parser;

use docker_image_courier::Logger;
use docker_image_courier::cli::{Args, Runner};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(error) = Runner::new(args).run().await {
        Logger::new(false).error(&error.to_string());
        std::process::exit(1);
    }
}
