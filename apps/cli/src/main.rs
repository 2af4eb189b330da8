//! Chatscribe CLI: turn shared ChatGPT conversations into blog articles.
//!
//! Generates an article from a share link or a text file, or serves the
//! same pipeline as a server-sent-events endpoint.

mod commands;
mod server;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
