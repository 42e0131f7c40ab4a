use std::path::PathBuf;

use clap::Parser;

/// Portal LLM gateway
#[derive(Debug, Parser)]
#[command(name = "portal", about = "Multi-tenant LLM gateway: transformer, pipeline, and scope kernel")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "portal.toml", env = "PORTAL_CONFIG")]
    pub config: PathBuf,
}
