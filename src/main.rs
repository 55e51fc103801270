mod app;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use app::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();

    cli::run(Cli::parse())
}
