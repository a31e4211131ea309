mod cli;
mod render;
mod snapshot;

use clap::Parser;
use eyre_pretty::eyre::Result;

fn setup_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new("agbtool=info,celeste=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    eyre_pretty::install()?;
    setup_tracing();
    let cfg = cli::Config::parse();

    match &cfg.command {
        cli::Command::Render(args) => render::render(args),
        cli::Command::Inspect(args) => render::inspect(args),
    }
}
