mod cli;

use clap::Parser;
use cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_tracing(&args.log_level, args.log_json)?;
    tracing::info!(
        listen_address = %args.listen_address,
        alertmanager = %args.alertmanager_address,
        "starting alert2pg"
    );

    cli::app::run(args).await
}
