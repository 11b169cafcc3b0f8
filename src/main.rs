use matching_engine::{cli::run_cli, utils::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    run_cli().await
}
