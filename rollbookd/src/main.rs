use rollbookd::daemon::{AgentConfig, AgentRuntime};
use rollbookd::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Disconnect,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--disconnect" => mode = CliMode::Disconnect,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    match parse_cli_mode(std::env::args())? {
        CliMode::Disconnect => {
            let store = match std::env::var("ROLLBOOK_STATE_DB") {
                Ok(path) => StateStore::new_at(&path.into()).await?,
                Err(_) => StateStore::new_default().await?,
            };
            store.disconnect().await?;
            eprintln!("[rollbookd] credential removed; pending changes are kept");
            return Ok(());
        }
        CliMode::Help => {
            println!("Usage: rollbookd [--disconnect]");
            println!("  --disconnect   Remove the saved credential and exit");
            return Ok(());
        }
        CliMode::Run => {}
    }
    let config = AgentConfig::from_env()?;
    let runtime = AgentRuntime::bootstrap(config).await?;
    runtime.run().await
}
