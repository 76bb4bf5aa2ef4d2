use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use agent_relay::{PgMessageStore, RelayClient, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage:");
        eprintln!("  relay-cli thread <context_id> <DATABASE_URL>");
        eprintln!("  relay-cli pending <recipient> <DATABASE_URL>");
        eprintln!("  relay-cli health <DATABASE_URL>");
        eprintln!();
        eprintln!("Set RELAY_CONFIG to a config file path to override the defaults.");
        std::process::exit(1);
    }

    agent_relay::telemetry::init_tracing(env::var("RELAY_LOG_JSON").is_ok())?;

    let config_path = env::var("RELAY_CONFIG").ok().map(PathBuf::from);
    let config = Arc::new(RelayConfig::load(config_path.as_deref())?);

    let cmd = args[1].as_str();

    match cmd {
        "thread" if args.len() == 4 => {
            let client = connect(&args[3], config).await?;
            let thread = client.thread(&args[2]).await?;
            let verdict = thread.validate(&client.config().workflow);

            println!("{}", serde_json::to_string_pretty(thread.messages())?);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        "pending" if args.len() == 4 => {
            let client = connect(&args[3], config).await?;
            let stats = client.pending_stats(Some(&args[2])).await?;
            println!(
                "{} pending message(s) for {}, oldest {}s old",
                stats.pending, args[2], stats.oldest_age_seconds
            );
        }
        "health" if args.len() == 3 => {
            let client = connect(&args[2], config).await?;
            let report = client.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                std::process::exit(2);
            }
        }
        _ => {
            eprintln!("Invalid arguments");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn connect(
    database_url: &str,
    config: Arc<RelayConfig>,
) -> Result<RelayClient<PgMessageStore>, Box<dyn std::error::Error>> {
    let store = PgMessageStore::connect(database_url).await?;
    Ok(RelayClient::new(Arc::new(store), config))
}
