use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use subset_cli::{run, Scenario};
use subset_engine::EngineConfig;
use subset_model::{ManagedListItemId, SubsetSignature};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn cli() -> Command {
    Command::new("subsetctl")
        .version(subset_engine::VERSION)
        .about("Managed list subset engine")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Write logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Replay a scenario file against an in-memory store")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario YAML file"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine config TOML file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output report as JSON"),
                ),
        )
        .subcommand(
            Command::new("signature")
                .about("Print the subset signature of a set of item ids")
                .arg(
                    Arg::new("items")
                        .required(true)
                        .num_args(1..)
                        .help("Managed list item ids (UUIDs)"),
                ),
        )
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EngineConfig::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => {
            let scenario_path = args
                .get_one::<PathBuf>("scenario")
                .context("scenario path is required")?;
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let scenario = Scenario::load(scenario_path)?;

            let report = run(&scenario, config).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.generate_text());
            }
        }
        Some(("signature", args)) => {
            let items = args
                .get_many::<String>("items")
                .into_iter()
                .flatten()
                .map(|raw| {
                    raw.parse::<ManagedListItemId>()
                        .with_context(|| format!("invalid item id {raw:?}"))
                })
                .collect::<Result<Vec<_>>>()?;
            let signature = SubsetSignature::build(items)?;
            println!("{signature}");
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
