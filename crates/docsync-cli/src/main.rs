use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use docsync_cache::DocumentCache;
use docsync_cli::commands;
use docsync_cli::DocsyncConfig;
use docsync_trigger::TaskCompletionTrigger;
use std::path::PathBuf;
use std::time::Duration;

fn cli() -> Command {
    Command::new("docsync")
        .version(docsync_cli::VERSION)
        .about("File-backed task documents with archival of completed tasks")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Document root (overrides the config file)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML config file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("show")
                .about("Print a document with line numbers")
                .arg(Arg::new("key").required(true).help("Document key"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("archive")
                .about("Move completed tasks to the archive document")
                .arg(Arg::new("key").required(true).help("Document key"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Archive completed tasks periodically until interrupted")
                .arg(
                    Arg::new("keys")
                        .num_args(0..)
                        .help("Document keys (default: trigger.keys from config)"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_parser(value_parser!(u64))
                        .help("Seconds between scans"),
                ),
        )
        .subcommand(
            Command::new("complete")
                .about("Mark a task completed")
                .arg(Arg::new("key").required(true).help("Document key"))
                .arg(
                    Arg::new("line")
                        .required(true)
                        .value_parser(value_parser!(usize))
                        .help("Zero-based line number, as printed by `show`"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Append a pending task")
                .arg(Arg::new("key").required(true).help("Document key"))
                .arg(Arg::new("text").required(true).help("Task text")),
        )
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<DocsyncConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DocsyncConfig::load(path)?,
        None => DocsyncConfig::default(),
    };
    if let Some(root) = matches.get_one::<PathBuf>("root") {
        config = config.with_root(root);
    }
    Ok(config)
}

fn key_arg(args: &ArgMatches) -> anyhow::Result<docsync_model::DocKey> {
    let raw = args
        .get_one::<String>("key")
        .context("missing document key")?;
    commands::parse_key(raw)
}

async fn run(matches: ArgMatches) -> anyhow::Result<String> {
    let config = load_config(&matches)?;
    tracing::debug!(root = %config.root.display(), "using document root");
    let cache = DocumentCache::open(&config.root, config.cache.clone());

    match matches.subcommand() {
        Some(("show", args)) => commands::show(&cache, &key_arg(args)?, args.get_flag("json")).await,
        Some(("archive", args)) => {
            let trigger = TaskCompletionTrigger::new(cache, &config.trigger);
            commands::archive(&trigger, &key_arg(args)?, args.get_flag("json")).await
        }
        Some(("watch", args)) => {
            let mut trigger_config = config.trigger.clone();
            if let Some(raw) = args.get_many::<String>("keys") {
                let keys = raw
                    .map(|k| commands::parse_key(k))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                if !keys.is_empty() {
                    trigger_config = trigger_config.with_keys(keys);
                }
            }
            if let Some(secs) = args.get_one::<u64>("interval") {
                trigger_config = trigger_config.with_scan_interval(Duration::from_secs(*secs));
            }
            anyhow::ensure!(!trigger_config.keys.is_empty(), "no document keys to watch");

            let trigger = TaskCompletionTrigger::new(cache, &trigger_config);
            let stop = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for ctrl-c, stopping");
                }
            };
            commands::watch(trigger, &trigger_config, stop).await
        }
        Some(("complete", args)) => {
            let line = *args.get_one::<usize>("line").context("missing line number")?;
            commands::complete(&cache, &key_arg(args)?, line).await
        }
        Some(("add", args)) => {
            let text = args.get_one::<String>("text").context("missing task text")?;
            commands::add(&cache, &key_arg(args)?, text).await
        }
        _ => anyhow::bail!("unknown command"),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match run(matches).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let matches = cli()
            .try_get_matches_from(["docsync", "show", "today.md", "--root", "/tmp/notes", "--json"])
            .unwrap();
        assert_eq!(matches.get_one::<PathBuf>("root"), Some(&PathBuf::from("/tmp/notes")));
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "show");
        assert!(args.get_flag("json"));
    }
}
