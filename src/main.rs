//! linkseq - run command sequences against a serial-linked device
//!
//! Inspects and executes the sequences of a configuration file. A real run
//! talks to the device over stdin/stdout (pipe them to the serial port, e.g.
//! with `socat`); `--simulate` answers every command in-process instead.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, error, info, warn};

use linkseq::config::loader::{ConfigLoader, LoadOptions};
use linkseq::events::{EventBus, SequenceEvent};
use linkseq::executor::ResponseRouter;
use linkseq::link::{spawn_simulated_device, ChannelLink, DeviceLink, StreamLink};
use linkseq::{Config, ConfigWatcher, RunOutcome, SequenceLibrary, SequenceRunner};

/// Command line arguments
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug logging
    debug: bool,
    action: Option<Action>,
    /// Answer commands in-process instead of using stdin/stdout
    simulate: bool,
    /// Flag overrides applied before running
    flags: Vec<(String, bool)>,
    /// Zone selection applied before running
    zones: Option<Vec<u8>>,
    /// Reload sequences when the config file changes
    watch: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    List,
    Expand(String),
    Validate(String),
    Run(String),
}

impl AppArgs {
    fn parse() -> anyhow::Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut app_args = AppArgs::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("Missing config file path")?;
                    app_args.config_path = Some(PathBuf::from(path));
                }
                "--debug" | "-d" => app_args.debug = true,
                "--list" => app_args.set_action(Action::List)?,
                "--expand" => {
                    let name = args.next().context("Missing sequence name for --expand")?;
                    app_args.set_action(Action::Expand(name))?;
                }
                "--validate" => {
                    let name = args.next().context("Missing sequence name for --validate")?;
                    app_args.set_action(Action::Validate(name))?;
                }
                "--run" => {
                    let name = args.next().context("Missing sequence name for --run")?;
                    app_args.set_action(Action::Run(name))?;
                }
                "--simulate" => app_args.simulate = true,
                "--flag" => {
                    let spec = args.next().context("Missing name=value for --flag")?;
                    app_args.flags.push(parse_flag(&spec)?);
                }
                "--zones" => {
                    let list = args.next().context("Missing zone list for --zones")?;
                    app_args.zones = Some(parse_zones(&list)?);
                }
                "--watch" => app_args.watch = true,
                "--help" | "-?" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("{} v{}", linkseq::NAME, linkseq::VERSION);
                    process::exit(0);
                }
                other if other.starts_with('-') => bail!("Unknown option: {}", other),
                other => warn!("Ignoring positional argument: {}", other),
            }
        }

        Ok(app_args)
    }

    fn set_action(&mut self, action: Action) -> anyhow::Result<()> {
        if let Some(existing) = &self.action {
            bail!("Conflicting actions: {:?} and {:?}", existing, action);
        }
        self.action = Some(action);
        Ok(())
    }
}

fn parse_flag(spec: &str) -> anyhow::Result<(String, bool)> {
    let (name, value) = spec
        .split_once('=')
        .with_context(|| format!("Flag '{}' is not name=value", spec))?;
    let value = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => true,
        "false" | "0" | "off" | "no" => false,
        other => bail!("Flag '{}' has non-boolean value '{}'", name, other),
    };
    Ok((name.trim().to_string(), value))
}

fn parse_zones(list: &str) -> anyhow::Result<Vec<u8>> {
    list.split(',')
        .map(|zone| {
            zone.trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid zone '{}'", zone))
        })
        .collect()
}

fn print_help() {
    println!("linkseq - command sequence execution engine for serial-linked devices");
    println!();
    println!("USAGE:");
    println!("    linkseq [OPTIONS] <ACTION>");
    println!();
    println!("ACTIONS:");
    println!("    --list                 List configured sequences");
    println!("    --expand <NAME>        Print the resolved directives of a sequence");
    println!("    --validate <NAME>      Print resolution and validation details as JSON");
    println!("    --run <NAME>           Execute a sequence");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("        --simulate         Answer commands in-process instead of stdin/stdout");
    println!("        --flag <NAME=BOOL> Set a flag before running (repeatable)");
    println!("        --zones <LIST>     Select zones before running, e.g. 1,3");
    println!("        --watch            Reload sequences when the config file changes");
    println!("    -?, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    linkseq looks for configuration files in the following order:");
    println!("    1. Path specified with --config or LINKSEQ_CONFIG");
    println!("    2. $XDG_CONFIG_HOME/linkseq/config.toml");
    println!("    3. ~/.config/linkseq/config.toml");
    println!("    4. ~/.linkseq/config.toml");
    println!("    5. ./linkseq.toml");
    println!("    6. Built-in defaults");
    println!();
    println!("ENVIRONMENT:");
    println!("    LINKSEQ_CONFIG         Path to configuration file");
    println!("    LINKSEQ_DEBUG          Enable debug logging (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

fn init_logging(debug: bool) {
    let debug = debug
        || env::var("LINKSEQ_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    let log_level = if debug { "debug" } else { "info" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    // stdout may be the device link, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Load the configuration and remember which file it came from
fn load_configuration(args: &AppArgs) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let explicit = args
        .config_path
        .clone()
        .or_else(|| env::var_os("LINKSEQ_CONFIG").map(PathBuf::from));

    if let Some(path) = explicit {
        let config = linkseq::init_with_config(&path)
            .map_err(|e| anyhow::anyhow!(linkseq::handle_startup_error(&e)))?;
        return Ok((config, Some(path)));
    }

    let mut loader = ConfigLoader::new();
    match loader.load_with(LoadOptions::default()) {
        Ok(config) => Ok((config, loader.current_path().map(PathBuf::from))),
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Ok((Config::default(), None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        print_help();
        process::exit(2);
    });

    init_logging(args.debug);
    debug!("Arguments: {:?}", args);

    let (config, config_path) = load_configuration(&args)?;

    let Some(action) = args.action.clone() else {
        print_help();
        process::exit(2);
    };

    match action {
        Action::List => {
            for name in config.sequence_names() {
                println!("{}", name);
            }
        }
        Action::Expand(name) => {
            let resolver = linkseq::SequenceResolver::from_config(&config);
            if !resolver.contains(&name) {
                bail!("Unknown sequence '{}'", name);
            }
            for directive in resolver.expand(&name) {
                println!("{}", directive);
            }
        }
        Action::Validate(name) => {
            let resolver = linkseq::SequenceResolver::from_config(&config);
            let info = resolver.sequence_info(&name);
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to render report")?
            );
            if !info.is_valid {
                process::exit(1);
            }
        }
        Action::Run(name) => {
            let outcome = run_sequence(&args, &config, config_path, &name).await?;
            let report =
                serde_json::to_string_pretty(&outcome).context("Failed to render outcome")?;
            if args.simulate {
                println!("{}", report);
            } else {
                eprintln!("{}", report);
            }
            if !outcome.success {
                process::exit(if outcome.is_cancelled() { 130 } else { 1 });
            }
        }
    }

    Ok(())
}

async fn run_sequence(
    args: &AppArgs,
    config: &Config,
    config_path: Option<PathBuf>,
    name: &str,
) -> anyhow::Result<RunOutcome> {
    let router = Arc::new(ResponseRouter::new(EventBus::new(
        config.execution.event_capacity,
    )));

    let link: Arc<dyn DeviceLink> = if args.simulate {
        let (link, commands) = ChannelLink::pair();
        spawn_simulated_device(
            commands,
            Arc::clone(&router),
            Duration::from_millis(20),
            |_| vec!["RECEIVED".to_string(), "complete".to_string()],
        );
        Arc::new(link)
    } else {
        Arc::new(StreamLink::spawn(
            tokio::io::stdin(),
            tokio::io::stdout(),
            Arc::clone(&router),
            config.execution.line_terminator.clone(),
        ))
    };

    let runner = Arc::new(
        SequenceRunner::from_config(config, link, router).context("Failed to set up runner")?,
    );
    for (flag, value) in &args.flags {
        runner.set_flag(flag, *value);
    }
    if let Some(zones) = &args.zones {
        runner
            .zones()
            .try_set_zones(zones)
            .context("Invalid --zones")?;
    }

    if args.watch {
        match config_path {
            Some(path) => {
                let resolver = Arc::clone(runner.resolver());
                let signals = Arc::clone(runner.signals());
                ConfigWatcher::start_background_watch(path, config.clone(), move |updated| {
                    resolver.reload(SequenceLibrary::from_config(&updated));
                    if let Err(e) = signals.load_config(&updated.signals) {
                        warn!("Signal mappings kept: {}", e);
                    }
                    info!("Sequence library reloaded");
                })
                .context("Failed to watch configuration")?;
            }
            None => warn!("--watch ignored: configuration did not come from a file"),
        }
    }

    let mut events = runner.events().subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SequenceEvent::ProgressUpdated { current, total, .. } => {
                    info!("Progress {}/{}", current, total)
                }
                SequenceEvent::ZoneStatusUpdated { zone, status } => {
                    info!("Zone {}: {}", zone, status)
                }
                SequenceEvent::SignalUpdated {
                    variable, value, ..
                } => info!("Signal {} = {}", variable, value),
                _ => {}
            }
        }
    });

    let canceller = Arc::clone(&runner);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            canceller.cancel();
        }
    });

    info!("Running '{}'", name);
    let outcome = runner.run(name).await.map_err(|e| {
        error!("Run could not start: {}", e);
        anyhow::Error::new(e)
    })?;
    Ok(outcome)
}
