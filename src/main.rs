use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::{info, LevelFilter};
use scpi_mp::commands;
use scpi_mp::config::{DEFAULT_SIMULATOR_HOST, DEFAULT_SIMULATOR_PORT};
use scpi_mp::loader::load_csv_file;
use scpi_mp::registry::connect_failures;
use scpi_mp::simulator::{CommandTable, Profile, SimulatorListener};
use scpi_mp::{
    ClientConfig, Command, Dispatcher, Endpoint, EndpointRegistry, Group, SimulatorConfig,
    Transcript,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Send SCPI commands to groups of instruments, or simulate an instrument.
#[derive(Debug, Parser)]
#[command(name = "scpi_cli", version)]
struct Cli {
    /// Log every frame sent and received
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run a simulated instrument
    Simulate(SimulateArgs),
    /// Send one command to a group and print every response
    Send(SendArgs),
    /// Type commands interactively
    Console(TargetArgs),
}

#[derive(Debug, Args)]
struct SimulateArgs {
    #[arg(long, default_value = DEFAULT_SIMULATOR_HOST)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_SIMULATOR_PORT)]
    port: u16,

    /// Built-in command table: instrument or load
    #[arg(long, default_value = "instrument")]
    profile: Profile,

    /// TOML command table, replacing the profile
    #[arg(long)]
    table: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Address shared by the ports given on the command line
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Load ports, comma-separated
    #[arg(long, value_delimiter = ',')]
    loads: Vec<u16>,

    /// Source ports, comma-separated
    #[arg(long, value_delimiter = ',')]
    sources: Vec<u16>,

    /// CSV file with Name,IP,Port,Type rows
    #[arg(long)]
    csv: Option<PathBuf>,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Per-endpoint bound on each command
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Debug, Args)]
struct SendArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// loads or sources
    #[arg(long, default_value = "loads")]
    group: Group,

    #[arg(long)]
    command: String,

    /// Also write the responses to this file
    #[arg(long)]
    transcript: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env()
        .init();

    match cli.mode {
        Mode::Simulate(args) => run_simulator(args),
        Mode::Send(args) => run_send(args),
        Mode::Console(args) => run_console(args),
    }
}

fn run_simulator(args: SimulateArgs) -> anyhow::Result<()> {
    let table = match &args.table {
        Some(path) => CommandTable::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => args.profile.table(),
    };
    let config = SimulatorConfig {
        host: args.host,
        port: args.port,
    };

    println!("=========================");
    println!("  SCPI Simulator ({})  ", args.profile);
    println!("=========================");

    let listener = SimulatorListener::bind(config.address(), table)
        .with_context(|| format!("binding {}", config.address()))?;
    println!("Listening on {}. Press Ctrl+C to exit.", listener.local_addr()?);
    listener.serve();
    Ok(())
}

/// Builds the registry from the command line.
///
/// Ports given with `--loads`/`--sources` are added after the CSV rows, so
/// they win on a shared port. Every endpoint replaced that way is returned
/// as a warning line for the operator.
fn build_registry(target: &TargetArgs) -> anyhow::Result<(EndpointRegistry, Vec<String>)> {
    let mut registry = EndpointRegistry::new();
    let mut warnings = Vec::new();
    let mut report = |group: Group, replaced: Endpoint| {
        warnings.push(format!(
            "[WARNING] {} {} on port {} replaced by a later definition.",
            group,
            replaced.identity(),
            replaced.port()
        ));
    };

    if let Some(path) = &target.csv {
        let records = load_csv_file(path).with_context(|| format!("loading {}", path.display()))?;
        for (group, replaced) in registry.populate(records)? {
            report(group, replaced);
        }
    }
    for (group, ports) in [(Group::Loads, &target.loads), (Group::Sources, &target.sources)] {
        for replaced in registry.add_ports(group, &target.host, ports)? {
            report(group, replaced);
        }
    }

    if registry.is_empty() {
        anyhow::bail!("no endpoints given; use --loads, --sources or --csv");
    }
    Ok((registry, warnings))
}

/// Builds the registry from the command line and connects every group.
fn connect(target: &TargetArgs) -> anyhow::Result<(EndpointRegistry, ClientConfig)> {
    let config = ClientConfig::from_millis(target.connect_timeout_ms, target.timeout_ms);
    let (mut registry, warnings) = build_registry(target)?;
    for warning in &warnings {
        eprintln!("{}", warning);
    }

    for group in Group::ALL {
        let outcomes = registry.connect_all(group, config.connect_timeout);
        for (identity, err) in connect_failures(&outcomes) {
            eprintln!("[ERROR] {}: {}", identity, err);
        }
        let connected = outcomes.len() - connect_failures(&outcomes).count();
        if !outcomes.is_empty() {
            println!("Connected {}/{} {}.", connected, outcomes.len(), group);
        }
    }
    Ok((registry, config))
}

fn run_send(args: SendArgs) -> anyhow::Result<()> {
    let command = Command::new(&args.command)?;
    let (mut registry, config) = connect(&args.target)?;
    let dispatcher = Dispatcher::from_config(&config);

    let result = dispatcher.dispatch(registry.group_mut(args.group), &command);
    let mut transcript = Transcript::new();
    transcript.record(&result);
    for line in transcript.lines() {
        println!("{}", line);
    }
    registry.disconnect_all();

    if let Some(path) = &args.transcript {
        transcript.save(path)?;
    }
    Ok(())
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

fn run_console(args: TargetArgs) -> anyhow::Result<()> {
    let (mut registry, config) = connect(&args)?;
    let dispatcher = Dispatcher::from_config(&config);
    let mut transcript = Transcript::new();

    println!("\n--- Console ---");
    println!("Enter '<group> <command>' (e.g. 'loads *IDN?'), 'voltage <V>', 'current <A>',");
    println!("'presets', 'save <file>', or 'back' to exit.");
    prompt()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let input = input.trim();

        if input == "back" {
            break;
        }
        if input.is_empty() {
            prompt()?;
            continue;
        }

        let (head, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();
        match head {
            "presets" => {
                for preset in commands::PRESETS {
                    println!("  {}", preset);
                }
            }
            "save" if !rest.is_empty() => match transcript.save(Path::new(rest)) {
                Ok(()) => println!("Responses saved to {}.", rest),
                Err(e) => eprintln!("[ERROR] {}", e),
            },
            // Setters go to the loads and never wait for a reply.
            "voltage" | "current" if !rest.is_empty() => {
                let command = if head == "voltage" {
                    commands::set_voltage(rest)
                } else {
                    commands::set_current(rest)
                };
                match command {
                    Ok(command) => {
                        let result =
                            dispatcher.dispatch_with(registry.group_mut(Group::Loads), &command, false);
                        print_result(&mut transcript, &result);
                    }
                    Err(e) => eprintln!("[ERROR] {}", e),
                }
            }
            _ => match (head.parse::<Group>(), Command::new(rest)) {
                (Ok(group), Ok(command)) => {
                    let result = dispatcher.dispatch(registry.group_mut(group), &command);
                    if result.is_empty() {
                        eprintln!("[WARNING] No endpoints in {}.", group);
                    }
                    print_result(&mut transcript, &result);
                }
                (Err(e), _) => eprintln!("[ERROR] {}", e),
                (_, Err(e)) => eprintln!("[ERROR] {}", e),
            },
        }
        prompt()?;
    }

    registry.disconnect_all();
    info!("console closed");
    Ok(())
}

fn print_result(transcript: &mut Transcript, result: &scpi_mp::DispatchResult) {
    for line in result.render() {
        println!("< {}", line);
        transcript.push(line);
    }
}
