//! Runs a digit-tape program.
//!
//! # Usage
//! ```text
//! digitape <file> [OPTIONS]
//! digitape -e <source> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `file`: Program source to encode and run
//!
//! # Options
//! - `-e, --eval <source>`: Run `source` instead of a file
//! - `--transports <list>`: Transport kinds tried by `CON`, in order
//! - `--connect-timeout <ms>`, `--io-timeout <ms>`: Socket timeouts
//! - `--max-steps <n>`: Halt after `n` steps
//! - `--on-eof <zero|keep|halt>`: What `RD` does at end of input
//! - `--dump`: Print the encoded image instead of running it
//! - `--profile`: Print executed opcode counts to stderr after the run
//! - `-v, --verbose`: Debug logging
//!
//! Program output goes to stdout; logs and the profile go to stderr.

use digitape::network::transport::parse_order;
use digitape::utils::log::{self, Level};
use digitape::virtual_machine::encoder::{Image, encode, encode_file};
use digitape::virtual_machine::errors::VMError;
use digitape::virtual_machine::host::StdHost;
use digitape::virtual_machine::vm::config::{EofPolicy, VmConfig};
use digitape::virtual_machine::vm::{Halt, Vm};
use digitape::{debug, error, info, warn};
use std::env;
use std::process;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinError;

/// How long a cancelled run may take to notice the stop flag before the
/// process exits anyway (the interpreter can be blocked in a read).
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Exit code used when Ctrl+C interrupts a run stuck in blocking I/O.
const EXIT_INTERRUPTED: i32 = 130;

/// Environment variable holding the log level when `-v` is absent.
const LOG_ENV: &str = "DIGITAPE_LOG";

enum Source {
    File(String),
    Inline(String),
}

struct Options {
    source: Source,
    config: VmConfig,
    dump: bool,
    profile: bool,
    verbose: bool,
}

type RunOutcome = (Result<Halt, VMError>, Vm<StdHost>);

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("digitape");

    if args.len() < 2 || args[1..].iter().any(|a| a == "--help" || a == "-h") {
        print_usage(program);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = match parse_args(&args[1..]) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}\n");
            print_usage(program);
            process::exit(1);
        }
    };

    configure_logging(options.verbose);

    let image = match &options.source {
        Source::File(path) => encode_file(path).unwrap_or_else(|e| {
            error!("{e}");
            process::exit(1);
        }),
        Source::Inline(source) => encode(source),
    };
    debug!(
        "encoded {} cells, tape starts at {:#06x}",
        image.emitted(),
        image.tape_start()
    );

    if options.dump {
        print!("{}", image.hex_dump());
        return;
    }

    let (result, vm) = run(image, options.config).await;

    if options.profile {
        eprint!("{}", vm.profile().table());
    }

    match result {
        Ok(halt) => {
            if halt != Halt::End {
                info!("Stopped: {halt} after {} steps", vm.steps());
            }
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

/// Runs the interpreter on a blocking thread, cancelling it on Ctrl+C.
async fn run(image: Image, config: VmConfig) -> RunOutcome {
    let vm = Vm::with_config(image, StdHost::stdio(), config);
    let stop = vm.stop_handle();
    let mut task = tokio::task::spawn_blocking(move || {
        let mut vm = vm;
        let result = vm.run();
        (result, vm)
    });

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = wait_for_ctrl_c() => None,
    };

    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("Ctrl+C received, stopping...");
            stop.store(true, Ordering::Relaxed);
            match tokio::time::timeout(CANCEL_GRACE, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Interpreter is blocked on I/O, exiting");
                    process::exit(EXIT_INTERRUPTED);
                }
            }
        }
    };

    joined.unwrap_or_else(|e: JoinError| {
        error!("Interpreter task failed: {e}");
        process::exit(1);
    })
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to setup Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}

fn configure_logging(verbose: bool) {
    if verbose {
        log::set_level(Level::Debug);
        return;
    }
    if let Ok(value) = env::var(LOG_ENV) {
        match value.parse::<Level>() {
            Ok(level) => log::set_level(level),
            Err(e) => warn!("Ignoring {LOG_ENV}: {e}"),
        }
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut source = None;
    let mut config = VmConfig::default();
    let mut dump = false;
    let mut profile = false;
    let mut verbose = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires an argument"))
        };
        match arg.as_str() {
            "-e" | "--eval" => {
                let text = value(arg)?;
                set_source(&mut source, Source::Inline(text))?;
            }
            "--transports" => {
                let list = value(arg)?;
                let order = parse_order(&list).map_err(|e| e.to_string())?;
                if order.is_empty() {
                    return Err("--transports needs at least one kind".to_string());
                }
                config.transports = order;
            }
            "--connect-timeout" => {
                config.connect_timeout = Some(parse_millis(arg, &value(arg)?)?);
            }
            "--io-timeout" => {
                config.io_timeout = Some(parse_millis(arg, &value(arg)?)?);
            }
            "--max-steps" => {
                let text = value(arg)?;
                let steps = text
                    .parse()
                    .map_err(|_| format!("Invalid step count: {text}"))?;
                config.max_steps = Some(steps);
            }
            "--on-eof" => {
                config.on_eof = value(arg)?.parse::<EofPolicy>()?;
            }
            "--dump" => dump = true,
            "--profile" => profile = true,
            "-v" | "--verbose" => verbose = true,
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(format!("Unexpected argument: {other}"));
            }
            path => set_source(&mut source, Source::File(path.to_string()))?,
        }
    }

    let source = source.ok_or_else(|| "No program given".to_string())?;
    Ok(Options {
        source,
        config,
        dump,
        profile,
        verbose,
    })
}

fn set_source(slot: &mut Option<Source>, source: Source) -> Result<(), String> {
    if slot.is_some() {
        return Err("Only one program may be given".to_string());
    }
    *slot = Some(source);
    Ok(())
}

fn parse_millis(flag: &str, text: &str) -> Result<Duration, String> {
    text.parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("{flag} expects milliseconds, got '{text}'"))
}

const USAGE: &str = "\
Digit-tape virtual machine

USAGE:
    {program} <file> [OPTIONS]
    {program} -e <source> [OPTIONS]

ARGS:
    <file>    Program source; every whitespace-separated token becomes one
              cell holding the sum of its decimal digits

OPTIONS:
    -e, --eval <source>        Run <source> instead of a file
    --transports <list>        Kinds tried by CON, in order
                               (default: tcp,udp,raw,unix,unixgram,unixpacket)
    --connect-timeout <ms>     Bound each tcp/raw connect attempt
    --io-timeout <ms>          Read/write timeout on connections
    --max-steps <n>            Halt after <n> steps
    --on-eof <zero|keep|halt>  What RD does at end of input (default: zero)
    --dump                     Print the encoded image and exit
    --profile                  Print executed opcode counts to stderr
    -v, --verbose              Enable debug logging
    -h, --help                 Print this help message

ENVIRONMENT:
    DIGITAPE_LOG    Log level when -v is absent (debug, info, warn, error)

EXAMPLES:
    # Print a zero byte and a newline
    {program} -e '1 19'

    # Echo one byte of input
    echo A | {program} -e '2 1 19'
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
