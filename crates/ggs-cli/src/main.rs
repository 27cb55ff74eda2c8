// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use ggs_cli::{CliError, detect, error_envelope, load_series, write_json_output};
use ggs_offline::GgsParams;
use std::env;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

enum Command {
    Detect(DetectArgs),
}

#[derive(Debug, PartialEq)]
struct DetectArgs {
    params: GgsParams,
    labels: bool,
    input: PathBuf,
    output: Option<PathBuf>,
}

impl Default for DetectArgs {
    fn default() -> Self {
        Self {
            params: GgsParams::default(),
            labels: false,
            input: PathBuf::new(),
            output: None,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", error_envelope(&err));
        process::exit(err.exit_code());
    }
}

fn run() -> Result<(), CliError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = parse_cli(&args)? else {
        return Ok(());
    };

    match command {
        Command::Detect(args) => {
            init_tracing(args.params.verbose);
            handle_detect(args)
        }
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` selects `info` and the default is `warn`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_cli(args: &[String]) -> Result<Option<Command>, CliError> {
    let Some(command_name) = args.first() else {
        print_root_help();
        return Ok(None);
    };

    if matches!(command_name.as_str(), "-h" | "--help") {
        print_root_help();
        return Ok(None);
    }
    if matches!(command_name.as_str(), "-V" | "--version") {
        print_version();
        return Ok(None);
    }

    let rest = &args[1..];
    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_command_help(command_name)?;
        return Ok(None);
    }
    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        print_version();
        return Ok(None);
    }

    match command_name.as_str() {
        "detect" => Ok(Some(Command::Detect(parse_detect_args(rest)?))),
        _ => Err(CliError::usage(format!(
            "unknown command '{command_name}'; expected: detect"
        ))),
    }
}

fn parse_detect_args(tokens: &[String]) -> Result<DetectArgs, CliError> {
    let mut args = DetectArgs::default();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline_value) = split_flag(tokens[idx].as_str())?;
        match flag {
            "--k-max" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.params.k_max = parse_usize_arg(&raw, flag)?;
            }
            "--lamb" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.params.lamb = parse_f64_arg(&raw, flag)?;
            }
            "--max-shuffles" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.params.max_shuffles = parse_usize_arg(&raw, flag)?;
            }
            "--seed" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.params.random_state = Some(parse_u64_arg(&raw, flag)?);
            }
            "--verbose" => {
                ensure_no_inline_value(flag, inline_value)?;
                args.params.verbose = true;
            }
            "--labels" => {
                ensure_no_inline_value(flag, inline_value)?;
                args.labels = true;
            }
            "--input" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.input = PathBuf::from(raw);
            }
            "--output" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.output = Some(PathBuf::from(raw));
            }
            other => {
                return Err(CliError::usage(format!("unknown detect option '{other}'")));
            }
        }
        idx += 1;
    }

    if args.input.as_os_str().is_empty() {
        return Err(CliError::usage("detect requires --input <path>"));
    }
    args.params.validate()?;

    Ok(args)
}

fn handle_detect(args: DetectArgs) -> Result<(), CliError> {
    let series = load_series(&args.input)?;
    tracing::info!(
        path = %args.input.display(),
        n = series.buffer.n(),
        d = series.buffer.d(),
        "loaded input"
    );
    let output = detect(&series, args.params, args.labels)?;
    write_json_output(&output, args.output.as_deref())
}

fn split_flag(token: &str) -> Result<(&str, Option<String>), CliError> {
    if !token.starts_with("--") {
        return Err(CliError::usage(format!(
            "unexpected positional argument '{token}'; expected --flag value"
        )));
    }
    if let Some((flag, value)) = token.split_once('=') {
        return Ok((flag, Some(value.to_string())));
    }
    Ok((token, None))
}

fn take_flag_value(
    flag: &str,
    inline_value: Option<String>,
    tokens: &[String],
    idx: &mut usize,
) -> Result<String, CliError> {
    if let Some(value) = inline_value {
        return Ok(value);
    }

    *idx += 1;
    let value = tokens
        .get(*idx)
        .ok_or_else(|| CliError::usage(format!("{flag} requires a value")))?;
    if value.starts_with("--") {
        return Err(CliError::usage(format!(
            "{flag} requires a value, but got option '{value}'"
        )));
    }
    Ok(value.clone())
}

fn ensure_no_inline_value(flag: &str, inline_value: Option<String>) -> Result<(), CliError> {
    if inline_value.is_some() {
        return Err(CliError::usage(format!("{flag} does not accept a value")));
    }
    Ok(())
}

fn parse_usize_arg(raw: &str, flag: &str) -> Result<usize, CliError> {
    raw.parse::<usize>().map_err(|_| {
        CliError::usage(format!(
            "{flag} expects a non-negative integer, got '{raw}'"
        ))
    })
}

fn parse_u64_arg(raw: &str, flag: &str) -> Result<u64, CliError> {
    raw.parse::<u64>().map_err(|_| {
        CliError::usage(format!(
            "{flag} expects a non-negative integer, got '{raw}'"
        ))
    })
}

fn parse_f64_arg(raw: &str, flag: &str) -> Result<f64, CliError> {
    raw.parse::<f64>()
        .map_err(|_| CliError::usage(format!("{flag} expects a number, got '{raw}'")))
}

fn print_version() {
    println!("ggs {}", env!("CARGO_PKG_VERSION"));
}

fn print_root_help() {
    println!(
        "ggs {}\n\nUSAGE:\n  ggs <COMMAND> [OPTIONS]\n\nCOMMANDS:\n  detect   Segment a series with greedy Gaussian segmentation\n\nGLOBAL OPTIONS:\n  -h, --help      Show help\n  -V, --version   Show version\n\nRun 'ggs <COMMAND> --help' for subcommand options.",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_command_help(command: &str) -> Result<(), CliError> {
    match command {
        "detect" => {
            println!(
                "USAGE:\n  ggs detect --input <path> [OPTIONS]\n\nOPTIONS:\n  --input <path>           Required (.csv or .json)\n  --k-max <usize>          Default: 10\n  --lamb <float>           Default: 1.0\n  --max-shuffles <usize>   Default: 250\n  --seed <u64>             Refinement order seed, default 0\n  --verbose                Log growth and refinement steps at info level\n  --labels                 Include per-sample segment labels\n  --output <path>          Write JSON output to file"
            );
            Ok(())
        }
        _ => Err(CliError::usage(format!(
            "unknown command '{command}'; expected: detect"
        ))),
    }
}
