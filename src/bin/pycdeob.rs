//! Command-line front end: reads a `.pyc`, applies a declarative rules
//! file, writes the rewritten container out. File I/O, the rules-file
//! loader, and the filesystem-watch loop are this binary's concern alone;
//! `pyc_marshal` itself never touches a filesystem.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pyc_marshal::{ConfigRules, Error, IdentityRules, Rules, Walker};

#[derive(Parser, Debug)]
#[command(name = "pycdeob", about = "Deobfuscate a CPython .pyc marshal stream")]
struct Cli {
    input: PathBuf,
    output: PathBuf,

    #[arg(long, default_value = "./default.pycrules")]
    rules: PathBuf,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    silent: bool,

    #[arg(long)]
    debug: Option<u8>,

    /// Re-run on every change to `input`, invoking the given shell command
    /// after each successful write. Not implemented by this binary; kept
    /// as a recognized flag so rules files targeting the full front end
    /// still parse.
    #[arg(long)]
    watch: Option<String>,
}

fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::Incompatible => 7,
        Error::UnexpectedTypeCode { .. } => 8,
        Error::MalformedLong { .. } => 11,
        Error::BadHeader(_) | Error::BufferOverflow { .. } | Error::Config(_) => 7,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.debug {
        None => log::LevelFilter::Warn,
        Some(0) => log::LevelFilter::Error,
        Some(1) => log::LevelFilter::Info,
        Some(2) => log::LevelFilter::Debug,
        Some(_) => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.silent { log::LevelFilter::Off } else { level })
        .init();

    if cli.watch.is_some() {
        log::warn!("--watch is accepted but not implemented by this binary");
    }

    run(&cli).unwrap_or_else(|code| code)
}

fn run(cli: &Cli) -> Result<ExitCode, ExitCode> {
    if !cli.input.exists() {
        log::error!("input not found: {}", cli.input.display());
        return Err(ExitCode::from(1));
    }

    if cli.output.exists() && !cli.force {
        log::error!("output exists, pass --force to overwrite: {}", cli.output.display());
        return Err(ExitCode::from(2));
    }

    let input = fs::read(&cli.input).map_err(|e| {
        log::error!("reading {}: {e}", cli.input.display());
        ExitCode::from(1)
    })?;

    let rules: Box<dyn Rules> = if cli.rules.exists() {
        let text = fs::read_to_string(&cli.rules).map_err(|e| {
            log::error!("reading rules file {}: {e}", cli.rules.display());
            ExitCode::from(6)
        })?;
        Box::new(ConfigRules::from_toml(&text).map_err(|e| {
            log::error!("parsing rules file {}: {e}", cli.rules.display());
            ExitCode::from(6)
        })?)
    } else {
        log::warn!("no rules file at {}, using identity rules", cli.rules.display());
        Box::new(IdentityRules)
    };

    let mut walker = Walker::new(input);
    let final_len = walker.walk(rules.as_ref()).map_err(|e| {
        log::error!("{e}");
        ExitCode::from(exit_code_for(&e))
    })?;

    fs::write(&cli.output, &walker.output()[..final_len]).map_err(|e| {
        log::error!("writing {}: {e}", cli.output.display());
        ExitCode::from(1)
    })?;

    Ok(ExitCode::SUCCESS)
}
