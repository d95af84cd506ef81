//! Command-line intake for configure binaries.
//!
//! Usage: `<binary> [flags...] [step-names...] [-- run-args...]`.  Help is
//! rendered by the engine itself (it must include options declared on past
//! runs), so clap's automatic help is disabled.

use anyhow::{anyhow, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bpp", disable_help_flag = true)]
struct Cli {
    /// Show help, do not execute.
    #[arg(short = 'h', long = "help")]
    help: bool,

    /// Print assembled commands and up-to-date notices.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short = 's', long)]
    silent: bool,

    /// Parallel worker count; 0 or absent uses the hardware hint.
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Write compile_commands.json at the project root.
    #[arg(long)]
    dump_compile_commands: bool,

    #[arg(long, hide = true)]
    export_steps: bool,

    /// Set an option: -Dkey or -Dkey=value.
    #[arg(short = 'D', value_name = "KEY[=VALUE]")]
    define: Vec<String>,

    #[arg(value_name = "STEP")]
    steps: Vec<String>,

    /// Passed through verbatim to the configure script.
    #[arg(last = true, value_name = "RUN-ARGS")]
    run_args: Vec<String>,
}

#[derive(Debug)]
pub struct ParsedArgs {
    pub help: bool,
    pub verbose: bool,
    pub silent: bool,
    pub jobs: Option<usize>,
    pub dump_compile_commands: bool,
    pub export_steps: bool,
    pub defines: Vec<(String, String)>,
    pub steps: Vec<String>,
    pub run_args: Vec<String>,
}

pub fn parse(argv: &[String]) -> Result<ParsedArgs> {
    let cli = Cli::try_parse_from(argv).map_err(|err| {
        let text = err.to_string();
        let first = text
            .lines()
            .next()
            .unwrap_or("invalid arguments")
            .trim_start_matches("error: ");
        anyhow!("{}", first)
    })?;

    let mut help = cli.help;
    let mut steps = cli.steps;
    // A bare `help` step means help, matching `-h`/`--help`.
    steps.retain(|s| {
        if s == "help" {
            help = true;
            false
        } else {
            true
        }
    });
    if steps.is_empty() && !cli.export_steps {
        help = true;
    }

    let defines = cli
        .define
        .iter()
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (token.clone(), "true".to_string()),
        })
        .collect();

    Ok(ParsedArgs {
        help,
        verbose: cli.verbose,
        silent: cli.silent,
        jobs: match cli.jobs {
            Some(0) => None,
            jobs => jobs,
        },
        dump_compile_commands: cli.dump_compile_commands,
        export_steps: cli.export_steps,
        defines,
        steps,
        run_args: cli.run_args,
    })
}
