use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use codegen_eval::batch::Filter;
use codegen_eval::codegen::Strategy;
use codegen_eval::commands::{self, CoverageArgs, RunOverrides};
use codegen_eval::config::EvalConfig;
use codegen_eval::logger;
use codegen_eval::testgen::TestGenMode;

#[derive(Parser)]
#[command(
    name = "codegen-eval",
    version,
    about = "Prompt LLMs for solutions, run them in a sandbox, and repair failures from test feedback."
)]
struct Cli {
    #[arg(long, global = true, help = "Config file (default: <config dir>/codegen-eval/config.toml)")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "More logging (-v debug, -vv trace)")]
    verbose: u8,

    #[arg(short, long, global = true, help = "Only log errors")]
    quiet: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Evaluate every configured model x strategy x problem
    Run(RunArgs),

    /// Check the built-in fixtures against the reference solutions
    Baseline,

    /// Run one file (code or a saved model response) against a problem's checks
    Check {
        problem: String,
        file: PathBuf,
    },

    /// List the problem catalog
    Problems,

    /// Continue the repair loop from every failed record in a results file
    Redebug {
        #[arg(long, help = "Results stream (default: <out_dir>/results.jsonl)")]
        results: Option<PathBuf>,

        #[arg(long, help = "Where to write (default: <out_dir>/redebug)")]
        out_dir: Option<PathBuf>,
    },

    /// Measure line/branch coverage of solutions, then add model-written tests
    Coverage(CoverageCmd),

    /// Write the first passing solution per problem as <dir>/<problem>.py
    Export {
        results: PathBuf,
        dir: PathBuf,

        #[arg(long, value_delimiter = ',', help = "Models to take solutions from first")]
        prefer: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, help = "Only this problem (repeatable)")]
    problem: Vec<String>,

    #[arg(long, help = "Only this strategy (repeatable)")]
    strategy: Vec<Strategy>,

    #[arg(long, help = "Only this model, by name or provider:model (repeatable)")]
    model: Vec<String>,

    #[arg(long, help = "Samples per sampling strategy")]
    k: Option<usize>,

    #[arg(long, help = "Repair rounds for self_repair")]
    max_repairs: Option<usize>,

    #[arg(long, help = "Output directory")]
    out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CoverageCmd {
    #[arg(long, help = "Only this problem (repeatable)")]
    problem: Vec<String>,

    #[arg(long, help = "Code or saved response to measure (needs one --problem)")]
    solution: Option<PathBuf>,

    #[arg(long, help = "Take passing candidates from this stream (default: <out_dir>/results.jsonl)")]
    results: Option<PathBuf>,

    #[arg(long, help = "coverage | spec_guided (default: coverage)")]
    mode: Option<TestGenMode>,

    #[arg(long, help = "Generated test files per problem")]
    iterations: Option<usize>,

    #[arg(long, help = "Model that writes the tests, by name or provider:model")]
    model: Vec<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logger::init(cli.verbose, cli.quiet);

    let cfg = EvalConfig::load(cli.config.as_deref())?;

    let ok = match cli.command {
        CliCommand::Run(args) => commands::run(
            cfg,
            Filter {
                problems: args.problem,
                strategies: args.strategy,
                models: args.model,
            },
            RunOverrides {
                k: args.k,
                max_repairs: args.max_repairs,
                out_dir: args.out_dir,
            },
        )?,
        CliCommand::Baseline => commands::baseline()?,
        CliCommand::Check { problem, file } => commands::check(&cfg, &problem, &file)?,
        CliCommand::Problems => commands::problems(&cfg)?,
        CliCommand::Redebug { results, out_dir } => {
            commands::redebug(&cfg, results.as_deref(), out_dir.as_deref())?
        }
        CliCommand::Coverage(args) => commands::coverage(
            &cfg,
            CoverageArgs {
                problems: args.problem,
                solution: args.solution,
                results: args.results,
                mode: args.mode,
                iterations: args.iterations,
                model: args.model,
            },
        )?,
        CliCommand::Export {
            results,
            dir,
            prefer,
        } => commands::export(&results, &dir, &prefer)?,
    };

    if !ok {
        process::exit(1);
    }
    Ok(())
}
