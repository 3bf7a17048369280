//! bmch CLI

use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use bmch::bmc::{CexTrace, EngineKind};
use bmch::config::BmcConfig;
use bmch::cpg::CutPointGraph;
use bmch::diagnostics::Diagnostics;
use bmch::error::report_error;
use bmch::harness::HarnessEmitter;
use bmch::mir::MirProgram;
use bmch::pass::{BmcPass, PassContext};
use bmch::smt::Z3Solver;
use bmch::stats::Stats;
use bmch::{BmchError, Result, Span};

#[derive(Parser)]
#[command(name = "bmch", version, about = "Bounded model checking with replay harnesses")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the entry function of a program
    Bmc(BmcArgs),
    /// Print the checkpoint graph of each function
    Cpg {
        /// Program file (.mir or .json)
        file: PathBuf,
    },
    /// Parse and dump the program as JSON (debug)
    Parse {
        /// Program file (.mir)
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Program file (.mir)
        file: PathBuf,
    },
}

#[derive(Args)]
struct BmcArgs {
    /// Program file (.mir or .json)
    file: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Function to check
    #[arg(long)]
    entry: Option<String>,

    /// Write the SMT-LIB2 encoding to a file
    #[arg(long, value_name = "FILE")]
    smt_out: Option<PathBuf>,

    /// Encode only, do not run the solver
    #[arg(long)]
    no_solve: bool,

    /// Write a replay harness (LLVM IR) on sat
    #[arg(long, value_name = "FILE")]
    harness: Option<PathBuf>,

    /// Define the get_value_<ty> providers in the harness
    #[arg(long)]
    emit_providers: bool,

    /// Separator characters of non-original function names
    #[arg(long)]
    separators: Option<String>,

    /// Print the counterexample to stderr on sat
    #[arg(long)]
    cex: bool,

    /// Log the unsat core on unsat
    #[arg(long)]
    unsat_core: bool,

    /// Disable the constant-branch analysis of the path engine
    #[arg(long)]
    no_absint: bool,

    /// Print statistics as JSON to stderr
    #[arg(long)]
    stats: bool,

    /// Path of the z3 binary
    #[arg(long, value_name = "PATH")]
    z3: Option<String>,

    /// Solver timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl BmcArgs {
    /// File configuration with command-line overrides applied
    fn config(&self) -> Result<BmcConfig> {
        let mut config = match &self.config {
            Some(path) => BmcConfig::load(path)?,
            None => BmcConfig::default(),
        };
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(entry) = &self.entry {
            config.entry = entry.clone();
        }
        if self.no_solve {
            config.solve = false;
        }
        if self.unsat_core {
            config.unsat_core = true;
        }
        if self.no_absint {
            config.abstract_interpretation = false;
        }
        if let Some(z3) = &self.z3 {
            config.solver.path = z3.clone();
        }
        if let Some(timeout) = self.timeout {
            config.solver.timeout_secs = Some(timeout);
        }
        if let Some(separators) = &self.separators {
            config.harness.separators = separators.clone();
        }
        if self.emit_providers {
            config.harness.default_providers = true;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let file = match &cli.command {
        Command::Bmc(args) => &args.file,
        Command::Cpg { file } | Command::Parse { file } | Command::Tokens { file } => file,
    };
    let filename = file.display().to_string();
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read '{filename}': {e}");
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Command::Bmc(args) => run_bmc(args, &filename, &source),
        Command::Cpg { .. } => print_cpg(&filename, &source),
        Command::Parse { .. } => parse_file(&filename, &source),
        Command::Tokens { .. } => tokenize_file(&source),
    };

    if let Err(e) = result {
        report_error(&filename, &source, &e);
        std::process::exit(1);
    }
}

/// Textual MIR, or its JSON form for `.json` files
fn load(filename: &str, source: &str) -> Result<MirProgram> {
    if Path::new(filename).extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(source)
            .map_err(|e| BmchError::parser(format!("Invalid JSON program: {e}"), Span::default()))
    } else {
        bmch::load_program(filename, source)
    }
}

fn run_bmc(args: &BmcArgs, filename: &str, source: &str) -> Result<()> {
    let config = args.config()?;
    let program = load(filename, source)?;

    let mut solver = Z3Solver::with_command(&config.solver.path);
    if let Some(secs) = config.solver.timeout_secs {
        solver = solver.with_timeout_secs(secs);
    }

    let mut pass = BmcPass::from_config(&config).with_cex(args.cex);
    if args.harness.is_some() {
        pass = pass.with_harness(config.harness.filter());
    }

    let mut smt_file = match &args.smt_out {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut diag = Diagnostics::new();
    let mut stats = Stats::new();

    let run = {
        let mut ctx = PassContext {
            out: &mut out,
            smt_out: smt_file.as_mut().map(|w| w as &mut dyn Write),
            diag: &mut diag,
            stats: &mut stats,
        };
        pass.run(&program, &mut solver, &mut ctx)?
    };
    if let Some(mut w) = smt_file {
        w.flush()?;
    }

    if let Some(run) = run {
        if args.cex
            && let Some(raw) = &run.trace
            && let Some(func) = program.function(&run.function)
        {
            eprint!("{}", CexTrace::new(func, raw.clone()));
        }
        if let (Some(path), Some(module)) = (&args.harness, &run.harness) {
            let emitter = HarnessEmitter::new().with_default_providers(config.harness.default_providers);
            std::fs::write(path, emitter.emit(module)?)?;
            tracing::info!("harness with {} stubs written to {}", module.stubs.len(), path.display());
        }
    }

    if args.stats {
        let json = stats
            .to_json()
            .map_err(|e| BmchError::io_error(e.to_string()))?;
        eprintln!("{json}");
    }
    Ok(())
}

fn print_cpg(filename: &str, source: &str) -> Result<()> {
    let program = load(filename, source)?;
    for func in &program.functions {
        print!("{}", CutPointGraph::build(func).render(func));
    }
    Ok(())
}

fn parse_file(filename: &str, source: &str) -> Result<()> {
    let program = bmch::load_program(filename, source)?;
    let json = serde_json::to_string_pretty(&program)
        .map_err(|e| BmchError::io_error(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn tokenize_file(source: &str) -> Result<()> {
    let tokens = bmch::lexer::tokenize(source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }
    Ok(())
}
