use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use kiln_jit::OptLevel;

mod commands;
mod error;

use commands::{check::handle_check, compile::handle_compile, run::handle_run, show::handle_show};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Load, compile and run kiln IR modules natively", long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Compile a module and call one of its functions
    Run {
        /// Textual IR or bitcode file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Function to call
        #[arg(value_name = "FUNCTION")]
        function: String,
        /// Arguments: nil, true, false, integers, floats or strings
        #[arg(value_name = "ARGS", allow_hyphen_values = true)]
        args: Vec<String>,
        /// Pass arguments and read the result as raw machine integers
        #[arg(long)]
        raw: bool,
        /// Cranelift optimization level (none, speed, speed_and_size)
        #[arg(long, value_name = "LEVEL", default_value = "none")]
        opt_level: OptLevel,
    },

    /// Write a module as bitcode
    Compile {
        /// Textual IR or bitcode file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output file (defaults to FILE with a .bc extension)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Print a module as textual IR
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Parse and verify a module
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    match args.command {
        Command::Run {
            file,
            function,
            args,
            raw,
            opt_level,
        } => handle_run(&file, &function, &args, raw, opt_level)?,
        Command::Compile { file, output } => {
            let written = handle_compile(&file, output)?;
            println!("wrote {}", written.display());
        }
        Command::Show { file } => handle_show(&file)?,
        Command::Check { file } => handle_check(&file)?,
    }
    Ok(())
}
