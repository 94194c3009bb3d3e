#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vdisk_cli::{LineOutcome, Shell, StdinConfirmer};

#[derive(Parser)]
#[command(
    name = "vdisk",
    about = "VDisk — simulated MBR disk manager with RAID-1 mirroring"
)]
struct Cli {
    /// Execute commands from a script file instead of the interactive
    /// prompt.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Base directory for relative disk paths (defaults to the process
    /// working directory).
    #[arg(long)]
    cwd: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VDISK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve working directory")?,
    };

    let mut shell = Shell::new(cwd, io::stdout(), StdinConfirmer);

    if let Some(script) = cli.script {
        let text = fs::read_to_string(&script)
            .with_context(|| format!("read script {}", script.display()))?;
        for line in text.lines() {
            if shell.run_line(line)? == LineOutcome::Exit {
                break;
            }
        }
        return Ok(());
    }

    let stdin = io::stdin();
    loop {
        {
            let mut stdout = io::stdout().lock();
            write!(stdout, "vdisk> ")?;
            stdout.flush()?;
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if shell.run_line(&line)? == LineOutcome::Exit {
            break;
        }
    }
    Ok(())
}
