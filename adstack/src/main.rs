use clap::Parser as ClapParser;
use std::{io, process};

use adstack::{
    AdStack, TapeCreateInfo,
    sweep::{Sweep, SweepConfig},
};

const MISMATCH_PRINT_LIMIT: usize = 10;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of forward steps to record
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    /// Steps per checkpointed segment, 0 records every step up front
    #[arg(long, default_value_t = 50)]
    checkpoint_every: usize,

    /// Replays of each checkpointed segment during the adjoint sweep
    #[arg(long, default_value_t = 2)]
    replays: usize,

    /// Main stack block size in bytes
    #[arg(long, help = "Block size in bytes (default 65536)")]
    block_size: Option<usize>,

    /// Elements per typed buffer
    #[arg(long, help = "Typed buffer capacity (default 512)")]
    buffer_capacity: Option<usize>,

    /// Print the tape and buffers once the sweep is done
    #[arg(long)]
    dump: bool,

    /// Print every push and pop in sequence notation
    #[arg(long)]
    trace: bool,

    /// Log repeat levels and block allocation
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter),
    )
    .init();

    let mut tape = match AdStack::new(TapeCreateInfo {
        block_size: cli.block_size,
        buffer_capacity: cli.buffer_capacity,
    }) {
        Ok(tape) => tape,
        Err(err) => {
            eprintln!("Error creating tape: {}", err);
            process::exit(1);
        }
    };

    let config = SweepConfig {
        steps: cli.steps,
        checkpoint_every: cli.checkpoint_every,
        replays: cli.replays,
    };

    let sweep = Sweep::new(&mut tape, config);
    let result = if cli.trace {
        let mut out = io::stdout().lock();
        sweep.with_trace(&mut out).run()
    } else {
        sweep.run()
    };
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Error during sweep: {}", err);
            process::exit(1);
        }
    };

    if cli.dump {
        println!("{}", tape.dump());
        print!("{}", tape.dump_buffers());
    }

    println!(
        "{} steps checked, {} mismatches",
        report.steps_checked,
        report.mismatches.len()
    );
    println!(
        "{} bytes maximum tape memory ({} blocks)",
        report.peak_bytes, report.peak_blocks
    );
    println!("{} bytes pushed", report.total_traffic);

    for mismatch in report.mismatches.iter().take(MISMATCH_PRINT_LIMIT) {
        eprintln!(
            "step {}: expected {} found {}",
            mismatch.step, mismatch.expected, mismatch.found
        );
    }
    if !report.balanced {
        eprintln!("tape did not return to its starting position");
    }
    if !report.is_clean() {
        process::exit(1);
    }
}
