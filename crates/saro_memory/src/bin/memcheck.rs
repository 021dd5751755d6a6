//! # Memory Check
//!
//! Command-line tool that builds a heap from a config file and runs it
//! through allocation, reallocation, marshalling and envelope checks.

#![allow(unsafe_code)]

use std::process::ExitCode;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use saro_memory::{
    bytes_to_struct, struct_to_bytes, AllocatorKind, ConfiguredHeap, Heap, MemoryConfig,
    MemoryResult, CANARY,
};
use tracing_subscriber::EnvFilter;

const CHURN_ROUNDS: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Sample {
    id: u32,
    generation: u32,
    weight: f32,
    flags: u32,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SARO MEMORY CHECK                                        ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help") {
        println!("Usage: memcheck [config.toml] [--guard] [--quarantine <depth>]");
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => {
            println!();
            println!("All checks passed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &[String]) -> MemoryResult<MemoryConfig> {
    let mut config = match args.get(1).filter(|a| !a.starts_with("--")) {
        Some(path) => MemoryConfig::from_toml(path)?,
        None => MemoryConfig::default(),
    };
    if args.iter().any(|a| a == "--guard") {
        config.guard_boundaries = true;
    }
    if let Some(depth) = args
        .iter()
        .position(|a| a == "--quarantine")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
    {
        config.quarantine_depth = depth;
    }
    Ok(config)
}

fn run(args: &[String]) -> MemoryResult<()> {
    let config = load_config(args)?;
    let heap = ConfiguredHeap::from_config(&config)?;

    println!("┌─ HEAP ───────────────────────────────────────────────────────────┐");
    println!("│ Mode:        {}", if heap.is_guarded() { "guarded" } else { "plain" });
    println!("│ Backend:     {}", heap.backend_name());
    println!("│ Alignment:   {} bytes", heap.alignment());
    println!("│ Envelope:    {} bytes", heap.envelope_bytes());
    println!("│ Quarantine:  {} regions", config.quarantine_depth);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    check_cleared_alloc(&heap)?;
    check_realloc(&heap)?;
    check_marshalling()?;
    if heap.is_guarded() {
        check_overrun_is_reported(&heap)?;
    }
    churn(&heap)?;
    Ok(())
}

fn check_cleared_alloc(heap: &ConfiguredHeap) -> MemoryResult<()> {
    let data = heap.alloc_typed::<u32>(4, AllocatorKind::Persistent, true)?;
    // SAFETY: `data` holds 16 bytes and is freed once.
    let zeroed = unsafe {
        let zeroed = data.as_slice(16).iter().all(|&b| b == 0);
        heap.free(data, AllocatorKind::Persistent);
        zeroed
    };
    println!("[alloc]    4 x u32 cleared:             {}", verdict(zeroed));
    Ok(())
}

fn check_realloc(heap: &ConfiguredHeap) -> MemoryResult<()> {
    let old = heap.alloc(64, AllocatorKind::Persistent, false)?;
    // SAFETY: `old` holds 64 bytes, `grown` 256; each is freed once.
    let intact = unsafe {
        old.as_mut_slice(64).fill(0xAB);
        let grown = heap.realloc(old, 256, AllocatorKind::Persistent, 64, true, true)?;
        let view = grown.as_slice(256);
        let intact = view[..64].iter().all(|&b| b == 0xAB) && view[64..].iter().all(|&b| b == 0);
        heap.free(grown, AllocatorKind::Persistent);
        intact
    };
    println!("[realloc]  64 -> 256 bytes, tail clear:  {}", verdict(intact));
    Ok(())
}

fn check_marshalling() -> MemoryResult<()> {
    let sample = Sample {
        id: 7,
        generation: 3,
        weight: 0.5,
        flags: 0b1010,
    };
    let mut buffer = [0u8; 24];
    struct_to_bytes(&sample, &mut buffer, 4, 16)?;
    let back: Sample = bytes_to_struct(&buffer, 4, 16)?;
    println!("[marshal]  16-byte struct round trip:   {}", verdict(back == sample));
    Ok(())
}

fn check_overrun_is_reported(heap: &ConfiguredHeap) -> MemoryResult<()> {
    let data = heap.alloc(32, AllocatorKind::Persistent, true)?;
    // SAFETY: the byte after the region is the first trailing canary byte,
    // which is restored before the region is freed.
    let reported = unsafe {
        let past_end = data.as_ptr().add(32);
        past_end.write(0);
        let result = heap.verify(data);
        if let Err(e) = &result {
            println!("[guard]    {e}");
        }
        past_end.write(CANARY.to_ne_bytes()[0]);
        heap.verify(data)?;
        heap.free(data, AllocatorKind::Persistent);
        result.is_err()
    };
    println!("[guard]    one-byte overrun reported:   {}", verdict(reported));
    Ok(())
}

fn churn(heap: &ConfiguredHeap) -> MemoryResult<()> {
    let start = Instant::now();
    for i in 0..CHURN_ROUNDS {
        let bytes = 16 + (i % 64) * 8;
        let data = heap.alloc(bytes, AllocatorKind::TemporaryJob, i % 2 == 0)?;
        // SAFETY: `data` is live and freed once.
        unsafe { heap.free(data, AllocatorKind::TemporaryJob) };
    }
    let elapsed = start.elapsed();
    println!(
        "[churn]    {CHURN_ROUNDS} alloc/free pairs:     {:.1} ns/pair",
        elapsed.as_nanos() as f64 / CHURN_ROUNDS as f64
    );
    Ok(())
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAILED"
    }
}
