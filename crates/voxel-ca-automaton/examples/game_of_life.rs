//! Conway's Game of Life written in the rule language and run by a `LazyWorld`.
//!
//! Live cells are white wool on the `y = 0` plane; the rule counts the
//! horizontal Moore neighborhood.
//!
//! Run with:
//! ```bash
//! cargo run --example game_of_life -p voxel-ca-automaton
//! cargo run --example game_of_life -p voxel-ca-automaton -- --wgsl
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use voxel_ca_automaton::{EngineConfig, LazyWorld, MemoryWorld};
use voxel_ca_core::{BlockPalette, CellPos};
use voxel_ca_lang::{KernelConfig, Program};

const LIFE: &str = "\
// dies unless it has two or three live neighbors
#white_wool & [!2]moore2d@#white_wool & [!3]moore2d@#white_wool -> #air
// born with exactly three
#air & [3]moore2d@#white_wool -> #white_wool
";

// =============================================================================
// Pattern Setters
// =============================================================================

fn place(world: &mut MemoryWorld, wool: i64, origin: (i32, i32), cells: &[(i32, i32)]) {
    for (dx, dz) in cells {
        world.set_block(CellPos::new(origin.0 + dx, 0, origin.1 + dz), wool);
    }
}

/// Glider heading toward +x, +z.
fn set_glider(world: &mut MemoryWorld, wool: i64, x: i32, z: i32) {
    place(world, wool, (x, z), &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
}

/// Period-2 oscillator.
fn set_blinker(world: &mut MemoryWorld, wool: i64, x: i32, z: i32) {
    place(world, wool, (x, z), &[(0, 0), (1, 0), (2, 0)]);
}

/// Still life.
fn set_block(world: &mut MemoryWorld, wool: i64, x: i32, z: i32) {
    place(world, wool, (x, z), &[(0, 0), (1, 0), (0, 1), (1, 1)]);
}

// =============================================================================
// Visualization
// =============================================================================

fn print_grid(world: &LazyWorld<MemoryWorld>, wool: i64, width: i32, depth: i32, generation: u64) {
    print!("\x1B[2J\x1B[H");

    println!("═══════════════════════════════════════════════════════════════");
    println!("  Conway's Game of Life - Generation {}", generation);
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    println!("  ┌{}┐", "─".repeat(width as usize));
    for z in 0..depth {
        print!("  │");
        for x in 0..width {
            if world.state_at(CellPos::new(x, 0, z), 0) == wool {
                print!("\x1B[92m█\x1B[0m");
            } else {
                print!(" ");
            }
        }
        println!("│");
    }
    println!("  └{}┘", "─".repeat(width as usize));

    let alive = world
        .host()
        .non_air_blocks()
        .iter()
        .filter(|(_, value)| *value == wool)
        .count();
    println!();
    println!(
        "  Alive cells: {}  |  Tracked cells: {}",
        alive,
        world.tracked_cell_count()
    );
    println!();
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let palette = BlockPalette::builtin();
    let program = Program::from_source(LIFE, &palette)?;

    if std::env::args().nth(1).as_deref() == Some("--wgsl") {
        let kernel = program.compile_kernel(KernelConfig::default())?;
        println!("{}", kernel.source());
        return Ok(());
    }

    let width = 40;
    let depth = 20;
    let max_generations = 200;
    let delay_ms = 100;

    let wool = palette
        .resolve("white_wool")
        .ok_or_else(|| anyhow::anyhow!("palette has no white_wool"))?;

    let mut host = MemoryWorld::new();
    set_glider(&mut host, wool, 2, 2);
    set_glider(&mut host, wool, 15, 5);
    set_blinker(&mut host, wool, 30, 10);
    set_block(&mut host, wool, 35, 2);

    let mut world = LazyWorld::register(host, Arc::new(program.compile()), EngineConfig::fast())?;

    println!("Starting simulation...\n");
    println!("  Controls: Press Ctrl+C to stop\n");
    thread::sleep(Duration::from_millis(500));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    for generation in 0..max_generations {
        if !running.load(Ordering::SeqCst) {
            println!("\n  ⏸ Interrupted at generation {}.", generation);
            break;
        }

        print_grid(&world, wool, width, depth, generation);
        world.tick();

        if world.is_idle() {
            println!("\n  ✓ Stabilized at generation {} (no tracked cells)", generation);
            break;
        }

        thread::sleep(Duration::from_millis(delay_ms));
    }

    let changed: usize = world.tick_history().iter().map(|r| r.modified_cells).sum();
    println!("\n  Simulation complete!");
    println!(
        "  Total ticks: {}, cells changed over the last {} ticks: {}",
        world.tick_count(),
        world.tick_history().len(),
        changed
    );

    Ok(())
}
