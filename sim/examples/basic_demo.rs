//! Basic demonstration of the RTS simulation.
//!
//! Run with: cargo run --example basic_demo

use rts_sim::{CommandKind, CommandRecord, Faction, SimConfig, SimId, SimulationLoop, Tile};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== RTS Simulation Demo ===\n");

    let mut sim = SimulationLoop::new_local(SimConfig::default())?;
    sim.spawn_default_world();

    println!("Initial state:");
    print_snapshot(&sim);

    // Send the Terran worker to the mineral field and train a marine.
    println!("\n--- Issuing orders ---\n");
    sim.enqueue(CommandRecord::new(CommandKind::Move, SimId(2), Tile::new(10, 10)));
    sim.enqueue(CommandRecord::new(CommandKind::Produce, SimId(3), Tile::new(12, 8)));

    // 10 seconds at the default 30 Hz.
    for frame in 0..300 {
        sim.step(1.0 / 30.0);
        if (frame + 1) % 60 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.current_tick(), sim.current_time());
            print_snapshot(&sim);
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot_json()?);
    Ok(())
}

fn print_snapshot(sim: &SimulationLoop) {
    let snapshot = sim.snapshot();
    for faction in &snapshot.factions {
        if faction.faction != Faction::Protoss {
            println!("  {:?}: {} minerals", faction.faction, faction.minerals);
        }
    }
    for entity in &snapshot.entities {
        println!(
            "  #{:<3} {:<8?} {:<11?} at ({:>2}, {:>2}) hp {:>4}{}",
            entity.id,
            entity.faction,
            entity.kind,
            entity.x,
            entity.y,
            entity.health,
            entity
                .carried
                .map(|c| format!(" cargo {c}"))
                .unwrap_or_default()
        );
    }
}
