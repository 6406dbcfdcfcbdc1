//! Headless симуляция OVERDRIVE
//!
//! Authority + клиент в одном процессе, scripted abilities, summary в конце.
//! Tuning: assets/config/abilities.ron (если нет: defaults).

use overdrive_simulation::logger::{set_logger, ConsoleLogger};
use overdrive_simulation::scenario::{Scenario, ScenarioConfig};
use overdrive_simulation::{log_info, AbilityTuning, ConfigError};

const TUNING_PATH: &str = "assets/config/abilities.ron";

fn main() -> Result<(), ConfigError> {
    set_logger(Box::new(ConsoleLogger));

    let tuning = AbilityTuning::load_or_default(TUNING_PATH)?;
    let config = ScenarioConfig::default();
    log_info(&format!(
        "Starting OVERDRIVE headless scenario (seed: {}, ticks: {})",
        config.seed, config.ticks
    ));

    let mut scenario = Scenario::new(config, tuning);
    let summary = scenario.run();

    for vehicle in &summary.vehicles {
        log_info(&format!(
            "{}: pos {:.1?}, energy {:.1} (client sees {:.1}), torque {:.0}, health {}",
            vehicle.id, vehicle.position, vehicle.energy, vehicle.client_energy, vehicle.max_torque, vehicle.health
        ));
    }
    log_info(&format!(
        "Scenario complete after {} ticks, {} zones alive",
        summary.ticks, summary.zones_alive
    ));

    Ok(())
}
