//! Classboard simulator binary.
//!
//! Usage: `classboard-sim [STUDENTS] [CONFIG.json]`

use classboard_core::SyncConfig;
use classboard_sim::{SimError, run_lesson};

const DEFAULT_STUDENTS: usize = 3;

fn load_config(path: Option<&str>) -> Result<SyncConfig, SimError> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(SyncConfig::from_json(&json)?)
        }
        None => Ok(SyncConfig::default()),
    }
}

fn main() {
    env_logger::init();
    log::info!("Starting Classboard simulator");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let students = args
        .first()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STUDENTS);

    let result = load_config(args.get(1).map(String::as_str)).and_then(|config| run_lesson(config, students));
    match result {
        Ok(report) => {
            println!("records: {}", report.records);
            println!("converged: {}", report.converged);
            println!("rejected edits: {}", report.rejected_edits);
            for (peer, stats) in &report.stats {
                println!(
                    "{peer}: deltas {}/{} snapshots {}/{} dropped {}",
                    stats.deltas_sent,
                    stats.deltas_applied,
                    stats.snapshots_sent,
                    stats.snapshots_applied,
                    stats.payloads_dropped
                );
            }
            if !report.converged {
                std::process::exit(1);
            }
        }
        Err(e) => {
            log::error!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    }
}
