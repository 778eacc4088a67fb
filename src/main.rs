//! `handover-sweep`: expire stale `Ready` handovers.
//!
//! Meant to run from a scheduler a few times a day. Paths default to the
//! application data directory and can be overridden with
//! `SHIFT_HANDOVER_DB` and `SHIFT_HANDOVER_SETTINGS`.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use uuid::Uuid;

use shift_handover_lib::config::{self, HandoverSettings};
use shift_handover_lib::db::SqliteHandoverStore;
use shift_handover_lib::HandoverService;

/// Actor recorded on handovers the sweep expires.
const SWEEP_ACTOR: Uuid = Uuid::nil();

fn path_from_env(var: &str, default: PathBuf) -> PathBuf {
    std::env::var_os(var).map(PathBuf::from).unwrap_or(default)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = path_from_env("SHIFT_HANDOVER_SETTINGS", config::settings_path());
    let db_path = path_from_env("SHIFT_HANDOVER_DB", config::database_path());

    let settings = HandoverSettings::load_or_default(&settings_path)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteHandoverStore::open(&db_path)?;
    let service = HandoverService::from_settings(store, &settings)?;

    let sweep = service.expire_stale(Utc::now(), SWEEP_ACTOR)?;
    for id in &sweep.skipped {
        tracing::warn!(handover_id = %id, "Handover changed during sweep, left for next run");
    }
    Ok(())
}

fn main() -> ExitCode {
    shift_handover_lib::init_tracing();
    tracing::info!("{} sweep starting v{}", config::APP_NAME, config::APP_VERSION);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Expiry sweep failed");
            ExitCode::FAILURE
        }
    }
}
