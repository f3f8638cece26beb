//! Show data version steps
//!
//! Viewer files carry a top-level `version`. When the show format changes, a
//! step is appended here: it names the version it produces and mutates each
//! stored show that is still below that version. Steps run in order, once
//! each; applied steps are recorded in `show_data_version`.
//!
//! Steps are not reversible. Never edit a step that has shipped.

use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use calchart_common::Result;

use crate::db::shows;
use crate::show::ShowHandle;
use crate::storage::FileStorage;

/// One transformation of stored show JSON
pub struct ShowVersionStep {
    /// Version the step produces
    pub version: i64,
    pub description: &'static str,
    pub apply: fn(&mut Map<String, Value>),
}

/// Every step, in ascending version order
pub const STEPS: &[ShowVersionStep] = &[ShowVersionStep {
    version: 6,
    description: "Add published flag (defaults to unpublished)",
    apply: set_unpublished,
}];

fn set_unpublished(show: &mut Map<String, Value>) {
    show.insert("published".to_string(), Value::Bool(false));
}

/// Version recorded in a show's JSON; 0 when absent
pub fn data_version(show: &Map<String, Value>) -> i64 {
    show.get("version").and_then(Value::as_i64).unwrap_or(0)
}

/// Outcome of running pending steps
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub steps_applied: Vec<i64>,
    pub shows_updated: u64,
    pub shows_skipped: u64,
}

/// Highest step already recorded as applied
pub async fn applied_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM show_data_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every step not yet recorded
pub async fn run_pending_steps(pool: &SqlitePool, storage: &FileStorage) -> Result<StepReport> {
    run_steps(pool, storage, STEPS).await
}

/// Apply the given steps past the recorded version
pub async fn run_steps(
    pool: &SqlitePool,
    storage: &FileStorage,
    steps: &[ShowVersionStep],
) -> Result<StepReport> {
    let mut report = StepReport::default();
    let applied = applied_version(pool).await?;

    let pending: Vec<&ShowVersionStep> = steps.iter().filter(|s| s.version > applied).collect();
    if pending.is_empty() {
        info!("Show data is up to date (v{})", applied);
        return Ok(report);
    }

    for step in pending {
        info!("Applying show data step v{}: {}", step.version, step.description);
        let mut updated = 0u64;

        for show in shows::list_shows(pool).await? {
            let slug = show.slug.clone();
            let mut handle = ShowHandle::new(show);

            let mut data = match load_object(&mut handle, storage).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(reason) => {
                    warn!("  Skipping show {}: {}", slug, reason);
                    report.shows_skipped += 1;
                    continue;
                }
            };

            if data_version(&data) >= step.version {
                continue;
            }

            (step.apply)(&mut data);
            data.insert("version".to_string(), Value::from(step.version));

            let bytes = serde_json::to_vec(&Value::Object(data))
                .map_err(|e| calchart_common::Error::Internal(e.to_string()))?;
            handle.set_viewer(pool, storage, bytes).await?;
            updated += 1;
        }

        sqlx::query("INSERT INTO show_data_version (version, shows_updated) VALUES (?, ?)")
            .bind(step.version)
            .bind(updated as i64)
            .execute(pool)
            .await?;

        info!("  ✓ Step v{} updated {} shows", step.version, updated);
        report.steps_applied.push(step.version);
        report.shows_updated += updated;
    }

    Ok(report)
}

/// Parse a show's viewer as a JSON object
///
/// `Ok(None)` when the show has no viewer yet; `Err` with a reason when the
/// stored content is unreadable or not an object.
async fn load_object(
    handle: &mut ShowHandle,
    storage: &FileStorage,
) -> std::result::Result<Option<Map<String, Value>>, String> {
    let bytes = match handle.viewer(storage).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err("viewer is not a JSON object".to_string()),
        Err(e) => Err(format!("viewer is not valid JSON: {}", e)),
    }
}
