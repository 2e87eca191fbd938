//! Catalog reconciliation pipeline: source snapshot, diff, concurrent
//! submission, strictly-later deletion, status persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use odh_client::{ApiClient, ClientConfig};
use odh_core::{Dataset, Publisher, StatusMap, SyncAction};
use odh_extract::{extract_page, parse_graph};
use odh_structure::{StructureConfig, StructureSync};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "odh-sync";

const PUBLICATION_LEVEL_PUBLIC: &str = "Public";
const PUBLICATION_LEVEL_INTERNAL: &str = "Internal";
const REGISTRATION_STATUS_RECORDED: &str = "Recorded";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub client: ClientConfig,
    pub structure: StructureConfig,
    pub max_workers: usize,
    pub page_limit: u64,
    pub status_path: PathBuf,
    pub log_path: PathBuf,
    pub import_structures: bool,
}

impl SyncConfig {
    /// Builds the run configuration from the environment. Credentials are
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let structure_defaults = StructureConfig::default();
        let client = ClientConfig {
            api_base_url: env_or("ODH_API_BASE_URL", "https://api.i14y.admin.ch/api/partner/v1"),
            token_url: env_or(
                "ODH_TOKEN_URL",
                "https://identity.bit.admin.ch/realms/bfs-sis-p/protocol/openid-connect/token",
            ),
            source_url: env_or(
                "ODH_SOURCE_URL",
                "https://dam-api.bfs.admin.ch/hub/api/ogd/harvest",
            ),
            client_key: std::env::var("ODH_CLIENT_KEY").context("ODH_CLIENT_KEY must be set")?,
            client_secret: std::env::var("ODH_CLIENT_SECRET")
                .context("ODH_CLIENT_SECRET must be set")?,
            organization_id: env_or("ODH_ORGANIZATION_ID", "CH1"),
            user_agent: env_or("ODH_USER_AGENT", "odh-harvester/0.1"),
            timeout: Duration::from_secs(env_parse("ODH_HTTP_TIMEOUT_SECS", 30)),
        };
        let structure = StructureConfig {
            table_download_url: env_or("ODH_TABLE_DOWNLOAD_URL", &structure_defaults.table_download_url),
            shape_namespace: env_or("ODH_SHAPE_NAMESPACE", &structure_defaults.shape_namespace),
        };
        Ok(Self {
            client,
            structure,
            max_workers: env_parse("ODH_MAX_WORKERS", 8),
            page_limit: env_parse("ODH_PAGE_LIMIT", 100),
            status_path: PathBuf::from(env_or("ODH_STATUS_PATH", "data/dataset_status.json")),
            log_path: PathBuf::from(env_or("ODH_LOG_PATH", "harvest_log.txt")),
            import_structures: matches!(
                env_or("ODH_IMPORT_STRUCTURES", "false").as_str(),
                "1" | "true" | "TRUE" | "True"
            ),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Action planned for one source dataset before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Update,
    Unchanged,
}

/// Cutoff below which a `modified` timestamp no longer counts as stale:
/// the current time in UTC+1 minus 24 hours.
pub fn staleness_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    let utc_plus_1 = FixedOffset::east_opt(3600).expect("one hour fits a fixed offset");
    (now.with_timezone(&utc_plus_1) - ChronoDuration::hours(24)).with_timezone(&Utc)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Per-identifier decision rule. New identifiers are created; existing ones
/// are updated only when `modified` is strictly greater than the cutoff.
pub fn classify(exists_remotely: bool, modified: Option<&str>, cutoff: DateTime<Utc>) -> PlannedAction {
    if !exists_remotely {
        return PlannedAction::Create;
    }
    let stale = modified
        .and_then(parse_timestamp)
        .map(|timestamp| timestamp > cutoff)
        .unwrap_or(false);
    if stale {
        PlannedAction::Update
    } else {
        PlannedAction::Unchanged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub create: Vec<String>,
    pub update: Vec<String>,
    pub unchanged: Vec<String>,
    /// Remote identifiers absent from the source snapshot. Executed in a
    /// separate phase strictly after every create/update resolved.
    pub delete: Vec<String>,
}

/// Pure diff of the source snapshot against the remote identifier index.
pub fn plan_actions(
    snapshot: &[Dataset],
    remote_index: &BTreeMap<String, String>,
    cutoff: DateTime<Utc>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut source_identifiers = BTreeSet::new();
    for dataset in snapshot {
        let Some(identifier) = dataset.primary_identifier() else {
            continue;
        };
        source_identifiers.insert(identifier.to_string());
        let exists = remote_index.contains_key(identifier);
        match classify(exists, dataset.modified.as_deref(), cutoff) {
            PlannedAction::Create => plan.create.push(identifier.to_string()),
            PlannedAction::Update => plan.update.push(identifier.to_string()),
            PlannedAction::Unchanged => plan.unchanged.push(identifier.to_string()),
        }
    }
    plan.delete = remote_index
        .keys()
        .filter(|identifier| !source_identifiers.contains(*identifier))
        .cloned()
        .collect();
    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_datasets: usize,
    pub skipped_invalid: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub errors: usize,
    pub structures_created: usize,
    pub status_path: String,
    pub log_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureRunSummary {
    pub processed: usize,
    pub structures_created: usize,
    pub errors: usize,
}

/// Result of one per-dataset task; each task owns the slot for its own
/// identifier, so merging after completion needs no lock.
#[derive(Debug)]
struct TaskOutcome {
    identifier: String,
    result: Result<(SyncAction, String), String>,
}

pub struct HarvestPipeline {
    config: SyncConfig,
    client: Arc<ApiClient>,
}

impl HarvestPipeline {
    /// Connects the API client; a failure to acquire the very first token
    /// aborts before any dataset processing.
    pub async fn connect(config: SyncConfig) -> Result<Self> {
        let client = ApiClient::connect(config.client.clone()).await?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "starting harvest run");

        let (snapshot, skipped_invalid) = self.fetch_source_snapshot().await?;
        let remote_index = self.remote_index().await?;
        let cutoff = staleness_cutoff(Utc::now());
        let plan = plan_actions(&snapshot, &remote_index, cutoff);
        info!(
            create = plan.create.len(),
            update = plan.update.len(),
            unchanged = plan.unchanged.len(),
            delete = plan.delete.len(),
            "reconciliation plan computed"
        );

        let mut status = StatusMap::default();
        let mut errors: Vec<(String, String)> = Vec::new();

        for identifier in &plan.unchanged {
            if let Some(dataset_id) = remote_index.get(identifier) {
                status.record(SyncAction::Unchanged, identifier.clone(), dataset_id.clone());
            }
        }

        // Create/update phase over a bounded worker pool.
        let to_submit: BTreeSet<&str> = plan
            .create
            .iter()
            .chain(plan.update.iter())
            .map(String::as_str)
            .collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for dataset in &snapshot {
            let Some(identifier) = dataset.primary_identifier() else {
                continue;
            };
            if !to_submit.contains(identifier) {
                continue;
            }
            let mut dataset = dataset.clone();
            dataset.publisher = Some(Publisher {
                identifier: self.config.client.organization_id.clone(),
            });
            let existing_id = remote_index.get(identifier).cloned();
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                submit_one(client, dataset, existing_id).await
            });
        }
        drain_tasks(tasks, &mut status, &mut errors).await;

        // Delete phase: starts only after every create/update future resolved,
        // so a dataset recreated under a reused identifier is never deleted in
        // the same pass.
        let mut deletions = JoinSet::new();
        for identifier in &plan.delete {
            let Some(dataset_id) = remote_index.get(identifier).cloned() else {
                continue;
            };
            let identifier = identifier.clone();
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            deletions.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                delete_one(client, identifier, dataset_id).await
            });
        }
        drain_tasks(deletions, &mut status, &mut errors).await;

        let structures_created = if self.config.import_structures {
            self.import_structures(&snapshot, &status).await
        } else {
            0
        };

        let finished_at = Utc::now();
        self.write_status(&status).await?;
        let log = render_log(finished_at, &status, &errors);
        tokio::fs::write(&self.config.log_path, log)
            .await
            .with_context(|| format!("writing {}", self.config.log_path.display()))?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at,
            source_datasets: snapshot.len(),
            skipped_invalid,
            created: status.created.len(),
            updated: status.updated.len(),
            unchanged: status.unchanged.len(),
            deleted: status.deleted.len(),
            errors: errors.len(),
            structures_created,
            status_path: self.config.status_path.display().to_string(),
            log_path: self.config.log_path.display().to_string(),
        };
        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            errors = summary.errors,
            "harvest run finished"
        );
        Ok(summary)
    }

    /// Runs structure inference for every dataset recorded in the persisted
    /// status map, re-extracting the source snapshot for distributions.
    pub async fn run_structure_import(&self) -> Result<StructureRunSummary> {
        let text = tokio::fs::read_to_string(&self.config.status_path)
            .await
            .with_context(|| format!("reading {}", self.config.status_path.display()))?;
        let status: StatusMap = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.config.status_path.display()))?;

        let (snapshot, _) = self.fetch_source_snapshot().await?;
        let structure_sync = StructureSync::new(self.client.clone(), &self.config.structure);

        let mut summary = StructureRunSummary {
            processed: 0,
            structures_created: 0,
            errors: 0,
        };
        let targets = status
            .created
            .iter()
            .chain(status.updated.iter())
            .chain(status.unchanged.iter());
        for (identifier, dataset_id) in targets {
            let Some(dataset) = snapshot
                .iter()
                .find(|d| d.primary_identifier() == Some(identifier.as_str()))
            else {
                continue;
            };
            summary.processed += 1;
            match structure_sync
                .process_dataset(dataset_id, &dataset.distributions)
                .await
            {
                Ok(true) => summary.structures_created += 1,
                Ok(false) => info!(identifier, "no structure produced"),
                Err(err) => {
                    warn!(identifier, %err, "structure import failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Walks the paginated source feed until an empty page or a page with no
    /// dataset subjects.
    async fn fetch_source_snapshot(&self) -> Result<(Vec<Dataset>, usize)> {
        let mut datasets = Vec::new();
        let mut skipped = 0usize;
        let mut skip = 0u64;
        let limit = self.config.page_limit;
        loop {
            let bytes = self.client.fetch_source_page(skip, limit).await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                break;
            }
            let graph = parse_graph(&bytes)
                .with_context(|| format!("parsing source feed page at skip={skip}"))?;
            let page = extract_page(&graph);
            if page.subjects == 0 {
                break;
            }
            skipped += page.skipped;
            datasets.extend(page.datasets);
            skip += limit;
        }
        info!(datasets = datasets.len(), skipped, "source snapshot extracted");
        Ok((datasets, skipped))
    }

    /// Remote identifier -> dataset-id index over the full paginated listing.
    /// Every identifier of a remote dataset maps to its id, not only the
    /// primary one.
    async fn remote_index(&self) -> Result<BTreeMap<String, String>> {
        let datasets = self.client.list_datasets().await?;
        let mut index = BTreeMap::new();
        for dataset in datasets {
            for identifier in dataset.identifiers {
                index.insert(identifier, dataset.id.clone());
            }
        }
        Ok(index)
    }

    async fn import_structures(&self, snapshot: &[Dataset], status: &StatusMap) -> usize {
        let structure_sync = StructureSync::new(self.client.clone(), &self.config.structure);
        let mut created = 0usize;
        let targets = status.created.iter().chain(status.updated.iter());
        for (identifier, dataset_id) in targets {
            let Some(dataset) = snapshot
                .iter()
                .find(|d| d.primary_identifier() == Some(identifier.as_str()))
            else {
                continue;
            };
            match structure_sync
                .process_dataset(dataset_id, &dataset.distributions)
                .await
            {
                Ok(true) => created += 1,
                Ok(false) => info!(identifier, "no structure produced"),
                Err(err) => warn!(identifier, %err, "structure import failed"),
            }
        }
        created
    }

    async fn write_status(&self, status: &StatusMap) -> Result<()> {
        if let Some(parent) = self.config.status_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let bytes = serde_json::to_vec_pretty(status).context("serializing status map")?;
        tokio::fs::write(&self.config.status_path, bytes)
            .await
            .with_context(|| format!("writing {}", self.config.status_path.display()))?;
        Ok(())
    }
}

/// Merges finished per-dataset tasks into the status map; failures fold into
/// the errors bucket without aborting the batch.
async fn drain_tasks(
    mut tasks: JoinSet<TaskOutcome>,
    status: &mut StatusMap,
    errors: &mut Vec<(String, String)>,
) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => match outcome.result {
                Ok((action, dataset_id)) => {
                    status.record(action, outcome.identifier, dataset_id);
                }
                Err(message) => {
                    warn!(identifier = %outcome.identifier, %message, "dataset task failed");
                    errors.push((outcome.identifier, message));
                }
            },
            Err(err) => {
                warn!(%err, "dataset task aborted");
                errors.push(("<task>".to_string(), err.to_string()));
            }
        }
    }
}

/// Submits one dataset: a single replace call for updates; for creates, the
/// publication level and registration status follow-ups are strictly
/// sequenced after the successful create.
async fn submit_one(
    client: Arc<ApiClient>,
    dataset: Dataset,
    existing_id: Option<String>,
) -> TaskOutcome {
    let identifier = dataset.primary_identifier().unwrap_or_default().to_string();
    let payload = json!({ "data": dataset });
    let result = match existing_id {
        Some(dataset_id) => match client.update_dataset(&dataset_id, &payload).await {
            Ok(returned_id) => Ok((SyncAction::Updated, returned_id.unwrap_or(dataset_id))),
            Err(err) => Err(err.to_string()),
        },
        None => match client.create_dataset(&payload).await {
            Ok(dataset_id) => {
                let follow_up = async {
                    client
                        .set_publication_level(&dataset_id, PUBLICATION_LEVEL_PUBLIC)
                        .await?;
                    client
                        .set_registration_status(&dataset_id, REGISTRATION_STATUS_RECORDED)
                        .await
                };
                match follow_up.await {
                    Ok(()) => Ok((SyncAction::Created, dataset_id)),
                    Err(err) => Err(err.to_string()),
                }
            }
            Err(err) => Err(err.to_string()),
        },
    };
    TaskOutcome { identifier, result }
}

/// Deletes one remote dataset. The remote lifecycle requires de-publication
/// first; a failure to demote aborts only this dataset's deletion. Structure
/// deletion failures are logged and do not block the dataset delete.
async fn delete_one(client: Arc<ApiClient>, identifier: String, dataset_id: String) -> TaskOutcome {
    let result = async {
        client
            .set_publication_level(&dataset_id, PUBLICATION_LEVEL_INTERNAL)
            .await?;
        if let Err(err) = client.delete_structures(&dataset_id).await {
            warn!(identifier = %identifier, %err, "failed to delete dataset structures");
        }
        client.delete_dataset(&dataset_id).await?;
        Ok::<_, odh_client::ApiError>(())
    }
    .await;
    TaskOutcome {
        identifier,
        result: result
            .map(|()| (SyncAction::Deleted, dataset_id))
            .map_err(|err| err.to_string()),
    }
}

/// Human-readable run summary grouped by action, one identifier/id pair per
/// line, plus the errors bucket.
pub fn render_log(
    finished_at: DateTime<Utc>,
    status: &StatusMap,
    errors: &[(String, String)],
) -> String {
    let mut log = format!(
        "Harvest completed successfully at {}\n",
        finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for action in SyncAction::ALL {
        let bucket = status.bucket(action);
        log.push_str(&format!("\n{} datasets: {}", action.label(), bucket.len()));
        for (identifier, dataset_id) in bucket {
            log.push_str(&format!("\n- {identifier} : {dataset_id}"));
        }
    }
    if !errors.is_empty() {
        log.push_str(&format!("\n\nErrors: {}", errors.len()));
        for (identifier, message) in errors {
            log.push_str(&format!("\n- {identifier} : {message}"));
        }
    }
    log.push('\n');
    log
}

/// Convenience entry point used by the CLI.
pub async fn run_harvest_from_env(import_structures: bool) -> Result<RunSummary> {
    let mut config = SyncConfig::from_env()?;
    config.import_structures = config.import_structures || import_structures;
    let pipeline = HarvestPipeline::connect(config).await?;
    pipeline.run().await
}

pub async fn run_structure_import_from_env() -> Result<StructureRunSummary> {
    let config = SyncConfig::from_env()?;
    let pipeline = HarvestPipeline::connect(config).await?;
    pipeline.run_structure_import().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mk_dataset(identifier: &str, modified: Option<&str>) -> Dataset {
        let mut dataset = Dataset {
            identifiers: vec![identifier.to_string()],
            modified: modified.map(str::to_string),
            ..Dataset::default()
        };
        dataset.description.set("de", "Eine Beschreibung");
        dataset.distributions.push(odh_core::Distribution {
            media_type: Some("text/csv".to_string()),
            ..odh_core::Distribution::default()
        });
        dataset
    }

    fn cutoff() -> DateTime<Utc> {
        staleness_cutoff(Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap())
    }

    #[test]
    fn cutoff_is_twenty_four_hours_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap();
        assert_eq!(
            staleness_cutoff(now),
            Utc.with_ymd_and_hms(2026, 2, 23, 12, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn staleness_boundary_is_strictly_greater_than() {
        let cutoff = cutoff();
        // exactly at the cutoff: NOT stale
        assert_eq!(
            classify(true, Some("2026-02-23T12:00:00Z"), cutoff),
            PlannedAction::Unchanged
        );
        // one second past the cutoff: stale
        assert_eq!(
            classify(true, Some("2026-02-23T12:00:01Z"), cutoff),
            PlannedAction::Update
        );
        // unparsable timestamps never count as stale
        assert_eq!(
            classify(true, Some("not a timestamp"), cutoff),
            PlannedAction::Unchanged
        );
        // unknown identifiers are created regardless of the timestamp
        assert_eq!(classify(false, None, cutoff), PlannedAction::Create);
    }

    #[test]
    fn unchanged_snapshot_plans_no_actions() {
        let snapshot = vec![
            mk_dataset("a", Some("2026-02-20T00:00:00Z")),
            mk_dataset("b", Some("2026-02-21T00:00:00Z")),
        ];
        let remote: BTreeMap<String, String> = [
            ("a".to_string(), "id-a".to_string()),
            ("b".to_string(), "id-b".to_string()),
        ]
        .into();
        let plan = plan_actions(&snapshot, &remote, cutoff());
        assert!(plan.create.is_empty());
        assert!(plan.update.is_empty());
        assert!(plan.delete.is_empty());
        assert_eq!(plan.unchanged, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn end_to_end_plan_scenario() {
        // source {A, B}, remote {B, C}, B modified after the cutoff
        let snapshot = vec![
            mk_dataset("A", Some("2026-02-20T00:00:00Z")),
            mk_dataset("B", Some("2026-02-24T08:00:00Z")),
        ];
        let remote: BTreeMap<String, String> = [
            ("B".to_string(), "id-b".to_string()),
            ("C".to_string(), "id-c".to_string()),
        ]
        .into();
        let plan = plan_actions(&snapshot, &remote, cutoff());
        assert_eq!(plan.create, vec!["A".to_string()]);
        assert_eq!(plan.update, vec!["B".to_string()]);
        assert_eq!(plan.delete, vec!["C".to_string()]);
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn executed_plan_yields_a_partition_over_all_identifiers() {
        let snapshot = vec![
            mk_dataset("A", Some("2026-02-20T00:00:00Z")),
            mk_dataset("B", Some("2026-02-24T08:00:00Z")),
            mk_dataset("D", Some("2026-02-01T00:00:00Z")),
        ];
        let remote: BTreeMap<String, String> = [
            ("B".to_string(), "id-b".to_string()),
            ("C".to_string(), "id-c".to_string()),
            ("D".to_string(), "id-d".to_string()),
        ]
        .into();
        let plan = plan_actions(&snapshot, &remote, cutoff());

        // simulate execution: every planned action succeeds
        let mut status = StatusMap::default();
        for identifier in &plan.create {
            status.record(SyncAction::Created, identifier.clone(), format!("new-{identifier}"));
        }
        for identifier in &plan.update {
            status.record(SyncAction::Updated, identifier.clone(), remote[identifier].clone());
        }
        for identifier in &plan.unchanged {
            status.record(SyncAction::Unchanged, identifier.clone(), remote[identifier].clone());
        }
        for identifier in &plan.delete {
            status.record(SyncAction::Deleted, identifier.clone(), remote[identifier].clone());
        }

        assert!(status.is_partition());
        let mut expected: BTreeSet<&str> = BTreeSet::new();
        expected.extend(["A", "B", "C", "D"]);
        assert_eq!(status.identifiers(), expected);
    }

    #[test]
    fn log_groups_identifiers_by_action() {
        let mut status = StatusMap::default();
        status.record(SyncAction::Created, "A", "id-a");
        status.record(SyncAction::Deleted, "C", "id-c");
        let errors = vec![("E".to_string(), "http status 500".to_string())];
        let finished = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap();

        let log = render_log(finished, &status, &errors);
        assert!(log.contains("Created datasets: 1"));
        assert!(log.contains("- A : id-a"));
        assert!(log.contains("Deleted datasets: 1"));
        assert!(log.contains("- C : id-c"));
        assert!(log.contains("Unchanged datasets: 0"));
        assert!(log.contains("Errors: 1"));
        assert!(log.contains("- E : http status 500"));
    }

    #[test]
    fn datasets_without_primary_identifier_are_ignored_by_planning() {
        let mut dataset = mk_dataset("x", None);
        dataset.identifiers.clear();
        let plan = plan_actions(&[dataset], &BTreeMap::new(), cutoff());
        assert_eq!(plan, ReconcilePlan::default());
    }
}
