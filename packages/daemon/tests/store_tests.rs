use std::error::Error;
use std::path::Path;
use std::time::Duration;

use api::{JobStatus, JobSystem};
use db::DbConfig;
use serde_json::Map;

/// Open the on-disk store, waiting for a previous handle to release its lock.
async fn open(path: &Path) -> Result<JobSystem, Box<dyn Error>> {
    let config = DbConfig::rocksdb(path.display().to_string());
    let mut attempts = 0;
    loop {
        match JobSystem::init(&config).await {
            Ok(system) => return Ok(system),
            Err(e) if attempts < 100 => {
                attempts += 1;
                tracing::debug!("store not ready yet: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::test]
async fn jobs_and_ids_survive_a_restart() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("database");

    let system = open(&path).await?;
    assert!(system.config.is_durable());
    let first = system.service().create(&Map::new(), "project-a", "deploy").await?;
    system.shutdown().await;

    let system = open(&path).await?;
    let kept = system.service().get(first).await?;
    assert_eq!(kept.status, JobStatus::Processed);
    assert_eq!(kept.resource, "project-a");

    let second = system.service().create(&Map::new(), "project-b", "deploy").await?;
    assert!(second > first);

    let queued: Vec<_> = system
        .queue_repo
        .entries()
        .await?
        .into_iter()
        .map(|e| e.job_id)
        .collect();
    assert_eq!(queued, vec![first, second]);

    system.shutdown().await;

    Ok(())
}
