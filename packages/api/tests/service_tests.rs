mod common;

use std::error::Error;
use std::sync::Arc;

use actors::{MarkerPolicy, ProcessOutput, start_pool};
use api::{ApiError, CreateJobRequest, JobEvent, JobId, JobStatus};
use db::repositories::JobPatch;
use futures_util::future::join_all;

#[tokio::test]
async fn create_stores_processed_job_and_enqueues_it() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;

    let id = service
        .create(&common::payload(&[("size", "medium")]), "project-a", "deploy")
        .await?;

    let job = service.get(id).await?;
    assert_eq!(job.status, JobStatus::Processed);
    assert_eq!(job.request, r#"{"size":"medium"}"#);
    assert_eq!(job.resource, "project-a");
    assert_eq!(job.action, "deploy");

    let entries = system.queue_repo.entries().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, id);

    Ok(())
}

#[tokio::test]
async fn create_emits_event() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;
    let mut rx = system.event_tx.subscribe();

    let id = service
        .submit(&CreateJobRequest {
            request: common::payload(&[("zone", "eu")]),
            resource: "project-a".into(),
            action: "deploy".into(),
        })
        .await?;

    match rx.try_recv()? {
        JobEvent::JobCreated {
            job_id,
            resource,
            action,
            ..
        } => {
            assert_eq!(job_id, id);
            assert_eq!(resource, "project-a");
            assert_eq!(action, "deploy");
        }
        other => panic!("unexpected event {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn concurrent_creates_get_distinct_ids() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;
    let empty = common::payload(&[]);

    let creates = (0..5).map(|i| {
        let service = service.clone();
        let empty = empty.clone();
        async move {
            service
                .create(&empty, &format!("project-{}", i), "deploy")
                .await
        }
    });
    let mut ids: Vec<JobId> = join_all(creates)
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 5);
    assert_eq!(system.queue.len().await?, 5);

    Ok(())
}

#[tokio::test]
async fn blank_action_is_rejected_before_storing() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;

    let result = service.create(&common::payload(&[]), "project-a", " ").await;
    assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    assert!(service.list(None, None).await?.is_empty());
    assert!(system.queue.is_empty().await?);

    Ok(())
}

#[tokio::test]
async fn get_unknown_id_is_not_found() -> Result<(), Box<dyn Error>> {
    let (_system, service) = common::setup().await?;

    let result = service.get(JobId(404)).await;
    assert!(matches!(result, Err(ApiError::NotFound(JobId(404)))));

    Ok(())
}

#[tokio::test]
async fn transition_requeues_finished_job_and_clears_error() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;
    let id = service
        .create(&common::payload(&[("size", "medium")]), "project-a", "deploy")
        .await?;

    // Simulate an attempt that ended in error.
    system
        .jobs
        .update(&JobPatch::new(id).status(JobStatus::Started))
        .await?;
    system
        .jobs
        .update(&JobPatch::new(id).status(JobStatus::Error).error("Traceback"))
        .await?;

    let failed = service.get(id).await?;
    let mut rx = system.event_tx.subscribe();
    assert_eq!(service.transition(&failed, "stop").await?, id);

    let job = service.get(id).await?;
    assert_eq!(job.status, JobStatus::Processed);
    assert_eq!(job.action, "stop");
    assert_eq!(job.error, None);
    assert_eq!(job.request, failed.request);

    // One entry from create, one from the transition.
    let entries = system.queue_repo.entries().await?;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.job_id == id));

    assert!(matches!(
        rx.try_recv()?,
        JobEvent::JobRequeued { job_id, ref action, .. } if job_id == id && action == "stop"
    ));

    Ok(())
}

#[tokio::test]
async fn transition_while_in_flight_is_rejected() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;
    let id = service
        .create(&common::payload(&[]), "project-a", "deploy")
        .await?;
    let queued = service.get(id).await?;

    let result = service.transition(&queued, "stop").await;
    assert!(matches!(
        result,
        Err(ApiError::InFlight {
            status: JobStatus::Processed,
            ..
        })
    ));

    let job = service.get(id).await?;
    assert_eq!(job.action, "deploy");
    assert_eq!(system.queue.len().await?, 1);

    Ok(())
}

#[tokio::test]
async fn transition_of_unknown_id_is_not_found() -> Result<(), Box<dyn Error>> {
    let (_system, service) = common::setup().await?;

    let result = service.transition_id(JobId(12), "stop").await;
    assert!(matches!(result, Err(ApiError::NotFound(JobId(12)))));

    Ok(())
}

#[tokio::test]
async fn deploy_then_stop_runs_two_attempts() -> Result<(), Box<dyn Error>> {
    let (system, service) = common::setup().await?;
    let executor = Arc::new(actors::FnExecutor::new(|job| -> actors::ExecFuture {
        // Fail deploys, succeed everything else.
        let stderr = if job.action == "deploy" {
            "Traceback (most recent call last):\n".to_string()
        } else {
            String::new()
        };
        Box::pin(async move {
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr,
            })
        })
    }));
    let deps = system.pool_deps(executor, Arc::new(MarkerPolicy::default()));

    let id = service
        .create(&common::payload(&[("size", "medium")]), "project-a", "deploy")
        .await?;
    start_pool(actors::PoolConfig::once(1), deps.clone())
        .await?
        .wait()
        .await;
    let failed = service.get(id).await?;
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.is_some());

    service.transition(&failed, "stop").await?;
    start_pool(actors::PoolConfig::once(1), deps).await?.wait().await;
    let stopped = service.get(id).await?;
    assert_eq!(stopped.status, JobStatus::Done);
    assert_eq!(stopped.action, "stop");
    assert_eq!(stopped.error, None);
    assert!(system.queue.is_empty().await?);

    system.shutdown().await;

    Ok(())
}
