mod common;

use std::collections::HashSet;
use std::error::Error;

use db::DbError;
use db::repositories::QueueRepository;
use futures_util::future::join_all;
use job_core::JobId;

#[tokio::test]
async fn entries_come_out_in_insertion_order() -> Result<(), Box<dyn Error>> {
    let (_, queue) = common::setup_repos().await?;

    for id in [3, 1, 2] {
        queue.insert(JobId(id)).await?;
    }

    let mut order = Vec::new();
    while let Some(entry) = queue.get("c1").await? {
        order.push(entry.job_id);
        queue.delete(entry.seq).await?;
    }
    assert_eq!(order, vec![JobId(3), JobId(1), JobId(2)]);
    assert!(queue.is_empty().await?);

    Ok(())
}

#[tokio::test]
async fn claimed_entries_stay_until_deleted() -> Result<(), Box<dyn Error>> {
    let (_, queue) = common::setup_repos().await?;
    queue.insert(JobId(1)).await?;

    let entry = queue.get("c1").await?.ok_or("queue was empty")?;
    assert_eq!(entry.claimed_by.as_deref(), Some("c1"));
    assert!(queue.get("c2").await?.is_none());
    assert_eq!(queue.len().await?, 1);
    assert_eq!(queue.claimed().await?.len(), 1);

    queue.delete(entry.seq).await?;
    assert!(matches!(queue.delete(entry.seq).await, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gets_claim_each_entry_once() -> Result<(), Box<dyn Error>> {
    let (_, queue) = common::setup_repos().await?;
    for id in 0..6 {
        queue.insert(JobId(id)).await?;
    }

    // Every caller talks to the store directly, without the queue actor.
    let gets = (0..8).map(|n| {
        let queue = queue.clone();
        tokio::spawn(async move { queue.get(&format!("c{}", n)).await })
    });
    let results = join_all(gets).await;

    let mut got = Vec::new();
    let mut empty = 0;
    for result in results {
        match result?? {
            Some(entry) => got.push(entry.job_id),
            None => empty += 1,
        }
    }

    let distinct: HashSet<JobId> = got.iter().copied().collect();
    assert_eq!(got.len(), 6);
    assert_eq!(distinct.len(), 6);
    assert_eq!(empty, 2);
    assert_eq!(queue.claimed().await?.len(), 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumers_on_separate_repositories_share_the_queue() -> Result<(), Box<dyn Error>> {
    let db_conn = common::setup_db().await?;
    let producer = QueueRepository::open(db_conn.clone()).await?;
    for id in 0..12 {
        producer.insert(JobId(id)).await?;
    }

    let consumers = (0..4).map(|n| {
        let queue = QueueRepository::new(db_conn.clone());
        tokio::spawn(async move {
            let consumer = format!("c{}", n);
            let mut seen = Vec::new();
            while let Some(entry) = queue.get(&consumer).await? {
                queue.delete(entry.seq).await?;
                seen.push(entry.job_id);
            }
            Ok::<_, DbError>(seen)
        })
    });

    let mut all = Vec::new();
    for result in join_all(consumers).await {
        all.extend(result??);
    }
    all.sort();
    assert_eq!(all, (0..12).map(JobId).collect::<Vec<_>>());
    assert!(producer.is_empty().await?);

    Ok(())
}
