/// Concurrent access tests
///
/// Many ingress calls racing each other, the reconciliation sweep and the
/// persistence engine against one buffer.
/// Run with: cargo test --test concurrent_access_tests

use alert2pg::{
    Alert, BufferOptions, DedupBuffer, EngineOptions, FiringSource, Identity, MemoryStore,
    PersistenceEngine, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

const WAIT: Duration = Duration::from_secs(10);

/// Reports the shared fingerprints as firing, nothing else.
struct SharedFiring(HashSet<Identity>);

#[async_trait]
impl FiringSource for SharedFiring {
    async fn fetch_firing_identities(&self) -> Result<HashSet<Identity>> {
        Ok(self.0.clone())
    }
}

fn started() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn shared(i: usize, writer: usize) -> Alert {
    Alert::firing(format!("shared_{}", i), started())
        .with_label("alertname", format!("Shared{}", i))
        .with_annotation("writer", writer.to_string())
}

fn private(writer: usize, i: usize) -> Alert {
    Alert::firing(format!("task_{}_{}", writer, i), started())
        .with_label("alertname", "Private")
}

fn buffer(shared_count: usize) -> Arc<DedupBuffer> {
    let firing = (0..shared_count).map(|i| shared(i, 0).identity()).collect();
    Arc::new(DedupBuffer::new(Arc::new(SharedFiring(firing)), BufferOptions::default()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_and_reconciliation() {
    let num_tasks = 10;
    let shared_count = 20;
    let private_per_task = 15;
    let buffer = buffer(shared_count);
    let barrier = Arc::new(Barrier::new(num_tasks + 1));

    let mut handles = vec![];
    for task_id in 0..num_tasks {
        let buffer = Arc::clone(&buffer);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for round in 0..5 {
                let mut batch: Vec<Alert> = (0..shared_count).map(|i| shared(i, task_id)).collect();
                batch.extend((0..private_per_task).map(|i| private(task_id, i)).skip(round * 3).take(3));
                buffer.update(batch, WAIT).await.unwrap();
            }
        }));
    }

    let sweeper = {
        let buffer = Arc::clone(&buffer);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            for _ in 0..10 {
                buffer.reconcile().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap();
    }
    sweeper.await.unwrap();

    let snapshot = buffer.snapshot(WAIT).await.unwrap();
    let identities: HashSet<Identity> = snapshot.iter().map(Alert::identity).collect();
    assert_eq!(identities.len(), snapshot.len(), "duplicate identities in buffer");
    assert_eq!(snapshot.len(), shared_count + num_tasks * private_per_task);

    for alert in &snapshot {
        if alert.fingerprint.starts_with("shared_") {
            // Shared alerts stay firing at the controller.
            assert!(alert.is_firing());
            let writer: usize = alert.annotations["writer"].parse().unwrap();
            assert!(writer < num_tasks);
        }
    }

    // Private alerts are unknown to the controller: the next sweep closes all of them.
    buffer.reconcile().await.unwrap();
    let resolved = buffer
        .snapshot(WAIT)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| !a.is_firing())
        .count();
    assert_eq!(resolved, num_tasks * private_per_task);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_while_saving() {
    let num_tasks = 8;
    let per_task = 25;
    let buffer = buffer(0);
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(
        PersistenceEngine::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            EngineOptions::new().parallelism(4),
        )
        .unwrap(),
    );

    let mut handles = vec![];
    for task_id in 0..num_tasks {
        let buffer = Arc::clone(&buffer);
        handles.push(tokio::spawn(async move {
            for i in 0..per_task {
                buffer.update(vec![private(task_id, i)], WAIT).await.unwrap();
            }
        }));
    }

    let saver = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for _ in 0..20 {
                engine.run_once().await;
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap();
    }
    saver.await.unwrap();
    engine.run_once().await;

    assert!(buffer.unsaved(WAIT).await.unwrap().is_empty());
    assert_eq!(store.len().await, num_tasks * per_task);
    assert_eq!(buffer.len().await, num_tasks * per_task);
}
