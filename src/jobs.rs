use crate::{
    models::ApiError,
    workflow::{Dropship, FulfillmentOutcome},
};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Finished jobs stay queryable this long.
const JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

type Statuses = Arc<Mutex<HashMap<Uuid, JobRecord>>>;

/// Single-worker queue for CJ order placement. Orders are placed one at a
/// time in arrival order.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Statuses,
    retention: Duration,
}

struct JobRecord {
    info: JobInfo,
    finished_at: Option<Instant>,
}

#[derive(Clone)]
struct Job {
    id: Uuid,
    order_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        result: FulfillmentOutcome,
    },
    Failed {
        error: String,
        stage: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub order_id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    pub fn spawn(dropship: Dropship, capacity: usize) -> (Self, JoinHandle<()>) {
        Self::spawn_with_retention(dropship, capacity, JOB_RETENTION)
    }

    fn spawn_with_retention(
        dropship: Dropship,
        capacity: usize,
        retention: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let statuses: Statuses = Arc::new(Mutex::new(HashMap::new()));
        let statuses_bg = statuses.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                set_state(&statuses_bg, job.id, JobState::Running).await;

                let state = match dropship.create_fulfillment_order(&job.order_id).await {
                    Ok(outcome) => {
                        info!(target = "louie.fulfillment", job_id = %job.id, order_id = %job.order_id, "fulfillment job finished");
                        JobState::Completed { result: outcome }
                    }
                    Err(err) => {
                        warn!(target = "louie.fulfillment", job_id = %job.id, order_id = %job.order_id, error = %err, "fulfillment job failed");
                        JobState::Failed {
                            error: err.detail().to_string(),
                            stage: Some(err.stage().to_string()),
                        }
                    }
                };
                set_state(&statuses_bg, job.id, state).await;
            }
        });

        (
            Self {
                tx,
                statuses,
                retention,
            },
            handle,
        )
    }

    pub async fn enqueue_fulfillment(&self, order_id: &str) -> Result<Uuid, ApiError> {
        let id = Uuid::new_v4();
        {
            let mut guard = self.statuses.lock().await;
            evict_finished(&mut guard, self.retention);
            guard.insert(
                id,
                JobRecord {
                    info: JobInfo {
                        id: id.to_string(),
                        order_id: order_id.to_string(),
                        state: JobState::Queued,
                    },
                    finished_at: None,
                },
            );
        }
        let job = Job {
            id,
            order_id: order_id.to_string(),
        };
        if self.tx.send(job).await.is_err() {
            self.statuses.lock().await.remove(&id);
            return Err(ApiError {
                error: "queue_send_failed".into(),
                detail: Some("worker not available".into()),
            });
        }
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        self.statuses
            .lock()
            .await
            .get(&id)
            .map(|record| record.info.clone())
    }
}

async fn set_state(statuses: &Mutex<HashMap<Uuid, JobRecord>>, id: Uuid, state: JobState) {
    let finished = matches!(state, JobState::Completed { .. } | JobState::Failed { .. });
    if let Some(record) = statuses.lock().await.get_mut(&id) {
        record.info.state = state;
        if finished {
            record.finished_at = Some(Instant::now());
        }
    }
}

fn evict_finished(statuses: &mut HashMap<Uuid, JobRecord>, retention: Duration) {
    let before = statuses.len();
    statuses.retain(|_, record| record.finished_at.is_none_or(|at| at.elapsed() < retention));
    let evicted = before - statuses.len();
    if evicted > 0 {
        debug!(target = "louie.fulfillment", evicted, "expired finished jobs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::workflow::testing::{harness, line, order, seed_token};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn wait_for_terminal(queue: &JobQueue, id: Uuid) -> JobInfo {
        for _ in 0..200 {
            if let Some(info) = queue.get(id).await
                && matches!(info.state, JobState::Completed { .. } | JobState::Failed { .. })
            {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn worker_places_the_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shopping/order/createOrderV2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true, "data": {"orderId": "CJO-77"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        h.store
            .save_order(&order("o1", vec![line("p1", Some("V1"), 1)]))
            .await
            .unwrap();

        let (queue, _worker) = JobQueue::spawn(h.dropship.clone(), 4);
        let id = queue.enqueue_fulfillment("o1").await.unwrap();
        let info = wait_for_terminal(&queue, id).await;
        assert_eq!(info.order_id, "o1");
        assert_eq!(
            info.state,
            JobState::Completed {
                result: FulfillmentOutcome::Submitted {
                    external_order_id: "CJO-77".into()
                }
            }
        );
    }

    #[tokio::test]
    async fn missing_order_fails_the_job() {
        let h = harness("http://127.0.0.1:9");
        let (queue, _worker) = JobQueue::spawn(h.dropship.clone(), 4);
        let id = queue.enqueue_fulfillment("ghost").await.unwrap();
        let info = wait_for_terminal(&queue, id).await;
        match info.state {
            JobState::Failed { stage, .. } => {
                assert_eq!(stage.as_deref(), Some("create_fulfillment"))
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn finished_jobs_expire_after_retention() {
        let h = harness("http://127.0.0.1:9");
        let (queue, _worker) = JobQueue::spawn_with_retention(h.dropship.clone(), 4, Duration::ZERO);
        let first = queue.enqueue_fulfillment("ghost-1").await.unwrap();
        wait_for_terminal(&queue, first).await;

        let second = queue.enqueue_fulfillment("ghost-2").await.unwrap();
        assert!(queue.get(first).await.is_none());
        assert!(queue.get(second).await.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let h = harness("http://127.0.0.1:9");
        let (queue, _worker) = JobQueue::spawn(h.dropship.clone(), 1);
        assert!(queue.get(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn state_serializes_with_tag() {
        let info = JobInfo {
            id: "j".into(),
            order_id: "o1".into(),
            state: JobState::Failed {
                error: "boom".into(),
                stage: Some("create_fulfillment".into()),
            },
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["order_id"], "o1");
        assert_eq!(value["stage"], "create_fulfillment");
    }
}
