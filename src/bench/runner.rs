//! Case runner with concurrency control and rate limiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;

use super::config::{Action, Case};
use super::metrics::{self, LatencySummary, Statistic, TpsSummary};
use super::payload::MessagePool;
use super::report::{BenchmarkReport, CaseReport};
use super::tps::{Meters, TICK};
use crate::http_client::CmqClient;
use crate::models::CmqResult;

const STATS_CHANNEL_SIZE: usize = 1000;

/// Run-wide switches from the command line
#[derive(Debug, Clone, Default)]
pub struct PerfOptions {
    /// Log every failed call
    pub show_errors: bool,
    /// Log the live TPS every N seconds, 0 disables
    pub show_tps: u64,
    /// Latency statistics over succeeded calls only
    pub succ_only: bool,
}

/// Runs cases against one or more gateways
pub struct CaseRunner {
    clients: Arc<Vec<CmqClient>>,
    pool: Arc<MessagePool>,
    options: PerfOptions,
}

impl CaseRunner {
    pub fn new(clients: Vec<CmqClient>, options: PerfOptions) -> anyhow::Result<Self> {
        if clients.is_empty() {
            anyhow::bail!("no client created");
        }
        Ok(Self {
            clients: Arc::new(clients),
            pool: Arc::new(MessagePool::new()),
            options,
        })
    }

    /// Run every enabled, valid case in order
    pub async fn run_all(&self, cases: &[Case]) -> BenchmarkReport {
        let mut report = BenchmarkReport::default();
        for case in cases {
            if !case.enabled {
                tracing::info!("Skip Case: {}", case.description);
                continue;
            }
            let action = match case.validate() {
                Ok(action) => action,
                Err(e) => {
                    tracing::warn!(case = %case.description, error = %e, "Skipping invalid case");
                    continue;
                }
            };

            tracing::info!("Test Case: {}", case.description);
            let result = self.run_case(case, action).await;
            if result.total_requests == 0 {
                tracing::warn!("no statistics found in case result");
                continue;
            }
            result.log();
            report.push(result);
        }
        report
    }

    /// Run one case to completion
    pub async fn run_case(&self, case: &Case, action: Action) -> CaseReport {
        let case = Arc::new(case.clone());
        let meters = Arc::new(Meters::default());
        let running = Arc::new(AtomicBool::new(true));

        let sampler = tokio::spawn(sample_tps(meters.clone(), running.clone()));
        let shower = (self.options.show_tps > 0).then(|| {
            tokio::spawn(show_tps(
                meters.clone(),
                Duration::from_secs(self.options.show_tps),
            ))
        });

        let (tx, mut rx) = mpsc::channel::<Statistic>(STATS_CHANNEL_SIZE);
        let capacity = metrics::stats_capacity(&case);
        let collector = tokio::spawn(async move {
            let mut stats = Vec::with_capacity(capacity);
            while let Some(s) = rx.recv().await {
                stats.push(s);
            }
            stats
        });

        let concurrent = u32::try_from(case.concurrent.max(1)).unwrap_or(u32::MAX);
        let semaphore = Arc::new(Semaphore::new(concurrent as usize));
        let max_tps = u32::try_from(case.maximum_tps.max(0)).unwrap_or(u32::MAX);
        let deadline = (case.repeat_timeout > 0)
            .then(|| Instant::now() + Duration::from_secs(case.repeat_timeout as u64));

        let start = Instant::now();
        let mut iteration: i64 = 0;
        'dispatch: loop {
            match deadline {
                Some(deadline) if Instant::now() >= deadline => break,
                None if iteration >= case.repeat_times => break,
                _ => {}
            }
            iteration += 1;

            for idx in 0..case.resource_count {
                if max_tps > 0 {
                    while meters.issued.current() >= max_tps {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break 'dispatch,
                };
                meters.issued.record();

                let clients = self.clients.clone();
                let pool = self.pool.clone();
                let case = case.clone();
                let meters = meters.clone();
                let tx = tx.clone();
                let show_errors = self.options.show_errors;
                tokio::spawn(async move {
                    let name = case.resource(idx);
                    let client = pick_client(&clients, action, &name);
                    let stat = execute(client, &case, action, &name, &pool, show_errors).await;
                    meters.complete(stat.succeeded);
                    let _ = tx.send(stat).await;
                    drop(permit);
                });
            }
        }

        // All permits back means every call has finished
        let _ = semaphore.acquire_many(concurrent).await;
        let elapsed = start.elapsed();
        running.store(false, Ordering::Release);
        drop(tx);

        let stats = collector.await.unwrap_or_default();
        let samples = sampler.await.unwrap_or_default();
        if let Some(shower) = shower {
            shower.abort();
        }

        let (succeeded, success_rate) = metrics::success_rate(&stats);
        CaseReport {
            description: case.description.clone(),
            action: action.to_string(),
            total_requests: stats.len(),
            succeeded,
            success_rate,
            tps: TpsSummary::from_samples(samples),
            latency: LatencySummary::from_stats(&stats, self.options.succ_only, elapsed),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Tick the meters every 10 ms, recording the one second total window
async fn sample_tps(meters: Arc<Meters>, running: Arc<AtomicBool>) -> Vec<u32> {
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut samples = Vec::new();
    while running.load(Ordering::Acquire) {
        ticker.tick().await;
        samples.push(meters.tick());
    }
    samples
}

async fn show_tps(meters: Arc<Meters>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let succeeded = meters.succeeded.window();
        let failed = meters.failed.window();
        let total = succeeded + failed;
        let rate = if total > 0 {
            succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        tracing::info!(
            "TPS: {:<5}  Succeed: {:<5}  Failed: {:<5}  Rate: {:.2}%",
            total,
            succeeded,
            failed,
            rate
        );
    }
}

/// Index of the client serving `key`
pub fn client_index(key: &str, count: usize) -> usize {
    crc32fast::hash(key.as_bytes()) as usize % count
}

fn pick_client<'a>(clients: &'a [CmqClient], action: Action, name: &str) -> &'a CmqClient {
    if clients.len() == 1 {
        return &clients[0];
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let key = format!("{}{}{}", action, name, nanos);
    &clients[client_index(&key, clients.len())]
}

/// Success requires a transport-level reply with code 0
fn judge<T: CmqResult>(result: crate::error::Result<T>) -> Result<(), String> {
    match result {
        Ok(resp) if resp.is_success() => Ok(()),
        Ok(resp) => Err(format!(
            "code: {}, message: {}, response: {}",
            resp.code(),
            resp.message(),
            resp.raw()
        )),
        Err(e) => Err(e.to_string()),
    }
}

async fn execute(
    client: &CmqClient,
    case: &Case,
    action: Action,
    name: &str,
    pool: &MessagePool,
    show_errors: bool,
) -> Statistic {
    let size = usize::try_from(case.message_size).unwrap_or(0);
    let count = usize::try_from(case.message_count).unwrap_or(0);
    let delay = case.delay_seconds.max(0) as u64;
    let wait = case.polling_wait_seconds.max(0) as u64;
    let random = case.rand_msg_size;

    let begin = Instant::now();
    let mut end = None;
    let outcome = match action {
        Action::QueryQueueRoute => judge(client.query_queue_route(name).await),
        Action::QueryTopicRoute => judge(client.query_topic_route(name).await),
        Action::SendMessage => {
            judge(client.send_message(name, pool.message(size, random), delay).await)
        }
        Action::BatchSendMessage => {
            let messages = pool.messages(count, size, random);
            judge(client.batch_send_message(name, &messages, delay).await)
        }
        Action::ReceiveMessage => {
            let result = client.receive_message(name, wait).await;
            if case.alone_recv_time {
                end = Some(Instant::now());
            }
            match result {
                Ok(resp) if resp.is_success() && case.ack_enabled => {
                    judge(client.delete_message(name, resp.receipt_handle()).await)
                }
                other => judge(other),
            }
        }
        Action::BatchReceiveMessage => {
            let result = client.batch_receive_message(name, wait, count).await;
            if case.alone_recv_time {
                end = Some(Instant::now());
            }
            match result {
                Ok(resp) if resp.is_success() && case.ack_enabled => {
                    let handles = resp.receipt_handles();
                    if handles.is_empty() {
                        Err("no message handles received".to_string())
                    } else {
                        judge(client.batch_delete_message(name, &handles).await)
                    }
                }
                other => judge(other),
            }
        }
        Action::DeleteMessage => match case.receipt_handles.first() {
            Some(handle) => judge(client.delete_message(name, handle).await),
            None => Err("no receipt handle for delete".to_string()),
        },
        Action::BatchDeleteMessage => {
            judge(client.batch_delete_message(name, &case.receipt_handles).await)
        }
        Action::PublishMessage => judge(
            client
                .publish_message(name, pool.message(size, random), &case.routing_key, &case.tags)
                .await,
        ),
        Action::BatchPublishMessage => {
            let messages = pool.messages(count, size, random);
            judge(
                client
                    .batch_publish_message(name, &case.routing_key, &messages, &case.tags)
                    .await,
            )
        }
    };
    let cost = end.unwrap_or_else(Instant::now).duration_since(begin);

    if let Err(e) = &outcome {
        if show_errors {
            tracing::warn!(uri = %client.uri(), action = %action, error = %e, "Request failed");
        }
    }
    Statistic {
        cost,
        succeeded: outcome.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::config::MockServerConfig;
    use crate::bench::mock_server::MockCmqServer;
    use crate::config::ClientConfig;

    async fn mock_runner(options: PerfOptions) -> (MockCmqServer, CaseRunner) {
        let mut server = MockCmqServer::new(MockServerConfig::default());
        server.start().await.unwrap();
        let client = CmqClient::new(ClientConfig::new(server.url(), "id", "key")).unwrap();
        let runner = CaseRunner::new(vec![client], options).unwrap();
        (server, runner)
    }

    fn case(action: &str) -> Case {
        Case {
            description: format!("{} case", action),
            enabled: true,
            repeat_times: 20,
            concurrent: 4,
            resource_name: "perf-q".to_string(),
            resource_count: 1,
            message_size: 32,
            message_count: 4,
            action: action.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_index_stable() {
        let a = client_index("SendMessagequeue-11700000000", 3);
        let b = client_index("SendMessagequeue-11700000000", 3);
        assert_eq!(a, b);
        assert!(a < 3);
        assert_eq!(client_index("anything", 1), 0);
    }

    #[test]
    fn test_runner_requires_clients() {
        assert!(CaseRunner::new(Vec::new(), PerfOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_run_send_case() {
        let (server, runner) = mock_runner(PerfOptions::default()).await;
        let c = case("SendMessage");
        let report = runner.run_case(&c, Action::SendMessage).await;

        assert_eq!(report.total_requests, 20);
        assert_eq!(report.succeeded, 20);
        assert!((report.success_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.latency.count, 20);
        assert_eq!(server.pending("perf-q"), 20);
    }

    #[tokio::test]
    async fn test_multiple_resources() {
        let (server, runner) = mock_runner(PerfOptions::default()).await;
        let c = Case {
            resource_name: "q-".to_string(),
            resource_count: 3,
            resource_start_idx: 1,
            repeat_times: 5,
            ..case("BatchSendMessage")
        };
        let report = runner.run_case(&c, Action::BatchSendMessage).await;
        assert_eq!(report.total_requests, 15);
        assert_eq!(server.pending("q-1"), 20);
        assert_eq!(server.pending("q-3"), 20);
        assert_eq!(server.pending("q-0"), 0);
    }

    #[tokio::test]
    async fn test_receive_with_ack_drains_queue() {
        let (server, runner) = mock_runner(PerfOptions::default()).await;
        let send = case("SendMessage");
        runner.run_case(&send, Action::SendMessage).await;

        let recv = Case {
            ack_enabled: true,
            alone_recv_time: true,
            ..case("ReceiveMessage")
        };
        let report = runner.run_case(&recv, Action::ReceiveMessage).await;
        assert_eq!(report.succeeded, 20);
        assert_eq!(server.pending("perf-q"), 0);
        assert_eq!(server.inflight(), 0);
    }

    #[tokio::test]
    async fn test_failures_counted() {
        let (_server, runner) = mock_runner(PerfOptions {
            succ_only: true,
            ..Default::default()
        })
        .await;
        let c = case("DeleteMessage");
        let report = runner.run_case(&c, Action::DeleteMessage).await;
        assert_eq!(report.total_requests, 20);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.latency.count, 0);
    }

    #[tokio::test]
    async fn test_run_all_skips_disabled_and_invalid() {
        let (_server, runner) = mock_runner(PerfOptions::default()).await;
        let cases = vec![
            Case {
                enabled: false,
                ..case("SendMessage")
            },
            Case {
                concurrent: 0,
                ..case("SendMessage")
            },
            case("QueryQueueRoute"),
        ];
        let report = runner.run_all(&cases).await;
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].action, "QueryQueueRoute");
    }

    #[tokio::test]
    async fn test_tps_cap() {
        let (_server, runner) = mock_runner(PerfOptions::default()).await;
        let c = Case {
            repeat_times: 0,
            repeat_timeout: 2,
            maximum_tps: 50,
            concurrent: 8,
            ..case("QueryQueueRoute")
        };
        let report = runner.run_case(&c, Action::QueryQueueRoute).await;
        // Two seconds at 50/s, with one window of slack for the first burst
        assert!(report.total_requests > 0);
        assert!(report.total_requests <= 150, "sent {}", report.total_requests);
        let tps = report.tps.unwrap();
        assert!(tps.max <= 50 + 8, "max tps {}", tps.max);
    }
}
