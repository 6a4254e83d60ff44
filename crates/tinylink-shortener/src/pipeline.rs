use parking_lot::Mutex;
use std::sync::Arc;
use tinylink_core::{ShortCode, ShortenerError, Storage, StorageError, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Splits `input` over `n` channels in round-robin order.
///
/// Every output closes once `input` is exhausted. An output whose receiver
/// has been dropped is skipped for the remaining items.
pub fn fan_out<T: Send + 'static>(
    mut input: mpsc::Receiver<T>,
    n: usize,
) -> Vec<mpsc::Receiver<T>> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..n.max(1)).map(|_| mpsc::channel(1)).unzip();

    tokio::spawn(async move {
        let mut next = 0;
        while let Some(mut item) = input.recv().await {
            // Try each output at most once per item.
            for _ in 0..senders.len() {
                let target = &senders[next];
                next = (next + 1) % senders.len();
                match target.send(item).await {
                    Ok(()) => break,
                    Err(mpsc::error::SendError(back)) => item = back,
                }
            }
        }
    });

    receivers
}

/// Merges every receiver into one. The result closes when all inputs closed.
pub fn fan_in<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(inputs.len().max(1));

    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct PipelineSettings {
    /// Long-lived workers sharing each job.
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Jobs that may wait before `submit` applies backpressure.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One worker's share of a job.
#[derive(Debug)]
pub struct DeletionAck {
    pub worker: usize,
    pub codes: Vec<ShortCode>,
    pub result: Result<(), StorageError>,
}

/// Everything the workers reported for one submitted job.
#[derive(Debug)]
pub struct DeletionReport {
    pub owner: UserId,
    pub acks: Vec<DeletionAck>,
}

impl DeletionReport {
    /// Codes whose worker finished without error.
    pub fn applied(&self) -> usize {
        self.acks
            .iter()
            .filter(|ack| ack.result.is_ok())
            .map(|ack| ack.codes.len())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeletionAck> {
        self.acks.iter().filter(|ack| ack.result.is_err())
    }
}

/// Invoked once per job after every worker acknowledged its share.
pub type CompletionCallback = Arc<dyn Fn(DeletionReport) + Send + Sync>;

fn log_report(report: DeletionReport) {
    for ack in &report.acks {
        match &ack.result {
            Ok(()) => debug!(
                owner = %report.owner,
                worker = ack.worker,
                codes = ack.codes.len(),
                "deletion share applied"
            ),
            Err(err) => warn!(
                owner = %report.owner,
                worker = ack.worker,
                codes = ack.codes.len(),
                error = %err,
                "deletion share failed"
            ),
        }
    }
}

#[derive(Debug)]
struct DeletionJob {
    owner: UserId,
    codes: Vec<ShortCode>,
}

struct Assignment {
    owner: UserId,
    items: mpsc::Receiver<ShortCode>,
    ack: mpsc::Sender<DeletionAck>,
}

/// Background soft-deletion of short codes.
///
/// A dispatcher takes submitted jobs one at a time, streams the codes through
/// [`fan_out`] to the workers, collects their acknowledgements with
/// [`fan_in`] and hands the resulting [`DeletionReport`] to the completion
/// callback. Each worker issues at most one `Storage::delete` per job.
pub struct DeletionPipeline {
    jobs: Mutex<Option<mpsc::Sender<DeletionJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionPipeline")
            .field("open", &self.jobs.lock().is_some())
            .finish()
    }
}

impl DeletionPipeline {
    /// Spawns the workers with the logging completion callback.
    pub fn start(storage: Arc<dyn Storage>, settings: PipelineSettings) -> Self {
        Self::start_with_callback(storage, settings, Arc::new(log_report))
    }

    pub fn start_with_callback(
        storage: Arc<dyn Storage>,
        settings: PipelineSettings,
        on_complete: CompletionCallback,
    ) -> Self {
        let workers = settings.workers.max(1);
        let (jobs_tx, jobs_rx) = mpsc::channel(settings.queue_capacity.max(1));

        let mut assign = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(1);
            assign.push(tx);
            handles.push(tokio::spawn(run_worker(id, storage.clone(), rx)));
        }

        let dispatcher = tokio::spawn(async move {
            dispatch(jobs_rx, assign, on_complete).await;
            for handle in handles {
                let _ = handle.await;
            }
        });

        info!(workers, queue_capacity = settings.queue_capacity, "deletion pipeline started");
        Self {
            jobs: Mutex::new(Some(jobs_tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Queues `codes` for soft deletion on behalf of `owner`.
    ///
    /// Returns as soon as the job is queued; the outcome reaches the
    /// completion callback only.
    pub async fn submit(&self, codes: Vec<ShortCode>, owner: UserId) -> Result<(), ShortenerError> {
        let jobs = self.jobs.lock().clone().ok_or(ShortenerError::QueueClosed)?;
        jobs.send(DeletionJob { owner, codes })
            .await
            .map_err(|_| ShortenerError::QueueClosed)
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        drop(self.jobs.lock().take());
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(err) = handle.await {
                warn!(error = %err, "deletion dispatcher panicked");
            }
        }
        info!("deletion pipeline stopped");
    }
}

async fn dispatch(
    mut jobs: mpsc::Receiver<DeletionJob>,
    workers: Vec<mpsc::Sender<Assignment>>,
    on_complete: CompletionCallback,
) {
    while let Some(DeletionJob { owner, codes }) = jobs.recv().await {
        let (items_tx, items_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for code in codes {
                if items_tx.send(code).await.is_err() {
                    break;
                }
            }
        });

        let shares = fan_out(items_rx, workers.len());
        let mut acks = Vec::with_capacity(workers.len());
        for (worker, items) in workers.iter().zip(shares) {
            let (ack_tx, ack_rx) = mpsc::channel(1);
            let assignment = Assignment {
                owner: owner.clone(),
                items,
                ack: ack_tx,
            };
            if worker.send(assignment).await.is_err() {
                warn!("deletion worker is gone, its share is dropped");
                continue;
            }
            acks.push(ack_rx);
        }

        let mut merged = fan_in(acks);
        let mut report = DeletionReport {
            owner,
            acks: Vec::new(),
        };
        while let Some(ack) = merged.recv().await {
            report.acks.push(ack);
        }
        report.acks.sort_by_key(|ack| ack.worker);
        on_complete(report);
    }
}

async fn run_worker(
    id: usize,
    storage: Arc<dyn Storage>,
    mut assignments: mpsc::Receiver<Assignment>,
) {
    while let Some(Assignment {
        owner,
        mut items,
        ack,
    }) = assignments.recv().await
    {
        let mut codes = Vec::new();
        while let Some(code) = items.recv().await {
            codes.push(code);
        }
        if codes.is_empty() {
            continue;
        }

        let result = storage.delete(&codes, &owner).await;
        let _ = ack
            .send(DeletionAck {
                worker: id,
                codes,
                result,
            })
            .await;
    }
    debug!(worker = id, "deletion worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tinylink_core::{Resolution, Statistics, UrlTable};
    use tinylink_storage::InMemoryStorage;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn table(owner: &str, entries: &[(&str, &str)]) -> UrlTable {
        UrlTable::from([(
            UserId::new(owner),
            entries
                .iter()
                .map(|(c, url)| (code(c), url.to_string()))
                .collect::<HashMap<_, _>>(),
        )])
    }

    fn reporting() -> (CompletionCallback, mpsc::UnboundedReceiver<DeletionReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(move |report: DeletionReport| drop(tx.send(report))), rx)
    }

    /// Counts delete calls and fails them all.
    #[derive(Default)]
    struct Failing {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Storage for Failing {
        async fn read_all(&self) -> tinylink_core::storage::Result<UrlTable> {
            Ok(UrlTable::new())
        }
        async fn save(&self, _: UrlTable) -> tinylink_core::storage::Result<()> {
            Ok(())
        }
        async fn resolve(&self, _: &ShortCode) -> tinylink_core::storage::Result<Resolution> {
            Ok(Resolution::Missing)
        }
        async fn delete(&self, codes: &[ShortCode], _: &UserId) -> tinylink_core::storage::Result<()> {
            self.calls.lock().push(codes.len());
            Err(StorageError::Unavailable("down".to_string()))
        }
        async fn ping(&self) -> tinylink_core::storage::Result<()> {
            Ok(())
        }
        async fn statistics(&self) -> tinylink_core::storage::Result<Statistics> {
            Ok(Statistics::default())
        }
    }

    #[tokio::test]
    async fn fan_out_distributes_round_robin() {
        let (tx, rx) = mpsc::channel(16);
        for i in 0..7 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let drains: Vec<_> = fan_out(rx, 3)
            .into_iter()
            .map(|mut output| {
                tokio::spawn(async move {
                    let mut share = Vec::new();
                    while let Some(item) = output.recv().await {
                        share.push(item);
                    }
                    share
                })
            })
            .collect();

        let mut shares = Vec::new();
        for drain in drains {
            shares.push(drain.await.unwrap());
        }
        assert_eq!(shares, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[tokio::test]
    async fn fan_out_then_fan_in_preserves_every_item() {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for i in 0..100 {
                tx.send(i).await.unwrap();
            }
        });

        let mut merged = fan_in(fan_out(rx, 4));
        let mut seen = Vec::new();
        while let Some(item) = merged.recv().await {
            seen.push(item);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fan_in_closes_when_all_inputs_close() {
        let (a_tx, a_rx) = mpsc::channel(1);
        let (b_tx, b_rx) = mpsc::channel(1);
        let mut merged = fan_in(vec![a_rx, b_rx]);

        a_tx.send(1).await.unwrap();
        drop(a_tx);
        b_tx.send(2).await.unwrap();
        drop(b_tx);

        let mut seen = vec![merged.recv().await.unwrap(), merged.recv().await.unwrap()];
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        assert!(merged.recv().await.is_none());
    }

    /// Delegates to memory and records the codes of every delete call.
    struct Recording {
        inner: InMemoryStorage,
        deletes: Mutex<Vec<Vec<ShortCode>>>,
    }

    #[async_trait]
    impl Storage for Recording {
        async fn read_all(&self) -> tinylink_core::storage::Result<UrlTable> {
            self.inner.read_all().await
        }
        async fn save(&self, data: UrlTable) -> tinylink_core::storage::Result<()> {
            self.inner.save(data).await
        }
        async fn resolve(&self, code: &ShortCode) -> tinylink_core::storage::Result<Resolution> {
            self.inner.resolve(code).await
        }
        async fn delete(&self, codes: &[ShortCode], owner: &UserId) -> tinylink_core::storage::Result<()> {
            self.deletes.lock().push(codes.to_vec());
            self.inner.delete(codes, owner).await
        }
        async fn ping(&self) -> tinylink_core::storage::Result<()> {
            self.inner.ping().await
        }
        async fn statistics(&self) -> tinylink_core::storage::Result<Statistics> {
            self.inner.statistics().await
        }
    }

    #[tokio::test]
    async fn job_tombstones_every_code_and_reports() {
        let storage = Arc::new(Recording {
            inner: InMemoryStorage::with_table(table(
                "alice",
                &[
                    ("aaa", "https://a.example"),
                    ("bbb", "https://b.example"),
                    ("ccc", "https://c.example"),
                ],
            )),
            deletes: Mutex::new(Vec::new()),
        });
        let (callback, mut reports) = reporting();
        let pipeline = DeletionPipeline::start_with_callback(
            storage.clone(),
            PipelineSettings::builder().workers(2).build(),
            callback,
        );

        pipeline
            .submit(vec![code("aaa"), code("bbb"), code("ccc")], UserId::new("alice"))
            .await
            .unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.owner, UserId::new("alice"));
        assert_eq!(report.applied(), 3);
        let shares: Vec<_> = report.acks.iter().map(|ack| (ack.worker, ack.codes.clone())).collect();
        assert_eq!(
            shares,
            vec![(0, vec![code("aaa"), code("ccc")]), (1, vec![code("bbb")])]
        );

        // exactly one delete per worker, each carrying its whole share in order
        let mut deletes = storage.deletes.lock().clone();
        deletes.sort_by_key(|codes| std::cmp::Reverse(codes.len()));
        assert_eq!(deletes, vec![vec![code("aaa"), code("ccc")], vec![code("bbb")]]);
        for c in ["aaa", "bbb", "ccc"] {
            assert_eq!(storage.resolve(&code(c)).await.unwrap(), Resolution::Deleted);
        }

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn workers_with_empty_shares_skip_storage() {
        let storage = Arc::new(Failing::default());
        let (callback, mut reports) = reporting();
        let pipeline = DeletionPipeline::start_with_callback(
            storage.clone(),
            PipelineSettings::builder().workers(5).build(),
            callback,
        );

        pipeline
            .submit(vec![code("aaa")], UserId::new("alice"))
            .await
            .unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.acks.len(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.applied(), 0);
        assert_eq!(*storage.calls.lock(), vec![1]);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn other_users_codes_are_untouched() {
        let mut initial = table("alice", &[("aaa", "https://a.example")]);
        initial.extend(table("bob", &[("bbb", "https://b.example")]));
        let storage = Arc::new(InMemoryStorage::with_table(initial));
        let pipeline = DeletionPipeline::start(storage.clone(), PipelineSettings::default());

        pipeline
            .submit(vec![code("aaa"), code("bbb")], UserId::new("alice"))
            .await
            .unwrap();
        pipeline.shutdown().await;

        assert_eq!(storage.resolve(&code("aaa")).await.unwrap(), Resolution::Deleted);
        assert_eq!(
            storage.resolve(&code("bbb")).await.unwrap(),
            Resolution::Active("https://b.example".to_string())
        );
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let pipeline = DeletionPipeline::start(
            Arc::new(InMemoryStorage::new()),
            PipelineSettings::default(),
        );
        pipeline.shutdown().await;

        let err = pipeline
            .submit(vec![code("aaa")], UserId::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::QueueClosed));
    }
}
