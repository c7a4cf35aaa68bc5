//! Per-chunk cipher dispatch
//!
//! Chunk tasks own everything they need (a copy of the key, the base nonce,
//! the chunk bytes) and hand back an owned result, so workers share no state
//! with the orchestrator or with each other.
//!
//! Architecture:
//!   - `WorkerPool`: N worker tasks, each with its own bounded inbox; the
//!     cipher work runs on Tokio's blocking pool
//!   - Tasks are assigned round-robin and tagged with a correlation id
//!   - Each run gets its own reply channel; outcomes may arrive in any order
//!     and are written into a `ChunkArena` by index
//!   - Cancelling a run drops its pending ids and reply channel; late
//!     outcomes for it are discarded
//!   - `Dispatcher::Inline` runs the same tasks on the calling task

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use pv_core::{PvError, PvResult};
use pv_crypto::{decrypt_chunk, encrypt_chunk, ChunkPosition, ContainerKey, NONCE_SIZE};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::arena::ChunkArena;
use crate::engine::ProgressFn;

/// Direction of a chunk task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOp {
    Seal,
    Open,
}

/// A self-contained unit of cipher work
pub struct ChunkTask {
    pub correlation_id: u64,
    pub op: CipherOp,
    pub key: ContainerKey,
    pub base_nonce: [u8; NONCE_SIZE],
    pub position: ChunkPosition,
    pub data: Vec<u8>,
}

/// Result of a chunk task, tagged for reassembly
pub struct ChunkOutcome {
    pub correlation_id: u64,
    pub index: u32,
    pub result: PvResult<Vec<u8>>,
}

impl ChunkTask {
    pub fn run(self) -> ChunkOutcome {
        let result = match self.op {
            CipherOp::Seal => encrypt_chunk(&self.key, &self.base_nonce, self.position, &self.data),
            CipherOp::Open => decrypt_chunk(&self.key, &self.base_nonce, self.position, &self.data),
        };
        ChunkOutcome {
            correlation_id: self.correlation_id,
            index: self.position.index,
            result,
        }
    }
}

struct Envelope {
    task: ChunkTask,
    reply: mpsc::UnboundedSender<ChunkOutcome>,
}

/// An owned pool of stateless chunk workers.
///
/// Must be created inside a Tokio runtime. Dropping the pool closes every
/// inbox, which stops the workers once their current task is done.
pub struct WorkerPool {
    inboxes: Vec<mpsc::Sender<Envelope>>,
    handles: Vec<JoinHandle<()>>,
    next_worker: AtomicUsize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> PvResult<Self> {
        if workers == 0 {
            return Err(PvError::Config("worker pool needs at least one worker".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PvError::Config("worker pool requires a Tokio runtime".into()))?;

        let mut inboxes = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel::<Envelope>(2);
            inboxes.push(tx);
            handles.push(runtime.spawn(worker_loop(id, rx)));
        }
        debug!(workers, "worker pool ready");

        Ok(Self {
            inboxes,
            handles,
            next_worker: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.inboxes.len()
    }

    async fn submit(&self, task: ChunkTask, reply: mpsc::UnboundedSender<ChunkOutcome>) -> PvResult<()> {
        let slot = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.inboxes.len();
        self.inboxes[slot]
            .send(Envelope { task, reply })
            .await
            .map_err(|_| PvError::Dispatch(format!("worker {slot} has shut down")))
    }

    /// Close all inboxes and wait for the workers to exit.
    pub async fn shutdown(self) {
        drop(self.inboxes);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("chunk worker exited abnormally: {e}");
            }
        }
    }
}

async fn worker_loop(id: usize, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { task, reply }) = inbox.recv().await {
        let correlation_id = task.correlation_id;
        let index = task.position.index;
        let outcome = match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(outcome) => outcome,
            Err(e) => ChunkOutcome {
                correlation_id,
                index,
                result: Err(PvError::Dispatch(format!("chunk task panicked: {e}"))),
            },
        };
        trace!(worker = id, correlation_id, index, "chunk task done");
        // A closed reply channel means the run was abandoned
        let _ = reply.send(outcome);
    }
    trace!(worker = id, "chunk worker stopped");
}

/// Where chunk tasks execute
pub enum Dispatcher {
    /// On the calling task, one chunk at a time
    Inline,
    /// On a worker pool, with at most `max_in_flight` chunks outstanding
    Pool {
        pool: WorkerPool,
        max_in_flight: usize,
    },
}

/// Parameters shared by every task of one run
pub struct RunSpec<'a> {
    pub op: CipherOp,
    pub key: &'a ContainerKey,
    pub base_nonce: [u8; NONCE_SIZE],
    pub chunk_count: u32,
    pub cancel: &'a CancellationToken,
    pub progress: Option<&'a ProgressFn>,
}

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_correlation_id() -> u64 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

impl Dispatcher {
    /// Run every input chunk through the cipher and write results into `arena`.
    ///
    /// Inputs are pulled lazily, so at most `max_in_flight` chunks (one for
    /// inline mode) are held in memory besides the arena.
    pub async fn run<I>(&self, spec: &RunSpec<'_>, inputs: I, arena: &mut ChunkArena) -> PvResult<()>
    where
        I: Iterator<Item = PvResult<(u32, Vec<u8>)>>,
    {
        match self {
            Dispatcher::Inline => run_inline(spec, inputs, arena),
            Dispatcher::Pool { pool, max_in_flight } => {
                run_pooled(pool, *max_in_flight, spec, inputs, arena).await
            }
        }
    }
}

fn make_task(spec: &RunSpec<'_>, index: u32, data: Vec<u8>) -> ChunkTask {
    ChunkTask {
        correlation_id: next_correlation_id(),
        op: spec.op,
        key: spec.key.clone(),
        base_nonce: spec.base_nonce,
        position: ChunkPosition::new(index, spec.chunk_count),
        data,
    }
}

fn report(spec: &RunSpec<'_>, arena: &ChunkArena) {
    if let Some(progress) = spec.progress {
        let verb = match spec.op {
            CipherOp::Seal => "encrypting",
            CipherOp::Open => "decrypting",
        };
        progress(
            arena.filled() as u64,
            spec.chunk_count as u64,
            &format!("{verb} chunk {}/{}", arena.filled(), spec.chunk_count),
        );
    }
}

fn run_inline<I>(spec: &RunSpec<'_>, inputs: I, arena: &mut ChunkArena) -> PvResult<()>
where
    I: Iterator<Item = PvResult<(u32, Vec<u8>)>>,
{
    for input in inputs {
        if spec.cancel.is_cancelled() {
            return Err(PvError::Cancelled);
        }
        let (index, data) = input?;
        let outcome = make_task(spec, index, data).run();
        arena.insert(outcome.index, &outcome.result?)?;
        report(spec, arena);
    }
    Ok(())
}

async fn run_pooled<I>(
    pool: &WorkerPool,
    max_in_flight: usize,
    spec: &RunSpec<'_>,
    mut inputs: I,
    arena: &mut ChunkArena,
) -> PvResult<()>
where
    I: Iterator<Item = PvResult<(u32, Vec<u8>)>>,
{
    let max_in_flight = max_in_flight.max(1);
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ChunkOutcome>();
    // correlation id → chunk index for every task not yet answered
    let mut pending: HashMap<u64, u32> = HashMap::with_capacity(max_in_flight);
    let mut exhausted = false;

    loop {
        if spec.cancel.is_cancelled() {
            debug!(abandoned = pending.len(), "chunk run cancelled");
            return Err(PvError::Cancelled);
        }

        if !exhausted && pending.len() < max_in_flight {
            match inputs.next() {
                Some(input) => {
                    let (index, data) = input?;
                    let task = make_task(spec, index, data);
                    pending.insert(task.correlation_id, index);
                    // A full inbox must not delay cancellation
                    tokio::select! {
                        biased;
                        _ = spec.cancel.cancelled() => {
                            debug!(abandoned = pending.len(), "chunk run cancelled");
                            return Err(PvError::Cancelled);
                        }
                        sent = pool.submit(task, reply_tx.clone()) => sent?,
                    }
                    continue;
                }
                None => exhausted = true,
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        let outcome = tokio::select! {
            _ = spec.cancel.cancelled() => {
                debug!(abandoned = pending.len(), "chunk run cancelled");
                return Err(PvError::Cancelled);
            }
            outcome = reply_rx.recv() => outcome
                .ok_or_else(|| PvError::Dispatch("reply channel closed".into()))?,
        };

        let Some(index) = pending.remove(&outcome.correlation_id) else {
            trace!(correlation_id = outcome.correlation_id, "discarding unknown outcome");
            continue;
        };
        if index != outcome.index {
            return Err(PvError::Dispatch(format!(
                "outcome for chunk {} arrived under the id of chunk {index}",
                outcome.index
            )));
        }
        arena.insert(index, &outcome.result?)?;
        report(spec, arena);
    }
}
