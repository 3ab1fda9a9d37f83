//! The batching evaluator: coalesces position evaluations into network batches
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! Search threads call [`Evaluator::evaluate`], which blocks until the result is available.
//! Requests that miss the cache go onto a bounded queue drained by a single background
//! worker. The worker blocks for the first request, then opportunistically gathers more for
//! up to two milliseconds before running the whole batch through the network at once, so
//! that concurrent search threads share inference calls.
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, error, trace};
use chess::game::GameState;
use crate::engine::cache::EvalCache;
use super::{encode, NetError, Network};

/// The most requests evaluated in a single network call
pub const MAX_BATCH: usize = 16;
/// How long the worker waits for further requests once it holds one
pub const MAX_DELAY: Duration = Duration::from_millis(2);
// Search threads block once this many requests are in flight.
const QUEUE_DEPTH: usize = 256;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A network evaluation of a single position: a scalar value in `[-1, 1]` from the mover's
/// point of view, and a softmax-normalized policy distribution over the move slots.
///
/// Illegal moves are not masked out of the policy here; the search masks them when it expands
/// a node.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Expected outcome for the side to move
    pub value: f32,
    /// Probability per policy slot, summing to one
    pub policy: Vec<f32>,
}

struct Request {
    key: u64,
    planes: Vec<f32>,
    reply: SyncSender<Result<Arc<Evaluation>, NetError>>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The engine's handle to the evaluation pipeline.
///
/// Dropping the evaluator closes the queue; the worker drains what is left and exits, and is
/// joined before the network session is released.
#[derive(Debug)]
pub struct Evaluator {
    planes: usize,
    cache: Arc<EvalCache>,
    queue: Option<SyncSender<Request>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Evaluator {
    /// Wraps a loaded network in a cache and a batching worker.
    pub fn new(network: Network, cache_capacity: usize) -> Evaluator {
        let planes = network.planes();
        let cache = Arc::new(EvalCache::new(cache_capacity));
        let (queue, requests) = sync_channel(QUEUE_DEPTH);

        let worker_cache = Arc::clone(&cache);
        let worker = thread::Builder::new()
            .name("evaluator".to_string())
            .spawn(move || worker(network, worker_cache, requests))
            .expect("failed to spawn the evaluator thread");

        Evaluator {
            planes,
            cache,
            queue: Some(queue),
            worker: Some(worker),
        }
    }

    /// Evaluates a position, blocking the caller until the result is available.
    ///
    /// Results are cached by the history-aware hash of the game state; a hit returns without
    /// touching the network.
    pub fn evaluate(&self, state: &GameState) -> Result<Arc<Evaluation>, NetError> {
        let key = state.history_hash();
        if let Some(evaluation) = self.cache.get(key) {
            trace!("cache hit for {:#x}", key);
            return Ok(evaluation);
        }

        let (reply, result) = sync_channel(1);
        let request = Request {
            key,
            planes: encode::encode(state, self.planes),
            reply,
        };
        self.queue.as_ref().expect("INFALLIBLE")
            .send(request)
            .map_err(|_| NetError::Execution("the evaluator has shut down".to_string()))?;

        result.recv()
            .map_err(|_| NetError::Execution("the evaluator dropped the request".to_string()))?
    }

    /// Returns the number of cached evaluations.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        // Closing the queue lets the worker run dry and exit; joining it guarantees the
        // session is not torn down under a running batch.
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker(mut network: Network, cache: Arc<EvalCache>, requests: Receiver<Request>) {
    let planes = network.planes();

    while let Ok(first) = requests.recv() {
        let mut batch = vec![first];
        let deadline = Instant::now() + MAX_DELAY;
        while batch.len() < MAX_BATCH {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match requests.recv_timeout(deadline - now) {
                Ok(request) => batch.push(request),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("running a batch of {}", batch.len());
        let mut data = Vec::with_capacity(batch.len() * planes * 64);
        for request in &batch {
            data.extend_from_slice(&request.planes);
        }

        match network.run(batch.len(), data) {
            Ok(evaluations) => {
                for (request, evaluation) in batch.into_iter().zip(evaluations) {
                    let evaluation = Arc::new(evaluation);
                    cache.insert(request.key, Arc::clone(&evaluation));
                    let _ = request.reply.send(Ok(evaluation));
                }
            }
            Err(err) => {
                // A failed batch poisons the pipeline: the whole batch and everything still
                // queued observe the error, and the worker exits. The engine stays unusable
                // until it is recreated.
                error!("network execution failed: {}", err);
                for request in batch {
                    let _ = request.reply.send(Err(err.clone()));
                }
                while let Ok(request) = requests.try_recv() {
                    let _ = request.reply.send(Err(err.clone()));
                }
                return;
            }
        }
    }
}
