//! The engine: batched Monte-Carlo tree search guided by the network
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::cmp::max;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use log::info;
use chess::Move;
use chess::game::GameState;
use crate::net::NetError;
use crate::net::evaluator::{Evaluation, Evaluator};

pub mod cache;
mod tree;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The seam between the search and the network pipeline.
///
/// The production implementation is the batching [`Evaluator`]; tests substitute stubs with
/// fixed values and priors.
pub trait Evaluate: Send + Sync {
    /// Evaluates a position, blocking until the result is available.
    fn evaluate(&self, state: &GameState) -> Result<Arc<Evaluation>, NetError>;
}

impl Evaluate for Evaluator {
    fn evaluate(&self, state: &GameState) -> Result<Arc<Evaluation>, NetError> {
        Evaluator::evaluate(self, state)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Tunable engine options, mapped to UCI options by the protocol shell
#[derive(Debug, Copy, Clone)]
pub struct Options {
    /// Number of search worker threads
    pub threads: usize,
    /// The exploration constant of the PUCT formula
    pub c_puct: f32,
    /// The simulation budget when no explicit budget is given
    pub visit_limit: u64,
    /// Whether to ask the network runtime for a GPU session
    pub use_gpu: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            c_puct: 1.5,
            visit_limit: 10_000,
            use_gpu: false,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// How long a search runs
#[derive(Debug, Copy, Clone)]
pub enum SearchBudget {
    /// Run a fixed number of simulations, split across the worker threads, to completion
    Visits(u64),
    /// Search until the wall clock runs out or the search is stopped
    Time(Duration),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The search engine.
///
/// The engine owns the node map and a handle to the evaluation pipeline. A search spawns
/// worker threads which run simulations against thread-local clones of the game state; all
/// shared statistics live in the interned nodes. The engine itself is shared behind an `Arc`
/// so that the protocol shell can stop a running search from another thread.
pub struct Engine {
    tree: tree::Tree,
    evaluator: Arc<dyn Evaluate>,
    options: Options,
    stop: AtomicBool,
}

impl Engine {
    /// Creates an engine searching with the given evaluator.
    pub fn new(evaluator: Arc<dyn Evaluate>, options: Options) -> Engine {
        Engine {
            tree: tree::Tree::new(),
            evaluator,
            options,
            stop: AtomicBool::new(false),
        }
    }

    /// Returns the engine options.
    pub fn options(&self) -> Options {
        self.options
    }

    /// Drops the whole search tree. Called for a new game and whenever the position changes.
    pub fn clear(&self) {
        self.tree.clear();
    }

    /// Returns the number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    /// Asks a running timed search to finish. Cancellation is cooperative: workers poll the
    /// flag between simulations, and fixed-visit searches run to completion.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Searches the given position and returns the best move, or `None` when the side to
    /// move has no legal moves.
    pub fn search(&self, state: &GameState, budget: SearchBudget)
    -> Result<Option<Move>, NetError> {
        self.stop.store(false, Ordering::SeqCst);
        let start = Instant::now();

        let root = self.tree.intern(state.history_hash());

        // A fresh root is expanded by a single inline simulation, so that the noise below
        // has priors to perturb before the workers race off.
        let mut presimulations = 0;
        if root.state.lock().children.is_empty() {
            let mut local = state.clone();
            tree::simulate(&self.tree, self.evaluator.as_ref(), &mut local, &root,
                           self.options.c_puct)?;
            presimulations = 1;
        }
        tree::add_root_noise(&self.tree, &root);

        let threads = max(self.options.threads, 1);
        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(threads);
            for _ in 0..threads {
                let root = Arc::clone(&root);
                let mut local = state.clone();
                workers.push(scope.spawn(move || -> Result<(), NetError> {
                    match budget {
                        SearchBudget::Visits(visits) => {
                            let share = visits.saturating_sub(presimulations) / threads as u64;
                            for _ in 0..share {
                                tree::simulate(&self.tree, self.evaluator.as_ref(),
                                               &mut local, &root, self.options.c_puct)?;
                            }
                        }
                        SearchBudget::Time(limit) => {
                            let deadline = start + limit;
                            while Instant::now() < deadline
                                && !self.stop.load(Ordering::Relaxed) {
                                tree::simulate(&self.tree, self.evaluator.as_ref(),
                                               &mut local, &root, self.options.c_puct)?;
                            }
                        }
                    }
                    Ok(())
                }));
            }
            for worker in workers {
                worker.join().expect("search worker panicked")?;
            }
            Ok(())
        })?;

        // The most visited root move wins; any of several equally visited moves will do.
        let children = root.state.lock().children.clone();
        let mut best: Option<(u32, Move)> = None;
        for (m, key) in children {
            let visits = self.tree.get(key).map_or(0, |child| child.state.lock().visits);
            if best.map_or(true, |(best_visits, _)| visits > best_visits) {
                best = Some((visits, m));
            }
        }

        info!("search finished in {:?}: {} nodes, best {}",
              start.elapsed(), self.tree.len(),
              best.map_or("none".to_string(), |(_, m)| m.to_string()));
        Ok(best.map(|(_, m)| m))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("nodes", &self.tree.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Board;
    use crate::net::policy::POLICY_SIZE;

    struct Uniform;

    impl Evaluate for Uniform {
        fn evaluate(&self, _: &GameState) -> Result<Arc<Evaluation>, NetError> {
            Ok(Arc::new(Evaluation {
                value: 0.0,
                policy: vec![1.0 / POLICY_SIZE as f32; POLICY_SIZE],
            }))
        }
    }

    fn engine(threads: usize) -> Engine {
        let options = Options { threads, ..Options::default() };
        Engine::new(Arc::new(Uniform), options)
    }

    #[test]
    fn fixed_visits_distribute_by_puct() {
        let engine = engine(1);
        let state = GameState::new(Board::new());

        let best = engine.search(&state, SearchBudget::Visits(256)).unwrap();
        assert!(best.is_some());

        let root = engine.tree.get(state.history_hash()).unwrap();
        let (visits, children) = {
            let st = root.state.lock();
            (st.visits, st.children.clone())
        };
        assert_eq!(visits, 256);
        assert_eq!(children.len(), 20);

        let counts: Vec<u32> = children.iter()
            .map(|&(_, key)| engine.tree.get(key).unwrap().state.lock().visits)
            .collect();
        // every simulation except the root expansion descended into exactly one child
        assert_eq!(counts.iter().sum::<u32>(), 255);
        // a zero-value stub with uniform priors spreads the visits almost evenly
        let max = counts.iter().max().expect("INFALLIBLE");
        let min = counts.iter().min().expect("INFALLIBLE");
        assert!(max - min <= 1, "visit counts {:?} are not uniform", counts);
    }

    #[test]
    fn parallel_fixed_visits_complete() {
        let engine = engine(4);
        let state = GameState::new(Board::new());
        let best = engine.search(&state, SearchBudget::Visits(512)).unwrap();
        assert!(best.is_some());
        assert!(engine.node_count() > 20);
    }

    #[test]
    fn timed_search_terminates_and_returns_a_move() {
        let engine = engine(2);
        let state = GameState::new(Board::new());
        let start = Instant::now();
        let best = engine.search(&state, SearchBudget::Time(Duration::from_millis(50)))
            .unwrap();
        assert!(best.is_some());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn a_mated_root_returns_no_move() {
        let engine = engine(1);
        let board: Board = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"
            .parse().unwrap();
        let state = GameState::new(board);
        let best = engine.search(&state, SearchBudget::Visits(64)).unwrap();
        assert_eq!(best, None);
    }

    #[test]
    fn clearing_the_tree_forgets_everything() {
        let engine = engine(1);
        let state = GameState::new(Board::new());
        engine.search(&state, SearchBudget::Visits(32)).unwrap();
        assert!(engine.node_count() > 0);
        engine.clear();
        assert_eq!(engine.node_count(), 0);
    }

    #[test]
    fn search_prefers_the_mating_move() {
        // Even with a know-nothing evaluator, once the search visits the mated position the
        // terminal value backs up and pulls every later simulation into the mating line.
        // White mates with Qh5-f7.
        let board: Board = "rnbqkb1r/pppp1ppp/5n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse().unwrap();
        let state = GameState::new(board);
        let engine = engine(1);
        let best = engine.search(&state, SearchBudget::Visits(4096)).unwrap();
        assert_eq!(best.map(|m| m.to_string()), Some("h5f7".to_string()));
    }
}
