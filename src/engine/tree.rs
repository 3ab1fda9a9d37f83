//! The search tree: interned nodes, PUCT descent, expansion and back-propagation
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! Nodes live in a process-wide map keyed by the history-aware hash of the position they
//! represent, so two lines that transpose into the same position share a node. The map hands
//! out `Arc` handles; the node graph never holds owning pointers, and the whole tree is
//! released at once by [`Tree::clear`].
//!
//! Every node guards its statistics and child list with its own mutex. A descent takes each
//! lock only long enough to apply the virtual loss and snapshot the children; the PUCT
//! scores are computed outside the lock.
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use rand_distr::{Distribution, Gamma};
use chess::Move;
use chess::game::GameState;
use chess::movegen;
use crate::net::{policy, NetError};
use super::Evaluate;

/// The temporary penalty applied to a node while a simulation is passing through it, to
/// steer concurrent simulations into different subtrees.
pub const VIRTUAL_LOSS: f32 = 0.3;

// Guards the prior normalization against an all-zero policy.
const PRIOR_EPSILON: f32 = 1e-6;

const DIRICHLET_ALPHA: f64 = 0.3;
const NOISE_FRACTION: f32 = 0.25;
// Root noise is only mixed in for narrow roots.
const NOISE_MOVE_LIMIT: usize = 20;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The mutable statistics of a node
#[derive(Debug, Default)]
pub (crate) struct NodeState {
    /// Visit count, including virtual visits of simulations still in flight
    pub visits: u32,
    /// Sum of the values backed up through this node
    pub total_value: f32,
    /// `total_value / visits`
    pub mean_value: f32,
    /// The prior probability the parent's policy assigned to the move into this node
    pub prior: f32,
    /// Outgoing moves and the keys of the nodes they lead to; empty until expansion
    pub children: Vec<(Move, u64)>,
}

/// A node of the search tree
#[derive(Debug, Default)]
pub (crate) struct Node {
    pub state: Mutex<NodeState>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The process-wide node map
#[derive(Debug, Default)]
pub (crate) struct Tree {
    nodes: RwLock<HashMap<u64, Arc<Node>>>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    /// Drops every node.
    pub fn clear(&self) {
        self.nodes.write().clear();
    }

    /// Returns the number of interned nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns the node for `key`, if it has been interned.
    pub fn get(&self, key: u64) -> Option<Arc<Node>> {
        self.nodes.read().get(&key).cloned()
    }

    /// Returns the node for `key`, interning a fresh one if necessary.
    pub fn intern(&self, key: u64) -> Arc<Node> {
        if let Some(node) = self.nodes.read().get(&key) {
            return Arc::clone(node);
        }
        Arc::clone(self.nodes.write().entry(key).or_default())
    }
}

/// The value of a position that has no expandable continuation, from the mover's point of
/// view: a mated mover scores -1, stalemate and the fifty-move rule score 0. A position that
/// still has legal moves scores 0 as well (it only ends up here when a concurrent expansion
/// has not finished yet).
fn terminal_value(state: &GameState) -> f32 {
    let board = state.board();
    if board.halfmove_clock() >= 100 {
        return 0.0;
    }
    if movegen::legal_moves(board).is_empty() && board.in_check(board.turn()) {
        -1.0
    } else {
        0.0
    }
}

// Expands a freshly visited leaf: evaluates it, interns a child node per legal move with its
// normalized prior, and replaces the leaf's virtual-lossed statistics with the evaluation.
//
// A node's statistics are stored from the perspective of the player who moves *into* it, so
// that selection can score children with `Q + U` directly and the virtual loss drags Q in
// the unattractive direction. The leaf value from the network (and from the terminal rules)
// is the mover's; it is negated once when it lands on the leaf itself, and once more per
// level on the way up. This function returns the un-negated, mover's-perspective value.
fn expand(tree: &Tree, evaluator: &dyn Evaluate, state: &mut GameState, node: &Arc<Node>)
-> Result<f32, NetError> {
    let moves = movegen::legal_moves(state.board());
    if moves.is_empty() || state.board().halfmove_clock() >= 100 {
        let value = terminal_value(state);
        let mut st = node.state.lock();
        st.visits = 1;
        st.total_value = -value;
        st.mean_value = -value;
        return Ok(value);
    }

    let evaluation = evaluator.evaluate(state)?;
    let turn = state.board().turn();

    let mut entries = Vec::with_capacity(moves.len());
    for m in moves {
        let undo = state.push(m);
        let key = state.history_hash();
        state.pop(undo);

        let prior = policy::encode(turn, m)
            .map(|slot| evaluation.policy[slot])
            .unwrap_or(0.0);
        entries.push((m, key, prior));
    }

    let sum: f32 = entries.iter().map(|&(_, _, prior)| prior).sum::<f32>() + PRIOR_EPSILON;
    for &(_, key, prior) in &entries {
        let child = tree.intern(key);
        child.state.lock().prior = prior / sum;
    }

    let mut st = node.state.lock();
    st.children = entries.into_iter().map(|(m, key, _)| (m, key)).collect();
    st.visits = 1;
    st.total_value = -evaluation.value;
    st.mean_value = -evaluation.value;
    Ok(evaluation.value)
}

/// Runs one simulation: descends from `root` by PUCT while applying virtual loss, expands or
/// scores the leaf, then backs the value up the path with alternating sign while rewinding
/// `state` to where it started.
pub (crate) fn simulate(
    tree: &Tree,
    evaluator: &dyn Evaluate,
    state: &mut GameState,
    root: &Arc<Node>,
    c_puct: f32,
) -> Result<(), NetError> {
    let mut node = Arc::clone(root);
    let mut path = Vec::new();

    let leaf_visits = loop {
        let (parent_visits, children) = {
            let mut st = node.state.lock();
            st.visits += 1;
            st.total_value -= VIRTUAL_LOSS;
            st.mean_value = st.total_value / st.visits as f32;
            if st.children.is_empty() {
                break st.visits;
            }
            (st.visits, st.children.clone())
        };

        // Score the snapshot outside the parent's lock; each child is locked just long
        // enough to read its statistics. Ties stay with the first child encountered.
        let sqrt_parent = (parent_visits as f32).sqrt();
        let mut best: Option<(f32, Move, Arc<Node>)> = None;
        for (m, key) in children {
            let child = tree.intern(key);
            let (visits, mean, prior) = {
                let st = child.state.lock();
                (st.visits, st.mean_value, st.prior)
            };
            let score = mean + c_puct * prior * sqrt_parent / (1.0 + visits as f32);
            if best.as_ref().map_or(true, |&(best_score, ..)| score > best_score) {
                best = Some((score, m, child));
            }
        }
        let (_, m, child) = best.expect("INFALLIBLE");

        let undo = state.push(m);
        path.push((Arc::clone(&child), undo));
        node = child;
    };

    let fresh_leaf = leaf_visits == 1;
    let mut value = if fresh_leaf {
        expand(tree, evaluator, state, &node)?
    } else {
        terminal_value(state)
    };

    // Unwind the path deepest-first. The value flips sign at each level, starting with the
    // leaf itself; the freshly expanded leaf already carries its share, and every other node
    // on the path gets the value plus the virtual-loss compensation.
    let mut skip = fresh_leaf;
    for (path_node, undo) in path.into_iter().rev() {
        state.pop(undo);
        value = -value;
        if skip {
            skip = false;
        } else {
            let mut st = path_node.state.lock();
            st.total_value += value + VIRTUAL_LOSS;
            st.mean_value = st.total_value / st.visits as f32;
        }
    }

    // The root took a virtual loss at the top of the descent like every other node on the
    // path, so it gets the same compensation, unless it was itself the freshly expanded
    // leaf (in which case its statistics were just replaced wholesale).
    value = -value;
    if !skip {
        let mut st = root.state.lock();
        st.total_value += value + VIRTUAL_LOSS;
        st.mean_value = st.total_value / st.visits as f32;
    }

    Ok(())
}

/// Mixes Dirichlet noise into the priors of the root's children to diversify the moves the
/// search explores. Only roots with fewer than 20 legal moves are perturbed.
pub (crate) fn add_root_noise(tree: &Tree, root: &Arc<Node>) {
    let children = root.state.lock().children.clone();
    if children.is_empty() || children.len() >= NOISE_MOVE_LIMIT {
        return;
    }

    // Gamma draws normalized to a Dirichlet sample, one component per child.
    let gamma = Gamma::new(DIRICHLET_ALPHA, 1.0).expect("INFALLIBLE");
    let mut rng = rand::rng();
    let samples: Vec<f64> = (0..children.len()).map(|_| gamma.sample(&mut rng)).collect();
    let sum: f64 = samples.iter().sum::<f64>().max(f64::MIN_POSITIVE);

    for (&(_, key), sample) in children.iter().zip(samples) {
        if let Some(child) = tree.get(key) {
            let mut st = child.state.lock();
            st.prior = (1.0 - NOISE_FRACTION) * st.prior + NOISE_FRACTION * (sample / sum) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Board;
    use crate::net::evaluator::Evaluation;

    struct Uniform;

    impl Evaluate for Uniform {
        fn evaluate(&self, _: &GameState) -> Result<Arc<Evaluation>, NetError> {
            Ok(Arc::new(Evaluation {
                value: 0.0,
                policy: vec![1.0 / policy::POLICY_SIZE as f32; policy::POLICY_SIZE],
            }))
        }
    }

    fn game(fen: &str) -> GameState {
        GameState::new(fen.parse::<Board>().unwrap())
    }

    #[test]
    fn interning_shares_nodes() {
        let tree = Tree::new();
        let a = tree.intern(42);
        let b = tree.intern(42);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(tree.len(), 1);

        tree.clear();
        assert_eq!(tree.len(), 0);
        let c = tree.intern(42);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn checkmate_scores_minus_one_for_the_mover() {
        // fool's mate: white is mated
        let state = game("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert_eq!(terminal_value(&state), -1.0);
    }

    #[test]
    fn stalemate_and_the_fifty_move_rule_score_zero() {
        let state = game("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert_eq!(terminal_value(&state), 0.0);

        let state = game("4k3/8/8/8/8/8/8/4K3 w - - 100 60");
        assert_eq!(terminal_value(&state), 0.0);
    }

    #[test]
    fn expansion_assigns_normalized_priors() {
        let tree = Tree::new();
        let mut state = game(chess::STARTPOS_FEN);
        let root = tree.intern(state.history_hash());

        simulate(&tree, &Uniform, &mut state, &root, 1.5).unwrap();

        let st = root.state.lock();
        assert_eq!(st.visits, 1);
        assert_eq!(st.children.len(), 20);

        let mut sum = 0.0;
        for &(_, key) in &st.children {
            let child = tree.get(key).expect("children are interned at expansion");
            sum += child.state.lock().prior;
        }
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn simulation_rewinds_the_game_state() {
        let tree = Tree::new();
        let mut state = game(chess::STARTPOS_FEN);
        let before = state.clone();
        let root = tree.intern(state.history_hash());

        for _ in 0..32 {
            simulate(&tree, &Uniform, &mut state, &root, 1.5).unwrap();
        }
        assert_eq!(state, before);
    }

    #[test]
    fn virtual_loss_is_compensated_everywhere() {
        let tree = Tree::new();
        let mut state = game(chess::STARTPOS_FEN);
        let root = tree.intern(state.history_hash());

        for _ in 0..64 {
            simulate(&tree, &Uniform, &mut state, &root, 1.5).unwrap();
        }

        // With a zero-value stub, every virtual loss must be paid back exactly once the
        // simulations resolve, on the root just like on its descendants.
        let st = root.state.lock();
        assert_eq!(st.visits, 64);
        assert_eq!(st.total_value, 0.0);
        assert_eq!(st.mean_value, 0.0);
        for &(_, key) in &st.children {
            let child = tree.get(key).expect("children are interned at expansion");
            let child = child.state.lock();
            assert_eq!(child.total_value, 0.0);
        }
    }

    #[test]
    fn transpositions_share_a_node() {
        let tree = Tree::new();

        // two move orders reaching the same position but with different histories produce
        // different keys, so they intentionally do not collide
        let mut a = game(chess::STARTPOS_FEN);
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6"] {
            let m = movegen::move_from_uci(a.board(), uci).unwrap();
            a.push(m);
        }
        let mut b = game(chess::STARTPOS_FEN);
        for uci in ["g1f3", "e7e5", "e2e4", "b8c6"] {
            let m = movegen::move_from_uci(b.board(), uci).unwrap();
            b.push(m);
        }
        assert_eq!(a.board(), b.board());
        assert_ne!(a.history_hash(), b.history_hash());

        let node_a = tree.intern(a.history_hash());
        let node_b = tree.intern(b.history_hash());
        assert!(!Arc::ptr_eq(&node_a, &node_b));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn root_noise_only_perturbs_narrow_roots() {
        let tree = Tree::new();
        // the starting position has exactly 20 legal moves, which is not "fewer than 20"
        let mut state = game(chess::STARTPOS_FEN);
        let root = tree.intern(state.history_hash());
        simulate(&tree, &Uniform, &mut state, &root, 1.5).unwrap();

        let before: Vec<f32> = {
            let st = root.state.lock();
            st.children.iter()
                .map(|&(_, key)| tree.get(key).unwrap().state.lock().prior)
                .collect()
        };
        add_root_noise(&tree, &root);
        let after: Vec<f32> = {
            let st = root.state.lock();
            st.children.iter()
                .map(|&(_, key)| tree.get(key).unwrap().state.lock().prior)
                .collect()
        };
        assert_eq!(before, after);

        // a sparse endgame root does get noise
        let mut state = game("4k3/8/8/8/8/8/8/4K3 w - - 0 1");
        let root = tree.intern(state.history_hash());
        simulate(&tree, &Uniform, &mut state, &root, 1.5).unwrap();
        add_root_noise(&tree, &root);

        let st = root.state.lock();
        assert_eq!(st.children.len(), 5);
        let sum: f32 = st.children.iter()
            .map(|&(_, key)| tree.get(key).unwrap().state.lock().prior)
            .sum();
        // the noisy priors still form a distribution
        assert!((sum - 1.0).abs() < 1e-3);
    }
}
