//! The state of a game in progress: the current board plus a short history of the positions
//! that led to it.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use crate::*;

/// The number of positions remembered by a [`PositionHistory`]
pub const HISTORY_SLOTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    board: Board,
    hash: Zobrist,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A circular buffer of the last eight positions of a game and their Zobrist hashes.
///
/// Slot `T-0` is the current position, `T-1` the position one move ago, and so on. Slots
/// which predate the start of the game are empty; a monotonic counter tracks how many slots
/// hold real positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHistory {
    slots: [Option<Slot>; HISTORY_SLOTS],
    current: usize,
    total: u64,
}

impl PositionHistory {
    /// Returns a new, empty history.
    pub fn new() -> PositionHistory {
        PositionHistory {
            slots: std::array::from_fn(|_| None),
            current: HISTORY_SLOTS - 1,
            total: 0,
        }
    }

    /// Snapshots `board` and its hash into the next slot.
    pub fn add(&mut self, board: &Board) {
        self.current = (self.current + 1) % HISTORY_SLOTS;
        self.slots[self.current] = Some(Slot { board: board.clone(), hash: board.zobrist() });
        self.total += 1;
    }

    /// Returns the number of positions ever added.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the board `t` moves ago, or `None` when the slot has been overwritten or
    /// predates the start of the game.
    pub fn get(&self, t: usize) -> Option<&Board> {
        if t >= HISTORY_SLOTS || t as u64 >= self.total {
            return None;
        }
        let index = (self.current + HISTORY_SLOTS - t) % HISTORY_SLOTS;
        self.slots[index].as_ref().map(|slot| &slot.board)
    }

    /// Returns the hash of the position `t` moves ago, if it is still remembered.
    pub fn hash(&self, t: usize) -> Option<Zobrist> {
        if t >= HISTORY_SLOTS || t as u64 >= self.total {
            return None;
        }
        let index = (self.current + HISTORY_SLOTS - t) % HISTORY_SLOTS;
        self.slots[index].as_ref().map(|slot| slot.hash)
    }

    /// Returns the current position, if any has been added.
    pub fn current(&self) -> Option<&Board> {
        self.get(0)
    }

    /// Counts how many of the last seven remembered positions hash equal to `board`.
    pub fn count_repetitions(&self, board: &Board) -> usize {
        (1..HISTORY_SLOTS)
            .filter_map(|t| self.hash(t))
            .filter(|&hash| hash == board.zobrist())
            .count()
    }

    /// Produces a hash of the recent history of the game.
    ///
    /// The hashes of the last four positions are each multiplied by a recency weight (1 for
    /// the current position through 4 for three moves ago) and XORed together. Two game
    /// states with the same board but different recent histories hash differently, which
    /// keeps them apart in the transposition table.
    pub fn history_hash(&self) -> u64 {
        let mut hash = 0u64;
        for t in 0..4 {
            if let Some(slot_hash) = self.hash(t) {
                hash ^= u64::from(slot_hash).wrapping_mul(t as u64 + 1);
            }
        }
        hash
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        PositionHistory::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// An undo record returned by [`GameState::push`].
///
/// In addition to the board state it captures the history slot that the push overwrote, so
/// that [`GameState::pop`] rewinds the history ring exactly along with the board.
#[derive(Debug)]
pub struct GameUndo {
    board: Undo,
    slot: Option<Slot>,
    current: usize,
    total: u64,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A board together with its position history.
///
/// This is the unit of state a search works on: moves are applied with [`push`](#method.push)
/// and taken back with [`pop`](#method.pop), and both the board and the history ring are
/// restored exactly. Each search thread works on its own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    board: Board,
    history: PositionHistory,
}

impl GameState {
    /// Creates a game state whose history contains only the given position.
    pub fn new(board: Board) -> GameState {
        let mut history = PositionHistory::new();
        history.add(&board);
        GameState { board, history }
    }

    /// Returns the current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the position history, most recent first.
    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    /// Applies a move to the board and records the new position in the history.
    pub fn push(&mut self, m: Move) -> GameUndo {
        let board = self.board.make(m);
        let next = (self.history.current + 1) % HISTORY_SLOTS;
        let undo = GameUndo {
            board,
            slot: self.history.slots[next].take(),
            current: self.history.current,
            total: self.history.total,
        };
        self.history.add(&self.board);
        undo
    }

    /// Takes back the move which produced `undo`, restoring the board and the history ring.
    pub fn pop(&mut self, undo: GameUndo) {
        self.history.slots[self.history.current] = undo.slot;
        self.history.current = undo.current;
        self.history.total = undo.total;
        self.board.unmake(undo.board);
    }

    /// Returns a hash of the current position and its recent history.
    pub fn history_hash(&self) -> u64 {
        self.history.history_hash()
    }

    /// Counts how many earlier remembered positions equal the current one.
    pub fn repetitions(&self) -> usize {
        self.history.count_repetitions(&self.board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen;

    fn push_uci(state: &mut GameState, moves: &str) -> Vec<GameUndo> {
        moves.split_whitespace()
            .map(|s| {
                let m = movegen::move_from_uci(state.board(), s).unwrap();
                state.push(m)
            })
            .collect()
    }

    #[test]
    fn slots_fill_and_wrap() {
        let mut state = GameState::new(Board::new());
        assert_eq!(state.history().total(), 1);
        assert_eq!(state.history().get(0), Some(state.board()));
        assert_eq!(state.history().get(1), None);

        push_uci(&mut state, "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6 b5a4 g8f6 e1g1 f8e7");
        assert_eq!(state.history().total(), 11);
        // only the last eight positions are remembered
        assert!(state.history().get(7).is_some());
        assert_eq!(state.history().get(8), None);
        assert_eq!(state.history().get(0), Some(state.board()));
    }

    #[test]
    fn push_and_pop_restore_board_and_history() {
        let mut state = GameState::new(Board::new());
        push_uci(&mut state, "d2d4 d7d5 c2c4");
        let before = state.clone();

        let undos = push_uci(&mut state, "e7e6 b1c3 g8f6");
        assert_ne!(state, before);
        for undo in undos.into_iter().rev() {
            state.pop(undo);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn repetitions_are_counted() {
        let mut state = GameState::new(Board::new());
        assert_eq!(state.repetitions(), 0);
        // knights shuffle back to the starting position
        push_uci(&mut state, "g1f3 g8f6 f3g1 f6g8");
        assert_eq!(state.repetitions(), 1);
        push_uci(&mut state, "b1c3 b8c6 c3b1 c6b8");
        // the earliest occurrence has fallen out of the ring by now, but the second remains
        assert_eq!(state.repetitions(), 1);
    }

    #[test]
    fn same_board_different_history_hashes_differently() {
        // reach the same position (including the empty en-passant square) by two different
        // move orders
        let mut a = GameState::new(Board::new());
        push_uci(&mut a, "e2e4 e7e5 g1f3 b8c6");
        let mut b = GameState::new(Board::new());
        push_uci(&mut b, "g1f3 e7e5 e2e4 b8c6");

        assert_eq!(a.board(), b.board());
        assert_eq!(a.board().zobrist(), b.board().zobrist());
        assert_ne!(a.history_hash(), b.history_hash());
    }

    #[test]
    fn history_hash_changes_as_the_game_moves() {
        let mut state = GameState::new(Board::new());
        let h0 = state.history_hash();
        push_uci(&mut state, "e2e4");
        let h1 = state.history_hash();
        assert_ne!(h0, h1);
    }
}
