//! Contains structure and data for Zobrist hash keys
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use super::super::*;

// The seed is fixed so that hash keys are identical on every run; they are part of the
// engine's external contract.
const ZOBRIST_SEED: u64 = 0x8c5f_57a1_43b2_e90d;

struct Keys {
    // indexed by 6*color + piece, the twelve piece kinds of the spec
    piece: [[u64; Square::COUNT]; Color::COUNT * Piece::COUNT],
    side: u64,
    castling: [u64; 4],
    ep_file: [u64; File::COUNT],
}

lazy_static! {
    static ref KEYS: Keys = {
        let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);
        let mut piece = [[0u64; Square::COUNT]; Color::COUNT * Piece::COUNT];
        for square_keys in piece.iter_mut() {
            for key in square_keys.iter_mut() {
                *key = rng.random();
            }
        }
        let side = rng.random();
        let mut castling = [0u64; 4];
        for key in castling.iter_mut() {
            *key = rng.random();
        }
        let mut ep_file = [0u64; File::COUNT];
        for key in ep_file.iter_mut() {
            *key = rng.random();
        }
        Keys { piece, side, castling, ep_file }
    };
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A 64-bit hash key generated from a position
///
/// The key is the XOR of one key per piece placement, a side-to-move key (present when Black
/// is to move), one key per remaining castling right, and a key for the file of the en-passant
/// square when one is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct Zobrist(u64);

impl Zobrist {
    /// Creates a new zobrist key
    pub fn new() -> Zobrist {
        Zobrist(0)
    }

    /// Toggles piece placement
    pub fn toggle_piece_placement(&mut self, c: Color, p: Piece, sq: Square) {
        self.0 ^= KEYS.piece[Piece::COUNT * c as usize + p as usize][sq as usize];
    }

    /// Toggles whose turn it is
    pub fn toggle_turn(&mut self) {
        self.0 ^= KEYS.side;
    }

    /// Toggles a single castling right, indexed 0..4 as white king-side, white queen-side,
    /// black king-side, black queen-side
    pub fn toggle_castling_right(&mut self, right: usize) {
        self.0 ^= KEYS.castling[right];
    }

    /// Toggles the en passant file
    pub fn toggle_ep_file(&mut self, file: File) {
        self.0 ^= KEYS.ep_file[file as usize];
    }
}

impl fmt::Display for Zobrist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::LowerHex for Zobrist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Zobrist> for u64 {
    /// Allows using the key to index a hash table
    fn from(zobrist: Zobrist) -> u64 {
        zobrist.0
    }
}
