//! The move encoding of the policy head
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! The policy head of the network emits one logit per slot of a fixed 1,858-entry move table.
//! The table enumerates, in the mover's frame:
//!
//!  -  every queen-like (origin, destination) pair: eight directions by up to seven steps from
//!     each square (1,456 slots, which also carry queen promotions),
//!  -  every knight (origin, destination) pair (336 slots),
//!  -  every under-promotion: push and both captures from the seventh rank, times the three
//!     pieces knight, bishop and rook (66 slots).
//!
//! Encoding and decoding are both table lookups against this single enumeration, so the two
//! directions round-trip by construction.
//!
//! The codec always works in the frame of the side to move: a black move is rotated by 180
//! degrees (`sq -> 63 - sq`) before lookup and after decoding, matching the rotation used by
//! the input encoder.
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::convert::TryFrom;
use chess::{Board, Color, Move, Promotion, Square};
use chess::movegen;
use lazy_static::lazy_static;

/// The number of slots in the policy head
pub const POLICY_SIZE: usize = 1858;

const NO_INDEX: u16 = u16::MAX;

// Under-promotion pieces, in slot order.
const UNDER_PROMOTIONS: [Promotion; 3] =
    [Promotion::ToKnight, Promotion::ToBishop, Promotion::ToRook];

struct Table {
    // slot -> (origin, destination, under-promotion piece)
    moves: Vec<(Square, Square, Option<Promotion>)>,
    // (origin, destination, promotion code) -> slot; code 0 covers plain moves and queen
    // promotions, codes 1..=3 the under-promotions
    index: Vec<u16>,
}

fn table_key(orig: Square, dest: Square, code: usize) -> usize {
    (orig as usize * 64 + dest as usize) * 4 + code
}

fn offset(sq: Square, dr: i8, df: i8) -> Option<Square> {
    let r = sq.rank() as i8 + dr;
    let f = sq.file() as i8 + df;
    if (0..8).contains(&r) && (0..8).contains(&f) {
        Some(Square::try_from((r as usize) * 8 + f as usize).expect("INFALLIBLE"))
    } else {
        None
    }
}

const QUEEN_STEPS: [(i8, i8); 8] = [
    (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1),
];

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (2, 1), (1, 2), (-1, 2), (-2, 1), (-2, -1), (-1, -2), (1, -2), (2, -1),
];

lazy_static! {
    static ref TABLE: Table = {
        let mut moves = Vec::with_capacity(POLICY_SIZE);
        let mut index = vec![NO_INDEX; 64 * 64 * 4];

        let mut add = |moves: &mut Vec<(Square, Square, Option<Promotion>)>,
                       orig: Square, dest: Square, prom: Option<Promotion>| {
            let code = match prom {
                None => 0,
                Some(p) => p as usize,
            };
            index[table_key(orig, dest, code)] = moves.len() as u16;
            moves.push((orig, dest, prom));
        };

        for i in 0..Square::COUNT {
            let orig = Square::try_from(i).expect("INFALLIBLE");
            for (dr, df) in QUEEN_STEPS {
                for dist in 1..8i8 {
                    match offset(orig, dr * dist, df * dist) {
                        Some(dest) => add(&mut moves, orig, dest, None),
                        None => break,
                    }
                }
            }
        }

        for i in 0..Square::COUNT {
            let orig = Square::try_from(i).expect("INFALLIBLE");
            for (dr, df) in KNIGHT_STEPS {
                if let Some(dest) = offset(orig, dr, df) {
                    add(&mut moves, orig, dest, None);
                }
            }
        }

        // Under-promotions are enumerated in the mover's frame, from the seventh rank.
        for f in 0..8 {
            let orig = Square::try_from(6 * 8 + f).expect("INFALLIBLE");
            for df in [-1i8, 0, 1] {
                if let Some(dest) = offset(orig, 1, df) {
                    for prom in UNDER_PROMOTIONS {
                        add(&mut moves, orig, dest, Some(prom));
                    }
                }
            }
        }

        assert_eq!(moves.len(), POLICY_SIZE);
        Table { moves, index }
    };
}

/// Returns the policy slot of a move played by `turn`, or `None` for moves without a slot
/// (only the null move in standard chess).
///
/// Queen promotions share the slot of the underlying pawn move; the under-promotions have
/// slots of their own.
pub fn encode(turn: Color, m: Move) -> Option<usize> {
    if m.is_null() {
        return None;
    }

    let (orig, dest) = match turn {
        Color::White => (m.origin(), m.destination()),
        Color::Black => (m.origin().rotate(), m.destination().rotate()),
    };
    let code = match m.promotion() {
        None | Some(Promotion::ToQueen) => 0,
        Some(prom) => prom as usize,
    };

    match TABLE.index[table_key(orig, dest, code)] {
        NO_INDEX => None,
        slot => Some(slot as usize),
    }
}

/// Returns the (origin, destination, under-promotion) of the given policy slot from the point
/// of view of `turn`, or `None` if the slot is out of range.
pub fn decode(turn: Color, slot: usize) -> Option<(Square, Square, Option<Promotion>)> {
    let &(orig, dest, prom) = TABLE.moves.get(slot)?;
    match turn {
        Color::White => Some((orig, dest, prom)),
        Color::Black => Some((orig.rotate(), dest.rotate(), prom)),
    }
}

/// Resolves a policy slot to a pseudo-legal move of the given board, recovering the move tags
/// (castling, en passant, double advancement) that the slot itself does not carry. Returns
/// `None` when no pseudo-legal move occupies the slot.
pub fn decode_move(board: &Board, slot: usize) -> Option<Move> {
    let (orig, dest, prom) = decode(board.turn(), slot)?;

    movegen::generate(board).into_iter().find(|m| {
        m.origin() == orig && m.destination() == dest && match prom {
            Some(p) => m.promotion() == Some(p),
            // a plain slot matches the ordinary move, or the queen promotion on the last rank
            None => matches!(m.promotion(), None | Some(Promotion::ToQueen)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_slot_is_distinct_and_in_range() {
        let mut seen = vec![false; POLICY_SIZE];
        for (slot, &(orig, dest, _)) in TABLE.moves.iter().enumerate() {
            assert!(slot < POLICY_SIZE);
            assert!(!seen[slot]);
            seen[slot] = true;
            assert_ne!(orig, dest);
        }
        assert!(seen.into_iter().all(|s| s));
    }

    fn assert_round_trips(board: &Board) {
        for m in movegen::legal_moves(board) {
            let slot = encode(board.turn(), m)
                .unwrap_or_else(|| panic!("{} has no policy slot", m));
            assert!(slot < POLICY_SIZE);
            assert_eq!(decode_move(board, slot), Some(m), "slot {} did not round-trip", slot);
        }
    }

    #[test]
    fn all_starting_moves_round_trip() {
        let board = Board::new();
        assert_eq!(movegen::legal_moves(&board).len(), 20);
        assert_round_trips(&board);
    }

    #[test]
    fn black_moves_round_trip() {
        let board: Board =
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".parse().unwrap();
        assert_round_trips(&board);
    }

    #[test]
    fn castling_and_en_passant_round_trip() {
        let board: Board =
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1"
            .parse().unwrap();
        assert_round_trips(&board);

        let board: Board =
            "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3".parse().unwrap();
        assert_round_trips(&board);
    }

    #[test]
    fn promotions_round_trip() {
        // push and capturing promotions for white
        let board: Board = "n3k3/1P6/8/8/8/8/8/4K3 w - - 0 1".parse().unwrap();
        assert_round_trips(&board);
        // and for black
        let board: Board = "4k3/8/8/8/8/8/6p1/4K2N b - - 0 1".parse().unwrap();
        assert_round_trips(&board);
    }

    #[test]
    fn under_promotions_get_their_own_slots() {
        let board: Board = "8/P6k/8/8/8/8/8/K7 w - - 0 1".parse().unwrap();
        let mut slots = std::collections::HashSet::new();
        for m in movegen::legal_moves(&board) {
            if m.promotion().is_some() {
                slots.insert(encode(Color::White, m).unwrap());
            }
        }
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn encoding_is_color_symmetric() {
        // a black move encodes like the rotated white move
        let black = Move::new(Square::E7, Square::E5, chess::MoveType::Advance2);
        let white = Move::new(Square::D2, Square::D4, chess::MoveType::Advance2);
        assert_eq!(encode(Color::Black, black), encode(Color::White, white));

        let black = Move::new(Square::G8, Square::F6, chess::MoveType::Standard);
        let white = Move::new(Square::B1, Square::C3, chess::MoveType::Standard);
        assert_eq!(encode(Color::Black, black), encode(Color::White, white));
    }

    #[test]
    fn the_null_move_has_no_slot() {
        assert_eq!(encode(Color::White, Move::null()), None);
        assert_eq!(encode(Color::Black, Move::null()), None);
    }
}
