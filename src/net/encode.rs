//! Encoding a game state into the input planes of the network
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! The network sees a position as a stack of 8x8 planes. The first 104 planes describe the
//! last eight positions of the game, 13 planes each: six for the mover's pieces, six for the
//! opponent's pieces and one repetition indicator. The remaining planes carry the castling
//! rights, the fifty-move clock and the side to move.
//!
//! All piece planes are oriented from the mover's point of view: when Black is to move, every
//! square is rotated by 180 degrees so that the mover's pieces start at the bottom of the
//! grid, mirroring the rotation applied by the policy codec.
////////////////////////////////////////////////////////////////////////////////////////////////////
use chess::{Color, Piece, Square};
use chess::game::{GameState, HISTORY_SLOTS};

/// The plane count of the common single-value network layout
pub const PLANES_LEGACY: usize = 112;
/// The plane count of the extended layout
pub const PLANES_EXTENDED: usize = 119;

/// The number of planes describing one historical position
const PLANES_PER_POSITION: usize = 13;
/// The number of planes describing the position history
const HISTORY_PLANES: usize = PLANES_PER_POSITION * HISTORY_SLOTS;

const PIECES: [Piece; 6] =
    [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen, Piece::King];

/// Encodes a game state into `planes` 8x8 feature planes, flattened row-major into
/// `planes * 64` floats. `planes` must be one of the supported layouts (112 or 119).
pub fn encode(state: &GameState, planes: usize) -> Vec<f32> {
    debug_assert!(planes >= PLANES_LEGACY);

    let mut data = vec![0f32; planes * 64];
    let mover = state.board().turn();

    let cell = |sq: Square| -> usize {
        match mover {
            Color::White => sq as usize,
            Color::Black => sq.rotate() as usize,
        }
    };

    // 13 planes for each remembered position, most recent first. Slots from before the start
    // of the game stay all-zero.
    for t in 0..HISTORY_SLOTS {
        let board = match state.history().get(t) {
            Some(board) => board,
            None => continue,
        };
        let base = t * PLANES_PER_POSITION;

        for (offset, color) in [(0, mover), (6, !mover)] {
            for (i, &piece) in PIECES.iter().enumerate() {
                let plane = base + offset + i;
                for sq in board.pieces(color, piece) {
                    data[plane * 64 + cell(sq)] = 1.0;
                }
            }
        }

        // the repetition plane is only populated for the current position
        if t == 0 {
            let reps = state.repetitions();
            if reps > 0 {
                let value = reps.min(3) as f32 / 3.0;
                data[(base + 12) * 64..(base + 13) * 64].fill(value);
            }
        }
    }

    // Castling rights, mover's first.
    let board = state.board();
    let rights = [
        board.can_castle_king_side(mover),
        board.can_castle_queen_side(mover),
        board.can_castle_king_side(!mover),
        board.can_castle_queen_side(!mover),
    ];
    for (i, &right) in rights.iter().enumerate() {
        if right {
            let plane = HISTORY_PLANES + i;
            data[plane * 64..(plane + 1) * 64].fill(1.0);
        }
    }

    // The fifty-move clock, scaled into [0, 1].
    let rule50 = board.halfmove_clock().min(99) as f32 / 99.0;
    let plane = HISTORY_PLANES + 4;
    data[plane * 64..(plane + 1) * 64].fill(rule50);

    // Side to move; only the legacy layout carries this plane. In the extended layout the
    // slot belongs to the zero padding below.
    if planes == PLANES_LEGACY && mover == Color::White {
        let plane = HISTORY_PLANES + 5;
        data[plane * 64..(plane + 1) * 64].fill(1.0);
    }

    // The extended layout ends with an all-ones plane; anything between stays zero.
    if planes >= PLANES_EXTENDED {
        data[(planes - 1) * 64..].fill(1.0);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Board;
    use chess::movegen;

    fn plane(data: &[f32], index: usize) -> &[f32] {
        &data[index * 64..(index + 1) * 64]
    }

    fn push_uci(state: &mut GameState, moves: &str) {
        for s in moves.split_whitespace() {
            let m = movegen::move_from_uci(state.board(), s).unwrap();
            state.push(m);
        }
    }

    #[test]
    fn starting_position_planes() {
        let state = GameState::new(Board::new());
        let data = encode(&state, PLANES_LEGACY);
        assert_eq!(data.len(), PLANES_LEGACY * 64);

        // eight mover pawns on the second rank
        assert_eq!(plane(&data, 0).iter().sum::<f32>(), 8.0);
        assert_eq!(data[Square::A2 as usize], 1.0);
        // the mover's king on e1
        assert_eq!(data[5 * 64 + Square::E1 as usize], 1.0);
        // eight opponent pawns
        assert_eq!(plane(&data, 6).iter().sum::<f32>(), 8.0);
        // no repetitions yet
        assert!(plane(&data, 12).iter().all(|&v| v == 0.0));
        // only one position in the history: planes for T-1 are empty
        assert!(plane(&data, 13).iter().all(|&v| v == 0.0));

        // all four castling rights
        for i in 0..4 {
            assert!(plane(&data, 104 + i).iter().all(|&v| v == 1.0));
        }
        // fresh fifty-move clock
        assert!(plane(&data, 108).iter().all(|&v| v == 0.0));
        // white to move
        assert!(plane(&data, 109).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn black_positions_are_rotated() {
        let mut state = GameState::new(Board::new());
        push_uci(&mut state, "e2e4");

        let data = encode(&state, PLANES_LEGACY);
        // black pawns appear at the bottom of the mover planes
        assert_eq!(data[Square::A2 as usize], 1.0);
        // white's e4 pawn appears rotated onto d5 in the opponent planes
        assert_eq!(data[6 * 64 + Square::D5 as usize], 1.0);
        // side-to-move plane is zero for black
        assert!(plane(&data, 109).iter().all(|&v| v == 0.0));

        // the previous position (T-1) holds the starting position from black's view
        assert_eq!(plane(&data, 13).iter().sum::<f32>(), 8.0);
    }

    #[test]
    fn repetition_plane_is_filled_on_repeat() {
        let mut state = GameState::new(Board::new());
        push_uci(&mut state, "g1f3 g8f6 f3g1 f6g8");
        assert_eq!(state.repetitions(), 1);

        let data = encode(&state, PLANES_LEGACY);
        assert!(plane(&data, 12).iter().all(|&v| (v - 1.0 / 3.0).abs() < 1e-6));
    }

    #[test]
    fn castling_planes_are_mover_relative() {
        let board: Board = "r3k2r/8/8/8/8/8/8/R3K2R b KQk - 0 1".parse().unwrap();
        let state = GameState::new(board);
        let data = encode(&state, PLANES_LEGACY);

        // mover (black) has only the king-side right
        assert!(plane(&data, 104).iter().all(|&v| v == 1.0));
        assert!(plane(&data, 105).iter().all(|&v| v == 0.0));
        // opponent (white) has both
        assert!(plane(&data, 106).iter().all(|&v| v == 1.0));
        assert!(plane(&data, 107).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn extended_layout_ends_with_ones() {
        let state = GameState::new(Board::new());
        let data = encode(&state, PLANES_EXTENDED);
        assert_eq!(data.len(), PLANES_EXTENDED * 64);
        assert!(plane(&data, PLANES_EXTENDED - 1).iter().all(|&v| v == 1.0));
        // the side-to-move plane exists only in the legacy layout; here the slot is part of
        // the zero padding, even with white to move
        assert!(plane(&data, 109).iter().all(|&v| v == 0.0));
        assert!(plane(&data, 112).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rule50_plane_is_scaled() {
        let board: Board = "4k3/8/8/8/8/8/8/4K3 w - - 33 40".parse().unwrap();
        let state = GameState::new(board);
        let data = encode(&state, PLANES_LEGACY);
        assert!(plane(&data, 108).iter().all(|&v| (v - 33.0 / 99.0).abs() < 1e-6));
    }
}
