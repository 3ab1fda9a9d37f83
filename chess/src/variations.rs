//! Module for counting and printing the number of variations from a given position
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use crate::*;
use crate::movegen;

/// Print the number of variations of the given `depth` for each legal move from `board`
pub fn print(board: &Board, depth: usize) -> u64 {
    if depth < 1 {
        return 1;
    }

    let mut board = board.clone();
    let mut total = 0;

    for m in movegen::legal_moves(&board) {
        let undo = board.make(m);
        let count = count_inner(&mut board, depth - 1);
        board.unmake(undo);

        total += count;
        println!("\t{:7}\t{:12}", m.to_string(), count);
    }

    total
}

/// Count the number of legal variations of the given `depth` from `board`
pub fn count(board: &Board, depth: usize) -> u64 {
    count_inner(&mut board.clone(), depth)
}

fn count_inner(board: &mut Board, depth: usize) -> u64 {
    if depth < 1 {
        return 1;
    }

    let mut total = 0;

    for m in movegen::generate(board) {
        // Castling legality needs the pre-move board; everything else is cheaper to verify
        // after the move is already made.
        if m.move_type() == MoveType::Castling && !movegen::is_legal(board, m) {
            continue;
        }
        let mover = board.turn();
        let undo = board.make(m);
        if !board.in_check(mover) {
            total += count_inner(board, depth - 1);
        }
        board.unmake(undo);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_is_one() {
        assert_eq!(count(&Board::new(), 0), 1);
    }

    #[test]
    fn shallow_counts_from_the_starting_position() {
        let board = Board::new();
        assert_eq!(count(&board, 1), 20);
        assert_eq!(count(&board, 2), 400);
    }
}
