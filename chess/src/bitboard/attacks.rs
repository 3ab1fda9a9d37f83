//! Provides data and functions used to compute attacks
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! Attacks of the sliding pieces are computed with classical ray scanning: for each square and
//! each of the eight compass directions a blocker-less ray is precomputed. Given the occupied
//! squares, the nearest blocker along a ray is the lowest set bit of `ray & occupied` for rays
//! that point toward higher square numbers, and the highest set bit for rays that point toward
//! lower square numbers. Everything beyond the blocker is cleared by removing the blocker's own
//! ray; the blocker square itself stays set, so captures fall out of a later intersection with
//! the enemy occupancy.
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::convert::TryFrom;
use lazy_static::lazy_static;
use super::*;

/// The eight compass directions of a queen-like ray, in the order used by the ray tables.
///
/// The first four point toward higher square numbers ("positive" rays), the last four toward
/// lower square numbers ("negative" rays).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    NorthWest = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    SouthEast = 7,
}

impl Direction {
    /// The number of directions
    pub const COUNT: usize = 8;

    /// All directions, positive rays first
    pub const ALL: [Direction; 8] = [
        Direction::North, Direction::NorthEast, Direction::East, Direction::NorthWest,
        Direction::South, Direction::SouthWest, Direction::West, Direction::SouthEast,
    ];

    /// The (rank, file) step of the direction
    pub fn step(self) -> (i8, i8) {
        match self {
            Direction::North => (1, 0),
            Direction::NorthEast => (1, 1),
            Direction::East => (0, 1),
            Direction::NorthWest => (1, -1),
            Direction::South => (-1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::West => (0, -1),
            Direction::SouthEast => (-1, 1),
        }
    }

    /// Returns `true` if the ray points toward higher square numbers
    pub fn is_positive(self) -> bool {
        (self as usize) < 4
    }
}

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (2, 1), (1, 2), (-1, 2), (-2, 1), (-2, -1), (-1, -2), (1, -2), (2, -1),
];

const KING_STEPS: [(i8, i8); 8] = [
    (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1),
];

// Diagonal capture targets only; pushes are not attacks.
const PAWN_STEPS: [[(i8, i8); 2]; Color::COUNT] = [
    [(1, -1), (1, 1)],
    [(-1, -1), (-1, 1)],
];

fn offset_squares(sq: Square, steps: &[(i8, i8)]) -> Bitboard {
    let mut bb = Bitboard::new();
    let (r, f) = (sq.rank() as i8, sq.file() as i8);
    for &(dr, df) in steps {
        let (r, f) = (r + dr, f + df);
        if (0..8).contains(&r) && (0..8).contains(&f) {
            bb.insert(Square::try_from((r as usize) * 8 + f as usize).expect("INFALLIBLE"));
        }
    }
    bb
}

fn ray_squares(sq: Square, dir: Direction) -> Bitboard {
    let mut bb = Bitboard::new();
    let (dr, df) = dir.step();
    let (mut r, mut f) = (sq.rank() as i8 + dr, sq.file() as i8 + df);
    while (0..8).contains(&r) && (0..8).contains(&f) {
        bb.insert(Square::try_from((r as usize) * 8 + f as usize).expect("INFALLIBLE"));
        r += dr;
        f += df;
    }
    bb
}

lazy_static! {
    static ref KNIGHT_ATTACKS: [Bitboard; Square::COUNT] = {
        let mut table = [Bitboard::new(); Square::COUNT];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = offset_squares(Square::try_from(i).expect("INFALLIBLE"), &KNIGHT_STEPS);
        }
        table
    };

    static ref KING_ATTACKS: [Bitboard; Square::COUNT] = {
        let mut table = [Bitboard::new(); Square::COUNT];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = offset_squares(Square::try_from(i).expect("INFALLIBLE"), &KING_STEPS);
        }
        table
    };

    static ref PAWN_ATTACKS: [[Bitboard; Square::COUNT]; Color::COUNT] = {
        let mut table = [[Bitboard::new(); Square::COUNT]; Color::COUNT];
        for (c, color_table) in table.iter_mut().enumerate() {
            for (i, entry) in color_table.iter_mut().enumerate() {
                *entry = offset_squares(Square::try_from(i).expect("INFALLIBLE"), &PAWN_STEPS[c]);
            }
        }
        table
    };

    static ref RAY_ATTACKS: [[Bitboard; Square::COUNT]; Direction::COUNT] = {
        let mut table = [[Bitboard::new(); Square::COUNT]; Direction::COUNT];
        for &dir in &Direction::ALL {
            for i in 0..Square::COUNT {
                table[dir as usize][i] = ray_squares(Square::try_from(i).expect("INFALLIBLE"), dir);
            }
        }
        table
    };
}

/// Computes knight-like attacks to or from `sq`
#[inline]
pub fn knight_attacks(sq: Square) -> Bitboard {
    KNIGHT_ATTACKS[sq as usize]
}

/// Computes king-like attacks to or from `sq`
#[inline]
pub fn king_attacks(sq: Square) -> Bitboard {
    KING_ATTACKS[sq as usize]
}

/// Computes the squares attacked by a pawn of the given color on `sq`
///
/// Only the diagonal capture targets are attacks; pawn advancements are not. To ask whether a
/// pawn of color `c` attacks square `s`, intersect `pawn_attacks(!c, s)` with the pawns of `c`
/// (the pattern is its own mirror).
#[inline]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    PAWN_ATTACKS[color as usize][sq as usize]
}

/// Computes the blocker-less ray from `sq` in direction `dir`, excluding `sq` itself
#[inline]
pub fn ray_attacks(dir: Direction, sq: Square) -> Bitboard {
    RAY_ATTACKS[dir as usize][sq as usize]
}

/// Scans a single ray from `sq`, cutting it off just past the nearest blocker in `occ`.
///
/// The blocker square remains in the result.
fn scan_ray(dir: Direction, sq: Square, occ: Bitboard) -> Bitboard {
    let mut attacks = RAY_ATTACKS[dir as usize][sq as usize];
    let blockers = attacks & occ;
    if !blockers.is_empty() {
        let blocker = if dir.is_positive() {
            blockers.first().expect("INFALLIBLE")
        } else {
            blockers.last().expect("INFALLIBLE")
        };
        attacks ^= RAY_ATTACKS[dir as usize][blocker as usize];
    }
    attacks
}

/// Computes bishop-like attacks to or from `sq` based on the occupied squares given by `occ`
pub fn bishop_attacks(sq: Square, occ: Bitboard) -> Bitboard {
    scan_ray(Direction::NorthEast, sq, occ)
        | scan_ray(Direction::NorthWest, sq, occ)
        | scan_ray(Direction::SouthEast, sq, occ)
        | scan_ray(Direction::SouthWest, sq, occ)
}

/// Computes rook-like attacks to or from `sq` based on the occupied squares given by `occ`
pub fn rook_attacks(sq: Square, occ: Bitboard) -> Bitboard {
    scan_ray(Direction::North, sq, occ)
        | scan_ray(Direction::East, sq, occ)
        | scan_ray(Direction::South, sq, occ)
        | scan_ray(Direction::West, sq, occ)
}

/// Computes queen-like attacks to or from `sq` based on the occupied squares given by `occ`
#[inline]
pub fn queen_attacks(sq: Square, occ: Bitboard) -> Bitboard {
    rook_attacks(sq, occ) | bishop_attacks(sq, occ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knight_attacks_from_the_corner() {
        let mut attacks = knight_attacks(Square::A1);
        assert_eq!(attacks.pop(), Some(Square::C2));
        assert_eq!(attacks.pop(), Some(Square::B3));
        assert_eq!(attacks.pop(), None);
    }

    #[test]
    fn king_attacks_from_the_edge() {
        assert_eq!(king_attacks(Square::A4).len(), 5);
        assert_eq!(king_attacks(Square::E4).len(), 8);
        assert_eq!(king_attacks(Square::H8).len(), 3);
    }

    #[test]
    fn pawn_attacks_point_the_right_way() {
        let mut attacks = pawn_attacks(Color::White, Square::E4);
        assert_eq!(attacks.pop(), Some(Square::D5));
        assert_eq!(attacks.pop(), Some(Square::F5));
        assert_eq!(attacks.pop(), None);

        let mut attacks = pawn_attacks(Color::Black, Square::A5);
        assert_eq!(attacks.pop(), Some(Square::B4));
        assert_eq!(attacks.pop(), None);
    }

    #[test]
    fn rays_stop_at_the_board_edge() {
        assert!(ray_attacks(Direction::NorthWest, Square::A1).is_empty());
        assert!(ray_attacks(Direction::South, Square::D1).is_empty());
        assert_eq!(ray_attacks(Direction::North, Square::D1).len(), 7);
        assert_eq!(ray_attacks(Direction::NorthEast, Square::A1).len(), 7);
    }

    #[test]
    fn rook_attacks_respect_blockers() {
        let occ = Bitboard::from(Square::A2) | Square::C1.into();
        let mut attacks = rook_attacks(Square::A1, occ);
        assert_eq!(attacks.pop(), Some(Square::B1));
        assert_eq!(attacks.pop(), Some(Square::C1));
        assert_eq!(attacks.pop(), Some(Square::A2));
        assert_eq!(attacks.pop(), None);
    }

    #[test]
    fn bishop_attacks_respect_blockers() {
        let occ = Bitboard::from(Square::F6);
        let attacks = bishop_attacks(Square::D4, occ);
        assert!(attacks.contains(Square::E5));
        assert!(attacks.contains(Square::F6));
        assert!(!attacks.contains(Square::G7));
        assert!(attacks.contains(Square::A1));
        assert!(attacks.contains(Square::A7));
        assert!(attacks.contains(Square::G1));
    }

    #[test]
    fn queen_attacks_are_the_union_of_rook_and_bishop() {
        let occ = Bitboard::from(Square::D6) | Square::F4.into();
        assert_eq!(
            queen_attacks(Square::D4, occ),
            rook_attacks(Square::D4, occ) | bishop_attacks(Square::D4, occ)
        );
    }

    #[test]
    fn empty_board_attack_counts() {
        // a rook always sees 14 squares on an empty board
        for i in 0..Square::COUNT {
            let sq = Square::try_from(i).unwrap();
            assert_eq!(rook_attacks(sq, Bitboard::new()).len(), 14);
        }
        // a bishop in the center sees 13
        assert_eq!(bishop_attacks(Square::D4, Bitboard::new()).len(), 13);
    }
}
