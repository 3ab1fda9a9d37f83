//! Contains structures to represent moves
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::convert::TryFrom;
use std::fmt;
use super::*;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The type of move
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveType {
    /// Any move which is not castling, a two-square pawn advancement, en-passant capture, or pawn
    /// promotion
    Standard,
    /// A castling move
    Castling,
    /// A two-square pawn advancement
    Advance2,
    /// An en passant capture
    EnPassant,
    /// A pawn promotion to the given piece type
    Promotion(Promotion),
}

impl Default for MoveType {
    fn default() -> Self {
        MoveType::Standard
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Which piece to promote to for a promotion move
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Promotion {
    ToKnight = 1,
    ToBishop = 2,
    ToRook = 3,
    ToQueen = 4,
}

impl Default for Promotion {
    fn default() -> Self {
        Promotion::ToQueen
    }
}

impl From<Promotion> for Piece {
    fn from(prom: Promotion) -> Self {
        // Promotion discriminants line up with Piece's Knight..Queen
        unsafe { std::mem::transmute::<Promotion, Piece>(prom) }
    }
}

impl fmt::Display for Promotion {
    /// The lowercase piece letter used in UCI long algebraic notation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Promotion::ToKnight => "n",
            Promotion::ToBishop => "b",
            Promotion::ToRook => "r",
            Promotion::ToQueen => "q",
        }.fmt(f)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A chess move, packed into 16 bits.
///
/// Bits 0-5 hold the origin square, bits 6-11 the destination square, and bits 12-15 a kind
/// tag distinguishing standard moves, two-square pawn advancements, en passant captures,
/// castling and the four promotions. Whether a move captures is not stored; it is recovered
/// from the board when the move is made.
///
/// The all-zero value is reserved as a null move (printed `0000`), used to answer a search
/// that finds no legal move.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Move(u16);

const KIND_STANDARD: u16 = 0;
const KIND_ADVANCE2: u16 = 1;
const KIND_EN_PASSANT: u16 = 2;
const KIND_CASTLING: u16 = 3;
// promotion kinds are 3 + the promotion code (1=N, 2=B, 3=R, 4=Q)
const KIND_PROMOTION_BASE: u16 = 3;

impl Move {
    /// Creates a new move
    pub fn new(orig: Square, dest: Square, move_type: MoveType) -> Move {
        let kind = match move_type {
            MoveType::Standard => KIND_STANDARD,
            MoveType::Advance2 => KIND_ADVANCE2,
            MoveType::EnPassant => KIND_EN_PASSANT,
            MoveType::Castling => KIND_CASTLING,
            MoveType::Promotion(prom) => KIND_PROMOTION_BASE + prom as u16,
        };

        Move((orig as u16) | ((dest as u16) << 6) | (kind << 12))
    }

    /// Returns the null move
    pub fn null() -> Move {
        Move(0)
    }

    /// Returns `true` if this is the null move
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the origin of the moved piece
    pub fn origin(self) -> Square {
        Square::try_from((self.0 & 0o77) as usize).expect("INFALLIBLE")
    }

    /// Returns the destination of the moved piece
    pub fn destination(self) -> Square {
        Square::try_from(((self.0 >> 6) & 0o77) as usize).expect("INFALLIBLE")
    }

    /// Returns the type of move
    pub fn move_type(self) -> MoveType {
        match self.0 >> 12 {
            KIND_STANDARD => MoveType::Standard,
            KIND_ADVANCE2 => MoveType::Advance2,
            KIND_EN_PASSANT => MoveType::EnPassant,
            KIND_CASTLING => MoveType::Castling,
            kind => MoveType::Promotion(match kind - KIND_PROMOTION_BASE {
                1 => Promotion::ToKnight,
                2 => Promotion::ToBishop,
                3 => Promotion::ToRook,
                4 => Promotion::ToQueen,
                _ => unreachable!(),
            }),
        }
    }

    /// Returns the type of promotion, if any
    pub fn promotion(self) -> Option<Promotion> {
        if let MoveType::Promotion(prom) = self.move_type() {
            Some(prom)
        } else {
            None
        }
    }
}

impl fmt::Display for Move {
    /// Formats the move in UCI long algebraic notation (`e2e4`, `e7e8q`, `0000` for the
    /// null move). Castling is written as the king's two-square move.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return "0000".fmt(f);
        }
        write!(f, "{}{}", self.origin(), self.destination())?;
        if let Some(prom) = self.promotion() {
            write!(f, "{}", prom)?;
        }
        Ok(())
    }
}
