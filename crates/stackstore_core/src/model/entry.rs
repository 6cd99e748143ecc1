//! Stack entry and configuration domain model.
//!
//! # Responsibility
//! - Define the persisted record shape for one stack element.
//! - Encode "neighbor or boundary" link fields as an explicit sum type.
//! - Define the direction flag that selects the active terminus.
//!
//! # Invariants
//! - `id` is stable and never reused for another entry.
//! - `Neighbor::Unset` only exists inside an open push transaction.
//! - In a non-empty list exactly one entry has `left == End` and exactly one
//!   entry has `right == End`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one stack entry.
pub type EntryId = Uuid;

/// One of the two physical ends of the linked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Content of one link field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Neighbor {
    /// The entry is the physical terminus on this side.
    End,
    /// Not yet resolved; only valid mid-construction.
    Unset,
    /// Adjacent entry on this side.
    Ref(EntryId),
}

impl Neighbor {
    /// Returns the referenced entry id, if any.
    pub fn entry_id(self) -> Option<EntryId> {
        match self {
            Self::Ref(id) => Some(id),
            Self::End | Self::Unset => None,
        }
    }

    pub fn is_end(self) -> bool {
        matches!(self, Self::End)
    }
}

/// Logical orientation of the stack.
///
/// `Forward` keeps the logical top at the left terminus, `Reversed` at the
/// right one. Flipping it is the whole-stack reversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Reversed,
}

impl Direction {
    /// Returns the physical side that currently acts as the stack top.
    pub fn active_side(self) -> Side {
        match self {
            Self::Forward => Side::Left,
            Self::Reversed => Side::Right,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Reversed,
            Self::Reversed => Self::Forward,
        }
    }
}

/// Persisted stack element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Stable id assigned at creation.
    pub id: EntryId,
    /// Stored text. May be empty.
    pub content: String,
    /// Link toward the left terminus.
    pub left: Neighbor,
    /// Link toward the right terminus.
    pub right: Neighbor,
}

impl StackEntry {
    /// Creates a detached entry with a generated id and both links `Unset`.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), content)
    }

    /// Creates a detached entry with a caller-provided id.
    pub fn with_id(id: EntryId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            left: Neighbor::Unset,
            right: Neighbor::Unset,
        }
    }

    /// Returns the link field on `side`.
    pub fn link(&self, side: Side) -> Neighbor {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Replaces the link field on `side`.
    pub fn set_link(&mut self, side: Side, neighbor: Neighbor) {
        match side {
            Side::Left => self.left = neighbor,
            Side::Right => self.right = neighbor,
        }
    }

    /// Returns whether both links are resolved.
    pub fn is_linked(&self) -> bool {
        self.left != Neighbor::Unset && self.right != Neighbor::Unset
    }
}

/// Singleton configuration record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfiguration {
    pub direction: Direction,
}
