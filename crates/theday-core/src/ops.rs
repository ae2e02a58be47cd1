//! Primitive document-store writes.

use serde::Serialize;

use crate::item::{ChildSet, Item, ItemId};

/// Which documents a write applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// The item with this id
    Id(ItemId),
    /// Every folder whose `files` or `subfolders` lists this id
    ListsChild(ItemId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Update {
    SetName(String),
    SetTrashed(bool),
    /// Append `child` to a folder's list
    Push { set: ChildSet, child: ItemId },
    /// Remove every occurrence of `child` from each listed set
    Pull { sets: Vec<ChildSet>, child: ItemId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    InsertOne(Item),
    UpdateOne { filter: Filter, update: Update },
    UpdateMany { filter: Filter, update: Update },
    DeleteOne { filter: Filter },
}

impl WriteOp {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertOne(_) => "insert_one",
            Self::UpdateOne { .. } => "update_one",
            Self::UpdateMany { .. } => "update_many",
            Self::DeleteOne { .. } => "delete_one",
        }
    }

    #[must_use]
    pub fn update_item(id: impl Into<ItemId>, update: Update) -> Self {
        Self::UpdateOne {
            filter: Filter::Id(id.into()),
            update,
        }
    }

    #[must_use]
    pub fn push_child(parent: impl Into<ItemId>, set: ChildSet, child: impl Into<ItemId>) -> Self {
        Self::update_item(
            parent,
            Update::Push {
                set,
                child: child.into(),
            },
        )
    }

    #[must_use]
    pub fn pull_child(parent: impl Into<ItemId>, set: ChildSet, child: impl Into<ItemId>) -> Self {
        Self::update_item(
            parent,
            Update::Pull {
                sets: vec![set],
                child: child.into(),
            },
        )
    }
}
