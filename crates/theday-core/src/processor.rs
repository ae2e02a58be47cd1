//! Translates tree mutations into primitive writes and submits them as one
//! bulk write.
//!
//! There is no coordination between concurrent batches: two callers editing
//! the same subtree at once may interleave, and a move racing a permanent
//! delete can leave a dangling or repeated child id behind. Reads tolerate
//! both.

use chrono::{DateTime, Utc};

use crate::{
    item::{ChildSet, Item, ItemKind},
    mutation::{CreateItem, Mutation},
    ops::{Filter, Update, WriteOp},
    storage::{BulkWriteSummary, DocumentStore},
    Result,
};

/// Primitive writes for a single mutation, in execution order
#[must_use]
pub fn expand(mutation: &Mutation, now: DateTime<Utc>) -> Vec<WriteOp> {
    match mutation {
        Mutation::Create(create) => {
            let kind = create.kind();
            vec![
                WriteOp::InsertOne(new_item(create, now)),
                WriteOp::push_child(&*create.parent_id, kind.child_set(), &*create.id),
            ]
        }
        Mutation::Rename(rename) => vec![WriteOp::update_item(
            &*rename.id,
            Update::SetName(rename.new_name.clone()),
        )],
        Mutation::Move(mv) => {
            let set = mv.kind().child_set();
            vec![
                WriteOp::pull_child(&*mv.old_parent, set, &*mv.id),
                WriteOp::push_child(&*mv.new_parent, set, &*mv.id),
            ]
        }
        Mutation::Trash { id } => vec![WriteOp::update_item(&**id, Update::SetTrashed(true))],
        Mutation::Restore { id } => vec![WriteOp::update_item(&**id, Update::SetTrashed(false))],
        Mutation::Delete { id } => vec![
            WriteOp::DeleteOne {
                filter: Filter::Id(id.clone()),
            },
            WriteOp::UpdateMany {
                filter: Filter::ListsChild(id.clone()),
                update: Update::Pull {
                    sets: ChildSet::ALL.to_vec(),
                    child: id.clone(),
                },
            },
        ],
    }
}

/// Flatten the writes of every mutation into one ordered batch
#[must_use]
pub fn plan(mutations: &[Mutation], now: DateTime<Utc>) -> Vec<WriteOp> {
    mutations.iter().flat_map(|m| expand(m, now)).collect()
}

fn new_item(create: &CreateItem, now: DateTime<Utc>) -> Item {
    match create.kind() {
        ItemKind::Folder => Item::folder(create.id.clone(), create.title.clone()),
        ItemKind::File => Item::file(
            create.id.clone(),
            create.title.clone(),
            create.mime_type.clone(),
            create.created_at.unwrap_or(now),
        ),
    }
}

pub struct TreeMutationProcessor<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> TreeMutationProcessor<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Submit the writes for `mutations` as a single bulk write.
    ///
    /// An empty batch is accepted without touching the store.
    pub async fn apply(&self, mutations: &[Mutation]) -> Result<BulkWriteSummary> {
        let ops = plan(mutations, Utc::now());
        if ops.is_empty() {
            tracing::debug!("Empty mutation batch, nothing to write");
            return Ok(BulkWriteSummary::default());
        }

        for (index, mutation) in mutations.iter().enumerate() {
            tracing::trace!(
                index,
                kind = mutation.name(),
                target = mutation.target(),
                "Planned tree mutation"
            );
        }

        tracing::debug!(
            mutations = mutations.len(),
            operations = ops.len(),
            "Submitting tree mutation batch"
        );

        let summary = self.store.bulk_write(&ops).await?;

        tracing::info!(
            inserted = summary.inserted,
            matched = summary.matched,
            deleted = summary.deleted,
            "Applied tree mutation batch"
        );

        Ok(summary)
    }
}
