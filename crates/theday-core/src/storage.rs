use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::{
    item::{ChildSet, FileRecord, FolderRecord, Item, ItemBody, ItemId, ItemKind},
    ops::{Filter, Update, WriteOp},
    Error, Result,
};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('file', 'folder')),
    mime_type TEXT,
    owner TEXT,
    created_at TEXT,
    files TEXT,
    subfolders TEXT,
    trashed INTEGER NOT NULL DEFAULT 0,
    CHECK (
        (kind = 'file'
            AND mime_type IS NOT NULL AND created_at IS NOT NULL
            AND files IS NULL AND subfolders IS NULL)
        OR (kind = 'folder'
            AND mime_type IS NULL AND owner IS NULL AND created_at IS NULL
            AND files IS NOT NULL AND subfolders IS NOT NULL)
    )
);

CREATE INDEX IF NOT EXISTS idx_items_kind ON items(kind);
"#;

const ITEM_COLUMNS: &str =
    "id, name, kind, mime_type, owner, created_at, files, subfolders, trashed";

type ItemRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
);

/// A primitive that failed inside a bulk write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteError {
    pub index: usize,
    pub op: &'static str,
    pub message: String,
}

/// Outcome of a bulk write. Zero-match updates count as success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteSummary {
    pub attempted: usize,
    pub inserted: u64,
    pub matched: u64,
    pub deleted: u64,
    pub write_errors: Vec<WriteError>,
}

/// Persistence substrate for the mirrored tree
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Execute every operation independently, in order.
    ///
    /// All operations are attempted even when some fail; if any failed the
    /// call returns [`Error::BulkWrite`] carrying the summary. A failure to
    /// reach the store aborts immediately.
    async fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteSummary>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderListing {
    pub folder: Option<Item>,
    pub folders: Vec<Item>,
    pub files: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    /// Open the store from a connection string such as `sqlite:theday.db?mode=rwc`.
    ///
    /// Every connection to an in-memory SQLite URL gets its own private
    /// database, so those pools are held to one long-lived connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(url).await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // Primitive writes

    pub async fn insert_one(&self, item: &Item) -> Result<()> {
        let (mime_type, owner, created_at, files, subfolders) = match &item.body {
            ItemBody::File(file) => (
                Some(file.mime_type.as_str()),
                file.owner.as_deref(),
                Some(file.created_at.to_rfc3339()),
                None,
                None,
            ),
            ItemBody::Folder(folder) => (
                None,
                None,
                None,
                Some(serde_json::to_string(&folder.files)?),
                Some(serde_json::to_string(&folder.subfolders)?),
            ),
        };

        sqlx::query(
            r#"
            INSERT INTO items (id, name, kind, mime_type, owner, created_at, files, subfolders, trashed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(item.kind().as_str())
        .bind(mime_type)
        .bind(owner)
        .bind(created_at)
        .bind(files)
        .bind(subfolders)
        .bind(item.trashed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply `update` to the first item matching `filter`; returns the match count
    pub async fn update_one(&self, filter: &Filter, update: &Update) -> Result<u64> {
        self.apply_update(filter, update, false).await
    }

    /// Apply `update` to every item matching `filter`; returns the match count
    pub async fn update_many(&self, filter: &Filter, update: &Update) -> Result<u64> {
        self.apply_update(filter, update, true).await
    }

    pub async fn delete_one(&self, filter: &Filter) -> Result<u64> {
        let sql = format!(
            "DELETE FROM items WHERE rowid IN (SELECT rowid FROM items WHERE {} LIMIT 1)",
            filter_predicate(filter, 1)
        );

        let result = sqlx::query(&sql)
            .bind(filter.id())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn apply_update(&self, filter: &Filter, update: &Update, many: bool) -> Result<u64> {
        let mut predicate = filter_predicate(filter, 2);
        // Child lists only exist on folders
        if matches!(update, Update::Push { .. } | Update::Pull { .. }) {
            predicate.push_str(" AND kind = 'folder'");
        }
        if !many {
            predicate = format!("rowid IN (SELECT rowid FROM items WHERE {predicate} LIMIT 1)");
        }

        let sql = format!("UPDATE items SET {} WHERE {predicate}", set_clause(update));

        let query = sqlx::query(&sql);
        let query = match update {
            Update::SetName(name) => query.bind(name),
            Update::SetTrashed(trashed) => query.bind(*trashed),
            Update::Push { child, .. } | Update::Pull { child, .. } => query.bind(child),
        };

        let result = query.bind(filter.id()).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn execute(&self, op: &WriteOp, summary: &mut BulkWriteSummary) -> Result<()> {
        match op {
            WriteOp::InsertOne(item) => {
                self.insert_one(item).await?;
                summary.inserted += 1;
            }
            WriteOp::UpdateOne { filter, update } => {
                summary.matched += self.update_one(filter, update).await?;
            }
            WriteOp::UpdateMany { filter, update } => {
                summary.matched += self.update_many(filter, update).await?;
            }
            WriteOp::DeleteOne { filter } => {
                summary.deleted += self.delete_one(filter).await?;
            }
        }
        Ok(())
    }

    // Reads

    pub async fn find_item(&self, id: &str) -> Result<Option<Item>> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(parse_item_row).transpose()
    }

    pub async fn get_item(&self, id: &str) -> Result<Item> {
        self.find_item(id)
            .await?
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    /// Children of a folder in list order, subfolders first.
    ///
    /// Ids that no longer resolve to an item are skipped, as are repeated ids.
    pub async fn list_children(&self, folder_id: &str, include_trashed: bool) -> Result<FolderListing> {
        let folder = self.get_item(folder_id).await?;
        let record = folder
            .as_folder()
            .ok_or_else(|| Error::NotAFolder(folder_id.to_string()))?;

        let wanted: Vec<&ItemId> = record.subfolders.iter().chain(&record.files).collect();
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id IN (SELECT value FROM json_each(?))"
        ))
        .bind(serde_json::to_string(&wanted)?)
        .fetch_all(&self.pool)
        .await?;

        let mut found: HashMap<ItemId, Item> = rows
            .into_iter()
            .map(|row| parse_item_row(row).map(|item| (item.id.clone(), item)))
            .collect::<Result<_>>()?;

        let mut listing = FolderListing::default();
        let mut seen = HashSet::new();
        for set in [ChildSet::Subfolders, ChildSet::Files] {
            for child_id in record.children(set) {
                if !seen.insert(child_id.as_str()) {
                    continue;
                }
                let Some(child) = found.remove(child_id) else {
                    tracing::debug!(folder = folder_id, child = %child_id, "Skipping dangling child reference");
                    continue;
                };
                if child.trashed && !include_trashed {
                    continue;
                }
                match set {
                    ChildSet::Subfolders => listing.folders.push(child),
                    ChildSet::Files => listing.files.push(child),
                }
            }
        }

        listing.folder = Some(folder);
        Ok(listing)
    }

    /// Insert an empty folder unless an item with `id` already exists.
    /// Returns whether the folder was created.
    pub async fn ensure_folder(&self, id: &str, name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO items (id, name, kind, files, subfolders, trashed)
            VALUES (?, ?, 'folder', '[]', '[]', 0)
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteSummary> {
        let mut summary = BulkWriteSummary {
            attempted: ops.len(),
            ..BulkWriteSummary::default()
        };

        for (index, op) in ops.iter().enumerate() {
            match self.execute(op, &mut summary).await {
                Ok(()) => {}
                Err(Error::Database(e)) if is_connection_error(&e) => return Err(Error::Database(e)),
                Err(e) => {
                    tracing::warn!(index, op = op.name(), error = %e, "Write operation failed");
                    summary.write_errors.push(WriteError {
                        index,
                        op: op.name(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if summary.write_errors.is_empty() {
            Ok(summary)
        } else {
            Err(Error::BulkWrite(summary))
        }
    }
}

impl Filter {
    fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::ListsChild(id) => id,
        }
    }
}

/// WHERE predicate for a filter, with the filter id bound as `?{param}`
fn filter_predicate(filter: &Filter, param: u8) -> String {
    match filter {
        Filter::Id(_) => format!("id = ?{param}"),
        Filter::ListsChild(_) => {
            let tests: Vec<String> = ChildSet::ALL
                .iter()
                .map(|set| {
                    format!(
                        "EXISTS (SELECT 1 FROM json_each(items.{}) WHERE value = ?{param})",
                        set.column()
                    )
                })
                .collect();
            format!("({})", tests.join(" OR "))
        }
    }
}

/// SET clause for an update; the update value is bound as `?1`
fn set_clause(update: &Update) -> String {
    match update {
        Update::SetName(_) => "name = ?1".to_string(),
        Update::SetTrashed(_) => "trashed = ?1".to_string(),
        Update::Push { set, .. } => {
            let column = set.column();
            format!("{column} = json_insert({column}, '$[#]', ?1)")
        }
        Update::Pull { sets, .. } => sets
            .iter()
            .map(|set| {
                let column = set.column();
                format!(
                    "{column} = COALESCE((SELECT json_group_array(value) OVER \
                     (ORDER BY key ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING) \
                     FROM json_each(items.{column}) WHERE value <> ?1 LIMIT 1), '[]')"
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn parse_item_row(row: ItemRow) -> Result<Item> {
    let (id, name, kind, mime_type, owner, created_at, files, subfolders, trashed) = row;

    let corrupt = |reason: String| Error::CorruptRecord {
        id: id.clone(),
        reason,
    };

    let kind: ItemKind = kind.parse().map_err(|e: Error| corrupt(e.to_string()))?;
    let body = match kind {
        ItemKind::File => {
            let created_at = created_at.ok_or_else(|| corrupt("file without created_at".into()))?;
            ItemBody::File(FileRecord {
                mime_type: mime_type.ok_or_else(|| corrupt("file without mime_type".into()))?,
                owner,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| corrupt(e.to_string()))?
                    .with_timezone(&Utc),
            })
        }
        ItemKind::Folder => ItemBody::Folder(FolderRecord {
            files: parse_child_list(files.as_deref()).map_err(|e| corrupt(e.to_string()))?,
            subfolders: parse_child_list(subfolders.as_deref()).map_err(|e| corrupt(e.to_string()))?,
        }),
    };

    Ok(Item {
        id,
        name,
        trashed,
        body,
    })
}

fn parse_child_list(raw: Option<&str>) -> serde_json::Result<Vec<ItemId>> {
    raw.map_or_else(|| Ok(Vec::new()), serde_json::from_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> Storage {
        let storage = Storage::open_memory().await.unwrap();
        storage.ensure_folder("root", "Root").await.unwrap();
        storage
    }

    fn pdf(id: &str) -> Item {
        Item::file(id.to_string(), id.to_string(), "application/pdf".to_string(), Utc::now())
    }

    async fn folder(storage: &Storage, id: &str) -> FolderRecord {
        storage.get_item(id).await.unwrap().as_folder().unwrap().clone()
    }

    #[tokio::test]
    async fn test_item_crud() {
        let storage = seeded().await;
        let file = pdf("f1");

        storage.insert_one(&file).await.unwrap();
        assert_eq!(storage.get_item("f1").await.unwrap(), file);

        let matched = storage
            .update_one(&Filter::Id("f1".into()), &Update::SetName("Lecture 1".into()))
            .await
            .unwrap();
        assert_eq!(matched, 1);
        assert_eq!(storage.get_item("f1").await.unwrap().name, "Lecture 1");

        assert_eq!(storage.delete_one(&Filter::Id("f1".into())).await.unwrap(), 1);
        assert!(matches!(
            storage.get_item("f1").await,
            Err(Error::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_push_and_pull_keep_order() {
        let storage = seeded().await;
        for child in ["a", "b", "c"] {
            storage
                .update_one(
                    &Filter::Id("root".into()),
                    &Update::Push {
                        set: ChildSet::Files,
                        child: child.into(),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(folder(&storage, "root").await.files, vec!["a", "b", "c"]);

        storage
            .update_one(
                &Filter::Id("root".into()),
                &Update::Pull {
                    sets: vec![ChildSet::Files],
                    child: "b".into(),
                },
            )
            .await
            .unwrap();
        let root = folder(&storage, "root").await;
        assert_eq!(root.files, vec!["a", "c"]);
        assert!(root.subfolders.is_empty());
    }

    #[tokio::test]
    async fn test_pull_keeps_order_of_remaining_children() {
        let storage = seeded().await;
        for child in ["a", "x", "b", "c", "x", "d", "e"] {
            storage
                .update_one(
                    &Filter::Id("root".into()),
                    &Update::Push {
                        set: ChildSet::Subfolders,
                        child: child.into(),
                    },
                )
                .await
                .unwrap();
        }

        let pull = |child: &str| Update::Pull {
            sets: vec![ChildSet::Subfolders],
            child: child.into(),
        };
        storage.update_one(&Filter::Id("root".into()), &pull("x")).await.unwrap();
        assert_eq!(
            folder(&storage, "root").await.subfolders,
            vec!["a", "b", "c", "d", "e"]
        );

        for child in ["a", "b", "c", "d", "e"] {
            storage.update_one(&Filter::Id("root".into()), &pull(child)).await.unwrap();
        }
        assert!(folder(&storage, "root").await.subfolders.is_empty());
    }

    #[tokio::test]
    async fn test_memory_url_shares_one_database() {
        let storage = Storage::connect("sqlite::memory:").await.unwrap();
        storage.ensure_folder("root", "Root").await.unwrap();

        let (a, b, c) = tokio::join!(
            storage.get_item("root"),
            storage.get_item("root"),
            storage.list_children("root", false),
        );
        assert_eq!(a.unwrap().name, "Root");
        assert_eq!(b.unwrap().name, "Root");
        assert!(c.unwrap().files.is_empty());
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:tree?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite:theday.db?mode=rwc"));
    }

    #[tokio::test]
    async fn test_push_ignores_files() {
        let storage = seeded().await;
        storage.insert_one(&pdf("f1")).await.unwrap();

        let matched = storage
            .update_one(
                &Filter::Id("f1".into()),
                &Update::Push {
                    set: ChildSet::Files,
                    child: "x".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(matched, 0);
        assert!(storage.get_item("f1").await.unwrap().as_file().is_some());
    }

    #[tokio::test]
    async fn test_pull_from_every_listing_folder() {
        let storage = seeded().await;
        storage.ensure_folder("archive", "Archive").await.unwrap();
        storage.ensure_folder("other", "Other").await.unwrap();
        for (parent, set) in [("root", ChildSet::Files), ("archive", ChildSet::Subfolders)] {
            storage
                .update_one(
                    &Filter::Id(parent.into()),
                    &Update::Push {
                        set,
                        child: "x".into(),
                    },
                )
                .await
                .unwrap();
        }

        let matched = storage
            .update_many(
                &Filter::ListsChild("x".into()),
                &Update::Pull {
                    sets: ChildSet::ALL.to_vec(),
                    child: "x".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(matched, 2);
        for id in ["root", "archive", "other"] {
            assert!(!folder(&storage, id).await.contains("x"));
        }
    }

    #[tokio::test]
    async fn test_bulk_write_attempts_every_operation() {
        let storage = seeded().await;
        storage.insert_one(&pdf("dup")).await.unwrap();

        let ops = vec![
            WriteOp::InsertOne(pdf("dup")),
            WriteOp::InsertOne(pdf("f2")),
            WriteOp::push_child("root", ChildSet::Files, "f2"),
        ];

        let err = storage.bulk_write(&ops).await.unwrap_err();
        let Error::BulkWrite(summary) = err else {
            panic!("expected bulk write error, got {err}");
        };
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.write_errors.len(), 1);
        assert_eq!(summary.write_errors[0].index, 0);

        assert!(storage.find_item("f2").await.unwrap().is_some());
        assert_eq!(folder(&storage, "root").await.files, vec!["f2"]);
    }

    #[tokio::test]
    async fn test_zero_match_is_not_an_error() {
        let storage = seeded().await;
        let summary = storage
            .bulk_write(&[
                WriteOp::update_item("missing", Update::SetTrashed(true)),
                WriteOp::DeleteOne {
                    filter: Filter::Id("missing".into()),
                },
            ])
            .await
            .unwrap();

        assert_eq!(summary.matched, 0);
        assert_eq!(summary.deleted, 0);
        assert!(summary.write_errors.is_empty());
    }

    #[tokio::test]
    async fn test_list_children_skips_dangling_and_trashed() {
        let storage = seeded().await;
        storage.ensure_folder("week1", "Week 1").await.unwrap();
        let mut trashed = pdf("old");
        trashed.trashed = true;
        storage.insert_one(&pdf("f1")).await.unwrap();
        storage.insert_one(&trashed).await.unwrap();

        let ops = vec![
            WriteOp::push_child("root", ChildSet::Subfolders, "week1"),
            WriteOp::push_child("root", ChildSet::Files, "gone"),
            WriteOp::push_child("root", ChildSet::Files, "f1"),
            WriteOp::push_child("root", ChildSet::Files, "old"),
            WriteOp::push_child("root", ChildSet::Files, "f1"),
        ];
        storage.bulk_write(&ops).await.unwrap();

        let listing = storage.list_children("root", false).await.unwrap();
        let names = |items: &[Item]| items.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(names(&listing.folders), vec!["week1"]);
        assert_eq!(names(&listing.files), vec!["f1"]);

        let listing = storage.list_children("root", true).await.unwrap();
        assert_eq!(names(&listing.files), vec!["f1", "old"]);
    }

    #[tokio::test]
    async fn test_list_children_of_file_fails() {
        let storage = seeded().await;
        storage.insert_one(&pdf("f1")).await.unwrap();

        assert!(matches!(
            storage.list_children("f1", false).await,
            Err(Error::NotAFolder(_))
        ));
        assert!(matches!(
            storage.list_children("nope", false).await,
            Err(Error::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_folder_is_idempotent() {
        let storage = Storage::open_memory().await.unwrap();
        assert!(storage.ensure_folder("root", "Root").await.unwrap());
        assert!(!storage.ensure_folder("root", "Renamed").await.unwrap());
        assert_eq!(storage.get_item("root").await.unwrap().name, "Root");
    }
}
