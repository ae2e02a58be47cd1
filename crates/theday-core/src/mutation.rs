//! Inbound tree mutations.
//!
//! Clients send batches of loosely typed JSON objects tagged by a `Type`
//! field. Decoding turns each into a [`Mutation`], a closed set of the six
//! logical tree edits, each carrying only the fields it needs.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{ItemId, ItemKind};
use crate::{Error, Result};

/// Field carrying the mutation tag on the wire
pub const TYPE_FIELD: &str = "Type";

/// `delType` value that turns a delete into a soft delete
pub const TRASH_DEL_TYPE: &str = "TRASH";

/// What to do with a batch entry whose `Type` tag is not recognized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKindPolicy {
    /// Fail the whole batch before anything is written
    #[default]
    Reject,
    /// Skip the entry and keep decoding
    Ignore,
}

impl UnknownKindPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for UnknownKindPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnknownKindPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown mutation policy '{other}'")),
        }
    }
}

/// Tags accepted in the `Type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WireTag {
    Create,
    Rename,
    Move,
    Restore,
    Delete,
}

impl WireTag {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "rename" => Some(Self::Rename),
            "move" => Some(Self::Move),
            "restore" => Some(Self::Restore),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateItem {
    #[serde(rename = "ID", alias = "id")]
    pub id: ItemId,
    pub title: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "parentID", alias = "parentId")]
    pub parent_id: ItemId,
}

impl CreateItem {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        ItemKind::from_mime_type(&self.mime_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameItem {
    pub id: ItemId,
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoveItem {
    pub id: ItemId,
    #[serde(rename = "oldParent")]
    pub old_parent: ItemId,
    #[serde(rename = "newParent")]
    pub new_parent: ItemId,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl MoveItem {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        ItemKind::from_mime_type(&self.mime_type)
    }
}

#[derive(Debug, Deserialize)]
struct TargetOnly {
    id: ItemId,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    id: ItemId,
    #[serde(rename = "delType", default)]
    del_type: Option<String>,
}

/// A single logical edit of the mirrored tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(CreateItem),
    Rename(RenameItem),
    Move(MoveItem),
    /// Soft delete
    Trash { id: ItemId },
    Restore { id: ItemId },
    /// Permanent delete
    Delete { id: ItemId },
}

impl Mutation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Rename(_) => "rename",
            Self::Move(_) => "move",
            Self::Trash { .. } => "trash",
            Self::Restore { .. } => "restore",
            Self::Delete { .. } => "delete",
        }
    }

    /// Id of the item the mutation acts on
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Create(c) => &c.id,
            Self::Rename(r) => &r.id,
            Self::Move(m) => &m.id,
            Self::Trash { id } | Self::Restore { id } | Self::Delete { id } => id,
        }
    }

    fn decode(tag: WireTag, entry: Value) -> serde_json::Result<Self> {
        match tag {
            WireTag::Create => serde_json::from_value(entry).map(Self::Create),
            WireTag::Rename => serde_json::from_value(entry).map(Self::Rename),
            WireTag::Move => serde_json::from_value(entry).map(Self::Move),
            WireTag::Restore => {
                let TargetOnly { id } = serde_json::from_value(entry)?;
                Ok(Self::Restore { id })
            }
            WireTag::Delete => {
                let DeleteRequest { id, del_type } = serde_json::from_value(entry)?;
                match del_type.as_deref() {
                    None => Ok(Self::Delete { id }),
                    Some(TRASH_DEL_TYPE) => Ok(Self::Trash { id }),
                    Some(other) => Err(serde_json::Error::custom(format!(
                        "unsupported delType '{other}'"
                    ))),
                }
            }
        }
    }
}

/// Decode a batch of raw entries, in order.
///
/// Any malformed entry fails the whole batch. Entries with an unknown tag
/// are handled according to `policy`.
pub fn decode_batch(entries: Vec<Value>, policy: UnknownKindPolicy) -> Result<Vec<Mutation>> {
    let mut mutations = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let tag = entry
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidMutation {
                index,
                reason: format!("missing '{TYPE_FIELD}' tag"),
            })?;

        let Some(wire_tag) = WireTag::parse(tag) else {
            match policy {
                UnknownKindPolicy::Reject => {
                    return Err(Error::UnknownMutationKind {
                        index,
                        kind: tag.to_string(),
                    });
                }
                UnknownKindPolicy::Ignore => {
                    tracing::warn!(index, kind = tag, "Ignoring mutation with unknown type");
                    continue;
                }
            }
        };

        let mutation = Mutation::decode(wire_tag, entry).map_err(|e| Error::InvalidMutation {
            index,
            reason: e.to_string(),
        })?;
        mutations.push(mutation);
    }

    Ok(mutations)
}
