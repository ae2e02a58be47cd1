use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type the storage provider uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Provider-assigned item identifier
pub type ItemId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    #[must_use]
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            Self::Folder
        } else {
            Self::File
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }

    /// Child list of a parent folder that holds items of this kind
    #[must_use]
    pub fn child_set(&self) -> ChildSet {
        match self {
            Self::File => ChildSet::Files,
            Self::Folder => ChildSet::Subfolders,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            _ => Err(crate::Error::CorruptRecord {
                id: String::new(),
                reason: format!("unknown item kind '{s}'"),
            }),
        }
    }
}

/// One of the two child lists a folder carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildSet {
    Files,
    Subfolders,
}

impl ChildSet {
    pub const ALL: [Self; 2] = [Self::Files, Self::Subfolders];

    /// Column holding the list in the `items` table
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Subfolders => "subfolders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub files: Vec<ItemId>,
    pub subfolders: Vec<ItemId>,
}

impl FolderRecord {
    #[must_use]
    pub fn children(&self, set: ChildSet) -> &[ItemId] {
        match set {
            ChildSet::Files => &self.files,
            ChildSet::Subfolders => &self.subfolders,
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.files.iter().chain(&self.subfolders).any(|c| c == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemBody {
    File(FileRecord),
    Folder(FolderRecord),
}

impl ItemBody {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::File(_) => ItemKind::File,
            Self::Folder(_) => ItemKind::Folder,
        }
    }
}

/// A node of the mirrored tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub trashed: bool,
    #[serde(flatten)]
    pub body: ItemBody,
}

impl Item {
    #[must_use]
    pub fn file(id: ItemId, name: String, mime_type: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            trashed: false,
            body: ItemBody::File(FileRecord {
                mime_type,
                owner: None,
                created_at,
            }),
        }
    }

    #[must_use]
    pub fn folder(id: ItemId, name: String) -> Self {
        Self {
            id,
            name,
            trashed: false,
            body: ItemBody::Folder(FolderRecord::default()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.body.kind()
    }

    #[must_use]
    pub fn as_folder(&self) -> Option<&FolderRecord> {
        match &self.body {
            ItemBody::Folder(folder) => Some(folder),
            ItemBody::File(_) => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&FileRecord> {
        match &self.body {
            ItemBody::File(file) => Some(file),
            ItemBody::Folder(_) => None,
        }
    }
}
