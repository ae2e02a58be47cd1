pub mod error;
pub mod item;
pub mod mutation;
pub mod ops;
pub mod processor;
pub mod storage;

pub use error::{Error, Result};
pub use item::{ChildSet, FileRecord, FolderRecord, Item, ItemBody, ItemId, ItemKind, FOLDER_MIME_TYPE};
pub use mutation::{decode_batch, CreateItem, MoveItem, Mutation, RenameItem, UnknownKindPolicy};
pub use ops::{Filter, Update, WriteOp};
pub use processor::TreeMutationProcessor;
pub use storage::{BulkWriteSummary, DocumentStore, FolderListing, Storage, WriteError};
