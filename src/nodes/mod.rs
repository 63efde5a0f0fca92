pub mod folder_selector;
pub mod metadata_writer;
pub mod pattern;
pub mod png_text;

pub use folder_selector::{
    select_image_from_folder, FolderSelectRequest, FolderSelection, SortKey, SortOrder,
};
pub use metadata_writer::{Label, MetadataWriteRequest, MetadataWriter, SavedImage};
