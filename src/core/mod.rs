pub mod archive;
pub mod classifier;
pub mod detector;
pub mod engine;
pub mod file_state;
pub mod layout;
pub mod registry;
pub mod scanner;

pub use archive::{
    archive_name, stored_entry_name, ArchiveWriter, ArchivedVersion, ARCHIVE_EXTENSION,
};
pub use classifier::FolderClassifier;
pub use detector::{ChangeDetector, FolderOutcome};
pub use engine::{CycleReport, WatchLoop, Watcher};
pub use file_state::{FileStamp, FileStateSnapshot, FileStateStore};
pub use layout::FolderLayout;
pub use registry::{RegistrySnapshot, Transition, WatchRegistry};
pub use scanner::{FolderScanner, ScanOutcome};
