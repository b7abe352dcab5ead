use std::fs;
use std::path::Path;

use artmark_core::MemoryStore;
use artmark_logging::{artmark_info, artmark_warn};
use serde::{Deserialize, Serialize};

/// On-disk list of item identifiers that were already downloaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProcessedList {
    ids: Vec<String>,
}

/// A missing or unreadable file means nothing was processed yet.
pub(crate) fn load_processed(path: &Path) -> MemoryStore {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return MemoryStore::new();
        }
        Err(err) => {
            artmark_warn!("Failed to read processed ids from {:?}: {}", path, err);
            return MemoryStore::new();
        }
    };

    let list: ProcessedList = match ron::from_str(&content) {
        Ok(list) => list,
        Err(err) => {
            artmark_warn!("Failed to parse processed ids from {:?}: {}", path, err);
            return MemoryStore::new();
        }
    };

    artmark_info!("Loaded {} processed id(s) from {:?}", list.ids.len(), path);
    list.ids.into_iter().collect()
}
