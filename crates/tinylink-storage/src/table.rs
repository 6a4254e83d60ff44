//! Table operations shared by the backends that keep the whole mapping in one
//! [`UrlTable`] (memory and file).

use std::collections::HashSet;
use tinylink_core::storage::{find_code_for, is_tombstoned, tombstone, Result};
use tinylink_core::{ShortCode, StorageError, UrlTable, UserId};

/// Merges `data` into `table`, rejecting the whole batch on a duplicate url.
pub(crate) fn merge(table: &mut UrlTable, data: UrlTable) -> Result<()> {
    let mut incoming = HashSet::new();
    for url in data.values().flat_map(|codes| codes.values()) {
        if !incoming.insert(url.as_str()) || find_code_for(table, url).is_some() {
            return Err(StorageError::Conflict {
                original_url: url.clone(),
            });
        }
    }

    for (user, codes) in data {
        table.entry(user).or_default().extend(codes);
    }
    Ok(())
}

/// Tombstones the live codes `owner` holds. Returns how many were marked.
pub(crate) fn mark_deleted(table: &mut UrlTable, codes: &[ShortCode], owner: &UserId) -> usize {
    let Some(owned) = table.get_mut(owner) else {
        return 0;
    };

    let mut marked = 0;
    for code in codes {
        if let Some(stored) = owned.get_mut(code) {
            if !is_tombstoned(stored) {
                *stored = tombstone(stored);
                marked += 1;
            }
        }
    }
    marked
}
