//! Opt-in library size estimation.
//!
//! Walks a library page by page and sums the reported item sizes, so a
//! delete run can report how much storage it reclaimed. Reporting only: the
//! trim never keys a decision off these numbers, and a failed estimate just
//! drops out of the report.
//!
//! Estimating costs a second full item-list pass per target (before and
//! after), which is why it sits behind a flag. Version histories are never
//! enumerated here.

use crate::remote::{RemoteApi, RemoteError, RemoteResult};
use crate::retry::with_backoff;

/// Estimated bytes held by a library's items.
pub async fn estimate_library_bytes(
    remote: &dyn RemoteApi,
    library: &str,
    page_size: u32,
    max_attempts: u32,
) -> RemoteResult<u64> {
    let mut total: u64 = 0;
    let mut cursor: Option<String> = None;

    loop {
        let cursor_ref = cursor.as_deref();
        let page = with_backoff(
            "size estimate: list items",
            max_attempts,
            RemoteError::is_retryable,
            || remote.list_items_page(library, page_size, cursor_ref),
        )
        .await?;

        for item in &page.items {
            total = total.saturating_add(item.size_bytes);
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(total)
}

/// Human-readable byte count in binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
