//! Cursor pagination for listing callers
//!
//! Cursors are opaque offset tokens. Server-side limits apply regardless of
//! what the caller requests; a malformed or out-of-range cursor is a
//! reportable error, never a silent reset to the first page.

/// Page size used when the caller does not request one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Hard ceiling on caller-requested page sizes.
pub const MAX_PAGE_LIMIT: usize = 200;

/// Pagination failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// The cursor is not a valid offset token.
    #[error("invalid cursor value: {0}")]
    InvalidCursor(String),

    /// The cursor points past the end of the sequence.
    #[error("cursor out of range: {0}")]
    OutOfRange(usize),
}

/// Slice one page out of a full in-memory sequence.
///
/// Returns the page and the cursor for the next one, or `None` when the
/// sequence is exhausted. A cursor equal to the sequence length yields an
/// empty final page; anything beyond it is [`PageError::OutOfRange`].
pub fn paginate<'a, T>(
    items: &'a [T],
    cursor: Option<&str>,
    limit: Option<usize>,
) -> Result<(&'a [T], Option<String>), PageError> {
    let limit = match limit {
        Some(limit) if limit > 0 => limit.min(MAX_PAGE_LIMIT),
        _ => DEFAULT_PAGE_LIMIT.min(items.len().max(1)),
    };

    let start = match cursor {
        Some(raw) => {
            let offset: usize = raw
                .parse()
                .map_err(|_| PageError::InvalidCursor(raw.to_string()))?;
            if offset > items.len() {
                return Err(PageError::OutOfRange(offset));
            }
            offset
        }
        None => 0,
    };

    if start >= items.len() {
        return Ok((&[], None));
    }

    let end = (start + limit).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Ok((&items[start..end], next))
}
