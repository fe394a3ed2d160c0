use crate::utils::error::{EtlError, Result};

/// Splits `items` into `parts` contiguous chunks, in order.
///
/// Every chunk but the last holds `items.len() / parts` elements; the last
/// one takes the remainder. With more parts than items the leading chunks
/// are empty and the last holds everything.
pub fn partition<T>(items: Vec<T>, parts: usize) -> Result<Vec<Vec<T>>> {
    if parts == 0 {
        return Err(EtlError::ValidationError {
            message: "cannot partition into zero parts".to_string(),
        });
    }

    let size = items.len() / parts;
    let mut rest = items.into_iter();
    let mut chunks = Vec::with_capacity(parts);
    for _ in 0..parts - 1 {
        chunks.push(rest.by_ref().take(size).collect());
    }
    chunks.push(rest.collect());
    Ok(chunks)
}

/// Number of workers worth spawning for `items` records.
pub fn worker_count(items: usize, configured: usize) -> usize {
    configured.min(items).max(1)
}
