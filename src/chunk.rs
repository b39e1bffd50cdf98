use crate::error::PipelineError;

pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Partitions `items` into contiguous batches of `size`, the last holding the remainder.
///
/// Empty input yields no chunks at all.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>, PipelineError> {
    if size == 0 {
        return Err(PipelineError::InvalidArgument(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    Ok(items.chunks(size).map(<[T]>::to_vec).collect())
}
