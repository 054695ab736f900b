//! Splice a source down to its declared time ranges.
//!
//! Every range is trimmed concurrently; results come back over a channel sized
//! to the number of ranges and are put back in declared order before a single
//! concat call, so the output never depends on which trim finished first.

use crate::domain::job::SpliceRange;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("no splice ranges declared")]
    NoRanges,
    #[error("trim of range #{position} failed: {source}")]
    Trim {
        position: usize,
        #[source]
        source: BoxError,
    },
    #[error("trim of range #{position} did not complete")]
    Aborted { position: usize },
    #[error("concat failed: {0}")]
    Concat(#[source] BoxError),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpliceBackend: Send + Sync {
    /// Cut one range out of the source; returns a reference to the part.
    async fn trim(&self, position: usize, range: SpliceRange) -> Result<String, BoxError>;

    /// Join the parts, in the order given, into the final asset.
    async fn concat(&self, parts: Vec<String>) -> Result<String, BoxError>;
}

/// Trim every range concurrently and concatenate the parts in declared order.
///
/// A single range is returned as-is without a concat call. The first failed
/// range aborts the remaining trims and concat is never issued.
pub async fn splice<B>(backend: Arc<B>, ranges: &[SpliceRange]) -> Result<String, SpliceError>
where
    B: SpliceBackend + ?Sized + 'static,
{
    if ranges.is_empty() {
        return Err(SpliceError::NoRanges);
    }
    if ranges.len() == 1 {
        return backend
            .trim(0, ranges[0])
            .await
            .map_err(|source| SpliceError::Trim {
                position: 0,
                source,
            });
    }

    let (tx, mut rx) = mpsc::channel(ranges.len());
    let mut handles = Vec::with_capacity(ranges.len());
    for (position, range) in ranges.iter().copied().enumerate() {
        let backend = backend.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let result = backend.trim(position, range).await;
            let _ = tx.send((position, result)).await;
        }));
    }
    drop(tx);

    let mut parts: Vec<Option<String>> = vec![None; ranges.len()];
    let mut received = 0;
    while let Some((position, result)) = rx.recv().await {
        match result {
            Ok(part) => {
                debug!(position, part = %part, "Range trimmed");
                parts[position] = Some(part);
                received += 1;
            }
            Err(source) => {
                handles.iter().for_each(|h| h.abort());
                return Err(SpliceError::Trim { position, source });
            }
        }
    }

    if received < ranges.len() {
        let position = parts.iter().position(Option::is_none).unwrap_or(0);
        return Err(SpliceError::Aborted { position });
    }

    let ordered: Vec<String> = parts.into_iter().flatten().collect();
    backend.concat(ordered).await.map_err(SpliceError::Concat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Finishes later ranges first and records what concat receives.
    struct ReverseBackend {
        delays_ms: Vec<u64>,
        fail_at: Option<usize>,
        concatenated: Mutex<Vec<Vec<String>>>,
    }

    impl ReverseBackend {
        fn new(n: usize) -> Self {
            Self {
                delays_ms: (0..n as u64).rev().map(|i| i * 15).collect(),
                fail_at: None,
                concatenated: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpliceBackend for ReverseBackend {
        async fn trim(&self, position: usize, range: SpliceRange) -> Result<String, BoxError> {
            tokio::time::sleep(Duration::from_millis(self.delays_ms[position])).await;
            if self.fail_at == Some(position) {
                return Err("remote rejected trim".into());
            }
            Ok(format!("part-{}-{}", position, range.start))
        }

        async fn concat(&self, parts: Vec<String>) -> Result<String, BoxError> {
            self.concatenated.lock().unwrap().push(parts);
            Ok("joined".to_string())
        }
    }

    fn ranges(n: usize) -> Vec<SpliceRange> {
        (0..n)
            .map(|i| SpliceRange {
                start: (i * 10) as f64,
                end: (i * 10 + 5) as f64,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_parts_ordered_by_declared_position() {
        let backend = Arc::new(ReverseBackend::new(4));
        let result = splice(backend.clone(), &ranges(4)).await.unwrap();

        assert_eq!(result, "joined");
        let calls = backend.concatenated.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec!["part-0-0", "part-1-10", "part-2-20", "part-3-30"]
        );
    }

    #[tokio::test]
    async fn test_single_range_skips_concat() {
        let mut backend = MockSpliceBackend::new();
        backend
            .expect_trim()
            .times(1)
            .returning(|_, _| Ok("only-part".to_string()));
        backend.expect_concat().never();

        let result = splice(Arc::new(backend), &ranges(1)).await.unwrap();
        assert_eq!(result, "only-part");
    }

    #[tokio::test]
    async fn test_failed_range_aborts_without_concat() {
        let mut backend = ReverseBackend::new(3);
        backend.fail_at = Some(1);
        let backend = Arc::new(backend);

        let err = splice(backend.clone(), &ranges(3)).await.unwrap_err();
        assert!(matches!(err, SpliceError::Trim { position: 1, .. }));
        assert!(backend.concatenated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_ranges() {
        let backend = Arc::new(MockSpliceBackend::new());
        let err = splice(backend, &[]).await.unwrap_err();
        assert!(matches!(err, SpliceError::NoRanges));
    }
}
