//! Chunked batch fetching with per-chunk failure isolation.
//!
//! A large id list is split into chunks of bounded size and one request is
//! issued per chunk, with a few chunks in flight at once. Outcomes come back
//! in completion order, so callers can publish partial results as soon as
//! the fastest chunk lands. A failing chunk contributes nothing but never
//! aborts its siblings.

use std::collections::HashMap;
use std::future::Future;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use super::ApiError;

/// Maximum chunk requests in flight for one batch.
const MAX_CONCURRENT_CHUNKS: usize = 4;

/// Result of one chunk request.
#[derive(Debug)]
pub struct ChunkOutcome<T> {
    /// Position of the chunk in submission order
    pub index: usize,
    /// The ids this chunk asked for
    pub ids: Vec<String>,
    pub result: Result<HashMap<String, T>, ApiError>,
}

impl<T> ChunkOutcome<T> {
    /// Ids the chunk asked for but did not get back, including every id of
    /// a failed chunk.
    pub fn unresolved_ids(&self) -> Vec<String> {
        match &self.result {
            Ok(found) => self
                .ids
                .iter()
                .filter(|id| !found.contains_key(*id))
                .cloned()
                .collect(),
            Err(_) => self.ids.clone(),
        }
    }
}

/// Split `ids` into chunks of at most `chunk_size` and fetch each with
/// `fetch_chunk`, yielding outcomes in completion order.
pub fn batch_stream<T, F, Fut>(
    ids: Vec<String>,
    chunk_size: usize,
    mut fetch_chunk: F,
) -> impl Stream<Item = ChunkOutcome<T>>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<HashMap<String, T>, ApiError>>,
{
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Vec<String>> = ids.chunks(chunk_size).map(|chunk| chunk.to_vec()).collect();
    debug!(ids = ids.len(), chunks = chunks.len(), chunk_size, "Starting batch fetch");

    stream::iter(chunks.into_iter().enumerate())
        .map(move |(index, chunk)| {
            let request = fetch_chunk(chunk.clone());
            async move {
                let result = request.await;
                if let Err(ref e) = result {
                    warn!(chunk = index, size = chunk.len(), error = %e, "Batch chunk failed");
                }
                ChunkOutcome {
                    index,
                    ids: chunk,
                    result,
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_CHUNKS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("r{:03}", i)).collect()
    }

    async fn collect<T, F, Fut>(ids: Vec<String>, chunk_size: usize, fetch_chunk: F) -> Vec<ChunkOutcome<T>>
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, T>, ApiError>>,
    {
        batch_stream(ids, chunk_size, fetch_chunk).collect().await
    }

    #[tokio::test]
    async fn test_chunks_are_bounded() {
        let outcomes = collect(ids(450), 200, |chunk| async move {
            Ok(chunk.into_iter().map(|id| (id, ())).collect())
        })
        .await;

        let mut sizes: Vec<usize> = outcomes.iter().map(|o| o.ids.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 200, 200]);
        assert!(outcomes.iter().all(|o| o.unresolved_ids().is_empty()));
    }

    #[tokio::test]
    async fn test_failed_chunk_is_isolated() {
        let all = ids(250);
        let outcomes = collect(all.clone(), 200, |chunk| async move {
            if chunk.len() == 200 {
                Ok(chunk.into_iter().map(|id| (id.clone(), id)).collect())
            } else {
                Err(ApiError::NoConnection("connection reset".to_string()))
            }
        })
        .await;

        assert_eq!(outcomes.len(), 2);
        let ok = outcomes.iter().find(|o| o.result.is_ok()).unwrap();
        let failed = outcomes.iter().find(|o| o.result.is_err()).unwrap();
        assert_eq!(ok.ids, all[..200].to_vec());
        assert!(ok.unresolved_ids().is_empty());
        assert_eq!(failed.unresolved_ids(), all[200..].to_vec());
        assert_eq!(
            failed.result.as_ref().unwrap_err(),
            &ApiError::NoConnection("connection reset".to_string())
        );
    }

    #[tokio::test]
    async fn test_omitted_ids_are_unresolved() {
        let outcomes = collect(ids(3), 20, |_chunk| async move {
            Ok(HashMap::from([("r000".to_string(), 1)]))
        })
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].unresolved_ids(), vec!["r001".to_string(), "r002".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_id_list_issues_no_requests() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let outcomes: Vec<ChunkOutcome<()>> = collect(Vec::new(), 20, move |_chunk| {
            *counter.lock().unwrap() += 1;
            async move { Ok(HashMap::new()) }
        })
        .await;

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_arrive_in_completion_order() {
        let order: Vec<usize> = batch_stream(ids(3), 1, |chunk| async move {
            // First chunk is slowest
            let delay = match chunk[0].as_str() {
                "r000" => 300,
                "r001" => 100,
                _ => 200,
            };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(HashMap::<String, ()>::new())
        })
        .map(|outcome| outcome.index)
        .collect()
        .await;

        assert_eq!(order, vec![1, 2, 0]);
    }
}
