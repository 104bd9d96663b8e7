//! Paged listings as lazy streams, with bounded retry on transient failures

use crate::core::error::{ReleaseError, ReleaseResult};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry with exponential backoff on retryable (5xx) errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: usize,
  pub initial_sleep: Duration,
  pub max_sleep: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 5,
      initial_sleep: Duration::from_secs(1),
      max_sleep: Duration::from_secs(20),
    }
  }
}

impl RetryPolicy {
  /// Same retry count, no sleeping
  pub fn immediate() -> Self {
    Self {
      initial_sleep: Duration::ZERO,
      max_sleep: Duration::ZERO,
      ..Self::default()
    }
  }

  fn sleep_for(&self, attempt: usize) -> Duration {
    let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
    self.initial_sleep.saturating_mul(factor).min(self.max_sleep)
  }
}

/// Run `op`, retrying retryable errors up to `policy.max_retries` times
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ReleaseResult<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = ReleaseResult<T>>,
{
  let mut attempt = 0;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) if err.is_retryable() && attempt < policy.max_retries => {
        let sleep = policy.sleep_for(attempt);
        attempt += 1;
        warn!(
          "retryable host error (attempt {}/{}), sleeping {:?}: {}",
          attempt, policy.max_retries, sleep, err
        );
        if !sleep.is_zero() {
          tokio::time::sleep(sleep).await;
        }
      }
      Err(err) => return Err(err),
    }
  }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
  pub items: Vec<T>,
  /// Cursor for the next page; `None` on the last page
  pub next_cursor: Option<String>,
}

struct Cursor<F> {
  fetch_page: F,
  cursor: Option<String>,
  done: bool,
}

/// Stream items from a paged listing.
///
/// Pages are fetched only as the stream is polled, each page fetch is retried under
/// `policy`, and no further pages are requested once `max_results` items were yielded.
/// An exhausted retry ends the stream with the error.
pub fn paginate<'a, T, F, Fut>(
  policy: RetryPolicy,
  max_results: Option<usize>,
  fetch_page: F,
) -> BoxStream<'a, ReleaseResult<T>>
where
  T: Send + 'a,
  F: FnMut(Option<String>) -> Fut + Send + 'a,
  Fut: Future<Output = ReleaseResult<Page<T>>> + Send + 'a,
{
  let init = Cursor {
    fetch_page,
    cursor: None,
    done: false,
  };
  let pages = stream::try_unfold(init, move |mut state| async move {
    if state.done {
      return Ok::<_, ReleaseError>(None);
    }
    let cursor = state.cursor.clone();
    let page = with_retry(&policy, || (state.fetch_page)(cursor.clone())).await?;
    state.done = page.next_cursor.is_none();
    state.cursor = page.next_cursor;
    Ok(Some((page.items, state)))
  });

  pages
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .take(max_results.unwrap_or(usize::MAX))
    .boxed()
}
