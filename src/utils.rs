use std::{future::Future, time::Duration};

use futures::future::join_all;

pub fn sort_by_key_ref<T, B, F>(slice: &mut [T], mut f: F)
where
    F: FnMut(&T) -> &B,
    B: Ord,
{
    slice.sort_by(|a, b| f(a).cmp(f(b)))
}

/// Runs `f` over `items`, `width` at a time, sleeping `pause` between
/// batches. Every item gets its own output; one failure never cancels the
/// rest of its batch. Outputs keep the order of `items`.
pub async fn in_batches<'a, T, R, F, Fut>(
    items: &'a [T],
    width: usize,
    pause: Duration,
    f: F,
) -> Vec<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut outputs = Vec::with_capacity(items.len());
    for (i, batch) in items.chunks(width.max(1)).enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        outputs.extend(join_all(batch.iter().map(&f)).await);
    }
    outputs
}
