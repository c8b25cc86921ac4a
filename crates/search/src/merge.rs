use codeindex_store::FuzzyMatch;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Anything ordered by a match score.
pub trait Scored {
    fn score(&self) -> f32;
}

impl Scored for FuzzyMatch {
    fn score(&self) -> f32 {
        self.score
    }
}

impl Scored for f32 {
    fn score(&self) -> f32 {
        *self
    }
}

/// Current head of one source stream.
struct Head<T> {
    score: f32,
    source: usize,
    item: T,
}

impl<T> PartialEq for Head<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Head<T> {}

impl<T> PartialOrd for Head<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Head<T> {
    // Max-heap on score; equal scores pop the earlier source first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// k-way merge of streams that are each sorted by descending score.
///
/// The heap holds at most one head per stream; popping a head pulls the next
/// item of the same stream. Yields `(stream position, item)`.
pub struct ScoreMerge<I: Iterator> {
    streams: Vec<I>,
    heap: BinaryHeap<Head<I::Item>>,
}

impl<I> ScoreMerge<I>
where
    I: Iterator,
    I::Item: Scored,
{
    pub fn new(streams: Vec<I>) -> Self {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(streams.len()),
            streams,
        };
        for source in 0..merge.streams.len() {
            merge.advance(source);
        }
        merge
    }

    fn advance(&mut self, source: usize) {
        if let Some(item) = self.streams[source].next() {
            self.heap.push(Head {
                score: item.score(),
                source,
                item,
            });
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<I> Iterator for ScoreMerge<I>
where
    I: Iterator,
    I::Item: Scored,
{
    type Item = (usize, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.heap.pop()?;
        self.advance(head.source);
        Some((head.source, head.item))
    }
}

/// Pop merged items until `max_results` of them resolve to `Some`
/// (`0` = no cap). Items resolving to `None` do not count. The flag is true
/// when the cap was hit with items still pending.
pub fn collect_top<I, T, F>(streams: Vec<I>, max_results: usize, mut resolve: F) -> (Vec<T>, bool)
where
    I: Iterator,
    I::Item: Scored,
    F: FnMut(usize, I::Item) -> Option<T>,
{
    let mut merge = ScoreMerge::new(streams);
    let mut results = Vec::new();
    while max_results == 0 || results.len() < max_results {
        let Some((source, item)) = merge.next() else {
            break;
        };
        if let Some(result) = resolve(source, item) {
            results.push(result);
        }
    }
    let truncated = !merge.is_exhausted();
    (results, truncated)
}
