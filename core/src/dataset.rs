//! Dataset operations: schema creation, appending and replacing data.
//!
//! # Design
//! The API accepts at most 500 records per request. Appends are split into
//! contiguous batches sent one after another, stopping at the first failure;
//! batches that already landed stay applied. Replace has no multi-request
//! form, so it sends a single request with the leading records only.

use std::num::NonZeroUsize;
use std::ops::Range;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::types::{DataPayload, DataRow, Dataset};

/// Records per request accepted by the API.
pub const DEFAULT_MAX_RECORDS_PER_REQUEST: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(max) => max,
    None => unreachable!(),
};

/// Dataset operations bound to a [`Client`].
#[derive(Debug, Clone, Copy)]
pub struct DatasetService<'a> {
    client: &'a Client,
    max_records_per_request: NonZeroUsize,
}

impl<'a> DatasetService<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            max_records_per_request: DEFAULT_MAX_RECORDS_PER_REQUEST,
        }
    }

    /// Override the number of records sent per request.
    pub fn with_max_records_per_request(mut self, max: NonZeroUsize) -> Self {
        self.max_records_per_request = max;
        self
    }

    pub fn max_records_per_request(&self) -> usize {
        self.max_records_per_request.get()
    }

    /// Create the dataset, or update its schema if it already exists.
    pub async fn find_or_create(&self, cancel: &CancellationToken, dataset: &Dataset) -> Result<()> {
        let body = encode(dataset)?;
        let request = self.client.build_request(
            HttpMethod::Put,
            &format!("/datasets/{}", dataset.name),
            Some(body),
        )?;
        self.client.execute(request, cancel).await
    }

    /// Append `data` to the dataset in batches of at most
    /// `max_records_per_request` rows.
    ///
    /// Batches are sent in order, one at a time. The first failing batch
    /// aborts the rest; earlier batches are not rolled back. Appending no rows
    /// sends nothing.
    pub async fn append_data(
        &self,
        cancel: &CancellationToken,
        dataset: &Dataset,
        data: &[DataRow],
    ) -> Result<()> {
        for (index, range) in batch_ranges(data.len(), self.max_records_per_request).enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(
                dataset = %dataset.name,
                batch = index,
                rows = range.len(),
                "appending batch"
            );
            self.send_data(cancel, HttpMethod::Post, dataset, &data[range])
                .await?;
        }
        Ok(())
    }

    /// Replace all data in the dataset with `data`.
    ///
    /// Only one request is made, so only the first `max_records_per_request`
    /// rows are sent. Any rows beyond that are dropped without an error.
    pub async fn replace_data(
        &self,
        cancel: &CancellationToken,
        dataset: &Dataset,
        data: &[DataRow],
    ) -> Result<()> {
        let end = data.len().min(self.max_records_per_request.get());
        debug!(dataset = %dataset.name, rows = end, "replacing data");
        self.send_data(cancel, HttpMethod::Put, dataset, &data[..end])
            .await
    }

    async fn send_data(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        dataset: &Dataset,
        rows: &[DataRow],
    ) -> Result<()> {
        let body = encode(&DataPayload { data: rows })?;
        let request = self.client.build_request(
            method,
            &format!("/datasets/{}/data", dataset.name),
            Some(body),
        )?;
        self.client.execute(request, cancel).await
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::Serialization)
}

/// Split `len` rows into contiguous ranges of at most `max` rows.
///
/// There are `len / max` full ranges followed by one partial range, which is
/// skipped when `len` is a multiple of `max`.
pub fn batch_ranges(len: usize, max: NonZeroUsize) -> impl Iterator<Item = Range<usize>> {
    let max = max.get();
    let full = len / max;
    (0..=full)
        .map(move |i| i * max..((i + 1) * max).min(len))
        .filter(|range| !range.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(len: usize, max: usize) -> Vec<Range<usize>> {
        batch_ranges(len, NonZeroUsize::new(max).unwrap()).collect()
    }

    #[test]
    fn no_rows_no_batches() {
        assert!(ranges(0, 500).is_empty());
        assert!(ranges(0, 1).is_empty());
    }

    #[test]
    fn fewer_rows_than_max() {
        assert_eq!(ranges(1, 500), vec![0..1]);
        assert_eq!(ranges(499, 500), vec![0..499]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_batch() {
        assert_eq!(ranges(500, 500), vec![0..500]);
        assert_eq!(ranges(4, 2), vec![0..2, 2..4]);
        assert_eq!(ranges(3, 1), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn remainder_goes_in_final_batch() {
        assert_eq!(ranges(5, 2), vec![0..2, 2..4, 4..5]);
        assert_eq!(ranges(1001, 500), vec![0..500, 500..1000, 1000..1001]);
    }

    #[test]
    fn batch_count_is_ceiling_division() {
        for max in 1..=7 {
            for len in 0..=50 {
                let batches = ranges(len, max);
                assert_eq!(batches.len(), len.div_ceil(max), "len={len} max={max}");
                let covered: Vec<usize> = batches.into_iter().flatten().collect();
                assert_eq!(covered, (0..len).collect::<Vec<_>>(), "len={len} max={max}");
            }
        }
    }

    #[test]
    fn default_batch_size() {
        let client = Client::with_url("key-444", "http://localhost:3000");
        assert_eq!(client.datasets().max_records_per_request(), 500);
        let service = client
            .datasets()
            .with_max_records_per_request(NonZeroUsize::new(2).unwrap());
        assert_eq!(service.max_records_per_request(), 2);
    }
}
