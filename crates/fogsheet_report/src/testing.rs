//! In-memory `ReadingsSource` for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::fetch::ReadingsSource;
use crate::spec::{FetchError, SpecReadingsQuery};

/// Canned payloads; a missing key answers `404`.
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    pub pings: HashMap<String, Value>,
    pub statistics: HashMap<String, Value>,
    pub assets: HashMap<String, Value>,
    pub readings: HashMap<String, Value>,
    pub summaries: HashMap<String, Value>,
    pub timespans: HashMap<String, Value>,
}

fn lookup(dict: &HashMap<String, Value>, key: &str) -> Result<Value, FetchError> {
    dict.get(key).cloned().ok_or_else(|| FetchError::Status {
        target: key.to_string(),
        status: 404,
    })
}

#[async_trait]
impl ReadingsSource for FakeSource {
    async fn ping(&self, url: &str) -> Result<Value, FetchError> {
        lookup(&self.pings, url)
    }

    async fn statistics(&self, url: &str) -> Result<Value, FetchError> {
        lookup(&self.statistics, url)
    }

    async fn assets(&self, url: &str) -> Result<Value, FetchError> {
        lookup(&self.assets, url)
    }

    async fn readings(
        &self,
        asset: &str,
        _datapoint: Option<&str>,
        _query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError> {
        lookup(&self.readings, asset)
    }

    async fn readings_summary(
        &self,
        asset: &str,
        _datapoint: Option<&str>,
        _query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError> {
        lookup(&self.summaries, asset)
    }

    async fn readings_timespan(
        &self,
        asset: &str,
        _datapoint: Option<&str>,
        _query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError> {
        lookup(&self.timespans, asset)
    }
}
