//! Injected fetch capability, bounded retry and per-asset/per-instance fetch plans.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::reading::decode_readings;
use crate::spec::{
    FetchError, SpecAssetPayload, SpecAssetRef, SpecInstanceStatusPayload, SpecReadingsQuery,
    SpecRetryPolicy,
};
use crate::summary::derive_local_aggregate;

const TUP_ASSET_NAME_KEYS: [&str; 4] = ["assetCode", "asset_code", "asset", "name"];
const TUP_ASSET_COUNT_KEYS: [&str; 3] = ["count", "readingCount", "readings"];

////////////////////////////////////////////////////////////////////////////////
// #region Capability

/// Upstream data platform as seen by the engine.
///
/// Instance-scoped calls (`ping`, `statistics`, `assets`) take the instance URL;
/// reading calls are answered by the instance the source is bound to.
/// Timeouts and transport belong to the implementation.
#[async_trait]
pub trait ReadingsSource: Send + Sync {
    /// Instance health and counters.
    async fn ping(&self, url: &str) -> Result<Value, FetchError>;

    /// Instance statistics (`[{key, value, description}]`).
    async fn statistics(&self, url: &str) -> Result<Value, FetchError>;

    /// Asset inventory (`[{assetCode, count}]`).
    async fn assets(&self, url: &str) -> Result<Value, FetchError>;

    /// Raw readings for one asset.
    async fn readings(
        &self,
        asset: &str,
        datapoint: Option<&str>,
        query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError>;

    /// Min/max/average per datapoint.
    async fn readings_summary(
        &self,
        asset: &str,
        datapoint: Option<&str>,
        query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError> {
        let _ = (datapoint, query);
        Err(FetchError::Unsupported(format!("summary for {asset}")))
    }

    /// Oldest/newest reading timestamps.
    async fn readings_timespan(
        &self,
        asset: &str,
        datapoint: Option<&str>,
        query: &SpecReadingsQuery,
    ) -> Result<Value, FetchError> {
        let _ = (datapoint, query);
        Err(FetchError::Unsupported(format!("timespan for {asset}")))
    }
}

/// Decode an asset inventory payload (objects or bare names).
pub fn decode_asset_list(payload: &Value) -> Vec<SpecAssetRef> {
    let Some(l_items) = payload.as_array() else {
        return vec![];
    };
    l_items
        .iter()
        .filter_map(|item| match item {
            Value::String(c_name) => Some(SpecAssetRef::from(c_name.as_str())),
            Value::Object(obj) => {
                let c_name = TUP_ASSET_NAME_KEYS
                    .iter()
                    .find_map(|c_key| obj.get(*c_key).and_then(Value::as_str))?;
                let reading_count = TUP_ASSET_COUNT_KEYS
                    .iter()
                    .find_map(|c_key| obj.get(*c_key).and_then(Value::as_u64));
                Some(SpecAssetRef {
                    asset_name: c_name.to_string(),
                    reading_count,
                })
            }
            _ => None,
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Retry

/// Delay before retry number `n_retry` (1-based), capped at the policy ceiling.
pub fn calculate_backoff(policy: &SpecRetryPolicy, n_retry: u32) -> Duration {
    let n_exponent = n_retry.saturating_sub(1).min(32) as i32;
    let n_ms = policy.ms_backoff_base as f64 * policy.backoff_factor.max(1.0).powi(n_exponent);
    Duration::from_millis(n_ms.min(policy.ms_backoff_max as f64) as u64)
}

/// Await `op` up to `n_attempts_max` times, sleeping between retryable failures.
///
/// Non-retryable errors and the last failure are returned as is.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &SpecRetryPolicy,
    target: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let n_attempts_max = policy.n_attempts_max.max(1);
    let mut n_attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && n_attempt < n_attempts_max => {
                let delay = calculate_backoff(policy, n_attempt);
                warn!(
                    target_resource = target,
                    attempt = n_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                n_attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FetchPlans

/// Fetch timespan and summary for one asset concurrently.
///
/// When either aggregate is unavailable and `if_fallback_local` is set, raw
/// readings are fetched and the missing aggregate is derived from them.
pub async fn fetch_asset_payload(
    source: &dyn ReadingsSource,
    asset_ref: &SpecAssetRef,
    query: &SpecReadingsQuery,
    policy: &SpecRetryPolicy,
    if_fallback_local: bool,
) -> Result<SpecAssetPayload, FetchError> {
    let c_asset = asset_ref.asset_name.as_str();
    let (res_timespan, res_summary) = futures::join!(
        fetch_with_retry(policy, c_asset, || source.readings_timespan(c_asset, None, query)),
        fetch_with_retry(policy, c_asset, || source.readings_summary(c_asset, None, query)),
    );

    let err_first = match (&res_timespan, &res_summary) {
        (Ok(timespan), Ok(summary)) => {
            return Ok(SpecAssetPayload {
                timespan: timespan.clone(),
                summary: summary.clone(),
                reading_count: asset_ref.reading_count,
            });
        }
        (Err(err), _) | (_, Err(err)) => err.clone(),
    };
    if !if_fallback_local {
        return Err(err_first);
    }

    warn!(asset = c_asset, error = %err_first, "aggregate fetch failed, deriving from readings");
    let payload_readings =
        fetch_with_retry(policy, c_asset, || source.readings(c_asset, None, query)).await?;
    let l_readings = decode_readings(&payload_readings, c_asset);
    let aggregate = derive_local_aggregate(&l_readings, None);
    debug!(asset = c_asset, readings = l_readings.len(), "derived local aggregate");

    Ok(SpecAssetPayload {
        timespan: res_timespan.unwrap_or_else(|_| aggregate.to_timespan_json()),
        summary: res_summary.unwrap_or_else(|_| aggregate.to_summary_json()),
        reading_count: asset_ref.reading_count.or(Some(aggregate.reading_count)),
    })
}

/// Fetch ping, statistics and assets for one instance concurrently.
///
/// Only a ping failure fails the instance; the other payloads degrade to `null`.
pub async fn fetch_instance_status(
    source: &dyn ReadingsSource,
    url: &str,
    policy: &SpecRetryPolicy,
) -> Result<SpecInstanceStatusPayload, FetchError> {
    let (res_ping, res_statistics, res_assets) = futures::join!(
        fetch_with_retry(policy, url, || source.ping(url)),
        fetch_with_retry(policy, url, || source.statistics(url)),
        fetch_with_retry(policy, url, || source.assets(url)),
    );

    let ping = res_ping?;
    let statistics = res_statistics.unwrap_or_else(|err| {
        warn!(url, error = %err, "statistics unavailable");
        Value::Null
    });
    let assets = res_assets.unwrap_or_else(|err| {
        warn!(url, error = %err, "asset inventory unavailable");
        Value::Null
    });

    Ok(SpecInstanceStatusPayload {
        ping,
        statistics,
        assets,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::summary::{decode_summary_payload, decode_timespan_payload};
    use crate::testing::FakeSource;

    #[test]
    fn test_calculate_backoff_grows_and_caps() {
        let policy = SpecRetryPolicy::default();
        assert_eq!(calculate_backoff(&policy, 1), Duration::from_millis(500));
        assert_eq!(calculate_backoff(&policy, 2), Duration::from_millis(1_000));
        assert_eq!(calculate_backoff(&policy, 3), Duration::from_millis(2_000));
        assert_eq!(calculate_backoff(&policy, 10), Duration::from_millis(8_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_retry_is_bounded() {
        let policy = SpecRetryPolicy::default();
        let n_calls = AtomicU32::new(0);

        let res: Result<(), FetchError> = fetch_with_retry(&policy, "t", || {
            n_calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Timeout("t".to_string())) }
        })
        .await;
        assert_eq!(res, Err(FetchError::Timeout("t".to_string())));
        assert_eq!(n_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_retry_recovers_and_skips_non_retryable() {
        let policy = SpecRetryPolicy::default();
        let n_calls = AtomicU32::new(0);
        let res = fetch_with_retry(&policy, "t", || {
            let n_call = n_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n_call == 0 {
                    Err(FetchError::Status {
                        target: "t".to_string(),
                        status: 503,
                    })
                } else {
                    Ok(n_call)
                }
            }
        })
        .await;
        assert_eq!(res, Ok(1));

        let n_calls = AtomicU32::new(0);
        let res: Result<(), FetchError> = fetch_with_retry(&policy, "t", || {
            n_calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Unsupported("t".to_string())) }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(n_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_asset_list() {
        let l_assets = decode_asset_list(&json!([
            {"assetCode": "a", "count": 3},
            "b",
            {"unrelated": true},
        ]));
        assert_eq!(l_assets.len(), 2);
        assert_eq!(l_assets[0].reading_count, Some(3));
        assert_eq!(l_assets[1].asset_name, "b");
        assert!(decode_asset_list(&json!({"assets": []})).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_asset_payload_falls_back_to_readings() {
        let mut source = FakeSource::default();
        source.timespans.insert(
            "a".to_string(),
            json!({"oldest": "2024-01-01 00:00:00", "newest": "2024-01-01 00:01:00"}),
        );
        source.readings.insert(
            "a".to_string(),
            json!([
                {"timestamp": "2024-01-01 00:00:00", "reading": {"temp": 1.0}},
                {"timestamp": "2024-01-01 00:01:00", "reading": {"temp": 3.0}},
            ]),
        );

        let payload = fetch_asset_payload(
            &source,
            &SpecAssetRef::from("a"),
            &SpecReadingsQuery::default(),
            &SpecRetryPolicy::default(),
            true,
        )
        .await
        .unwrap();
        assert_eq!(payload.reading_count, Some(2));
        assert_eq!(
            payload.timespan,
            json!({"oldest": "2024-01-01 00:00:00", "newest": "2024-01-01 00:01:00"})
        );
        let dict_stats = decode_summary_payload(&payload.summary, "a").unwrap();
        assert_eq!(dict_stats["temp"].average, Some(2.0));

        let res = fetch_asset_payload(
            &source,
            &SpecAssetRef::from("a"),
            &SpecReadingsQuery::default(),
            &SpecRetryPolicy::default(),
            false,
        )
        .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_fetch_asset_payload_local_timespan_round_trips() {
        let mut source = FakeSource::default();
        source.readings.insert(
            "a".to_string(),
            json!([{"timestamp": "2024-01-01 00:00:00.500", "reading": {"temp": 1.0}}]),
        );
        let payload = fetch_asset_payload(
            &source,
            &SpecAssetRef::from("a"),
            &SpecReadingsQuery::default(),
            &SpecRetryPolicy::default(),
            true,
        )
        .await
        .unwrap();
        let timespan = decode_timespan_payload(&payload.timespan).unwrap();
        assert_eq!(
            timespan.oldest,
            crate::timeval::to_grid_date(&"2024-01-01 00:00:00.500".into())
        );
    }

    #[tokio::test]
    async fn test_fetch_instance_status_tolerates_partial_failure() {
        let mut source = FakeSource::default();
        source
            .pings
            .insert("http://i1".to_string(), json!({"uptime": 10}));

        let payload = fetch_instance_status(&source, "http://i1", &SpecRetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(payload.ping, json!({"uptime": 10}));
        assert_eq!(payload.statistics, Value::Null);

        let res = fetch_instance_status(&source, "http://i2", &SpecRetryPolicy::default()).await;
        assert!(res.is_err());
    }
}
