//! Bybit linear perpetuals adapter (v5 API).
//!
//! Bybit wraps every response in a `retCode`/`result` envelope; a zero
//! retCode with an empty list is "no data", anything else is classified
//! into the venue taxonomy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use common::Bps;
use common::time::now_ms;

use crate::api::{VenueApi, VenueResult};
use crate::credentials::ReadOnlyCredentials;
use crate::error::VenueError;
use crate::gate::TokenGate;
use crate::types::{
    CapabilitySet, FeeSchedule, FundingRate, Market, OrderBookTop, Pair, VenueId,
};

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

const CATEGORY: &str = "linear";

pub struct BybitVenue {
    http: Client,
    base_url: String,
    credentials: ReadOnlyCredentials,
    gate: Arc<TokenGate>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FundingEntry {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingRateTimestamp")]
    funding_rate_timestamp: String,
}

#[derive(Debug, Deserialize)]
struct FeeEntry {
    #[serde(rename = "makerFeeRate")]
    maker_fee_rate: String,
    #[serde(rename = "takerFeeRate")]
    taker_fee_rate: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookResult {
    /// bids as [price, size] string pairs
    b: Vec<[String; 2]>,
    a: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    symbol: String,
    status: String,
    #[serde(rename = "baseCoin")]
    base_coin: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
}

fn native_symbol(pair: &Pair) -> String {
    format!("{}{}", pair.base, pair.quote)
}

fn classify(ret_code: i64, msg: &str) -> VenueError {
    match ret_code {
        10001 if msg.to_ascii_lowercase().contains("symbol") => {
            VenueError::InvalidSymbol(msg.to_string())
        }
        10002 => VenueError::InvalidNonce,
        10003 | 10004 => VenueError::AuthFailed(msg.to_string()),
        10005 => VenueError::PermissionDenied(msg.to_string()),
        10006 | 10018 => VenueError::RateLimited {
            retry_after_seconds: None,
        },
        _ => VenueError::Exchange {
            code: ret_code.to_string(),
            message: msg.to_string(),
        },
    }
}

impl BybitVenue {
    pub fn new(
        base_url: impl Into<String>,
        credentials: ReadOnlyCredentials,
    ) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(VenueError::from)?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            gate: Arc::new(TokenGate::with_defaults(now_ms())),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        signed: bool,
    ) -> VenueResult<T> {
        let _permit = self.gate.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url).query(query);

        if signed {
            let ts = now_ms().to_string();
            let canonical: String = query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            let payload = format!("{ts}{}{}", self.credentials.api_key, canonical);
            req = req
                .header("X-BAPI-API-KEY", &self.credentials.api_key)
                .header("X-BAPI-TIMESTAMP", ts)
                .header("X-BAPI-SIGN", self.credentials.sign(&payload));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(VenueError::from_status(status.as_u16(), &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| VenueError::Unknown(format!("unexpected bybit payload: {e}")))?;

        if envelope.ret_code != 0 {
            return Err(classify(envelope.ret_code, &envelope.ret_msg));
        }

        envelope
            .result
            .ok_or_else(|| VenueError::Unknown("bybit envelope missing result".to_string()))
    }
}

#[async_trait]
impl VenueApi for BybitVenue {
    fn venue(&self) -> VenueId {
        VenueId::Bybit
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    #[instrument(skip(self), fields(venue = "bybit", pair = %pair.id()), level = "debug")]
    async fn funding_rate(&self, pair: &Pair) -> VenueResult<Option<FundingRate>> {
        let symbol = native_symbol(pair);
        let result: ListResult<FundingEntry> = match self
            .get(
                "/v5/market/funding/history",
                &[
                    ("category", CATEGORY),
                    ("symbol", symbol.as_str()),
                    ("limit", "1"),
                ],
                false,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(entry) = result.list.into_iter().next() else {
            return Ok(None);
        };

        let fraction: f64 = entry
            .funding_rate
            .parse()
            .map_err(|_| VenueError::Unknown(format!("bad rate: {}", entry.funding_rate)))?;
        let rate = Bps::from_fraction(fraction)
            .map_err(|e| VenueError::Unknown(format!("malformed funding rate: {e}")))?;

        let funding_time_ms: u64 = entry.funding_rate_timestamp.parse().unwrap_or(0);

        debug!(rate = %rate, "bybit funding rate fetched");

        Ok(Some(FundingRate {
            venue: VenueId::Bybit,
            pair: pair.clone(),
            rate,
            funding_time_ms,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "bybit", pair = %pair.id()), level = "debug")]
    async fn taker_fee(&self, pair: &Pair) -> VenueResult<Option<FeeSchedule>> {
        let symbol = native_symbol(pair);
        let result: ListResult<FeeEntry> = match self
            .get(
                "/v5/account/fee-rate",
                &[("category", CATEGORY), ("symbol", symbol.as_str())],
                true,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(entry) = result.list.into_iter().next() else {
            return Ok(None);
        };

        let maker = Bps::from_fraction(entry.maker_fee_rate.parse().unwrap_or(f64::NAN))
            .map_err(|e| VenueError::Unknown(format!("malformed maker fee: {e}")))?;
        let taker = Bps::from_fraction(entry.taker_fee_rate.parse().unwrap_or(f64::NAN))
            .map_err(|e| VenueError::Unknown(format!("malformed taker fee: {e}")))?;

        Ok(Some(FeeSchedule {
            venue: VenueId::Bybit,
            pair: pair.clone(),
            maker,
            taker,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "bybit", pair = %pair.id()), level = "debug")]
    async fn order_book_top(&self, pair: &Pair) -> VenueResult<Option<OrderBookTop>> {
        let symbol = native_symbol(pair);
        let book: OrderbookResult = match self
            .get(
                "/v5/market/orderbook",
                &[
                    ("category", CATEGORY),
                    ("symbol", symbol.as_str()),
                    ("limit", "1"),
                ],
                false,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let best_bid = book
            .b
            .first()
            .and_then(|lvl| lvl[0].parse::<f64>().ok())
            .unwrap_or(0.0);
        let best_ask = book
            .a
            .first()
            .and_then(|lvl| lvl[0].parse::<f64>().ok())
            .unwrap_or(0.0);

        if best_bid <= 0.0 || best_ask <= 0.0 {
            return Ok(None);
        }

        Ok(Some(OrderBookTop {
            venue: VenueId::Bybit,
            pair: pair.clone(),
            best_bid,
            best_ask,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "bybit"), level = "debug")]
    async fn markets(&self) -> VenueResult<Vec<Market>> {
        let result: ListResult<InstrumentEntry> = self
            .get(
                "/v5/market/instruments-info",
                &[("category", CATEGORY)],
                false,
            )
            .await?;

        Ok(result
            .list
            .into_iter()
            .map(|i| Market {
                pair: Pair::new(i.base_coin, i.quote_coin),
                native_symbol: i.symbol,
                active: i.status == "Trading",
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_code_classification() {
        assert!(matches!(
            classify(10001, "params error: symbol invalid"),
            VenueError::InvalidSymbol(_)
        ));
        assert!(matches!(classify(10002, ""), VenueError::InvalidNonce));
        assert!(matches!(classify(10003, ""), VenueError::AuthFailed(_)));
        assert!(matches!(
            classify(10006, ""),
            VenueError::RateLimited { .. }
        ));
        assert!(matches!(classify(10001, "param error"), VenueError::Exchange { .. }));
    }

    #[test]
    fn funding_envelope_parses() {
        let raw = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [
                    {
                        "symbol": "BTCUSDT",
                        "fundingRate": "-0.001",
                        "fundingRateTimestamp": "1700000000000"
                    }
                ]
            }
        }"#;

        let env: Envelope<ListResult<FundingEntry>> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.ret_code, 0);
        let entry = &env.result.unwrap().list[0];
        let bps = Bps::from_fraction(entry.funding_rate.parse().unwrap()).unwrap();
        assert_eq!(bps, Bps::new(-10));
    }

    #[test]
    fn orderbook_levels_parse() {
        let raw = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "b": [["45000.5", "1.2"]],
                "a": [["45001.0", "0.4"]]
            }
        }"#;

        let env: Envelope<OrderbookResult> = serde_json::from_str(raw).unwrap();
        let book = env.result.unwrap();
        assert_eq!(book.b[0][0], "45000.5");
        assert_eq!(book.a[0][0], "45001.0");
    }
}
