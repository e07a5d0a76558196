//! Binance USDT-margined perpetuals adapter.
//!
//! Funding comes from the premium index endpoint (current rate plus next
//! settlement time); the commission endpoint is signed with the platform's
//! read-only key. Decimal strings are converted to `Bps` at this boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
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

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

pub struct BinanceVenue {
    http: Client,
    base_url: String,
    credentials: ReadOnlyCredentials,
    gate: Arc<TokenGate>,
}

#[derive(Debug, Deserialize)]
struct PremiumIndex {
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: u64,
}

#[derive(Debug, Deserialize)]
struct CommissionRate {
    #[serde(rename = "makerCommissionRate")]
    maker_commission_rate: String,
    #[serde(rename = "takerCommissionRate")]
    taker_commission_rate: String,
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

fn native_symbol(pair: &Pair) -> String {
    format!("{}{}", pair.base, pair.quote)
}

/// Map Binance's numeric error codes onto the venue taxonomy.
fn classify(code: i64, msg: &str) -> VenueError {
    match code {
        -1121 => VenueError::InvalidSymbol(msg.to_string()),
        -1021 => VenueError::InvalidNonce,
        -2014 | -2015 => VenueError::AuthFailed(msg.to_string()),
        -1003 => VenueError::RateLimited {
            retry_after_seconds: None,
        },
        _ => VenueError::Exchange {
            code: code.to_string(),
            message: msg.to_string(),
        },
    }
}

impl BinanceVenue {
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

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> VenueResult<T> {
        let _permit = self.gate.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(query).send().await?;

        Self::decode(resp).await
    }

    async fn get_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> VenueResult<T> {
        let _permit = self.gate.acquire().await;

        let mut canonical: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        canonical.push(format!("timestamp={}", now_ms()));
        let payload = canonical.join("&");
        let signature = self.credentials.sign(&payload);

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, payload, signature
        );
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;

        Self::decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> VenueResult<T> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(classify(err.code, &err.msg));
            }
            return Err(VenueError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| VenueError::Unknown(format!("unexpected binance payload: {e}")))
    }
}

#[async_trait]
impl VenueApi for BinanceVenue {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    #[instrument(skip(self), fields(venue = "binance", pair = %pair.id()), level = "debug")]
    async fn funding_rate(&self, pair: &Pair) -> VenueResult<Option<FundingRate>> {
        let symbol = native_symbol(pair);
        let idx: PremiumIndex = match self
            .get_public("/fapi/v1/premiumIndex", &[("symbol", symbol.as_str())])
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let fraction: f64 = idx
            .last_funding_rate
            .parse()
            .map_err(|_| VenueError::Unknown(format!("bad rate: {}", idx.last_funding_rate)))?;
        let rate = Bps::from_fraction(fraction)
            .map_err(|e| VenueError::Unknown(format!("malformed funding rate: {e}")))?;

        debug!(rate = %rate, "binance funding rate fetched");

        Ok(Some(FundingRate {
            venue: VenueId::Binance,
            pair: pair.clone(),
            rate,
            funding_time_ms: idx.next_funding_time,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "binance", pair = %pair.id()), level = "debug")]
    async fn taker_fee(&self, pair: &Pair) -> VenueResult<Option<FeeSchedule>> {
        let symbol = native_symbol(pair);
        let rate: CommissionRate = match self
            .get_signed("/fapi/v1/commissionRate", &[("symbol", symbol.as_str())])
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let maker: f64 = rate.maker_commission_rate.parse().unwrap_or(f64::NAN);
        let taker: f64 = rate.taker_commission_rate.parse().unwrap_or(f64::NAN);

        let maker = Bps::from_fraction(maker)
            .map_err(|e| VenueError::Unknown(format!("malformed maker fee: {e}")))?;
        let taker = Bps::from_fraction(taker)
            .map_err(|e| VenueError::Unknown(format!("malformed taker fee: {e}")))?;

        Ok(Some(FeeSchedule {
            venue: VenueId::Binance,
            pair: pair.clone(),
            maker,
            taker,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "binance", pair = %pair.id()), level = "debug")]
    async fn order_book_top(&self, pair: &Pair) -> VenueResult<Option<OrderBookTop>> {
        let symbol = native_symbol(pair);
        let book: BookTicker = match self
            .get_public("/fapi/v1/ticker/bookTicker", &[("symbol", symbol.as_str())])
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let best_bid: f64 = book.bid_price.parse().unwrap_or(0.0);
        let best_ask: f64 = book.ask_price.parse().unwrap_or(0.0);
        if best_bid <= 0.0 || best_ask <= 0.0 {
            return Ok(None);
        }

        Ok(Some(OrderBookTop {
            venue: VenueId::Binance,
            pair: pair.clone(),
            best_bid,
            best_ask,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "binance"), level = "debug")]
    async fn markets(&self) -> VenueResult<Vec<Market>> {
        let info: ExchangeInfo = self.get_public("/fapi/v1/exchangeInfo", &[]).await?;

        Ok(info
            .symbols
            .into_iter()
            .map(|s| Market {
                pair: Pair::new(s.base_asset, s.quote_asset),
                native_symbol: s.symbol,
                active: s.status == "TRADING",
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_mapping() {
        assert_eq!(native_symbol(&Pair::new("BTC", "USDT")), "BTCUSDT");
    }

    #[test]
    fn error_code_classification() {
        assert!(matches!(
            classify(-1121, "Invalid symbol."),
            VenueError::InvalidSymbol(_)
        ));
        assert!(matches!(classify(-1021, ""), VenueError::InvalidNonce));
        assert!(matches!(
            classify(-2015, "bad key"),
            VenueError::AuthFailed(_)
        ));
        assert!(matches!(
            classify(-1003, ""),
            VenueError::RateLimited { .. }
        ));
        assert!(matches!(classify(-4000, "x"), VenueError::Exchange { .. }));
    }

    #[test]
    fn premium_index_envelope_parses() {
        let raw = r#"{
            "symbol": "BTCUSDT",
            "markPrice": "45000.10",
            "indexPrice": "45001.00",
            "lastFundingRate": "0.00010000",
            "nextFundingTime": 1700000000000,
            "time": 1699990000000
        }"#;

        let idx: PremiumIndex = serde_json::from_str(raw).unwrap();
        assert_eq!(idx.last_funding_rate, "0.00010000");
        assert_eq!(idx.next_funding_time, 1_700_000_000_000);

        let bps = Bps::from_fraction(idx.last_funding_rate.parse().unwrap()).unwrap();
        assert_eq!(bps, Bps::new(1));
    }

    #[test]
    fn commission_envelope_parses() {
        let raw = r#"{
            "symbol": "BTCUSDT",
            "makerCommissionRate": "0.000200",
            "takerCommissionRate": "0.000400"
        }"#;

        let rate: CommissionRate = serde_json::from_str(raw).unwrap();
        let taker = Bps::from_fraction(rate.taker_commission_rate.parse().unwrap()).unwrap();
        assert_eq!(taker, Bps::new(4));
    }
}
