//! OKX perpetual swaps adapter (v5 API).
//!
//! OKX reports maker/taker fees as negative fractions (rebate convention);
//! they are normalised to positive cost bps here so the detector's fee
//! arithmetic stays sign-free.

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

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";

pub struct OkxVenue {
    http: Client,
    base_url: String,
    credentials: ReadOnlyCredentials,
    gate: Arc<TokenGate>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    msg: String,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FundingEntry {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingTime")]
    funding_time: String,
}

#[derive(Debug, Deserialize)]
struct FeeEntry {
    maker: String,
    taker: String,
}

#[derive(Debug, Deserialize)]
struct BookEntry {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    state: String,
}

/// `BTC/USDT` -> `BTC-USDT-SWAP`
fn native_symbol(pair: &Pair) -> String {
    format!("{}-{}-SWAP", pair.base, pair.quote)
}

fn pair_from_inst_id(inst_id: &str) -> Option<Pair> {
    let mut parts = inst_id.split('-');
    let base = parts.next()?;
    let quote = parts.next()?;
    match parts.next() {
        Some("SWAP") => Some(Pair::new(base, quote)),
        _ => None,
    }
}

fn classify(code: &str, msg: &str) -> VenueError {
    match code {
        "51001" | "51000" => VenueError::InvalidSymbol(msg.to_string()),
        "50102" => VenueError::InvalidNonce,
        "50111" | "50113" => VenueError::AuthFailed(msg.to_string()),
        "50110" => VenueError::PermissionDenied(msg.to_string()),
        "50011" => VenueError::RateLimited {
            retry_after_seconds: None,
        },
        _ => VenueError::Exchange {
            code: code.to_string(),
            message: msg.to_string(),
        },
    }
}

impl OkxVenue {
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
    ) -> VenueResult<Vec<T>> {
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
            let payload = format!("{ts}GET{path}?{canonical}");
            req = req
                .header("OK-ACCESS-KEY", &self.credentials.api_key)
                .header("OK-ACCESS-TIMESTAMP", ts)
                .header("OK-ACCESS-SIGN", self.credentials.sign(&payload));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(VenueError::from_status(status.as_u16(), &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| VenueError::Unknown(format!("unexpected okx payload: {e}")))?;

        if envelope.code != "0" {
            return Err(classify(&envelope.code, &envelope.msg));
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl VenueApi for OkxVenue {
    fn venue(&self) -> VenueId {
        VenueId::Okx
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    #[instrument(skip(self), fields(venue = "okx", pair = %pair.id()), level = "debug")]
    async fn funding_rate(&self, pair: &Pair) -> VenueResult<Option<FundingRate>> {
        let inst = native_symbol(pair);
        let data: Vec<FundingEntry> = match self
            .get(
                "/api/v5/public/funding-rate",
                &[("instId", inst.as_str())],
                false,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(entry) = data.into_iter().next() else {
            return Ok(None);
        };

        let fraction: f64 = entry
            .funding_rate
            .parse()
            .map_err(|_| VenueError::Unknown(format!("bad rate: {}", entry.funding_rate)))?;
        let rate = Bps::from_fraction(fraction)
            .map_err(|e| VenueError::Unknown(format!("malformed funding rate: {e}")))?;

        debug!(rate = %rate, "okx funding rate fetched");

        Ok(Some(FundingRate {
            venue: VenueId::Okx,
            pair: pair.clone(),
            rate,
            funding_time_ms: entry.funding_time.parse().unwrap_or(0),
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "okx", pair = %pair.id()), level = "debug")]
    async fn taker_fee(&self, pair: &Pair) -> VenueResult<Option<FeeSchedule>> {
        let inst = native_symbol(pair);
        let data: Vec<FeeEntry> = match self
            .get(
                "/api/v5/account/trade-fee",
                &[("instType", "SWAP"), ("instId", inst.as_str())],
                true,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(entry) = data.into_iter().next() else {
            return Ok(None);
        };

        // Negative values are the rebate convention; cost is the magnitude.
        let maker = Bps::from_fraction(entry.maker.parse::<f64>().unwrap_or(f64::NAN))
            .map_err(|e| VenueError::Unknown(format!("malformed maker fee: {e}")))?
            .abs();
        let taker = Bps::from_fraction(entry.taker.parse::<f64>().unwrap_or(f64::NAN))
            .map_err(|e| VenueError::Unknown(format!("malformed taker fee: {e}")))?
            .abs();

        Ok(Some(FeeSchedule {
            venue: VenueId::Okx,
            pair: pair.clone(),
            maker,
            taker,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "okx", pair = %pair.id()), level = "debug")]
    async fn order_book_top(&self, pair: &Pair) -> VenueResult<Option<OrderBookTop>> {
        let inst = native_symbol(pair);
        let data: Vec<BookEntry> = match self
            .get(
                "/api/v5/market/books",
                &[("instId", inst.as_str()), ("sz", "1")],
                false,
            )
            .await
        {
            Ok(v) => v,
            Err(VenueError::InvalidSymbol(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(book) = data.into_iter().next() else {
            return Ok(None);
        };

        let best_bid = book
            .bids
            .first()
            .and_then(|lvl| lvl.first())
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);
        let best_ask = book
            .asks
            .first()
            .and_then(|lvl| lvl.first())
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);

        if best_bid <= 0.0 || best_ask <= 0.0 {
            return Ok(None);
        }

        Ok(Some(OrderBookTop {
            venue: VenueId::Okx,
            pair: pair.clone(),
            best_bid,
            best_ask,
            observed_at_ms: now_ms(),
        }))
    }

    #[instrument(skip(self), fields(venue = "okx"), level = "debug")]
    async fn markets(&self) -> VenueResult<Vec<Market>> {
        let data: Vec<InstrumentEntry> = self
            .get("/api/v5/public/instruments", &[("instType", "SWAP")], false)
            .await?;

        Ok(data
            .into_iter()
            .filter_map(|i| {
                let pair = pair_from_inst_id(&i.inst_id)?;
                Some(Market {
                    pair,
                    native_symbol: i.inst_id,
                    active: i.state == "live",
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_mapping_round_trip() {
        let pair = Pair::new("BTC", "USDT");
        let inst = native_symbol(&pair);
        assert_eq!(inst, "BTC-USDT-SWAP");
        assert_eq!(pair_from_inst_id(&inst), Some(pair));
        assert_eq!(pair_from_inst_id("BTC-USDT"), None);
        assert_eq!(pair_from_inst_id("BTC-USDT-240329"), None);
    }

    #[test]
    fn fee_rebate_sign_is_normalised() {
        let raw = r#"{
            "code": "0",
            "msg": "",
            "data": [{"maker": "-0.0002", "taker": "-0.0005"}]
        }"#;

        let env: Envelope<FeeEntry> = serde_json::from_str(raw).unwrap();
        let entry = &env.data[0];

        let taker = Bps::from_fraction(entry.taker.parse::<f64>().unwrap())
            .unwrap()
            .abs();
        assert_eq!(taker, Bps::new(5));
    }

    #[test]
    fn error_code_classification() {
        assert!(matches!(
            classify("51001", "Instrument ID does not exist"),
            VenueError::InvalidSymbol(_)
        ));
        assert!(matches!(classify("50102", ""), VenueError::InvalidNonce));
        assert!(matches!(classify("50111", ""), VenueError::AuthFailed(_)));
        assert!(matches!(
            classify("50011", ""),
            VenueError::RateLimited { .. }
        ));
    }
}
