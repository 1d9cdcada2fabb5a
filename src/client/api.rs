// Retrying, rate-limited request primitive plus the endpoint surface the
// missions consume. Every call takes exactly one scheduler token per attempt.
use crate::client::scheduler::{Priority, RateLimit};
use crate::models::*;
use crate::{o_debug, o_error, o_info};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Duration;

const MAX_RETRIES: u32 = 5;
const BACKOFF_SCHEDULE: [u64; 5] = [5, 10, 20, 40, 60];
const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;
const CIRCUIT_BREAKER_PAUSE_SECS: u64 = 120;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application error code for "server did not return a valid response"
const CODE_SERVER_NO_RESPONSE: u32 = 3000;
const CODE_RATE_LIMITED: u32 = 429;

/// Terminal failure from the upstream API.
///
/// `code` is the application error code when the payload carries one,
/// otherwise the HTTP status. A bare-string error payload is normalized to
/// `{code: http_status, message: string, data: {}}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: u32,
    pub message: String,
    pub data: Value,
}

impl ApiError {
    fn transport(message: String) -> Self {
        Self { code: 0, message, data: json!({}) }
    }

    fn parse(message: String) -> Self {
        Self { code: 0, message, data: json!({}) }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

fn normalize_error(http_status: u16, err: &Value) -> (u32, String, Value) {
    match err {
        Value::String(message) => (http_status as u32, message.clone(), json!({})),
        Value::Object(fields) => (
            fields
                .get("code")
                .and_then(Value::as_u64)
                .unwrap_or(http_status as u64) as u32,
            fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown API error")
                .to_string(),
            fields.get("data").cloned().unwrap_or_else(|| json!({})),
        ),
        other => (http_status as u32, other.to_string(), json!({})),
    }
}

fn parse_value<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::parse(format!("response parse error: {}", e)))
}

fn parse_data<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    match body {
        Value::Object(mut fields) => match fields.remove("data") {
            Some(data) => parse_value(data),
            None => Err(ApiError::parse("response missing data field".to_string())),
        },
        _ => Err(ApiError::parse("response is not an object".to_string())),
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    limiter: Arc<dyn RateLimit>,
    consecutive_failures: AtomicU32,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, limiter: Arc<dyn RateLimit>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            limiter,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        priority: Priority,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire(priority).await;

            if self.consecutive_failures.load(Ordering::Relaxed) >= CIRCUIT_BREAKER_THRESHOLD {
                o_error!(
                    "🧯 Circuit breaker: {} consecutive failures, pausing {}s",
                    self.consecutive_failures.load(Ordering::Relaxed),
                    CIRCUIT_BREAKER_PAUSE_SECS
                );
                tokio::time::sleep(Duration::from_secs(CIRCUIT_BREAKER_PAUSE_SECS)).await;
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }

            o_debug!("🌐 {} {} (attempt {})", method, path, attempt + 1);

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    if attempt < MAX_RETRIES {
                        let wait = BACKOFF_SCHEDULE[attempt.min(4) as usize];
                        o_info!(
                            "🌐 Transport error on {} {}: {} - retry {}/{} in {}s",
                            method, path, e, attempt + 1, MAX_RETRIES, wait
                        );
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ApiError::transport(format!("transport error: {}", e)));
                }
            };

            let status = response.status();
            if status.as_u16() == 204 {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                return Ok(Value::Null);
            }

            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<f64>().ok());

            let text = response.text().await.map_err(|e| {
                ApiError::parse(format!("failed to read response body: {}", e))
            })?;
            let body_json: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

            if let Some(err) = body_json.get("error") {
                let (code, message, data) = normalize_error(status.as_u16(), err);

                if (code == CODE_RATE_LIMITED || status.as_u16() == 429) && attempt < MAX_RETRIES {
                    let wait = retry_after
                        .map(|s| s.ceil() as u64)
                        .unwrap_or(BACKOFF_SCHEDULE[attempt.min(4) as usize]);
                    o_info!(
                        "🕐 Rate limited on {} {} - retry {}/{} in {}s",
                        method, path, attempt + 1, MAX_RETRIES, wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                    continue;
                }

                if (code == CODE_SERVER_NO_RESPONSE || status.is_server_error())
                    && attempt < MAX_RETRIES
                {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    let wait = BACKOFF_SCHEDULE[attempt.min(4) as usize];
                    o_info!(
                        "🌐 Server error {} on {} {} - retry {}/{} in {}s",
                        code, method, path, attempt + 1, MAX_RETRIES, wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                    continue;
                }

                return Err(ApiError { code, message, data });
            }

            if !status.is_success() {
                if status.is_server_error() && attempt < MAX_RETRIES {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    let wait = BACKOFF_SCHEDULE[attempt.min(4) as usize];
                    o_info!(
                        "🌐 HTTP {} on {} {} - retry {}/{} in {}s",
                        status, method, path, attempt + 1, MAX_RETRIES, wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                    continue;
                }
                return Err(ApiError {
                    code: status.as_u16() as u32,
                    message: format!("request failed with status {}", status),
                    data: json!({}),
                });
            }

            self.consecutive_failures.store(0, Ordering::Relaxed);
            return Ok(body_json);
        }
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        priority: Priority,
    ) -> Result<Value, ApiError> {
        self.request(Method::GET, path, query, None, priority).await
    }

    pub async fn post(&self, path: &str, body: Value, priority: Priority) -> Result<Value, ApiError> {
        self.request(Method::POST, path, &[], Some(&body), priority).await
    }

    pub async fn patch(&self, path: &str, body: Value, priority: Priority) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, &[], Some(&body), priority).await
    }

    /// Walk a paginated endpoint until every reported item has been
    /// collected or a page comes back empty. Returns the items plus the
    /// meta of the last page.
    pub async fn get_paginated(
        &self,
        path: &str,
        limit: u32,
        priority: Priority,
    ) -> Result<(Vec<Value>, Meta), ApiError> {
        let mut items: Vec<Value> = Vec::new();
        let mut page: u32 = 1;
        loop {
            let body = self
                .get(
                    path,
                    &[("page", page.to_string()), ("limit", limit.to_string())],
                    priority,
                )
                .await?;
            let data: Vec<Value> = body
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let meta: Meta = body
                .get("meta")
                .cloned()
                .and_then(|m| serde_json::from_value(m).ok())
                .unwrap_or(Meta { total: 0, page: page as i32, limit: limit as i32 });

            let page_was_empty = data.is_empty();
            items.extend(data);

            if items.len() as i32 >= meta.total || page_was_empty {
                return Ok((items, meta));
            }
            page += 1;
        }
    }

    // ------------------------------------------------------------------
    // Agent & fleet
    // ------------------------------------------------------------------

    pub async fn get_agent(&self) -> Result<Agent, ApiError> {
        parse_data(self.get("/my/agent", &[], Priority::Low).await?)
    }

    pub async fn list_ships(&self) -> Result<Vec<Ship>, ApiError> {
        let (items, _meta) = self.get_paginated("/my/ships", 20, Priority::Low).await?;
        items.into_iter().map(parse_value).collect()
    }

    pub async fn get_ship(&self, ship_symbol: &str) -> Result<Ship, ApiError> {
        parse_data(
            self.get(&format!("/my/ships/{}", ship_symbol), &[], Priority::Low)
                .await?,
        )
    }

    pub async fn get_cargo(&self, ship_symbol: &str) -> Result<ShipCargo, ApiError> {
        parse_data(
            self.get(&format!("/my/ships/{}/cargo", ship_symbol), &[], Priority::Low)
                .await?,
        )
    }

    /// Returns None when the ship has no active cooldown (204).
    pub async fn get_cooldown(&self, ship_symbol: &str) -> Result<Option<ShipCooldown>, ApiError> {
        let body = self
            .get(&format!("/my/ships/{}/cooldown", ship_symbol), &[], Priority::Low)
            .await?;
        if body.is_null() {
            return Ok(None);
        }
        parse_data(body).map(Some)
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    pub async fn orbit(&self, ship_symbol: &str) -> Result<ShipNav, ApiError> {
        let data: NavOnly = parse_data(
            self.post(&format!("/my/ships/{}/orbit", ship_symbol), json!({}), Priority::Normal)
                .await?,
        )?;
        Ok(data.nav)
    }

    pub async fn dock(&self, ship_symbol: &str) -> Result<ShipNav, ApiError> {
        let data: NavOnly = parse_data(
            self.post(&format!("/my/ships/{}/dock", ship_symbol), json!({}), Priority::Normal)
                .await?,
        )?;
        Ok(data.nav)
    }

    pub async fn navigate(&self, ship_symbol: &str, waypoint_symbol: &str) -> Result<NavigationData, ApiError> {
        parse_data(
            self.post(
                &format!("/my/ships/{}/navigate", ship_symbol),
                json!({ "waypointSymbol": waypoint_symbol }),
                Priority::Normal,
            )
            .await?,
        )
    }

    pub async fn set_flight_mode(&self, ship_symbol: &str, mode: FlightMode) -> Result<ShipNav, ApiError> {
        parse_data(
            self.patch(
                &format!("/my/ships/{}/nav", ship_symbol),
                json!({ "flightMode": mode.as_str() }),
                Priority::Normal,
            )
            .await?,
        )
    }

    pub async fn refuel(&self, ship_symbol: &str, from_cargo: bool) -> Result<RefuelData, ApiError> {
        let body = if from_cargo {
            json!({ "fromCargo": true })
        } else {
            json!({})
        };
        parse_data(
            self.post(&format!("/my/ships/{}/refuel", ship_symbol), body, Priority::Normal)
                .await?,
        )
    }

    // ------------------------------------------------------------------
    // Cargo & trading
    // ------------------------------------------------------------------

    pub async fn purchase_cargo(
        &self,
        ship_symbol: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<TradeData, ApiError> {
        parse_data(
            self.post(
                &format!("/my/ships/{}/purchase", ship_symbol),
                json!({ "symbol": trade_symbol, "units": units }),
                Priority::High,
            )
            .await?,
        )
    }

    pub async fn sell_cargo(
        &self,
        ship_symbol: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<TradeData, ApiError> {
        parse_data(
            self.post(
                &format!("/my/ships/{}/sell", ship_symbol),
                json!({ "symbol": trade_symbol, "units": units }),
                Priority::High,
            )
            .await?,
        )
    }

    pub async fn jettison(
        &self,
        ship_symbol: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<ShipCargo, ApiError> {
        let data: CargoData = parse_data(
            self.post(
                &format!("/my/ships/{}/jettison", ship_symbol),
                json!({ "symbol": trade_symbol, "units": units }),
                Priority::Normal,
            )
            .await?,
        )?;
        Ok(data.cargo)
    }

    pub async fn transfer(
        &self,
        from_ship: &str,
        to_ship: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<ShipCargo, ApiError> {
        let data: CargoData = parse_data(
            self.post(
                &format!("/my/ships/{}/transfer", from_ship),
                json!({ "tradeSymbol": trade_symbol, "units": units, "shipSymbol": to_ship }),
                Priority::Normal,
            )
            .await?,
        )?;
        Ok(data.cargo)
    }

    // ------------------------------------------------------------------
    // Extraction
    // ------------------------------------------------------------------

    pub async fn extract(
        &self,
        ship_symbol: &str,
        survey: Option<&Survey>,
    ) -> Result<ExtractionData, ApiError> {
        let body = match survey {
            Some(survey) => json!({ "survey": survey }),
            None => json!({}),
        };
        parse_data(
            self.post(&format!("/my/ships/{}/extract", ship_symbol), body, Priority::High)
                .await?,
        )
    }

    pub async fn survey(&self, ship_symbol: &str) -> Result<SurveyData, ApiError> {
        parse_data(
            self.post(&format!("/my/ships/{}/survey", ship_symbol), json!({}), Priority::Normal)
                .await?,
        )
    }

    // ------------------------------------------------------------------
    // Systems & waypoints
    // ------------------------------------------------------------------

    pub async fn get_system(&self, system_symbol: &str) -> Result<System, ApiError> {
        parse_data(
            self.get(&format!("/systems/{}", system_symbol), &[], Priority::Low)
                .await?,
        )
    }

    pub async fn list_waypoints(&self, system_symbol: &str) -> Result<Vec<Waypoint>, ApiError> {
        let (items, _meta) = self
            .get_paginated(&format!("/systems/{}/waypoints", system_symbol), 20, Priority::Low)
            .await?;
        items.into_iter().map(parse_value).collect()
    }

    pub async fn get_waypoint(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
    ) -> Result<Waypoint, ApiError> {
        parse_data(
            self.get(
                &format!("/systems/{}/waypoints/{}", system_symbol, waypoint_symbol),
                &[],
                Priority::Low,
            )
            .await?,
        )
    }

    pub async fn get_market(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
    ) -> Result<Market, ApiError> {
        self.get_market_with_priority(system_symbol, waypoint_symbol, Priority::Low)
            .await
    }

    /// Probes fetch markets at Background priority so they never starve
    /// revenue traffic.
    pub async fn get_market_with_priority(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
        priority: Priority,
    ) -> Result<Market, ApiError> {
        parse_data(
            self.get(
                &format!("/systems/{}/waypoints/{}/market", system_symbol, waypoint_symbol),
                &[],
                priority,
            )
            .await?,
        )
    }

    pub async fn get_shipyard(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
    ) -> Result<Shipyard, ApiError> {
        parse_data(
            self.get(
                &format!("/systems/{}/waypoints/{}/shipyard", system_symbol, waypoint_symbol),
                &[],
                Priority::Low,
            )
            .await?,
        )
    }

    // ------------------------------------------------------------------
    // Contracts
    // ------------------------------------------------------------------

    pub async fn list_contracts(&self) -> Result<Vec<Contract>, ApiError> {
        let (items, _meta) = self.get_paginated("/my/contracts", 20, Priority::Low).await?;
        items.into_iter().map(parse_value).collect()
    }

    pub async fn get_contract(&self, contract_id: &str) -> Result<Contract, ApiError> {
        parse_data(
            self.get(&format!("/my/contracts/{}", contract_id), &[], Priority::Low)
                .await?,
        )
    }

    pub async fn accept_contract(&self, contract_id: &str) -> Result<AcceptData, ApiError> {
        parse_data(
            self.post(&format!("/my/contracts/{}/accept", contract_id), json!({}), Priority::High)
                .await?,
        )
    }

    pub async fn deliver_contract(
        &self,
        contract_id: &str,
        ship_symbol: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<DeliverData, ApiError> {
        parse_data(
            self.post(
                &format!("/my/contracts/{}/deliver", contract_id),
                json!({ "shipSymbol": ship_symbol, "tradeSymbol": trade_symbol, "units": units }),
                Priority::High,
            )
            .await?,
        )
    }

    pub async fn fulfill_contract(&self, contract_id: &str) -> Result<FulfillData, ApiError> {
        parse_data(
            self.post(&format!("/my/contracts/{}/fulfill", contract_id), json!({}), Priority::High)
                .await?,
        )
    }

    pub async fn negotiate_contract(&self, ship_symbol: &str) -> Result<Contract, ApiError> {
        let data: NegotiateData = parse_data(
            self.post(
                &format!("/my/ships/{}/negotiate/contract", ship_symbol),
                json!({}),
                Priority::High,
            )
            .await?,
        )?;
        Ok(data.contract)
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub async fn get_construction(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
    ) -> Result<Construction, ApiError> {
        parse_data(
            self.get(
                &format!("/systems/{}/waypoints/{}/construction", system_symbol, waypoint_symbol),
                &[],
                Priority::Low,
            )
            .await?,
        )
    }

    pub async fn supply_construction(
        &self,
        system_symbol: &str,
        waypoint_symbol: &str,
        ship_symbol: &str,
        trade_symbol: &str,
        units: i32,
    ) -> Result<SupplyData, ApiError> {
        parse_data(
            self.post(
                &format!(
                    "/systems/{}/waypoints/{}/construction/supply",
                    system_symbol, waypoint_symbol
                ),
                json!({ "shipSymbol": ship_symbol, "tradeSymbol": trade_symbol, "units": units }),
                Priority::High,
            )
            .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_error_payload_uses_http_status() {
        let (code, message, data) = normalize_error(502, &json!("bad gateway"));
        assert_eq!(code, 502);
        assert_eq!(message, "bad gateway");
        assert_eq!(data, json!({}));
    }

    #[test]
    fn object_error_payload_keeps_application_code() {
        let err = json!({ "code": 4214, "message": "ship is in transit", "data": { "arrival": "soon" } });
        let (code, message, data) = normalize_error(400, &err);
        assert_eq!(code, 4214);
        assert_eq!(message, "ship is in transit");
        assert_eq!(data["arrival"], "soon");
    }

    #[test]
    fn object_error_without_code_falls_back_to_status() {
        let (code, message, _) = normalize_error(503, &json!({ "message": "nope" }));
        assert_eq!(code, 503);
        assert_eq!(message, "nope");
    }

    #[test]
    fn parse_data_requires_data_field() {
        let agent: Result<Agent, ApiError> = parse_data(json!({ "nope": 1 }));
        assert!(agent.is_err());
    }

    #[test]
    fn parse_data_extracts_payload() {
        let body = json!({ "data": {
            "accountId": "abc",
            "symbol": "AGENT",
            "headquarters": "X1-AB12-A1",
            "credits": 175000,
            "startingFaction": "COSMIC",
            "shipCount": 4,
        }});
        let agent: Agent = parse_data(body).unwrap();
        assert_eq!(agent.symbol, "AGENT");
        assert_eq!(agent.credits, 175_000);
    }
}
