// Contract procurement mission: negotiate, buy cheapest, deliver, fulfill.
//
// The game allows one active contract at a time. Ships on this mission
// share one ContractState: they buy and deliver in parallel, and only one
// ship negotiates the next contract (async mutex, with an API double-check
// after acquiring it).
use crate::client::{ApiClient, ApiError};
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::MissionParams;
use crate::fleet::state::{FleetState, load_system_intel};
use crate::missions::MissionError;
use crate::missions::navigation::{navigate_with_refuel_stops, try_refuel, wait_for_arrival};
use crate::missions::router::build_fuel_waypoints;
use crate::models::{Contract, NavStatus, Ship};
use crate::storage::MarketStore;
use crate::{o_error, o_info, o_summary};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Duration;

/// Wait between retries when no contract is available.
const NO_CONTRACT_SLEEP: Duration = Duration::from_secs(300);
/// Wait after a failed buy before re-checking the market.
const BUY_RETRY_SLEEP: Duration = Duration::from_secs(120);
/// Wait after an API error before the next cycle.
const ERROR_SLEEP: Duration = Duration::from_secs(60);

/// Upstream code for "ship already has an active contract".
const CODE_EXISTING_CONTRACT: u32 = 4214;

#[derive(Debug, Default)]
struct ContractBook {
    contract: Option<Contract>,
    contracts_completed: u32,
    total_revenue: i64,
    total_cost: i64,
    start_credits: i64,
}

/// Shared state across all contract-mission ships.
pub struct ContractState {
    negotiate_lock: tokio::sync::Mutex<()>,
    book: std::sync::Mutex<ContractBook>,
}

impl ContractState {
    pub fn new() -> Self {
        Self {
            negotiate_lock: tokio::sync::Mutex::new(()),
            book: std::sync::Mutex::new(ContractBook::default()),
        }
    }

    pub async fn lock_negotiation(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.negotiate_lock.lock().await
    }

    pub fn current(&self) -> Option<Contract> {
        self.lock_book().contract.clone()
    }

    pub fn set_contract(&self, contract: Option<Contract>) {
        self.lock_book().contract = contract;
    }

    pub fn add_revenue(&self, amount: i64) {
        self.lock_book().total_revenue += amount;
    }

    pub fn add_cost(&self, amount: i64) {
        self.lock_book().total_cost += amount;
    }

    pub fn record_completion(&self) {
        self.lock_book().contracts_completed += 1;
    }

    pub fn net_profit(&self) -> i64 {
        let book = self.lock_book();
        book.total_revenue - book.total_cost
    }

    pub fn completions(&self) -> u32 {
        self.lock_book().contracts_completed
    }

    /// Remember the balance at mission start; first writer wins.
    pub fn init_start_credits(&self, credits: i64) {
        let mut book = self.lock_book();
        if book.start_credits == 0 {
            book.start_credits = credits;
        }
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, ContractBook> {
        match self.book.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ContractState {
    fn default() -> Self {
        Self::new()
    }
}

/// An accepted, unfulfilled procurement contract, if any.
async fn find_active_contract(api: &ApiClient) -> Result<Option<Contract>, ApiError> {
    let contracts = api.list_contracts().await?;
    Ok(contracts
        .into_iter()
        .find(|c| c.accepted && !c.fulfilled && c.contract_type == "PROCUREMENT"))
}

/// Is buying the remaining goods cheaper than the contract pays?
fn evaluate_profitability(
    contract: &Contract,
    store: &MarketStore,
    system: &str,
) -> (bool, i64, String) {
    let mut total_cost: i64 = 0;
    let mut details: Vec<String> = Vec::new();

    for delivery in &contract.terms.deliver {
        let remaining = delivery.units_remaining();
        if remaining <= 0 {
            continue;
        }
        let Some(best) = store.find_best_buy(&delivery.trade_symbol, Some(system)) else {
            return (false, 0, format!("no cached market sells {}", delivery.trade_symbol));
        };
        total_cost += best.purchase_price as i64 * remaining as i64;
        details.push(format!(
            "{}x {} @ {}/unit from {}",
            remaining, delivery.trade_symbol, best.purchase_price, best.waypoint_symbol
        ));
    }

    let total_payment = contract.total_payment();
    let profit = total_payment - total_cost;
    let explanation = format!(
        "payment {} - cost {} = profit {} | {}",
        total_payment,
        total_cost,
        profit,
        details.join(", ")
    );
    (profit > 0, profit, explanation)
}

/// Return the active contract, negotiating a new one at the faction HQ if
/// needed. Only one ship negotiates at a time.
async fn ensure_contract(
    api: &ApiClient,
    ship_symbol: &str,
    state: &FleetState,
    system: &str,
    hq: &str,
    coords: &HashMap<String, (i32, i32)>,
    fuel_waypoints: &HashSet<String>,
) -> Result<Option<Contract>, ApiError> {
    let shared = &state.contract_state;

    // Fast path: the shared handle, re-fetched so progress is current
    if let Some(contract) = shared.current() {
        if !contract.fulfilled {
            if let Ok(fresh) = api.get_contract(&contract.id).await {
                if !fresh.fulfilled {
                    shared.set_contract(Some(fresh.clone()));
                    return Ok(Some(fresh));
                }
            }
        }
    }

    if let Some(active) = find_active_contract(api).await? {
        shared.set_contract(Some(active.clone()));
        return Ok(Some(active));
    }

    let _guard = shared.lock_negotiation().await;
    // Another ship may have negotiated while we waited
    if let Some(contract) = shared.current() {
        if !contract.fulfilled {
            return Ok(Some(contract));
        }
    }
    if let Some(active) = find_active_contract(api).await? {
        shared.set_contract(Some(active.clone()));
        return Ok(Some(active));
    }

    let mut ship = wait_for_arrival(api, ship_symbol).await?;
    if ship.nav.waypoint_symbol != hq {
        o_info!("📋 [{}] → {} for contract negotiation", ship_symbol, hq);
        ship = navigate_with_refuel_stops(api, ship, hq, coords, fuel_waypoints).await?;
    }
    if ship.nav.status != NavStatus::Docked {
        api.dock(ship_symbol).await?;
    }

    let offer = match api.negotiate_contract(ship_symbol).await {
        Ok(contract) => contract,
        Err(e) if e.code == CODE_EXISTING_CONTRACT => {
            o_info!("📋 [{}] Already have an active contract - re-checking", ship_symbol);
            let active = find_active_contract(api).await?;
            shared.set_contract(active.clone());
            return Ok(active);
        }
        Err(e) => {
            o_error!("❌ [{}] Negotiate failed: {} (code {})", ship_symbol, e, e.code);
            return Ok(None);
        }
    };

    let (profitable, profit, explanation) =
        evaluate_profitability(&offer, &state.market_store, system);
    o_info!("📋 [{}] Offer: {}", ship_symbol, explanation);
    if !profitable {
        // Can't negotiate another while this offer exists; wait it out
        o_info!("📋 [{}] Unprofitable - leaving the offer unaccepted", ship_symbol);
        return Ok(None);
    }

    let accepted = match api.accept_contract(&offer.id).await {
        Ok(data) => data.contract,
        Err(e) => {
            o_error!("❌ [{}] Accept failed: {} (code {})", ship_symbol, e, e.code);
            return Ok(None);
        }
    };
    let advance = accepted.terms.payment.on_accepted;
    shared.set_contract(Some(accepted.clone()));
    shared.add_revenue(advance);
    o_summary!(
        "📋 [{}] ACCEPTED {} | +{} advance | est. profit {}",
        ship_symbol, accepted.id, advance, profit
    );
    for delivery in &accepted.terms.deliver {
        o_info!(
            "  [{}] {} {} → {}",
            ship_symbol, delivery.units_required, delivery.trade_symbol,
            delivery.destination_symbol
        );
    }
    Ok(Some(accepted))
}

/// Buy goods at the current market, refreshing the cache while docked.
/// Returns (ship, units_bought, total_cost).
async fn buy_goods(
    api: &ApiClient,
    state: &FleetState,
    mut ship: Ship,
    trade_symbol: &str,
    units: i32,
) -> Result<(Ship, i32, i64), ApiError> {
    if ship.nav.status != NavStatus::Docked {
        api.dock(&ship.symbol).await?;
    }

    let mut trade_volume = 60;
    if let Ok(market) = api.get_market(&ship.nav.system_symbol, &ship.nav.waypoint_symbol).await {
        if let Some(goods) = market.trade_goods {
            state
                .market_store
                .update_market(&ship.nav.waypoint_symbol, &goods, Some(&ship.nav.system_symbol));
            if let Some(good) = goods.iter().find(|g| g.symbol == trade_symbol) {
                trade_volume = good.trade_volume;
            }
        }
    }

    ship = api.get_ship(&ship.symbol).await?;
    let mut total_bought = 0;
    let mut total_cost: i64 = 0;

    while total_bought < units {
        let batch = (units - total_bought).min(ship.free_cargo()).min(trade_volume);
        if batch <= 0 {
            break;
        }
        match api.purchase_cargo(&ship.symbol, trade_symbol, batch).await {
            Ok(trade) => {
                total_bought += trade.transaction.units;
                total_cost += trade.transaction.total_price;
                o_info!(
                    "  💳 [{}] Bought {} {} for {} cr ({}/{})",
                    ship.symbol, trade.transaction.units, trade_symbol,
                    trade.transaction.total_price, total_bought, units
                );
                if let Some(ops) = &state.ops_store {
                    ops.record_trade(
                        &ship.symbol,
                        "BUY",
                        trade_symbol,
                        trade.transaction.units,
                        trade.transaction.price_per_unit,
                        trade.transaction.total_price,
                        &ship.nav.waypoint_symbol,
                        Some(trade.agent.credits),
                        "contract",
                    );
                }
                ship = api.get_ship(&ship.symbol).await?;
            }
            Err(e) => {
                o_error!("❌ [{}] Buy failed: {} (code {})", ship.symbol, e, e.code);
                break;
            }
        }
    }
    Ok((ship, total_bought, total_cost))
}

/// Deliver contract goods from cargo, clamped to what the contract still
/// needs. Returns (ship, units_delivered).
async fn deliver_cargo(
    api: &ApiClient,
    mut ship: Ship,
    contract: &Contract,
    trade_symbol: &str,
) -> Result<(Ship, i32), ApiError> {
    if ship.nav.status != NavStatus::Docked {
        api.dock(&ship.symbol).await?;
    }

    let mut to_deliver = ship.units_in_cargo(trade_symbol);
    if to_deliver == 0 {
        return Ok((ship, 0));
    }
    if let Some(delivery) = contract
        .terms
        .deliver
        .iter()
        .find(|d| d.trade_symbol == trade_symbol)
    {
        to_deliver = to_deliver.min(delivery.units_remaining());
    }
    if to_deliver <= 0 {
        return Ok((ship, 0));
    }

    match api
        .deliver_contract(&contract.id, &ship.symbol, trade_symbol, to_deliver)
        .await
    {
        Ok(_) => {
            o_info!("📦 [{}] Delivered {} {}", ship.symbol, to_deliver, trade_symbol);
            ship = api.get_ship(&ship.symbol).await?;
            Ok((ship, to_deliver))
        }
        Err(e) => {
            o_error!("❌ [{}] Deliver failed: {} (code {})", ship.symbol, e, e.code);
            ship = api.get_ship(&ship.symbol).await?;
            Ok((ship, 0))
        }
    }
}

/// CONTRACT mission entry point.
pub async fn contract_mission(
    api: Arc<ApiClient>,
    ship_symbol: String,
    state: Arc<FleetState>,
    _params: MissionParams,
) -> Result<(), MissionError> {
    let ship = wait_for_arrival(&api, &ship_symbol).await?;
    let system = ship.nav.system_symbol.clone();
    let system_state = load_system_intel(&api, &system, &state).await?;
    let coords = system_state.coords.clone();
    let fuel_waypoints = build_fuel_waypoints(&system_state.waypoints);

    let agent_info = api.get_agent().await?;
    let hq = agent_info.headquarters.clone();
    state.contract_state.init_start_credits(agent_info.credits);
    if state.contract_state.current().is_none() {
        if let Some(active) = find_active_contract(&api).await? {
            state.contract_state.set_contract(Some(active));
        }
    }

    o_summary!("📋 [{}] CONTRACT mission started in {} (HQ: {})", ship_symbol, system, hq);

    while !state.shutdown.is_set() {
        let step = contract_cycle(&api, &ship_symbol, &state, &system, &hq, &coords, &fuel_waypoints).await;
        if let Err(e) = step {
            // Per-cycle errors are absorbed; the loop is self-healing
            o_error!("❌ [{}] Contract cycle error: {} - retrying in 60s", ship_symbol, e);
            state.shutdown.sleep(ERROR_SLEEP).await;
        }
    }

    o_summary!(
        "📋 [{}] CONTRACT mission stopped - {} completed, net profit {}",
        ship_symbol,
        state.contract_state.completions(),
        state.contract_state.net_profit()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn contract_cycle(
    api: &ApiClient,
    ship_symbol: &str,
    state: &FleetState,
    system: &str,
    hq: &str,
    coords: &HashMap<String, (i32, i32)>,
    fuel_waypoints: &HashSet<String>,
) -> Result<(), ApiError> {
    let Some(contract) =
        ensure_contract(api, ship_symbol, state, system, hq, coords, fuel_waypoints).await?
    else {
        o_info!("📋 [{}] No contract available - retrying in 5 min", ship_symbol);
        state.emit(FleetEvent::with_data(
            EventType::TradeDry,
            ship_symbol,
            json!({ "reason": "no_contract" }),
        ));
        state.shutdown.sleep(NO_CONTRACT_SLEEP).await;
        return Ok(());
    };

    let contract = api.get_contract(&contract.id).await?;
    let remaining = contract.remaining_deliveries();

    if remaining.is_empty() {
        if !contract.fulfilled {
            match api.fulfill_contract(&contract.id).await {
                Ok(data) => {
                    let payment = data.contract.terms.payment.on_fulfilled;
                    state.contract_state.add_revenue(payment);
                    state.contract_state.record_completion();
                    o_summary!(
                        "🎉 [{}] CONTRACT FULFILLED +{} cr | net profit {} | balance {}",
                        ship_symbol, payment,
                        state.contract_state.net_profit(), data.agent.credits
                    );
                    state.emit(FleetEvent::with_data(
                        EventType::ContractFulfilled,
                        ship_symbol,
                        json!({
                            "contract_id": contract.id,
                            "payment": payment,
                            "credits": data.agent.credits,
                        }),
                    ));
                }
                Err(e) => o_error!("❌ [{}] Fulfill failed: {}", ship_symbol, e),
            }
        }
        state.contract_state.set_contract(None);
        return Ok(());
    }

    // First unfinished delivery line
    let trade_symbol = remaining[0].trade_symbol.clone();
    let deliver_wp = remaining[0].destination_symbol.clone();
    let units_needed = remaining[0].units_remaining();

    let mut ship = wait_for_arrival(api, ship_symbol).await?;

    // Deliver what we already carry before buying more
    let carried = ship.units_in_cargo(&trade_symbol);
    if carried > 0 {
        o_info!(
            "📦 [{}] Have {} {} in cargo - delivering first",
            ship_symbol, carried, trade_symbol
        );
        if ship.nav.waypoint_symbol != deliver_wp {
            ship = navigate_with_refuel_stops(api, ship, &deliver_wp, coords, fuel_waypoints).await?;
        }
        let contract = api.get_contract(&contract.id).await?;
        let (ship, _delivered) = deliver_cargo(api, ship, &contract, &trade_symbol).await?;
        try_refuel(api, ship).await?;
        return Ok(());
    }

    // Buy at the cheapest cached source
    let Some(best_buy) = state.market_store.find_best_buy(&trade_symbol, Some(system)) else {
        o_error!(
            "❌ [{}] No cached market sells {} - waiting for probe data",
            ship_symbol, trade_symbol
        );
        state.shutdown.sleep(NO_CONTRACT_SLEEP).await;
        return Ok(());
    };
    let buy_wp = best_buy.waypoint_symbol.clone();
    let to_buy = units_needed.min(ship.free_cargo());
    o_info!(
        "📋 [{}] Buy {} {} at {} ({} still needed)",
        ship_symbol, to_buy, trade_symbol, buy_wp, units_needed
    );

    if ship.nav.waypoint_symbol != buy_wp {
        ship = navigate_with_refuel_stops(api, ship, &buy_wp, coords, fuel_waypoints).await?;
    }
    let (ship, bought, cost) = buy_goods(api, state, ship, &trade_symbol, to_buy).await?;
    state.contract_state.add_cost(cost);
    if bought == 0 {
        o_info!("⚠️ [{}] Couldn't buy any {} - retrying in 2 min", ship_symbol, trade_symbol);
        state.shutdown.sleep(BUY_RETRY_SLEEP).await;
        return Ok(());
    }

    let ship = try_refuel(api, ship).await?;

    // Deliver
    o_info!("📦 [{}] → {} to deliver {} {}", ship_symbol, deliver_wp, bought, trade_symbol);
    let ship = navigate_with_refuel_stops(api, ship, &deliver_wp, coords, fuel_waypoints).await?;
    let contract = api.get_contract(&contract.id).await?;
    let (ship, delivered) = deliver_cargo(api, ship, &contract, &trade_symbol).await?;
    if delivered > 0 {
        state.emit(FleetEvent::with_data(
            EventType::ContractDelivery,
            ship_symbol,
            json!({
                "contract_id": contract.id,
                "trade_symbol": trade_symbol,
                "units": delivered,
            }),
        ));
    }
    let _ = try_refuel(api, ship).await?;

    // Progress log with fresh numbers
    let contract = api.get_contract(&contract.id).await?;
    state.contract_state.set_contract(Some(contract.clone()));
    for delivery in &contract.terms.deliver {
        if delivery.trade_symbol == trade_symbol {
            o_info!(
                "📋 [{}] Progress: {}/{} {}",
                ship_symbol, delivery.units_fulfilled, delivery.units_required, trade_symbol
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractDelivery, ContractPayment, ContractTerms};
    use chrono::Utc;

    fn contract(deliveries: Vec<ContractDelivery>, on_accepted: i64, on_fulfilled: i64) -> Contract {
        Contract {
            id: "clx1".to_string(),
            faction_symbol: "COSMIC".to_string(),
            contract_type: "PROCUREMENT".to_string(),
            terms: ContractTerms {
                deadline: Utc::now(),
                payment: ContractPayment { on_accepted, on_fulfilled },
                deliver: deliveries,
            },
            accepted: true,
            fulfilled: false,
            expiration: Utc::now(),
            deadline_to_accept: None,
        }
    }

    fn delivery(symbol: &str, required: i32, fulfilled: i32) -> ContractDelivery {
        ContractDelivery {
            trade_symbol: symbol.to_string(),
            destination_symbol: "X1-AB12-A1".to_string(),
            units_required: required,
            units_fulfilled: fulfilled,
        }
    }

    fn store_with_price(symbol: &str, price: i32) -> MarketStore {
        use crate::models::MarketTradeGood;
        let store = MarketStore::in_memory();
        store.update_market(
            "X1-AB12-H58",
            &[MarketTradeGood {
                symbol: symbol.to_string(),
                trade_type: "EXPORT".to_string(),
                trade_volume: 60,
                supply: "HIGH".to_string(),
                activity: None,
                purchase_price: price,
                sell_price: price / 2,
            }],
            None,
        );
        store
    }

    #[test]
    fn profitable_when_payment_beats_procurement_cost() {
        let store = store_with_price("ALUMINUM", 100);
        let c = contract(vec![delivery("ALUMINUM", 50, 10)], 4_000, 2_000);
        // 40 remaining * 100 = 4000 cost vs 6000 payment
        let (profitable, profit, _) = evaluate_profitability(&c, &store, "X1-AB12");
        assert!(profitable);
        assert_eq!(profit, 2_000);
    }

    #[test]
    fn unprofitable_when_goods_cost_too_much() {
        let store = store_with_price("ALUMINUM", 200);
        let c = contract(vec![delivery("ALUMINUM", 50, 0)], 4_000, 2_000);
        let (profitable, profit, _) = evaluate_profitability(&c, &store, "X1-AB12");
        assert!(!profitable);
        assert_eq!(profit, -4_000);
    }

    #[test]
    fn missing_market_means_unprofitable() {
        let store = MarketStore::in_memory();
        let c = contract(vec![delivery("ALUMINUM", 50, 0)], 100_000, 100_000);
        let (profitable, _, explanation) = evaluate_profitability(&c, &store, "X1-AB12");
        assert!(!profitable);
        assert!(explanation.contains("no cached market"));
    }

    #[test]
    fn fulfilled_lines_cost_nothing() {
        let store = store_with_price("ALUMINUM", 1_000_000);
        let c = contract(vec![delivery("ALUMINUM", 50, 50)], 1_000, 0);
        let (profitable, profit, _) = evaluate_profitability(&c, &store, "X1-AB12");
        assert!(profitable);
        assert_eq!(profit, 1_000);
    }

    #[test]
    fn contract_book_totals() {
        let state = ContractState::new();
        state.init_start_credits(100_000);
        state.init_start_credits(999); // second writer loses
        state.add_revenue(5_000);
        state.add_cost(1_200);
        state.record_completion();
        assert_eq!(state.net_profit(), 3_800);
        assert_eq!(state.completions(), 1);
    }
}
