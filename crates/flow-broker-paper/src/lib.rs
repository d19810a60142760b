//! Deterministic in-memory dry-run implementation of [`flow_execution::Venue`]
//! (spec §4.13): every mutating call returns a simulated ack with the
//! `dry_run_` order-id prefix and never reaches a real venue. Internal order
//! and position bookkeeping exists only so callers (the trailing service,
//! the executor loop) can observe consistent state across calls in tests.

use std::collections::BTreeMap;

use anyhow::Result;
use flow_execution::{AccountBalance, HealthStatus, OrderAck, Position, TriggerKind, Venue};
use flow_schemas::TradeSide;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct OpenOrder {
    symbol: String,
    side: TradeSide,
    size: f64,
    trigger_price: Option<f64>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    orders: BTreeMap<String, OpenOrder>,
    positions: BTreeMap<String, Position>,
    leverage: BTreeMap<String, u32>,
}

pub struct PaperBroker {
    initial_equity: f64,
    state: Mutex<State>,
}

impl PaperBroker {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            initial_equity,
            state: Mutex::new(State::default()),
        }
    }

    fn next_order_id(state: &mut State) -> String {
        state.next_id += 1;
        format!("dry_run_{}", state.next_id)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(10_000.0)
    }
}

impl Venue for PaperBroker {
    fn place_market_order(&self, symbol: &str, side: TradeSide, size: f64) -> Result<OrderAck> {
        let mut state = self.state.lock();
        let order_id = Self::next_order_id(&mut state);
        state.orders.insert(
            order_id.clone(),
            OpenOrder {
                symbol: symbol.to_string(),
                side,
                size,
                trigger_price: None,
            },
        );
        Ok(OrderAck {
            order_id,
            symbol: symbol.to_string(),
        })
    }

    fn place_trigger_order(&self, symbol: &str, side: TradeSide, size: f64, _kind: TriggerKind, trigger_price: f64) -> Result<OrderAck> {
        let mut state = self.state.lock();
        let order_id = Self::next_order_id(&mut state);
        state.orders.insert(
            order_id.clone(),
            OpenOrder {
                symbol: symbol.to_string(),
                side,
                size,
                trigger_price: Some(trigger_price),
            },
        );
        Ok(OrderAck {
            order_id,
            symbol: symbol.to_string(),
        })
    }

    fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        self.state.lock().orders.remove(order_id);
        Ok(())
    }

    fn place_order_with_sl_tp(&self, symbol: &str, side: TradeSide, size: f64, sl_price: f64, tp_price: f64) -> Result<(OrderAck, OrderAck, OrderAck)> {
        let entry = self.place_market_order(symbol, side, size)?;
        let sl = self.place_trigger_order(symbol, side, size, TriggerKind::StopLoss, sl_price)?;
        let tp = self.place_trigger_order(symbol, side, size, TriggerKind::TakeProfit, tp_price)?;

        let mut state = self.state.lock();
        state.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                side,
                size,
                entry_price: 0.0,
            },
        );
        Ok((entry, sl, tp))
    }

    fn update_stop_loss(&self, symbol: &str, old_order_id: &str, side: TradeSide, size: f64, new_sl_price: f64) -> Result<OrderAck> {
        let ack = self.place_trigger_order(symbol, side, size, TriggerKind::StopLoss, new_sl_price)?;
        self.cancel_order(symbol, old_order_id)?;
        Ok(ack)
    }

    fn update_take_profit(&self, symbol: &str, old_order_id: &str, side: TradeSide, size: f64, new_tp_price: f64) -> Result<OrderAck> {
        let ack = self.place_trigger_order(symbol, side, size, TriggerKind::TakeProfit, new_tp_price)?;
        self.cancel_order(symbol, old_order_id)?;
        Ok(ack)
    }

    fn close_position(&self, symbol: &str) -> Result<OrderAck> {
        let mut state = self.state.lock();
        let order_id = Self::next_order_id(&mut state);
        state.positions.remove(symbol);
        Ok(OrderAck {
            order_id,
            symbol: symbol.to_string(),
        })
    }

    fn close_all_positions(&self) -> Result<Vec<OrderAck>> {
        let symbols: Vec<String> = self.state.lock().positions.keys().cloned().collect();
        symbols.iter().map(|s| self.close_position(s)).collect()
    }

    fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.state.lock().leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.state.lock().positions.values().cloned().collect())
    }

    fn get_account_balance(&self) -> Result<AccountBalance> {
        Ok(AccountBalance {
            equity: self.initial_equity,
            available_margin: self.initial_equity,
        })
    }

    fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mutating_call_returns_a_dry_run_prefixed_order_id() {
        let broker = PaperBroker::default();
        let ack = broker.place_market_order("BTC", TradeSide::Long, 1.0).unwrap();
        assert!(ack.is_dry_run());
    }

    #[test]
    fn cancel_removes_the_order_from_the_book() {
        let broker = PaperBroker::default();
        let ack = broker.place_trigger_order("BTC", TradeSide::Long, 1.0, TriggerKind::StopLoss, 95.0).unwrap();
        broker.cancel_order("BTC", &ack.order_id).unwrap();
        assert!(broker.state.lock().orders.is_empty());
    }

    #[test]
    fn place_order_with_sl_tp_opens_a_tracked_position() {
        let broker = PaperBroker::default();
        let (entry, sl, tp) = broker.place_order_with_sl_tp("BTC", TradeSide::Long, 1.0, 95.0, 110.0).unwrap();
        assert_ne!(entry.order_id, sl.order_id);
        assert_ne!(sl.order_id, tp.order_id);
        assert_eq!(broker.get_positions().unwrap().len(), 1);
    }

    #[test]
    fn update_stop_loss_replaces_new_order_before_cancelling_old() {
        let broker = PaperBroker::default();
        let (_, sl, _) = broker.place_order_with_sl_tp("BTC", TradeSide::Long, 1.0, 95.0, 110.0).unwrap();
        let new_sl = broker.update_stop_loss("BTC", &sl.order_id, TradeSide::Long, 1.0, 100.0).unwrap();
        assert_ne!(new_sl.order_id, sl.order_id);
        assert!(!broker.state.lock().orders.contains_key(&sl.order_id));
        assert!(broker.state.lock().orders.contains_key(&new_sl.order_id));
    }

    #[test]
    fn close_all_positions_clears_the_book() {
        let broker = PaperBroker::default();
        broker.place_order_with_sl_tp("BTC", TradeSide::Long, 1.0, 95.0, 110.0).unwrap();
        broker.place_order_with_sl_tp("ETH", TradeSide::Short, 2.0, 110.0, 90.0).unwrap();
        let acks = broker.close_all_positions().unwrap();
        assert_eq!(acks.len(), 2);
        assert!(broker.get_positions().unwrap().is_empty());
    }

    #[test]
    fn health_check_is_always_healthy_in_dry_run() {
        let broker = PaperBroker::default();
        assert_eq!(broker.health_check().unwrap(), HealthStatus::Healthy);
    }
}
