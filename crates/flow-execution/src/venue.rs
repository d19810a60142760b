//! Execution Client Adapter (spec §4.13): a narrow trait over one venue.
//! `flow-broker-paper` is the only production implementation in this repo;
//! a live venue adapter is a second crate behind the same trait.

use anyhow::Result;
use flow_schemas::TradeSide;

use crate::types::{AccountBalance, HealthStatus, OrderAck, Position, TriggerKind};

pub trait Venue: Send + Sync {
    fn place_market_order(&self, symbol: &str, side: TradeSide, size: f64) -> Result<OrderAck>;

    fn place_trigger_order(&self, symbol: &str, side: TradeSide, size: f64, kind: TriggerKind, trigger_price: f64) -> Result<OrderAck>;

    fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Entry plus both protective legs in one call — used on position open.
    fn place_order_with_sl_tp(&self, symbol: &str, side: TradeSide, size: f64, sl_price: f64, tp_price: f64) -> Result<(OrderAck, OrderAck, OrderAck)>;

    fn update_stop_loss(&self, symbol: &str, old_order_id: &str, side: TradeSide, size: f64, new_sl_price: f64) -> Result<OrderAck>;

    fn update_take_profit(&self, symbol: &str, old_order_id: &str, side: TradeSide, size: f64, new_tp_price: f64) -> Result<OrderAck>;

    fn close_position(&self, symbol: &str) -> Result<OrderAck>;

    fn close_all_positions(&self) -> Result<Vec<OrderAck>>;

    fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    fn get_positions(&self) -> Result<Vec<Position>>;

    fn get_account_balance(&self) -> Result<AccountBalance>;

    fn health_check(&self) -> Result<HealthStatus>;
}
