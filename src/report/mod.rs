//! Read-only views over the ledger for reporting
//!
//! Every figure comes from [`position_metrics`], the same derivation the
//! engine sells on, so a report can never disagree with a trading decision.

pub mod server;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::execution::{position_metrics, PositionLedger};
use crate::models::Position;

pub const REPORT_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M";
pub const INVALID_DATE: &str = "Invalid Date";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentPriceView {
    pub pair: String,
    pub current_price: f64,
}

/// One open order with its sell target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub order_id: String,
    pub amount: f64,
    pub bought_at: f64,
    pub sell_at: f64,
    pub days_open: i64,
    pub distance: f64,
    pub datetime: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SellStatus {
    #[serde(rename = "Selling")]
    Selling,
    #[serde(rename = "Not selling")]
    NotSelling,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellEvaluation {
    pub order_id: String,
    pub sell_threshold: f64,
    pub current_price: f64,
    pub status: SellStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub pair: String,
    pub current_price: f64,
    pub open_orders: usize,
    pub total_quantity: f64,
    pub average_buy_price: Option<f64>,
    pub next_buy_price: Option<f64>,
    pub total_profit: f64,
    pub total_sales: u64,
}

pub fn current_price_view(pair: &str, current_price: f64) -> CurrentPriceView {
    CurrentPriceView {
        pair: pair.to_string(),
        current_price,
    }
}

/// `dd/mm/YYYY HH:MM`, or `Invalid Date` when the stored value does not parse
pub fn format_order_datetime(raw: &str) -> String {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ"));

    match parsed {
        Ok(dt) => dt.format(REPORT_DATETIME_FORMAT).to_string(),
        Err(_) => INVALID_DATE.to_string(),
    }
}

/// Open orders in ledger order; orders without a datetime are left out
pub fn existing_orders(
    ledger: &PositionLedger,
    current_price: f64,
    rise_percent: f64,
    now: DateTime<Utc>,
) -> Vec<OrderView> {
    ledger
        .positions()
        .iter()
        .filter_map(|position| {
            let Some(raw) = position.datetime.as_deref() else {
                tracing::warn!("Order {} has no datetime, left out of report", position.id);
                return None;
            };
            Some(order_view(position, raw, current_price, rise_percent, now))
        })
        .collect()
}

fn order_view(
    position: &Position,
    raw_datetime: &str,
    current_price: f64,
    rise_percent: f64,
    now: DateTime<Utc>,
) -> OrderView {
    let metrics = position_metrics(position, current_price, rise_percent, now);

    OrderView {
        order_id: position.id.clone(),
        amount: position.amount,
        bought_at: position.buy_price,
        sell_at: metrics.sell_threshold,
        days_open: metrics.days_open,
        distance: metrics.distance_to_sell,
        datetime: format_order_datetime(raw_datetime),
    }
}

pub fn sell_threshold_eval(
    ledger: &PositionLedger,
    current_price: f64,
    rise_percent: f64,
    now: DateTime<Utc>,
) -> Vec<SellEvaluation> {
    ledger
        .positions()
        .iter()
        .map(|position| {
            let metrics = position_metrics(position, current_price, rise_percent, now);
            SellEvaluation {
                order_id: position.id.clone(),
                sell_threshold: metrics.sell_threshold,
                current_price,
                status: if metrics.should_sell(current_price) {
                    SellStatus::Selling
                } else {
                    SellStatus::NotSelling
                },
            }
        })
        .collect()
}

pub fn ledger_summary(
    pair: &str,
    ledger: &PositionLedger,
    current_price: f64,
    drop_percent: f64,
) -> LedgerSummary {
    LedgerSummary {
        pair: pair.to_string(),
        current_price,
        open_orders: ledger.len(),
        total_quantity: ledger.total_open_quantity(),
        average_buy_price: ledger.weighted_average_buy_price(),
        next_buy_price: ledger.next_buy_price(drop_percent),
        total_profit: ledger.meta().total_profit,
        total_sales: ledger.meta().total_sales,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerMeta;
    use chrono::TimeZone;

    fn position(id: &str, price: f64, amount: f64, datetime: Option<&str>) -> Position {
        Position {
            id: id.to_string(),
            symbol: "BTC/USDT".to_string(),
            buy_price: price,
            side: Default::default(),
            status: Default::default(),
            amount,
            remaining: amount,
            datetime: datetime.map(str::to_string),
            timestamp: None,
        }
    }

    fn ledger() -> PositionLedger {
        PositionLedger::with_parts(
            vec![
                position("a", 100.0, 2.0, Some("2024-05-01T08:30:00.000Z")),
                position("b", 80.0, 1.0, Some("yesterday-ish")),
                position("c", 90.0, 1.0, None),
            ],
            LedgerMeta {
                total_profit: 12.5,
                total_sales: 3,
            },
        )
    }

    #[test]
    fn test_format_order_datetime() {
        assert_eq!(format_order_datetime("2024-05-01T08:30:00.000Z"), "01/05/2024 08:30");
        assert_eq!(format_order_datetime("2024-05-01T08:30:59+00:00"), "01/05/2024 08:30");
        assert_eq!(format_order_datetime("05/01/2024"), "Invalid Date");
    }

    #[test]
    fn test_existing_orders() {
        let now = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        let views = existing_orders(&ledger(), 95.0, 10.0, now);

        assert_eq!(views.len(), 2);
        assert_eq!(
            views[0],
            OrderView {
                order_id: "a".to_string(),
                amount: 2.0,
                bought_at: 100.0,
                sell_at: views[0].sell_at,
                days_open: 3,
                distance: views[0].distance,
                datetime: "01/05/2024 08:30".to_string(),
            }
        );
        assert!((views[0].sell_at - 110.0).abs() < 1e-9);
        assert!((views[0].distance - 15.0).abs() < 1e-9);
        assert_eq!(views[1].datetime, INVALID_DATE);
        assert_eq!(views[1].days_open, 0);
    }

    #[test]
    fn test_sell_threshold_eval() {
        let evals = sell_threshold_eval(&ledger(), 89.0, 10.0, Utc::now());

        let statuses: Vec<(&str, SellStatus)> = evals
            .iter()
            .map(|e| (e.order_id.as_str(), e.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a", SellStatus::NotSelling),
                ("b", SellStatus::Selling),
                ("c", SellStatus::NotSelling),
            ]
        );

        let json = serde_json::to_value(&evals[1]).unwrap();
        assert_eq!(json["status"], "Selling");
        assert_eq!(json["current_price"], 89.0);
    }

    #[test]
    fn test_summary() {
        let summary = ledger_summary("BTC/USDT", &ledger(), 95.0, 5.0);

        assert_eq!(summary.open_orders, 3);
        assert_eq!(summary.total_quantity, 4.0);
        assert_eq!(summary.average_buy_price, Some(92.5));
        assert_eq!(summary.next_buy_price, Some(76.0));
        assert_eq!(summary.total_profit, 12.5);
        assert_eq!(summary.total_sales, 3);
    }
}
