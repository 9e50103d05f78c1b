use crate::models::{LedgerMeta, Position};

/// In-memory set of open positions plus the aggregate profit/sales counters
///
/// Positions are keyed by order id and kept in insertion order, which is also
/// the order sells are evaluated in. No I/O happens here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionLedger {
    positions: Vec<Position>,
    meta: LedgerMeta,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a ledger from persisted parts
    pub fn with_parts(positions: Vec<Position>, meta: LedgerMeta) -> Self {
        let mut ledger = Self {
            positions: Vec::with_capacity(positions.len()),
            meta,
        };
        for position in positions {
            ledger.open_position(position);
        }
        ledger
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn meta(&self) -> &LedgerMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Insert a position; an existing entry with the same id is replaced in place
    pub fn open_position(&mut self, position: Position) {
        match self.positions.iter().position(|p| p.id == position.id) {
            Some(index) => {
                tracing::warn!(
                    "Position {} already in ledger, replacing (old price {:.4}, new price {:.4})",
                    position.id,
                    self.positions[index].buy_price,
                    position.buy_price
                );
                self.positions[index] = position;
            }
            None => self.positions.push(position),
        }
    }

    /// Remove a position by id, returning it
    pub fn close_position(&mut self, id: &str) -> Option<Position> {
        match self.positions.iter().position(|p| p.id == id) {
            Some(index) => Some(self.positions.remove(index)),
            None => {
                tracing::warn!("Cannot close position {}: not in ledger", id);
                None
            }
        }
    }

    /// Minimum buy price across open positions
    pub fn lowest_buy_price(&self) -> Option<f64> {
        self.positions
            .iter()
            .map(|p| p.buy_price)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Price at or below which the next averaging-down buy fires
    pub fn next_buy_price(&self, drop_percent: f64) -> Option<f64> {
        self.lowest_buy_price()
            .map(|lowest| lowest * (1.0 - drop_percent / 100.0))
    }

    pub fn record_sale(&mut self, profit: f64) {
        self.meta.total_profit += profit;
        self.meta.total_sales += 1;
    }

    pub fn total_open_quantity(&self) -> f64 {
        self.positions.iter().map(|p| p.amount).sum()
    }

    /// Σ(amount·price) / Σamount, `None` while nothing is held
    pub fn weighted_average_buy_price(&self) -> Option<f64> {
        let quantity = self.total_open_quantity();
        if quantity <= 0.0 {
            return None;
        }

        let cost: f64 = self.positions.iter().map(|p| p.amount * p.buy_price).sum();
        Some(cost / quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, PositionStatus};

    fn position(id: &str, price: f64, amount: f64) -> Position {
        Position {
            id: id.to_string(),
            symbol: "BTC/USDT".to_string(),
            buy_price: price,
            side: OrderSide::Buy,
            status: PositionStatus::Open,
            amount,
            remaining: amount,
            datetime: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_open_and_close_position() {
        let mut ledger = PositionLedger::new();
        ledger.open_position(position("a", 100.0, 1.0));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("a").unwrap().buy_price, 100.0);

        let closed = ledger.close_position("a").unwrap();
        assert_eq!(closed.id, "a");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_close_missing_position_is_noop() {
        let mut ledger = PositionLedger::new();
        ledger.open_position(position("a", 100.0, 1.0));

        assert!(ledger.close_position("zzz").is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_same_price_positions_are_both_kept() {
        let mut ledger = PositionLedger::new();
        ledger.open_position(position("first", 100.0, 1.0));
        ledger.open_position(position("second", 100.0, 2.0));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.total_open_quantity(), 3.0);
    }

    #[test]
    fn test_same_id_replaces_in_place() {
        let mut ledger = PositionLedger::new();
        ledger.open_position(position("a", 100.0, 1.0));
        ledger.open_position(position("b", 95.0, 1.0));
        ledger.open_position(position("a", 90.0, 4.0));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.positions()[0].id, "a");
        assert_eq!(ledger.positions()[0].buy_price, 90.0);
    }

    #[test]
    fn test_lowest_buy_price() {
        let mut ledger = PositionLedger::new();
        assert_eq!(ledger.lowest_buy_price(), None);
        assert_eq!(ledger.next_buy_price(5.0), None);

        ledger.open_position(position("a", 100.0, 1.0));
        ledger.open_position(position("b", 92.5, 1.0));
        ledger.open_position(position("c", 97.0, 1.0));

        assert_eq!(ledger.lowest_buy_price(), Some(92.5));
        let next = ledger.next_buy_price(2.0).unwrap();
        assert!((next - 90.65).abs() < 1e-9);
    }

    #[test]
    fn test_record_sale() {
        let mut ledger = PositionLedger::new();
        ledger.record_sale(125.0);
        ledger.record_sale(-20.0);

        assert_eq!(ledger.meta().total_profit, 105.0);
        assert_eq!(ledger.meta().total_sales, 2);
    }

    #[test]
    fn test_weighted_average_buy_price() {
        let mut ledger = PositionLedger::new();
        assert_eq!(ledger.weighted_average_buy_price(), None);

        ledger.open_position(position("a", 100.0, 1.0));
        ledger.open_position(position("b", 80.0, 3.0));

        // (100 + 240) / 4
        assert_eq!(ledger.weighted_average_buy_price(), Some(85.0));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let ledger = PositionLedger::with_parts(
            vec![position("z", 10.0, 1.0), position("a", 30.0, 1.0), position("m", 20.0, 1.0)],
            LedgerMeta::default(),
        );

        let ids: Vec<&str> = ledger.positions().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }
}
