//! Trade lifecycle: OPEN → CLOSED, exactly once.
//!
//! `open` appends an OPEN record. `close` computes the realized R-multiple
//! and appends a CLOSED record, deduplicated by trade identity. `reconcile`
//! closes any still-open trade whose stop or target was touched by later
//! candles, checking the stop first.

use crate::journal::{JournalError, TradeJournal};
use chrono::{DateTime, TimeZone, Timelike, Utc};
use quorum_core::domain::{
    realized_r, Candle, ClosedTradeRecord, OpenTradeRecord, Outcome, Side, TradeKey, TradeStatus,
};
use quorum_core::orders::OrderLevels;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A trade about to be opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub meta: serde_json::Value,
}

impl NewTrade {
    pub fn from_levels(
        pair: &str,
        levels: &OrderLevels,
        size: f64,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            pair: pair.to_string(),
            side: levels.side,
            entry: levels.entry,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            size,
            meta,
        }
    }
}

/// Everything needed to close a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseRequest {
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub exit_price: f64,
    pub outcome: Outcome,
    pub opened_at: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub meta: serde_json::Value,
}

impl CloseRequest {
    /// Close an OPEN record at `exit_price`.
    pub fn for_open(
        open: &OpenTradeRecord,
        exit_price: f64,
        outcome: Outcome,
        exit_time: DateTime<Utc>,
    ) -> Self {
        Self {
            pair: open.pair.clone(),
            side: open.side,
            entry: open.entry,
            stop_loss: open.stop_loss,
            take_profit: open.take_profit,
            size: open.size,
            exit_price,
            outcome,
            opened_at: open.t,
            exit_time,
            meta: open.meta.clone(),
        }
    }

    pub fn key(&self) -> TradeKey {
        TradeKey::new(
            self.opened_at,
            &self.pair,
            self.side,
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.size,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseResult {
    Closed(ClosedTradeRecord),
    /// A CLOSED record with the same identity already exists.
    AlreadyClosed,
}

impl CloseResult {
    pub fn is_closed(&self) -> bool {
        matches!(self, CloseResult::Closed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    /// Open trades examined.
    pub checked: usize,
    pub closed: Vec<ClosedTradeRecord>,
    pub still_open: usize,
    /// Pairs with open trades but no candles supplied.
    pub missing_data: Vec<String>,
}

/// Which level, if any, a candle touched. The stop is checked first.
pub fn touched_level(
    side: Side,
    stop_loss: f64,
    take_profit: f64,
    candle: &Candle,
) -> Option<(Outcome, f64)> {
    match side {
        Side::Long => {
            if candle.l <= stop_loss {
                Some((Outcome::Sl, stop_loss))
            } else if candle.h >= take_profit {
                Some((Outcome::Tp, take_profit))
            } else {
                None
            }
        }
        Side::Short => {
            if candle.h >= stop_loss {
                Some((Outcome::Sl, stop_loss))
            } else if candle.l <= take_profit {
                Some((Outcome::Tp, take_profit))
            } else {
                None
            }
        }
    }
}

fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Paper-trade lifecycle over a [`TradeJournal`].
#[derive(Debug)]
pub struct TradeLifecycle {
    journal: TradeJournal,
}

impl TradeLifecycle {
    pub fn new(journal: TradeJournal) -> Self {
        Self { journal }
    }

    pub fn open_dir(dir: &Path) -> Result<Self, JournalError> {
        Ok(Self::new(TradeJournal::open(dir)?))
    }

    pub fn journal(&self) -> &TradeJournal {
        &self.journal
    }

    /// Append an OPEN record. The open time is stored at second precision.
    pub fn open(
        &mut self,
        trade: NewTrade,
        opened_at: DateTime<Utc>,
    ) -> Result<OpenTradeRecord, JournalError> {
        let record = OpenTradeRecord {
            t: truncate_to_seconds(opened_at),
            pair: trade.pair,
            side: trade.side,
            entry: trade.entry,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            size: trade.size,
            status: TradeStatus::Open,
            meta: trade.meta,
        };
        self.journal.append_open(&record)?;
        tracing::info!(
            pair = %record.pair,
            side = %record.side,
            entry = record.entry,
            stop_loss = record.stop_loss,
            take_profit = record.take_profit,
            "trade opened"
        );
        Ok(record)
    }

    /// Close a trade at most once.
    pub fn close(&mut self, request: CloseRequest) -> Result<CloseResult, JournalError> {
        let key = request.key();
        if self.journal.is_closed(&key) {
            tracing::debug!(pair = %request.pair, key = %key.fingerprint(), "already closed");
            return Ok(CloseResult::AlreadyClosed);
        }

        let pnl_r = realized_r(
            request.side,
            request.entry,
            request.stop_loss,
            request.exit_price,
        );
        let record = ClosedTradeRecord {
            pair: request.pair,
            side: request.side,
            entry: request.entry,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            size: request.size,
            open_time: truncate_to_seconds(request.opened_at),
            exit_time: request.exit_time,
            exit: request.exit_price,
            outcome: request.outcome,
            pnl_r,
            status: TradeStatus::Closed,
            meta: request.meta,
        };

        if !self.journal.append_closed(&record)? {
            return Ok(CloseResult::AlreadyClosed);
        }
        tracing::info!(
            pair = %record.pair,
            outcome = record.outcome.as_str(),
            exit = record.exit,
            pnl_r,
            "trade closed"
        );
        Ok(CloseResult::Closed(record))
    }

    /// Close open trades whose stop or target was touched after the open.
    pub fn reconcile(
        &mut self,
        candles_by_pair: &HashMap<String, Vec<Candle>>,
    ) -> Result<ReconcileSummary, JournalError> {
        let mut summary = ReconcileSummary::default();

        for open in self.journal.unclosed()? {
            summary.checked += 1;
            let Some(candles) = candles_by_pair.get(&open.pair) else {
                if !summary.missing_data.contains(&open.pair) {
                    summary.missing_data.push(open.pair.clone());
                }
                summary.still_open += 1;
                continue;
            };

            let opened = open.t.timestamp();
            let hit = candles
                .iter()
                .filter(|c| c.t >= opened)
                .find_map(|c| {
                    touched_level(open.side, open.stop_loss, open.take_profit, c)
                        .map(|(outcome, price)| (c.t, outcome, price))
                });

            let Some((t, outcome, price)) = hit else {
                summary.still_open += 1;
                continue;
            };
            let Some(exit_time) = Utc.timestamp_opt(t, 0).single() else {
                summary.still_open += 1;
                continue;
            };

            let request = CloseRequest::for_open(&open, price, outcome, exit_time);
            match self.close(request)? {
                CloseResult::Closed(record) => summary.closed.push(record),
                CloseResult::AlreadyClosed => {}
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    fn long_trade() -> NewTrade {
        NewTrade {
            pair: "BTCUSDT".into(),
            side: Side::Long,
            entry: 100.0,
            stop_loss: 99.0,
            take_profit: 101.5,
            size: 1.0,
            meta: serde_json::json!({"score": 0.72}),
        }
    }

    fn candle(t: DateTime<Utc>, h: f64, l: f64) -> Candle {
        Candle::new(t.timestamp(), (h + l) / 2.0, h, l, (h + l) / 2.0, 1.0)
    }

    #[test]
    fn close_computes_live_pnl_r() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        let open = lc.open(long_trade(), opened_at()).unwrap();
        let result = lc
            .close(CloseRequest::for_open(
                &open,
                101.5,
                Outcome::Tp,
                opened_at() + chrono::Duration::hours(2),
            ))
            .unwrap();
        let CloseResult::Closed(record) = result else {
            panic!("expected a close");
        };
        assert!((record.pnl_r - 1.5).abs() < 1e-12);
        assert_eq!(record.status, TradeStatus::Closed);
    }

    #[test]
    fn short_close_pnl_r() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        let trade = NewTrade {
            side: Side::Short,
            stop_loss: 101.0,
            take_profit: 98.5,
            ..long_trade()
        };
        let open = lc.open(trade, opened_at()).unwrap();
        let result = lc
            .close(CloseRequest::for_open(&open, 98.5, Outcome::Tp, opened_at()))
            .unwrap();
        let CloseResult::Closed(record) = result else {
            panic!("expected a close");
        };
        assert!((record.pnl_r - 1.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_risk_gives_zero_r() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        let trade = NewTrade {
            stop_loss: 100.0,
            ..long_trade()
        };
        let open = lc.open(trade, opened_at()).unwrap();
        let result = lc
            .close(CloseRequest::for_open(&open, 110.0, Outcome::Manual, opened_at()))
            .unwrap();
        let CloseResult::Closed(record) = result else {
            panic!("expected a close");
        };
        assert_eq!(record.pnl_r, 0.0);
    }

    #[test]
    fn open_time_is_stored_at_second_precision() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        let precise = opened_at() + chrono::Duration::milliseconds(750);
        let open = lc.open(long_trade(), precise).unwrap();
        assert_eq!(open.t, opened_at());
    }

    #[test]
    fn reconcile_closes_on_first_touch_stop_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        lc.open(long_trade(), opened_at()).unwrap();

        let before = opened_at() - chrono::Duration::minutes(15);
        let later = opened_at() + chrono::Duration::minutes(15);
        let mut candles = HashMap::new();
        candles.insert(
            "BTCUSDT".to_string(),
            vec![
                // Before the open: ignored even though it touches the stop.
                candle(before, 100.2, 98.0),
                candle(opened_at(), 100.5, 99.5),
                // Both levels inside one candle: the stop wins.
                candle(later, 102.0, 98.5),
            ],
        );
        let summary = lc.reconcile(&candles).unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.closed.len(), 1);
        let record = &summary.closed[0];
        assert_eq!(record.outcome, Outcome::Sl);
        assert_eq!(record.exit, 99.0);
        assert_eq!(record.exit_time, later);
        assert!((record.pnl_r + 1.0).abs() < 1e-12);

        // Second pass finds nothing left to close.
        let again = lc.reconcile(&candles).unwrap();
        assert_eq!(again.checked, 0);
    }

    #[test]
    fn reconcile_reports_missing_data_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = TradeLifecycle::open_dir(dir.path()).unwrap();
        lc.open(long_trade(), opened_at()).unwrap();
        lc.open(
            NewTrade {
                pair: "ETHUSDT".into(),
                ..long_trade()
            },
            opened_at(),
        )
        .unwrap();

        let mut candles = HashMap::new();
        candles.insert("BTCUSDT".to_string(), vec![candle(opened_at(), 100.5, 99.5)]);
        let summary = lc.reconcile(&candles).unwrap();
        assert_eq!(summary.checked, 2);
        assert!(summary.closed.is_empty());
        assert_eq!(summary.still_open, 2);
        assert_eq!(summary.missing_data, vec!["ETHUSDT".to_string()]);
    }

    #[test]
    fn touched_level_short_side() {
        let c = Candle::new(0, 100.0, 101.2, 98.0, 100.0, 1.0);
        assert_eq!(touched_level(Side::Short, 101.0, 98.5, &c), Some((Outcome::Sl, 101.0)));
        let c = Candle::new(0, 100.0, 100.5, 98.0, 100.0, 1.0);
        assert_eq!(touched_level(Side::Short, 101.0, 98.5, &c), Some((Outcome::Tp, 98.5)));
    }
}
