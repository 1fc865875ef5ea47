use exchange_client::OrderBook;
use scanner_core::{FlowQuality, OrderFlowSummary, SpreadQuality};

const WALL_SIZE_MULTIPLE: f64 = 3.0;
const DEEP_LIQUIDITY_USD: f64 = 20_000.0;
const MODERATE_LIQUIDITY_USD: f64 = 5_000.0;
const TIGHT_SPREAD_PCT: f64 = 0.01;
const NORMAL_SPREAD_PCT: f64 = 0.03;

fn wall_count(levels: &[exchange_client::BookLevel]) -> u32 {
    if levels.is_empty() {
        return 0;
    }
    let avg = levels.iter().map(|l| l.size).sum::<f64>() / levels.len() as f64;
    if avg <= f64::EPSILON {
        return 0;
    }
    levels.iter().filter(|l| l.size > avg * WALL_SIZE_MULTIPLE).count() as u32
}

fn best_bid(book: &OrderBook) -> Option<f64> {
    book.bids.iter().map(|l| l.price).fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.max(p))))
}

fn best_ask(book: &OrderBook) -> Option<f64> {
    book.asks.iter().map(|l| l.price).fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.min(p))))
}

fn spread_quality(book: &OrderBook) -> SpreadQuality {
    match (best_bid(book), best_ask(book)) {
        (Some(bid), Some(ask)) if bid > 0.0 => {
            let mid = (bid + ask) / 2.0;
            let spread_pct = if mid > 0.0 { (ask - bid).abs() / mid } else { 1.0 };
            if spread_pct <= TIGHT_SPREAD_PCT {
                SpreadQuality::Tight
            } else if spread_pct <= NORMAL_SPREAD_PCT {
                SpreadQuality::Normal
            } else {
                SpreadQuality::Wide
            }
        }
        _ => SpreadQuality::Wide,
    }
}

fn flow_quality(total_liquidity: f64) -> FlowQuality {
    if total_liquidity >= DEEP_LIQUIDITY_USD {
        FlowQuality::Deep
    } else if total_liquidity >= MODERATE_LIQUIDITY_USD {
        FlowQuality::Moderate
    } else {
        FlowQuality::Thin
    }
}

/// Analyzes both outcome books together (C6): a YES market buy pressure is
/// also visible as sell pressure on the NO book, so both are weighed.
pub fn analyze_order_flow(yes_book: &OrderBook, no_book: &OrderBook) -> OrderFlowSummary {
    let yes_imbalance = yes_book.imbalance();
    let no_imbalance = no_book.imbalance();
    // Normalize each ratio in (0, inf) to (-1, 1), bid-heavy positive.
    let yes_pressure = (yes_imbalance - 1.0) / (yes_imbalance + 1.0);
    let no_pressure = (no_imbalance - 1.0) / (no_imbalance + 1.0);
    let pressure_score = (yes_pressure - no_pressure) / 2.0;

    let total_liquidity = yes_book.bid_liquidity()
        + yes_book.ask_liquidity()
        + no_book.bid_liquidity()
        + no_book.ask_liquidity();

    let wall_count_bid = wall_count(&yes_book.bids) + wall_count(&no_book.bids);
    let wall_count_ask = wall_count(&yes_book.asks) + wall_count(&no_book.asks);

    let spread = match (spread_quality(yes_book), spread_quality(no_book)) {
        (SpreadQuality::Wide, _) | (_, SpreadQuality::Wide) => SpreadQuality::Wide,
        (SpreadQuality::Normal, _) | (_, SpreadQuality::Normal) => SpreadQuality::Normal,
        _ => SpreadQuality::Tight,
    };

    OrderFlowSummary {
        pressure_score,
        wall_count_bid,
        wall_count_ask,
        flow_quality: flow_quality(total_liquidity),
        spread_quality: spread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_client::BookLevel;

    fn book(bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> OrderBook {
        OrderBook {
            bids: bids.into_iter().map(|(price, size)| BookLevel { price, size }).collect(),
            asks: asks.into_iter().map(|(price, size)| BookLevel { price, size }).collect(),
        }
    }

    #[test]
    fn bid_heavy_yes_book_produces_positive_pressure() {
        let yes = book(vec![(0.5, 1000.0)], vec![(0.51, 10.0)]);
        let no = book(vec![(0.49, 10.0)], vec![(0.5, 10.0)]);
        let summary = analyze_order_flow(&yes, &no);
        assert!(summary.pressure_score > 0.0);
    }

    #[test]
    fn thin_books_report_thin_flow_quality() {
        let yes = book(vec![(0.5, 1.0)], vec![(0.51, 1.0)]);
        let no = book(vec![(0.49, 1.0)], vec![(0.5, 1.0)]);
        let summary = analyze_order_flow(&yes, &no);
        assert_eq!(summary.flow_quality, FlowQuality::Thin);
    }

    #[test]
    fn wide_spread_on_either_book_dominates() {
        let yes = book(vec![(0.4, 100.0)], vec![(0.6, 100.0)]);
        let no = book(vec![(0.49, 100.0)], vec![(0.5, 100.0)]);
        let summary = analyze_order_flow(&yes, &no);
        assert_eq!(summary.spread_quality, SpreadQuality::Wide);
    }
}
