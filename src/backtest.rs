// =============================================================================
// Backtester — decision replay against forward price action
// =============================================================================
//
// For every historical decision carrying trade parameters, walk forward a
// timeframe-dependent number of bars and simulate the exit:
//
//   1. Update the favorable/adverse price extremes for the bar.
//   2. Check the stop level first, then the target (the stop wins when both
//      would trigger inside the same bar).
//   3. No breach inside the window exits at the final bar's close (TIMEOUT).
//
// Aggregated statistics cover win rate, profit factor, streaks, drawdown,
// Sharpe/Sortino, Kelly, expectancy, recovery factor, heuristic MAE/MFE and
// segment breakdowns by confidence bucket, signal type and timeframe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{DecisionOutput, Signal};
use crate::market_data::{Candle, Timeframe};

// =============================================================================
// Value objects
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Timeout,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StopLoss => "STOP_LOSS",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

/// One simulated trade, write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal: Signal,
    pub confidence: u8,

    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,

    /// Best price reached during the trade's life.
    pub max_favorable_price: f64,
    /// Worst price reached during the trade's life.
    pub max_adverse_price: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    /// Directional profit/loss in percent of entry.
    pub pnl_pct: f64,
    /// Profit/loss as a multiple of the initial risk.
    pub pnl_r: f64,
    pub duration_hours: f64,
    pub was_profitable: bool,
    pub hit_target: bool,
    pub hit_stop: bool,
}

/// Core stats recomputed per segment slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub count: u32,
    pub win_rate: f64,
    pub avg_r: f64,
    pub avg_pnl: f64,
}

/// Aggregated backtest statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u32,
    pub profitable_trades: u32,
    pub losing_trades: u32,

    pub win_rate: f64,
    /// Gross profit over gross loss; +inf when there are no losses.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_r: f64,

    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub max_drawdown: f64,

    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,

    /// Kelly-optimal position fraction in percent, floored at 0.
    pub kelly_criterion: Option<f64>,
    pub expectancy: Option<f64>,
    pub recovery_factor: Option<f64>,

    /// Heuristic excursion estimates (not measured intrabar).
    pub max_adverse_excursion: Option<f64>,
    pub max_favorable_excursion: Option<f64>,
    pub avg_mae: Option<f64>,
    pub avg_mfe: Option<f64>,

    pub by_confidence: BTreeMap<String, SegmentStats>,
    pub by_signal: BTreeMap<String, SegmentStats>,
    pub by_timeframe: BTreeMap<String, SegmentStats>,
}

// =============================================================================
// Trade simulation
// =============================================================================

/// Replay one decision against forward candles.  Returns `None` for neutral
/// decisions, decisions without trade parameters, or an empty forward window.
pub fn evaluate_decision(decision: &DecisionOutput, forward: &[Candle]) -> Option<TradeOutcome> {
    let trade = decision.trade.as_ref()?;
    if forward.is_empty() {
        return None;
    }

    let entry = trade.entry;
    let stop = trade.stop_loss;
    let target = trade.take_profit;
    let is_long = decision.signal.is_long();
    if !decision.signal.is_actionable() {
        return None;
    }

    let window = decision.timeframe.backtest_window().min(forward.len());
    let bars = &forward[..window];

    let mut max_favorable = entry;
    let mut max_adverse = entry;
    let mut exit: Option<(f64, ExitReason, usize)> = None;

    for (i, bar) in bars.iter().enumerate() {
        if is_long {
            max_favorable = max_favorable.max(bar.high);
            max_adverse = max_adverse.min(bar.low);

            // Stop first: when both levels are inside one bar the stop wins.
            if bar.low <= stop {
                exit = Some((stop, ExitReason::StopLoss, i));
                break;
            }
            if bar.high >= target {
                exit = Some((target, ExitReason::TakeProfit, i));
                break;
            }
        } else {
            max_favorable = max_favorable.min(bar.low);
            max_adverse = max_adverse.max(bar.high);

            if bar.high >= stop {
                exit = Some((stop, ExitReason::StopLoss, i));
                break;
            }
            if bar.low <= target {
                exit = Some((target, ExitReason::TakeProfit, i));
                break;
            }
        }
    }

    let (exit_price, exit_reason, exit_index) = exit.unwrap_or((
        bars[bars.len() - 1].close,
        ExitReason::Timeout,
        bars.len() - 1,
    ));

    let (pnl_pct, risk, reward) = if is_long {
        (
            (exit_price - entry) / entry * 100.0,
            entry - stop,
            exit_price - entry,
        )
    } else {
        (
            (entry - exit_price) / entry * 100.0,
            stop - entry,
            entry - exit_price,
        )
    };
    let pnl_r = if risk != 0.0 { reward / risk } else { 0.0 };

    let duration_hours = exit_index as f64 * decision.timeframe.minutes() as f64 / 60.0;

    debug!(
        symbol = %decision.symbol,
        signal = %decision.signal,
        exit = %exit_reason,
        pnl = format!("{pnl_pct:+.2}%"),
        "trade replayed"
    );

    Some(TradeOutcome {
        symbol: decision.symbol.clone(),
        timeframe: decision.timeframe,
        signal: decision.signal,
        confidence: decision.confidence,
        entry_price: entry,
        stop_loss: stop,
        take_profit: target,
        max_favorable_price: max_favorable,
        max_adverse_price: max_adverse,
        exit_price,
        exit_reason,
        pnl_pct,
        pnl_r,
        duration_hours,
        was_profitable: pnl_pct > 0.0,
        hit_target: exit_reason == ExitReason::TakeProfit,
        hit_stop: exit_reason == ExitReason::StopLoss,
    })
}

// =============================================================================
// Backtester
// =============================================================================

#[derive(Default)]
pub struct Backtester {
    results: Vec<TradeOutcome>,
}

impl Backtester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay a batch of (decision, forward candles) pairs and aggregate.
    /// Decisions without trade parameters are skipped, matching the rule
    /// that neutral signals are never backtested.
    pub fn run<'a, I>(&mut self, cases: I) -> PerformanceMetrics
    where
        I: IntoIterator<Item = (&'a DecisionOutput, &'a [Candle])>,
    {
        for (decision, forward) in cases {
            if let Some(outcome) = evaluate_decision(decision, forward) {
                self.results.push(outcome);
            }
        }
        compute_metrics(&self.results)
    }

    /// Per-trade outcomes accumulated so far.
    pub fn results(&self) -> &[TradeOutcome] {
        &self.results
    }
}

// =============================================================================
// Metric aggregation
// =============================================================================

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn segment_stats(outcomes: &[&TradeOutcome]) -> SegmentStats {
    let count = outcomes.len() as u32;
    let wins = outcomes.iter().filter(|o| o.was_profitable).count();
    let returns: Vec<f64> = outcomes.iter().map(|o| o.pnl_pct).collect();
    let r_multiples: Vec<f64> = outcomes.iter().map(|o| o.pnl_r).collect();
    SegmentStats {
        count,
        win_rate: if count > 0 {
            wins as f64 / count as f64 * 100.0
        } else {
            0.0
        },
        avg_r: mean(&r_multiples),
        avg_pnl: mean(&returns),
    }
}

pub fn compute_metrics(outcomes: &[TradeOutcome]) -> PerformanceMetrics {
    if outcomes.is_empty() {
        return empty_metrics();
    }

    let total = outcomes.len() as u32;
    let profitable = outcomes.iter().filter(|o| o.was_profitable).count() as u32;
    let losing = total - profitable;
    let win_rate = profitable as f64 / total as f64 * 100.0;

    let returns: Vec<f64> = outcomes.iter().map(|o| o.pnl_pct).collect();
    let wins: Vec<f64> = returns.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|p| *p < 0.0).collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        f64::INFINITY
    };

    let avg_win = mean(&wins);
    let avg_loss = mean(&losses);
    let avg_r = mean(&outcomes.iter().map(|o| o.pnl_r).collect::<Vec<_>>());

    // Streaks: the counter flips sign on every win/loss transition.
    let mut max_consecutive_wins = 0i64;
    let mut max_consecutive_losses = 0i64;
    let mut streak = 0i64;
    for outcome in outcomes {
        streak = if outcome.was_profitable {
            (streak + 1).max(1)
        } else {
            (streak - 1).min(-1)
        };
        max_consecutive_wins = max_consecutive_wins.max(streak);
        max_consecutive_losses = max_consecutive_losses.min(streak);
    }
    let max_consecutive_wins = max_consecutive_wins.max(0) as u32;
    let max_consecutive_losses = max_consecutive_losses.unsigned_abs() as u32;

    // Max drawdown from the cumulative-return running maximum.
    let mut cumulative = 1.0;
    let mut running_max = f64::MIN;
    let mut max_drawdown = 0.0f64;
    for pnl in &returns {
        cumulative *= 1.0 + pnl / 100.0;
        running_max = running_max.max(cumulative);
        let drawdown = (cumulative - running_max) / running_max * 100.0;
        max_drawdown = max_drawdown.max(drawdown.abs());
    }

    // Risk-adjusted ratios, annualised by sqrt(252).
    let std = sample_std(&returns);
    let sharpe_ratio = (std > 0.0).then(|| mean(&returns) / std * 252.0_f64.sqrt());

    let downside_std = sample_std(&losses);
    let sortino_ratio =
        (losses.len() >= 2 && downside_std > 0.0).then(|| mean(&returns) / downside_std * 252.0_f64.sqrt());

    // Kelly fraction: f* = (p*W - (1-p)) / W, floored at zero.
    let kelly_criterion = (avg_loss < 0.0 && avg_win > 0.0).then(|| {
        let p = win_rate / 100.0;
        let w = avg_win / avg_loss.abs();
        (((p * w - (1.0 - p)) / w) * 100.0).max(0.0)
    });

    let expectancy = (avg_win > 0.0 || avg_loss < 0.0)
        .then(|| win_rate / 100.0 * avg_win + (100.0 - win_rate) / 100.0 * avg_loss);

    let net_profit: f64 = returns.iter().sum();
    let recovery_factor = (max_drawdown > 0.0).then(|| net_profit / max_drawdown);

    // Heuristic MAE/MFE estimates.  These are approximations from final P&L,
    // not measured intrabar excursions, and are flagged as such in the docs.
    let mut mae_estimates = Vec::with_capacity(outcomes.len());
    let mut mfe_estimates = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if outcome.was_profitable {
            mae_estimates.push((-outcome.pnl_pct.abs() * 0.3).min(-0.5));
            mfe_estimates.push(outcome.pnl_pct.abs());
        } else {
            mae_estimates.push(outcome.pnl_pct);
            mfe_estimates.push(outcome.pnl_pct.abs() * 0.2);
        }
    }
    let max_adverse_excursion = mae_estimates.iter().copied().reduce(f64::min);
    let max_favorable_excursion = mfe_estimates.iter().copied().reduce(f64::max);
    let avg_mae = (!mae_estimates.is_empty()).then(|| mean(&mae_estimates));
    let avg_mfe = (!mfe_estimates.is_empty()).then(|| mean(&mfe_estimates));

    // Segment breakdowns.
    const CONFIDENCE_BINS: [(u8, u8, &str); 4] = [
        (0, 50, "0-50%"),
        (50, 70, "50-70%"),
        (70, 85, "70-85%"),
        (85, 101, "85-100%"),
    ];
    let mut by_confidence = BTreeMap::new();
    for (low, high, label) in CONFIDENCE_BINS {
        let slice: Vec<&TradeOutcome> = outcomes
            .iter()
            .filter(|o| o.confidence >= low && o.confidence < high)
            .collect();
        if !slice.is_empty() {
            by_confidence.insert(label.to_string(), segment_stats(&slice));
        }
    }

    let mut by_signal: BTreeMap<String, Vec<&TradeOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_signal
            .entry(outcome.signal.to_string())
            .or_default()
            .push(outcome);
    }
    let by_signal = by_signal
        .into_iter()
        .map(|(k, v)| (k, segment_stats(&v)))
        .collect();

    let mut by_timeframe: BTreeMap<String, Vec<&TradeOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_timeframe
            .entry(outcome.timeframe.as_str().to_string())
            .or_default()
            .push(outcome);
    }
    let by_timeframe = by_timeframe
        .into_iter()
        .map(|(k, v)| (k, segment_stats(&v)))
        .collect();

    PerformanceMetrics {
        total_trades: total,
        profitable_trades: profitable,
        losing_trades: losing,
        win_rate,
        profit_factor,
        avg_win,
        avg_loss,
        avg_r,
        max_consecutive_wins,
        max_consecutive_losses,
        max_drawdown,
        sharpe_ratio,
        sortino_ratio,
        kelly_criterion,
        expectancy,
        recovery_factor,
        max_adverse_excursion,
        max_favorable_excursion,
        avg_mae,
        avg_mfe,
        by_confidence,
        by_signal,
        by_timeframe,
    }
}

fn empty_metrics() -> PerformanceMetrics {
    PerformanceMetrics {
        total_trades: 0,
        profitable_trades: 0,
        losing_trades: 0,
        win_rate: 0.0,
        profit_factor: 0.0,
        avg_win: 0.0,
        avg_loss: 0.0,
        avg_r: 0.0,
        max_consecutive_wins: 0,
        max_consecutive_losses: 0,
        max_drawdown: 0.0,
        sharpe_ratio: None,
        sortino_ratio: None,
        kelly_criterion: None,
        expectancy: None,
        recovery_factor: None,
        max_adverse_excursion: None,
        max_favorable_excursion: None,
        avg_mae: None,
        avg_mfe: None,
        by_confidence: BTreeMap::new(),
        by_signal: BTreeMap::new(),
        by_timeframe: BTreeMap::new(),
    }
}
