/// Transient per-attempt state, never persisted — a crash mid-evaluation
/// simply loses the attempt; the next scheduler tick starts a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorState {
    Idle,
    Admitted,
    MarketData,
    Chart,
    Analysis,
    Hold,
    Execute,
    Reported,
}
