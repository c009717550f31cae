//! Incremental aggregation of stage metrics over a bounded window of stages.
//!
//! The REST API only lists the most recent stages, in no particular order, and
//! a stage may be reported as active in one poll and finalized in a later one.
//! Summing every window would count the same work again on each poll, so the
//! aggregator emits only what changed since the previous poll and carries the
//! state needed for that between polls:
//!
//! - every finalized stage with an id up to `max_processed_finalized_stage_id`
//!   has been fully accounted for, unless it is still listed as active,
//! - `active_stage_metrics` holds what was already counted for stages that
//!   were not finalized during the previous poll.

use std::{
    collections::BTreeMap,
    ops::{AddAssign, Sub},
};

use log::{debug, error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resources::crd::v1alpha1::application::RunStatistics;

use super::model::StageResponse;

pub const NO_STAGE_PROCESSED: i64 = -1;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageMetrics {
    pub output_bytes: i64,
    pub input_bytes: i64,
    pub cpu_time: i64,
}

impl StageMetrics {
    pub fn of(stage: &StageResponse) -> Self {
        Self {
            output_bytes: stage.output_bytes,
            input_bytes: stage.input_bytes,
            cpu_time: stage.executor_cpu_time,
        }
    }
}

impl AddAssign for StageMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.output_bytes += rhs.output_bytes;
        self.input_bytes += rhs.input_bytes;
        self.cpu_time += rhs.cpu_time;
    }
}

impl Sub for StageMetrics {
    type Output = StageMetrics;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            output_bytes: self.output_bytes - rhs.output_bytes,
            input_bytes: self.input_bytes - rhs.input_bytes,
            cpu_time: self.cpu_time - rhs.cpu_time,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageAggregationState {
    #[serde(default = "no_stage_processed")]
    pub max_processed_finalized_stage_id: i64,
    /// metrics already counted for stages which weren't finalized yet
    #[serde(default)]
    pub active_stage_metrics: BTreeMap<i64, StageMetrics>,
}

fn no_stage_processed() -> i64 {
    NO_STAGE_PROCESSED
}

impl Default for StageAggregationState {
    fn default() -> Self {
        Self {
            max_processed_finalized_stage_id: NO_STAGE_PROCESSED,
            active_stage_metrics: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageAggregation {
    /// metrics added since the previous window
    pub delta: StageMetrics,
    /// state to carry into the next window
    pub state: StageAggregationState,
}

/// Folds one window of stages into the previously carried `state`.
///
/// Gaps, i.e. finalized stages that left the window before they were ever
/// observed, can't be recovered. They are logged and the rest of the window is
/// processed normally.
pub fn aggregate_stages(window: &[StageResponse], state: &StageAggregationState) -> StageAggregation {
    let window = latest_attempts(window);

    if let Some(missing_id) = missing_stage(&window, state) {
        error!(
            "Stage {missing_id} is missing from the window {:?}..={:?}, \
            metrics of stages that left the window unobserved are lost!",
            window.first().map(|stage| stage.stage_id),
            window.last().map(|stage| stage.stage_id),
        );
    }

    fold_window(&window, state)
}

/// State describing a window seen for the first time, every stage in it
/// counted.
pub fn initial_state(window: &[StageResponse]) -> StageAggregationState {
    fold_window(&latest_attempts(window), &StageAggregationState::default()).state
}

/// Retried stages are listed once per attempt, only the latest attempt of
/// each stage is kept. Ordered by stage id.
fn latest_attempts(window: &[StageResponse]) -> Vec<&StageResponse> {
    let mut latest: BTreeMap<i64, &StageResponse> = BTreeMap::new();

    for stage in window {
        match latest.get(&stage.stage_id) {
            Some(seen) if seen.attempt_id >= stage.attempt_id => {}
            _ => {
                latest.insert(stage.stage_id, stage);
            }
        }
    }

    latest.into_values().collect()
}

/// First finalized stage past the watermark that was never observed, if the
/// window has already moved beyond it.
fn missing_stage(window: &[&StageResponse], state: &StageAggregationState) -> Option<i64> {
    let expected_id = state.max_processed_finalized_stage_id + 1;
    let moved_past = window.iter().any(|stage| {
        stage.status.is_finalized() && stage.stage_id > state.max_processed_finalized_stage_id
    });
    let observed = window.iter().any(|stage| stage.stage_id == expected_id);

    (moved_past && !observed).then_some(expected_id)
}

fn fold_window(window: &[&StageResponse], state: &StageAggregationState) -> StageAggregation {
    let (finalized, active): (Vec<&StageResponse>, Vec<&StageResponse>) =
        window.iter().copied().partition(|stage| stage.status.is_finalized());

    debug!(
        "Aggregating stage window: {} finalized, {} active, last processed finalized stage {}",
        finalized.len(),
        active.len(),
        state.max_processed_finalized_stage_id
    );

    let previously_counted = |stage: &StageResponse| {
        state
            .active_stage_metrics
            .get(&stage.stage_id)
            .copied()
            .unwrap_or_default()
    };

    let mut delta = StageMetrics::default();
    let mut max_processed_finalized_stage_id = state.max_processed_finalized_stage_id;

    for stage in finalized {
        let already_counted = stage.stage_id <= state.max_processed_finalized_stage_id
            && !state.active_stage_metrics.contains_key(&stage.stage_id);

        if already_counted {
            continue;
        }

        delta += StageMetrics::of(stage) - previously_counted(stage);
        max_processed_finalized_stage_id = max_processed_finalized_stage_id.max(stage.stage_id);
    }

    let mut active_stage_metrics = BTreeMap::new();

    for stage in active {
        let metrics = StageMetrics::of(stage);

        delta += metrics - previously_counted(stage);
        active_stage_metrics.insert(stage.stage_id, metrics);
    }

    StageAggregation {
        delta,
        state: StageAggregationState {
            max_processed_finalized_stage_id,
            active_stage_metrics,
        },
    }
}

/// Plain sum over the latest attempts in a window, with no regard for what
/// was counted before.
pub fn sum_stage_metrics(window: &[StageResponse]) -> StageMetrics {
    let mut total = StageMetrics::default();

    for stage in latest_attempts(window) {
        total += StageMetrics::of(stage);
    }

    total
}

/// How a poll's stage metrics are folded into the recorded run statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageMetricsUpdate {
    /// No aggregation state was recorded yet, totals are the full window sum.
    Full {
        totals: StageMetrics,
        state: StageAggregationState,
    },
    /// Totals advance by what changed since the recorded state.
    Incremental {
        delta: StageMetrics,
        state: StageAggregationState,
    },
}

impl StageMetricsUpdate {
    pub fn compute(window: &[StageResponse], state: Option<&StageAggregationState>) -> Self {
        match state {
            Some(state) => {
                let StageAggregation { delta, state } = aggregate_stages(window, state);

                StageMetricsUpdate::Incremental { delta, state }
            }
            None => StageMetricsUpdate::Full {
                totals: sum_stage_metrics(window),
                state: initial_state(window),
            },
        }
    }

    /// Applies the update to `statistics`, returning the state to record.
    pub fn apply(self, statistics: &mut RunStatistics) -> StageAggregationState {
        match self {
            StageMetricsUpdate::Full { totals, state } => {
                statistics.total_input_bytes = totals.input_bytes;
                statistics.total_output_bytes = totals.output_bytes;
                statistics.total_executor_cpu_time = totals.cpu_time;

                state
            }
            StageMetricsUpdate::Incremental { delta, state } => {
                statistics.total_input_bytes += delta.input_bytes;
                statistics.total_output_bytes += delta.output_bytes;
                statistics.total_executor_cpu_time += delta.cpu_time;

                state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::spark::model::StageStatus;

    use super::*;

    fn stage(stage_id: i64, status: StageStatus, input: i64, output: i64, cpu: i64) -> StageResponse {
        StageResponse {
            status,
            stage_id,
            input_bytes: input,
            output_bytes: output,
            executor_cpu_time: cpu,
            ..Default::default()
        }
    }

    fn complete(stage_id: i64, amount: i64) -> StageResponse {
        stage(stage_id, StageStatus::Complete, amount, amount * 2, amount * 3)
    }

    fn active(stage_id: i64, amount: i64) -> StageResponse {
        stage(stage_id, StageStatus::Active, amount, amount * 2, amount * 3)
    }

    fn metrics(amount: i64) -> StageMetrics {
        StageMetrics {
            input_bytes: amount,
            output_bytes: amount * 2,
            cpu_time: amount * 3,
        }
    }

    /// Runs windows one after another, returning the summed deltas and the final state.
    fn run(windows: &[Vec<StageResponse>]) -> (StageMetrics, StageAggregationState) {
        let mut state = StageAggregationState::default();
        let mut total = StageMetrics::default();

        for window in windows {
            let aggregation = aggregate_stages(window, &state);
            assert!(
                aggregation.state.max_processed_finalized_stage_id
                    >= state.max_processed_finalized_stage_id
            );

            total += aggregation.delta;
            state = aggregation.state;
        }

        (total, state)
    }

    #[test]
    fn first_window_counts_everything() {
        let aggregation = aggregate_stages(
            &[complete(0, 1), complete(1, 10), active(2, 100)],
            &StageAggregationState::default(),
        );

        assert_eq!(aggregation.delta, metrics(111));
        assert_eq!(aggregation.state.max_processed_finalized_stage_id, 1);
        assert_eq!(
            aggregation.state.active_stage_metrics,
            BTreeMap::from([(2, metrics(100))])
        );
    }

    #[test]
    fn repeated_window_adds_nothing() {
        let window = vec![complete(0, 1), complete(1, 10)];

        let (total, state) = run(&[window.clone(), window.clone(), window]);

        assert_eq!(total, metrics(11));
        assert_eq!(state.max_processed_finalized_stage_id, 1);
        assert!(state.active_stage_metrics.is_empty());
    }

    #[test]
    fn stage_finalizing_after_being_active_counts_only_the_difference() {
        let state = StageAggregationState {
            max_processed_finalized_stage_id: 0,
            active_stage_metrics: BTreeMap::from([(1, metrics(4))]),
        };

        let aggregation = aggregate_stages(&[complete(0, 1), complete(1, 10)], &state);

        assert_eq!(aggregation.delta, metrics(6));
        assert_eq!(aggregation.state.max_processed_finalized_stage_id, 1);
        assert!(aggregation.state.active_stage_metrics.is_empty());
    }

    #[test]
    fn late_finalization_below_watermark_is_still_counted() {
        // stage 1 finishes after stage 2 did
        let (total, state) = run(&[
            vec![complete(0, 1), active(1, 5), complete(2, 20)],
            vec![complete(0, 1), complete(1, 8), complete(2, 20)],
        ]);

        assert_eq!(total, metrics(29));
        assert_eq!(state.max_processed_finalized_stage_id, 2);
        assert!(state.active_stage_metrics.is_empty());
    }

    #[test]
    fn totals_are_conserved_across_sliding_windows() {
        // window of three stages sliding over stages 0..=5, each stage spends
        // a few polls active with growing metrics before it completes
        let windows = vec![
            vec![active(0, 1)],
            vec![active(0, 2), active(1, 1)],
            vec![complete(0, 3), active(1, 4), active(2, 1)],
            vec![active(2, 2), complete(1, 5), active(3, 2)],
            vec![complete(2, 7), complete(3, 2), active(4, 1)],
            vec![complete(3, 2), complete(4, 9), complete(5, 11)],
            vec![complete(3, 2), complete(4, 9), complete(5, 11)],
        ];

        let (total, state) = run(&windows);

        assert_eq!(total, metrics(3 + 5 + 7 + 2 + 9 + 11));
        assert_eq!(state.max_processed_finalized_stage_id, 5);
        assert!(state.active_stage_metrics.is_empty());
    }

    #[test]
    fn out_of_order_window_matches_ordered_window() {
        let ordered = vec![complete(0, 1), complete(1, 2), active(2, 3), complete(3, 4)];
        let mut shuffled = ordered.clone();
        shuffled.reverse();

        let from_ordered = aggregate_stages(&ordered, &StageAggregationState::default());
        let from_shuffled = aggregate_stages(&shuffled, &StageAggregationState::default());

        assert_eq!(from_ordered, from_shuffled);
    }

    #[test]
    fn gap_is_tolerated_and_processing_continues() {
        let state = StageAggregationState {
            max_processed_finalized_stage_id: 2,
            active_stage_metrics: BTreeMap::new(),
        };

        // stages 3 and 4 left the window before being observed
        let aggregation = aggregate_stages(&[complete(5, 1), complete(6, 2), active(7, 3)], &state);

        assert_eq!(aggregation.delta, metrics(6));
        assert_eq!(aggregation.state.max_processed_finalized_stage_id, 6);
    }

    #[test]
    fn active_metrics_are_replaced_not_accumulated() {
        let (total, state) = run(&[vec![active(0, 1)], vec![active(0, 5)], vec![active(0, 6)]]);

        assert_eq!(total, metrics(6));
        assert_eq!(state.active_stage_metrics, BTreeMap::from([(0, metrics(6))]));
        assert_eq!(state.max_processed_finalized_stage_id, NO_STAGE_PROCESSED);
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let state = StageAggregationState {
            max_processed_finalized_stage_id: 10,
            active_stage_metrics: BTreeMap::new(),
        };

        let aggregation = aggregate_stages(&[complete(3, 1)], &state);

        assert_eq!(aggregation.state.max_processed_finalized_stage_id, 10);
        assert_eq!(aggregation.delta, StageMetrics::default());
    }

    #[test]
    fn full_update_sets_totals_and_incremental_update_advances_them() {
        let window = vec![complete(0, 10), active(1, 5)];
        let mut statistics = RunStatistics {
            total_input_bytes: 1000,
            ..Default::default()
        };

        let state = StageMetricsUpdate::compute(&window, None).apply(&mut statistics);

        assert_eq!(statistics.total_input_bytes, 15);
        assert_eq!(statistics.total_output_bytes, 30);
        assert_eq!(statistics.total_executor_cpu_time, 45);

        let window = vec![complete(0, 10), complete(1, 7)];
        StageMetricsUpdate::compute(&window, Some(&state)).apply(&mut statistics);

        assert_eq!(statistics.total_input_bytes, 17);
        assert_eq!(statistics.total_output_bytes, 34);
        assert_eq!(statistics.total_executor_cpu_time, 51);
    }

    fn attempt(stage: StageResponse, attempt_id: i64) -> StageResponse {
        StageResponse { attempt_id, ..stage }
    }

    fn failed(stage_id: i64, amount: i64) -> StageResponse {
        stage(stage_id, StageStatus::Failed, amount, amount * 2, amount * 3)
    }

    #[test]
    fn retried_stage_counts_only_its_latest_attempt() {
        let (total, state) = run(&[
            vec![failed(0, 10), attempt(active(0, 3), 1)],
            vec![failed(0, 10), attempt(complete(0, 8), 1)],
            vec![attempt(complete(0, 8), 1), failed(0, 10)],
        ]);

        assert_eq!(total, metrics(8));
        assert_eq!(state.max_processed_finalized_stage_id, 0);
        assert!(state.active_stage_metrics.is_empty());
    }

    #[test]
    fn retried_stage_in_first_window_is_summed_once() {
        let window = vec![complete(0, 1), failed(1, 10), attempt(complete(1, 4), 1)];

        assert_eq!(sum_stage_metrics(&window), metrics(5));
        assert_eq!(
            aggregate_stages(&window, &StageAggregationState::default()).delta,
            metrics(5)
        );
    }

    #[test]
    fn missing_stage_is_reported_only_past_the_watermark() {
        let window = [complete(5, 1), active(6, 1)];
        let window = latest_attempts(&window);

        assert_eq!(missing_stage(&window, &StageAggregationState::default()), Some(0));
        assert_eq!(
            missing_stage(
                &window,
                &StageAggregationState {
                    max_processed_finalized_stage_id: 4,
                    active_stage_metrics: BTreeMap::new(),
                }
            ),
            None
        );
    }

    #[test]
    fn initial_state_of_a_late_window_needs_no_earlier_stages() {
        let window = vec![complete(5, 1), complete(6, 2), active(7, 3)];

        let update = StageMetricsUpdate::compute(&window, None);

        assert_eq!(
            update,
            StageMetricsUpdate::Full {
                totals: metrics(6),
                state: StageAggregationState {
                    max_processed_finalized_stage_id: 6,
                    active_stage_metrics: BTreeMap::from([(7, metrics(3))]),
                },
            }
        );
    }

    #[test]
    fn state_survives_serialization() {
        let state = StageAggregationState {
            max_processed_finalized_stage_id: 4,
            active_stage_metrics: BTreeMap::from([(5, metrics(1))]),
        };

        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["activeStageMetrics"]["5"]["cpuTime"], 3);
        assert_eq!(serde_json::from_value::<StageAggregationState>(value).unwrap(), state);
    }
}
