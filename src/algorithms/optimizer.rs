use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::{Duration, Instant},
};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tokio::sync::watch;
use tracing::{debug, info};

use super::config::SchedulerConfig;
use super::controller::{progress_percent, AdaptiveController, StopReason};
use super::fitness::{FitnessCalculator, QualityGrade};
use super::input::InputModel;
use super::island::{migrate, EvolutionContext, Individual, Island, IslandGeneration, RunSignals};
use super::models::{ProgressSnapshot, ResultStats, ScheduleResult};
use super::repair::RepairLimits;
use crate::error::{Result, SchedulerError};

// ============================================================================
// PROGRESS REPORTING
// ============================================================================

/// Rate-limited, one-way progress channel. Only the latest snapshot is kept,
/// so a slow reader never blocks the optimizer.
pub struct ProgressReporter {
    tx: Option<watch::Sender<ProgressSnapshot>>,
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(tx: watch::Sender<ProgressSnapshot>, min_interval: Duration) -> Self {
        Self {
            tx: Some(tx),
            min_interval,
            last_sent: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            tx: None,
            min_interval: Duration::ZERO,
            last_sent: None,
        }
    }

    /// Publish unless the previous report is more recent than the interval.
    pub fn report(&mut self, snapshot: ProgressSnapshot, force: bool) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if !force
            && self
                .last_sent
                .is_some_and(|last| last.elapsed() < self.min_interval)
        {
            return false;
        }
        tx.send_replace(snapshot);
        self.last_sent = Some(Instant::now());
        true
    }
}

// ============================================================================
// ISLAND COORDINATOR
// ============================================================================

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(ScheduleResult),
    Cancelled { generations: usize },
}

pub struct GeneticOptimizer {
    model: Arc<InputModel>,
    config: SchedulerConfig,
    calculator: FitnessCalculator,
    limits: RepairLimits,
}

impl GeneticOptimizer {
    pub fn new(model: Arc<InputModel>, config: SchedulerConfig) -> Self {
        let calculator = FitnessCalculator::new(config.soft_weights, config.soft_limits);
        Self {
            model,
            config,
            calculator,
            limits: RepairLimits::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Evolve `num_islands` populations in parallel until a stop condition
    /// holds or `cancel` is raised, migrating between epochs.
    pub fn optimize(&self, cancel: &AtomicBool, reporter: &mut ProgressReporter) -> Result<RunOutcome> {
        let config = &self.config;
        let start_time = Instant::now();
        let deadline = start_time + Duration::from_millis(config.max_execution_time_ms);

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut master = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..config.num_islands).map(|_| master.random()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_islands)
            .thread_name(|i| format!("island-{}", i))
            .build()
            .map_err(|e| SchedulerError::Internal(format!("cannot build island pool: {}", e)))?;

        let ctx = EvolutionContext {
            model: &self.model,
            config,
            calculator: &self.calculator,
            limits: self.limits,
        };

        info!(
            islands = config.num_islands,
            population = config.population_size,
            genes = self.model.event_count(),
            seed,
            "starting optimization"
        );

        let mut islands: Vec<Island> = pool.install(|| {
            seeds
                .par_iter()
                .enumerate()
                .map(|(index, &seed)| Island::new(index, &ctx, seed))
                .collect()
        });

        let mut global_best = best_of(&islands)?;
        let mut controller = AdaptiveController::new();
        let mut since_migration = 0usize;

        let stop_reason = loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(self.cancelled(&controller));
            }

            let epoch = epoch_length(config, &controller, since_migration);
            let signals = RunSignals {
                cancel,
                target_reached: AtomicBool::new(false),
                deadline,
            };

            let logs: Vec<Vec<IslandGeneration>> = pool.install(|| {
                islands
                    .par_iter_mut()
                    .map(|island| island.run_epoch(&ctx, epoch, &signals))
                    .collect()
            });

            if cancel.load(Ordering::Relaxed) {
                return Ok(self.cancelled(&controller));
            }

            let candidate = best_of(&islands)?;
            if candidate.fitness.is_better_than(&global_best.fitness) {
                global_best = candidate;
            }

            let merged = self.merge_epoch(&logs, &mut controller, start_time, reporter);
            debug!(
                generation = controller.generation(),
                best = global_best.fitness.value(),
                stagnation = controller.stagnation(),
                "epoch finished"
            );

            if let Some(reason) = controller.stop_reason(config, start_time.elapsed()) {
                break reason;
            }
            if merged == 0 {
                // Every island halted before its first generation
                break StopReason::TimeLimit;
            }

            since_migration += merged;
            if since_migration >= config.migration_interval {
                migrate(&mut islands, config.migration_strategy, config.migration_size);
                since_migration = 0;
                debug!(
                    strategy = ?config.migration_strategy,
                    size = config.migration_size,
                    "migration exchanged"
                );
            }
        };

        let result = self.build_result(&global_best, controller, stop_reason, start_time.elapsed());
        reporter.report(
            ProgressSnapshot {
                generation: result.stats.generations_completed,
                best_fitness: result.stats.best_fitness,
                progress: 100.0,
                stagnation: result.history.last().map(|s| s.stagnation).unwrap_or(0),
                mutation_probability: result.history.last().and_then(|s| s.mutation_probability),
                diversity: result.history.last().and_then(|s| s.diversity),
            },
            true,
        );

        info!(
            reason = ?stop_reason,
            generations = result.stats.generations_completed,
            best_fitness = result.stats.best_fitness,
            hard_violations = result.stats.hard_violations,
            "optimization finished"
        );
        Ok(RunOutcome::Completed(result))
    }

    /// Fold the per-island logs of one epoch into the global generation log.
    /// Returns the number of generations merged.
    fn merge_epoch(
        &self,
        logs: &[Vec<IslandGeneration>],
        controller: &mut AdaptiveController,
        start_time: Instant,
        reporter: &mut ProgressReporter,
    ) -> usize {
        let longest = logs.iter().map(Vec::len).max().unwrap_or(0);
        for generation in 0..longest {
            // An island that halted early keeps contributing its last record
            let records: Vec<&IslandGeneration> = logs
                .iter()
                .filter_map(|log| log.get(generation).or(log.last()))
                .collect();
            let Some(best) = records.iter().map(|r| r.best).min() else {
                continue;
            };
            let mutation_probability =
                records.iter().map(|r| r.mutation_probability).sum::<f64>() / records.len() as f64;
            let diversities: Vec<f64> = records.iter().filter_map(|r| r.diversity).collect();
            let diversity = (!diversities.is_empty())
                .then(|| diversities.iter().sum::<f64>() / diversities.len() as f64);

            let stats = controller.observe(best, Some(mutation_probability), diversity);
            let snapshot = ProgressSnapshot {
                generation: stats.generation,
                best_fitness: stats.best_fitness,
                progress: progress_percent(
                    stats.generation,
                    self.config.max_generations,
                    start_time.elapsed(),
                    self.config.max_execution_time_ms,
                ),
                stagnation: stats.stagnation,
                mutation_probability: stats.mutation_probability,
                diversity: stats.diversity,
            };
            reporter.report(snapshot, false);
        }
        longest
    }

    fn cancelled(&self, controller: &AdaptiveController) -> RunOutcome {
        info!(generations = controller.generation(), "optimization cancelled");
        RunOutcome::Cancelled {
            generations: controller.generation(),
        }
    }

    fn build_result(
        &self,
        best: &Individual,
        controller: AdaptiveController,
        stop_reason: StopReason,
        elapsed: Duration,
    ) -> ScheduleResult {
        let evaluation = self.calculator.evaluate(&best.chromosome, &self.model);
        let generations_completed = controller.generation();
        ScheduleResult {
            assignments: best.chromosome.genes.clone(),
            stats: ResultStats {
                completion_rate: evaluation.completion_rate,
                hard_violations: evaluation.hard.len(),
                soft_violations: evaluation.breakdown.total_instances(),
                best_fitness: evaluation.fitness.value(),
                generations_completed,
                quality_grade: QualityGrade::grade(
                    evaluation.fitness.hard_violations,
                    evaluation.fitness.soft_penalty,
                    evaluation.completion_rate,
                ),
                stop_reason,
                elapsed_ms: elapsed.as_millis() as u64,
                soft_breakdown: evaluation.breakdown,
            },
            history: controller.into_history(),
        }
    }
}

/// Generations to run before the next coordinator check: up to the next
/// migration, never past the generation budget, and never past the
/// generation at which the stagnation limit would be exceeded.
fn epoch_length(config: &SchedulerConfig, controller: &AdaptiveController, since_migration: usize) -> usize {
    let remaining = config.max_generations.saturating_sub(controller.generation());
    let until_stagnation = config
        .max_stagnant_generations
        .saturating_sub(controller.stagnation())
        + 1;
    config
        .migration_interval
        .saturating_sub(since_migration)
        .min(remaining)
        .min(until_stagnation)
        .max(1)
}

fn best_of(islands: &[Island]) -> Result<Individual> {
    islands
        .iter()
        .map(Island::best)
        .min_by(|a, b| a.fitness.cmp(&b.fitness))
        .cloned()
        .ok_or_else(|| SchedulerError::Internal("no islands to select from".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::config::{ConfigOverrides, ConfigRequest};
    use crate::algorithms::controller::{adaptive_mutation_probability, DIVERSITY_THRESHOLD};
    use crate::algorithms::input::tests::{lecture, slots};
    use crate::algorithms::models::InputSnapshot;

    fn model() -> Arc<InputModel> {
        let mut a = lecture(1, 1, &[100, 101], &[5]);
        a.occurrences = 2;
        let mut b = lecture(2, 2, &[100, 101], &[5]);
        b.occurrences = 2;
        Arc::new(
            InputModel::build(InputSnapshot {
                lectures: vec![a, b, lecture(3, 3, &[101], &[6])],
                slots: slots(2, 3),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn config(overrides: ConfigOverrides) -> SchedulerConfig {
        SchedulerConfig::resolve(&ConfigRequest {
            overrides: ConfigOverrides {
                population_size: overrides.population_size.or(Some(16)),
                num_islands: overrides.num_islands.or(Some(2)),
                seed: overrides.seed.or(Some(17)),
                ..overrides
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reporter_rate_limits() {
        let (tx, rx) = watch::channel(ProgressSnapshot {
            generation: 0,
            best_fitness: 0.0,
            progress: 0.0,
            stagnation: 0,
            mutation_probability: None,
            diversity: None,
        });
        let mut reporter = ProgressReporter::new(tx, Duration::from_secs(60));
        let mut snapshot = rx.borrow().clone();
        snapshot.generation = 1;
        assert!(reporter.report(snapshot.clone(), false));
        snapshot.generation = 2;
        assert!(!reporter.report(snapshot.clone(), false));
        assert_eq!(rx.borrow().generation, 1);
        assert!(reporter.report(snapshot, true));
        assert_eq!(rx.borrow().generation, 2);
    }

    #[test]
    fn test_generation_budget_completes() {
        let config = config(ConfigOverrides {
            max_generations: Some(12),
            migration_interval: Some(5),
            target_fitness: Some(-1.0),
            max_stagnant_generations: Some(1000),
            ..Default::default()
        });
        let optimizer = GeneticOptimizer::new(model(), config);
        let cancel = AtomicBool::new(false);
        let outcome = optimizer
            .optimize(&cancel, &mut ProgressReporter::disabled())
            .unwrap();
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.generations_completed, 12);
        assert_eq!(result.history.len(), 12);
        assert_eq!(result.assignments.len(), 5);
    }

    #[test]
    fn test_target_fitness_stops_early() {
        let config = config(ConfigOverrides {
            max_generations: Some(500),
            target_fitness: Some(1e9),
            ..Default::default()
        });
        let optimizer = GeneticOptimizer::new(model(), config);
        let cancel = AtomicBool::new(false);
        let RunOutcome::Completed(result) = optimizer
            .optimize(&cancel, &mut ProgressReporter::disabled())
            .unwrap()
        else {
            panic!("expected a completed run");
        };
        assert_eq!(result.stats.stop_reason, StopReason::TargetReached);
        assert_eq!(result.stats.generations_completed, 1);
    }

    fn completed(config: SchedulerConfig) -> ScheduleResult {
        let optimizer = GeneticOptimizer::new(model(), config);
        let cancel = AtomicBool::new(false);
        match optimizer.optimize(&cancel, &mut ProgressReporter::disabled()) {
            Ok(RunOutcome::Completed(result)) => result,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[test]
    fn test_stagnation_stops_inside_migration_interval() {
        let result = completed(config(ConfigOverrides {
            num_islands: Some(1),
            migration_interval: Some(25),
            max_stagnant_generations: Some(2),
            max_generations: Some(5000),
            target_fitness: Some(-1.0),
            ..Default::default()
        }));
        assert_eq!(result.stats.stop_reason, StopReason::Stagnation);
        let (last, earlier) = result.history.split_last().unwrap();
        assert_eq!(last.stagnation, 3);
        assert!(earlier.iter().all(|s| s.stagnation <= 2));
    }

    #[test]
    fn test_epoch_length_caps() {
        let config = SchedulerConfig {
            migration_interval: 25,
            max_stagnant_generations: 2,
            max_generations: 100,
            ..SchedulerConfig::default()
        };
        let mut controller = AdaptiveController::new();
        assert_eq!(epoch_length(&config, &controller, 0), 3);
        let flat = crate::algorithms::fitness::Fitness {
            hard_violations: 1,
            soft_penalty: 0.0,
        };
        controller.observe(flat, None, None);
        controller.observe(flat, None, None);
        assert_eq!(epoch_length(&config, &controller, 2), 2);
        assert_eq!(epoch_length(&config, &controller, 24), 1);
    }

    #[test]
    fn test_logged_mutation_follows_diversity() {
        let base = 0.1;
        let result = completed(config(ConfigOverrides {
            num_islands: Some(1),
            mutation_probability: Some(base),
            max_generations: Some(40),
            target_fitness: Some(-1.0),
            max_stagnant_generations: Some(1000),
            ..Default::default()
        }));
        for stats in &result.history {
            let diversity = stats.diversity.unwrap();
            let expected = adaptive_mutation_probability(base, Some(diversity));
            assert_eq!(stats.mutation_probability, Some(expected));
            if diversity < DIVERSITY_THRESHOLD {
                assert!(expected > base);
            }
        }
    }

    #[test]
    fn test_random_migration_run_completes() {
        let result = completed(config(ConfigOverrides {
            num_islands: Some(3),
            migration_interval: Some(4),
            migration_strategy: Some(crate::algorithms::config::MigrationStrategy::Random),
            max_generations: Some(20),
            target_fitness: Some(-1.0),
            max_stagnant_generations: Some(1000),
            ..Default::default()
        }));
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.history.len(), 20);
        for pair in result.history.windows(2) {
            assert!(pair[1].best_fitness <= pair[0].best_fitness);
        }
    }

    #[test]
    fn test_raised_cancel_flag_returns_no_result() {
        let optimizer = GeneticOptimizer::new(model(), config(ConfigOverrides::default()));
        let cancel = AtomicBool::new(true);
        let outcome = optimizer
            .optimize(&cancel, &mut ProgressReporter::disabled())
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled { generations: 0 }));
    }
}
