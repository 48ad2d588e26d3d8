use std::time::Duration;

use hashbrown::HashSet;
use serde::Serialize;

use super::config::SchedulerConfig;
use super::fitness::Fitness;
use super::models::{Chromosome, GenerationStats};

/// Diversity below which mutation pressure is raised.
pub const DIVERSITY_THRESHOLD: f64 = 0.5;
/// Ceiling for adaptive mutation, as a multiple of the base rate.
pub const MAX_MUTATION_BOOST: f64 = 2.0;

/// Why a run ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    Stagnation,
    MaxGenerations,
    TimeLimit,
}

/// Fraction of unique chromosomes in a population.
pub fn population_diversity<'a, I>(chromosomes: I) -> f64
where
    I: IntoIterator<Item = &'a Chromosome>,
{
    let mut total = 0usize;
    let mut unique = HashSet::new();
    for chromosome in chromosomes {
        total += 1;
        unique.insert(chromosome.fingerprint());
    }
    if total == 0 {
        return 0.0;
    }
    unique.len() as f64 / total as f64
}

/// Base rate when diversity is healthy or unknown; otherwise scaled up
/// linearly as diversity drops, reaching twice the base rate at zero.
pub fn adaptive_mutation_probability(base: f64, diversity: Option<f64>) -> f64 {
    match diversity {
        Some(d) if d < DIVERSITY_THRESHOLD => {
            let boost = 1.0 + (DIVERSITY_THRESHOLD - d.max(0.0)) / DIVERSITY_THRESHOLD;
            (base * boost.min(MAX_MUTATION_BOOST)).min(1.0)
        }
        _ => base,
    }
}

/// Percentage of the tighter of the generation and wall-clock budgets.
pub fn progress_percent(generation: usize, max_generations: usize, elapsed: Duration, max_time_ms: u64) -> f32 {
    let by_generation = generation as f64 / max_generations.max(1) as f64;
    let by_time = elapsed.as_millis() as f64 / max_time_ms.max(1) as f64;
    (by_generation.max(by_time) * 100.0).clamp(0.0, 100.0) as f32
}

/// Tracks best fitness, stagnation and the per-generation log of a run.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveController {
    best: Option<Fitness>,
    stagnation: usize,
    generation: usize,
    history: Vec<GenerationStats>,
}

impl AdaptiveController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed generation.
    pub fn observe(
        &mut self,
        best: Fitness,
        mutation_probability: Option<f64>,
        diversity: Option<f64>,
    ) -> &GenerationStats {
        self.generation += 1;
        match self.best {
            Some(current) if !best.is_better_than(&current) => self.stagnation += 1,
            _ => {
                self.best = Some(best);
                self.stagnation = 0;
            }
        }
        self.history.push(GenerationStats {
            generation: self.generation,
            best_fitness: best.value(),
            hard_violations: best.hard_violations,
            mutation_probability,
            diversity,
            stagnation: self.stagnation,
        });
        &self.history[self.history.len() - 1]
    }

    /// Stop conditions in priority order: target fitness, stagnation,
    /// generation budget, wall-clock budget.
    pub fn stop_reason(&self, config: &SchedulerConfig, elapsed: Duration) -> Option<StopReason> {
        if self
            .best
            .is_some_and(|best| best.value() <= config.target_fitness)
        {
            Some(StopReason::TargetReached)
        } else if self.stagnation > config.max_stagnant_generations {
            Some(StopReason::Stagnation)
        } else if self.generation >= config.max_generations {
            Some(StopReason::MaxGenerations)
        } else if elapsed.as_millis() >= config.max_execution_time_ms as u128 {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }

    pub fn best(&self) -> Option<Fitness> {
        self.best
    }

    pub fn stagnation(&self) -> usize {
        self.stagnation
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    pub fn into_history(self) -> Vec<GenerationStats> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(hard: usize, soft: f64) -> Fitness {
        Fitness {
            hard_violations: hard,
            soft_penalty: soft,
        }
    }

    #[test]
    fn test_adaptive_probability_bounds() {
        assert_eq!(adaptive_mutation_probability(0.1, None), 0.1);
        assert_eq!(adaptive_mutation_probability(0.1, Some(0.8)), 0.1);
        assert!((adaptive_mutation_probability(0.1, Some(0.25)) - 0.15).abs() < 1e-12);
        assert!((adaptive_mutation_probability(0.1, Some(0.0)) - 0.2).abs() < 1e-12);
        assert_eq!(adaptive_mutation_probability(0.9, Some(0.0)), 1.0);
    }

    #[test]
    fn test_stagnation_counter() {
        let mut controller = AdaptiveController::new();
        controller.observe(fit(2, 5.0), None, None);
        controller.observe(fit(2, 5.0), None, None);
        controller.observe(fit(2, 5.0), None, None);
        assert_eq!(controller.stagnation(), 2);
        controller.observe(fit(1, 9.0), None, None);
        assert_eq!(controller.stagnation(), 0);
        assert_eq!(controller.generation(), 4);
        assert_eq!(controller.history().len(), 4);
    }

    #[test]
    fn test_stop_priority() {
        let config = SchedulerConfig {
            max_generations: 2,
            max_stagnant_generations: 0,
            max_execution_time_ms: 10,
            target_fitness: 0.0,
            ..SchedulerConfig::default()
        };
        let mut controller = AdaptiveController::new();
        assert_eq!(controller.stop_reason(&config, Duration::ZERO), None);
        controller.observe(fit(1, 0.0), None, None);
        controller.observe(fit(1, 0.0), None, None);
        // Stagnation outranks the generation and time budgets
        assert_eq!(
            controller.stop_reason(&config, Duration::from_secs(1)),
            Some(StopReason::Stagnation)
        );
        controller.observe(fit(0, 0.0), None, None);
        assert_eq!(
            controller.stop_reason(&config, Duration::from_secs(1)),
            Some(StopReason::TargetReached)
        );
    }

    #[test]
    fn test_diversity_and_progress() {
        let a = Chromosome { genes: vec![] };
        let mut b = a.clone();
        b.genes.push(crate::algorithms::models::Gene {
            lecture_event_id: 0,
            lecture_id: 0,
            timeslot_id: 1,
            classroom_id: 1,
            is_locked: false,
        });
        assert_eq!(population_diversity([&a, &a, &b, &b]), 0.5);
        assert_eq!(progress_percent(50, 100, Duration::from_millis(10), 1000), 50.0);
        assert_eq!(progress_percent(10, 100, Duration::from_millis(900), 1000), 90.0);
    }
}
