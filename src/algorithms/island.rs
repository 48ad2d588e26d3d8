use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::config::{MigrationStrategy, SchedulerConfig};
use super::controller::{adaptive_mutation_probability, population_diversity};
use super::fitness::{Fitness, FitnessCalculator};
use super::input::InputModel;
use super::models::Chromosome;
use super::operators::{crossover, mutate, tournament_select};
use super::repair::{repair_chromosome, RepairLimits};

/// Seed that makes every island panic on its first generation in test builds.
#[cfg(test)]
pub(crate) const FAULT_SEED: u64 = 0xFA17;

#[derive(Debug, Clone)]
pub struct Individual {
    pub chromosome: Chromosome,
    pub fitness: Fitness,
}

/// Read-only state every island needs to evolve.
#[derive(Clone, Copy)]
pub struct EvolutionContext<'a> {
    pub model: &'a InputModel,
    pub config: &'a SchedulerConfig,
    pub calculator: &'a FitnessCalculator,
    pub limits: RepairLimits,
}

impl EvolutionContext<'_> {
    fn evaluate(&self, chromosomes: Vec<Chromosome>) -> Vec<Individual> {
        chromosomes
            .into_par_iter()
            .map(|chromosome| Individual {
                fitness: self.calculator.calculate_fitness(&chromosome, self.model),
                chromosome,
            })
            .collect()
    }
}

/// Flags checked by every island at each generation boundary.
pub struct RunSignals<'a> {
    pub cancel: &'a AtomicBool,
    pub target_reached: AtomicBool,
    pub deadline: Instant,
}

impl RunSignals<'_> {
    pub fn should_halt(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
            || self.target_reached.load(Ordering::Relaxed)
            || Instant::now() >= self.deadline
    }
}

/// What one island observed in one generation.
#[derive(Debug, Clone, Copy)]
pub struct IslandGeneration {
    pub best: Fitness,
    pub mutation_probability: f64,
    pub diversity: Option<f64>,
}

/// One independently evolving population with its own random stream.
pub struct Island {
    pub index: usize,
    /// Kept sorted best-first
    pub population: Vec<Individual>,
    pub generation: usize,
    rng: StdRng,
}

impl Island {
    /// Seed a population: a `heuristic_init_ratio` share built greedily, the
    /// rest at random.
    pub fn new(index: usize, ctx: &EvolutionContext, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = ctx.config.population_size;
        let heuristic = ((size as f64) * ctx.config.heuristic_init_ratio).round() as usize;

        let chromosomes: Vec<Chromosome> = (0..size)
            .map(|i| {
                if i < heuristic {
                    Chromosome::heuristic(ctx.model, &mut rng)
                } else {
                    Chromosome::random(ctx.model, &mut rng)
                }
            })
            .collect();

        let mut island = Self {
            index,
            population: ctx.evaluate(chromosomes),
            generation: 0,
            rng,
        };
        island.sort();
        island
    }

    fn sort(&mut self) {
        self.population.sort_by(|a, b| a.fitness.cmp(&b.fitness));
    }

    pub fn best(&self) -> &Individual {
        &self.population[0]
    }

    /// Elites, then tournament-selected offspring through crossover, mutation
    /// and repair.
    pub fn step(&mut self, ctx: &EvolutionContext) -> IslandGeneration {
        let config = ctx.config;
        let diversity = (config.track_diversity || config.adaptive_mutation)
            .then(|| population_diversity(self.population.iter().map(|i| &i.chromosome)));
        let mutation_probability = if config.adaptive_mutation {
            adaptive_mutation_probability(config.mutation_probability, diversity)
        } else {
            config.mutation_probability
        };

        let fitness: Vec<Fitness> = self.population.iter().map(|i| i.fitness).collect();
        let size = config.population_size;
        let elite_count = config.elite_count.min(self.population.len());

        let mut offspring = Vec::with_capacity(size - elite_count);
        while offspring.len() < size - elite_count {
            let first = tournament_select(&fitness, config.tournament_size, &mut self.rng);
            let first = &self.population[first].chromosome;
            let mut child = if self.rng.random_bool(config.crossover_probability) {
                let second = tournament_select(&fitness, config.tournament_size, &mut self.rng);
                crossover(
                    first,
                    &self.population[second].chromosome,
                    config.crossover_strategy,
                    &mut self.rng,
                )
            } else {
                first.clone()
            };
            mutate(
                &mut child,
                ctx.model,
                mutation_probability,
                config.swap_mutation_ratio,
                &mut self.rng,
            );
            repair_chromosome(&mut child, ctx.model, ctx.limits, &mut self.rng);
            offspring.push(child);
        }

        let mut next: Vec<Individual> = self.population[..elite_count].to_vec();
        next.extend(ctx.evaluate(offspring));
        self.population = next;
        self.sort();
        self.generation += 1;

        IslandGeneration {
            best: self.best().fitness,
            mutation_probability,
            diversity: config.track_diversity.then_some(diversity).flatten(),
        }
    }

    /// Run up to `generations` generations, stopping early when a signal
    /// fires. Reaching the target raises the shared flag for the other islands.
    pub fn run_epoch(
        &mut self,
        ctx: &EvolutionContext,
        generations: usize,
        signals: &RunSignals,
    ) -> Vec<IslandGeneration> {
        let mut log = Vec::with_capacity(generations);
        for _ in 0..generations {
            if signals.should_halt() {
                break;
            }
            #[cfg(test)]
            if ctx.config.seed == Some(FAULT_SEED) {
                panic!("island {} failed in generation {}", self.index, self.generation + 1);
            }
            let record = self.step(ctx);
            if record.best.value() <= ctx.config.target_fitness {
                signals.target_reached.store(true, Ordering::Relaxed);
            }
            log.push(record);
        }
        log
    }

    /// Copies of `count` individuals chosen by `strategy`.
    pub fn emigrants(&mut self, strategy: MigrationStrategy, count: usize) -> Vec<Individual> {
        let count = count.min(self.population.len());
        match strategy {
            MigrationStrategy::Best => self.population[..count].to_vec(),
            MigrationStrategy::Random => self
                .population
                .choose_multiple(&mut self.rng, count)
                .cloned()
                .collect(),
            MigrationStrategy::Diverse => self.diverse_emigrants(count),
        }
    }

    /// Greedy max-min distance selection starting from the best individual.
    fn diverse_emigrants(&self, count: usize) -> Vec<Individual> {
        if count == 0 {
            return Vec::new();
        }
        let mut chosen = vec![0usize];
        let mut min_distance: Vec<usize> = self
            .population
            .iter()
            .map(|i| i.chromosome.distance(&self.population[0].chromosome))
            .collect();

        while chosen.len() < count {
            let next = (0..self.population.len())
                .filter(|idx| !chosen.contains(idx))
                .max_by_key(|&idx| (min_distance[idx], std::cmp::Reverse(idx)));
            let Some(next) = next else {
                break;
            };
            chosen.push(next);
            for (idx, individual) in self.population.iter().enumerate() {
                let d = individual
                    .chromosome
                    .distance(&self.population[next].chromosome);
                min_distance[idx] = min_distance[idx].min(d);
            }
        }
        chosen
            .into_iter()
            .map(|idx| self.population[idx].clone())
            .collect()
    }

    /// Immigrants replace the worst individuals.
    pub fn accept_immigrants(&mut self, immigrants: Vec<Individual>) {
        let len = self.population.len();
        let count = immigrants.len().min(len.saturating_sub(1));
        for (offset, immigrant) in immigrants.into_iter().take(count).enumerate() {
            self.population[len - 1 - offset] = immigrant;
        }
        self.sort();
    }
}

/// Ring exchange: island `i` receives the emigrants of island `i - 1`.
pub fn migrate(islands: &mut [Island], strategy: MigrationStrategy, count: usize) {
    let n = islands.len();
    if n < 2 || count == 0 {
        return;
    }
    let outgoing: Vec<Vec<Individual>> = islands
        .iter_mut()
        .map(|island| island.emigrants(strategy, count))
        .collect();
    for (source, migrants) in outgoing.into_iter().enumerate() {
        islands[(source + 1) % n].accept_immigrants(migrants);
    }
}
