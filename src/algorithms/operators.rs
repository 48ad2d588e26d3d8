//! Selection, crossover and mutation over timetable chromosomes.
//!
//! Locked genes are never touched: crossover copies them from the first
//! parent (they are identical in every chromosome) and both mutations skip
//! them.

use rand::seq::IndexedRandom;
use rand::Rng;

use super::config::CrossoverStrategy;
use super::fitness::Fitness;
use super::input::InputModel;
use super::models::Chromosome;

/// Draws per mutation before giving up silently.
pub const MAX_MUTATION_ATTEMPTS: usize = 10;

// ============================================================================
// SELECTION
// ============================================================================

/// Draw `tournament_size` individuals uniformly (with replacement) and return
/// the index of the fittest.
pub fn tournament_select<R: Rng>(fitness: &[Fitness], tournament_size: usize, rng: &mut R) -> usize {
    debug_assert!(!fitness.is_empty());
    let mut best = rng.random_range(0..fitness.len());
    for _ in 1..tournament_size.max(1) {
        let challenger = rng.random_range(0..fitness.len());
        if fitness[challenger].is_better_than(&fitness[best]) {
            best = challenger;
        }
    }
    best
}

// ============================================================================
// CROSSOVER
// ============================================================================

pub fn crossover<R: Rng>(
    first: &Chromosome,
    second: &Chromosome,
    strategy: CrossoverStrategy,
    rng: &mut R,
) -> Chromosome {
    match strategy {
        CrossoverStrategy::Uniform => uniform_crossover(first, second, rng),
        CrossoverStrategy::SinglePoint => single_point_crossover(first, second, rng),
    }
}

/// Each unlocked gene comes from either parent with equal probability.
pub fn uniform_crossover<R: Rng>(first: &Chromosome, second: &Chromosome, rng: &mut R) -> Chromosome {
    let genes = first
        .genes
        .iter()
        .zip(&second.genes)
        .map(|(a, b)| {
            if a.is_locked || rng.random_bool(0.5) {
                *a
            } else {
                *b
            }
        })
        .collect();
    Chromosome { genes }
}

/// Genes before a random cut come from the first parent, the rest from the second.
pub fn single_point_crossover<R: Rng>(
    first: &Chromosome,
    second: &Chromosome,
    rng: &mut R,
) -> Chromosome {
    let len = first.genes.len();
    if len < 2 {
        return first.clone();
    }
    let cut = rng.random_range(1..len);
    let genes = first
        .genes
        .iter()
        .zip(&second.genes)
        .enumerate()
        .map(|(idx, (a, b))| if idx < cut || a.is_locked { *a } else { *b })
        .collect();
    Chromosome { genes }
}

// ============================================================================
// MUTATION
// ============================================================================

/// With probability `probability`, apply swap mutation (`swap_ratio` share) or
/// random-reset mutation. Returns whether any gene changed.
pub fn mutate<R: Rng>(
    chromosome: &mut Chromosome,
    model: &InputModel,
    probability: f64,
    swap_ratio: f64,
    rng: &mut R,
) -> bool {
    if !rng.random_bool(probability.clamp(0.0, 1.0)) {
        return false;
    }
    if rng.random_bool(swap_ratio.clamp(0.0, 1.0)) {
        swap_mutation(chromosome, model, rng)
    } else {
        random_reset_mutation(chromosome, model, rng)
    }
}

/// Exchange the timeslots of two random unlocked genes. Rooms move with them
/// only when each lecture may use the other's room.
pub fn swap_mutation<R: Rng>(chromosome: &mut Chromosome, model: &InputModel, rng: &mut R) -> bool {
    let len = chromosome.genes.len();
    if len < 2 {
        return false;
    }
    for _ in 0..MAX_MUTATION_ATTEMPTS {
        let a = rng.random_range(0..len);
        let b = rng.random_range(0..len);
        if a == b || chromosome.genes[a].is_locked || chromosome.genes[b].is_locked {
            continue;
        }
        let (gene_a, gene_b) = (chromosome.genes[a], chromosome.genes[b]);
        chromosome.genes[a].timeslot_id = gene_b.timeslot_id;
        chromosome.genes[b].timeslot_id = gene_a.timeslot_id;
        if model.allowed_rooms(gene_a.lecture_id).contains(&gene_b.classroom_id)
            && model.allowed_rooms(gene_b.lecture_id).contains(&gene_a.classroom_id)
        {
            chromosome.genes[a].classroom_id = gene_b.classroom_id;
            chromosome.genes[b].classroom_id = gene_a.classroom_id;
        }
        return true;
    }
    false
}

/// Move one random unlocked gene to a uniform timeslot and a uniform room from
/// its lecture's allowed list.
pub fn random_reset_mutation<R: Rng>(
    chromosome: &mut Chromosome,
    model: &InputModel,
    rng: &mut R,
) -> bool {
    let len = chromosome.genes.len();
    if len == 0 {
        return false;
    }
    let slots = model.slots();
    for _ in 0..MAX_MUTATION_ATTEMPTS {
        let idx = rng.random_range(0..len);
        if chromosome.genes[idx].is_locked {
            continue;
        }
        let rooms = model.allowed_rooms(chromosome.genes[idx].lecture_id);
        let Some(&room) = rooms.choose(rng) else {
            continue;
        };
        let slot = slots[rng.random_range(0..slots.len())].id;
        let gene = &mut chromosome.genes[idx];
        gene.timeslot_id = slot;
        gene.classroom_id = room;
        return true;
    }
    false
}
