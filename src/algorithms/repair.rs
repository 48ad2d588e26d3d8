//! Best-effort repair of hard-constraint violations.
//!
//! Repair never fails: running out of attempts leaves the chromosome as it
//! is and the remaining violations are expressed through the fitness penalty.

use rand::Rng;

use super::checker::{check_family, is_elective_pair};
use super::input::InputModel;
use super::models::{Chromosome, ConstraintKind, SlotId};

/// Attempt budgets for [`repair_chromosome`] and [`find_valid_slot_for_gene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairLimits {
    /// Relocation attempts per constraint family
    pub max_repair_attempts: usize,
    /// Random timeslots sampled per relocation
    pub max_slot_search_attempts: usize,
}

pub const MAX_REPAIR_ATTEMPTS: usize = 10;
pub const MAX_SLOT_SEARCH_ATTEMPTS: usize = 20;

impl Default for RepairLimits {
    fn default() -> Self {
        Self {
            max_repair_attempts: MAX_REPAIR_ATTEMPTS,
            max_slot_search_attempts: MAX_SLOT_SEARCH_ATTEMPTS,
        }
    }
}

/// Walk the families in [`ConstraintKind::ALL`] order; within each, keep
/// relocating the gene of the first violation that has an unlocked gene until
/// the family is clean or its attempt budget is spent. Returns the number of
/// genes moved.
pub fn repair_chromosome<R: Rng>(
    chromosome: &mut Chromosome,
    model: &InputModel,
    limits: RepairLimits,
    rng: &mut R,
) -> usize {
    let mut moved = 0;
    for kind in ConstraintKind::ALL {
        moved += repair_family(chromosome, model, kind, limits, rng);
    }
    moved
}

/// Repair a single constraint family.
pub fn repair_family<R: Rng>(
    chromosome: &mut Chromosome,
    model: &InputModel,
    kind: ConstraintKind,
    limits: RepairLimits,
    rng: &mut R,
) -> usize {
    let mut moved = 0;
    for _ in 0..limits.max_repair_attempts {
        let violations = check_family(chromosome, model, kind);
        // Relocate the last unlocked participant of the first repairable violation
        let target = violations.iter().find_map(|v| {
            v.gene_indices
                .iter()
                .rev()
                .copied()
                .find(|&idx| !chromosome.genes[idx].is_locked)
        });
        let Some(gene_idx) = target else {
            break;
        };
        if let Some(slot) =
            find_valid_slot_for_gene(chromosome, gene_idx, model, limits.max_slot_search_attempts, rng)
        {
            chromosome.genes[gene_idx].timeslot_id = slot;
            moved += 1;
        }
    }
    moved
}

/// Sample up to `max_attempts` random timeslots other than the gene's current
/// one and return the first that is hard-available for the lecture's teacher,
/// groups and current room, and where no other gene shares its teacher, a
/// group (outside a common elective) or its room.
pub fn find_valid_slot_for_gene<R: Rng>(
    chromosome: &Chromosome,
    gene_idx: usize,
    model: &InputModel,
    max_attempts: usize,
    rng: &mut R,
) -> Option<SlotId> {
    let slots = model.slots();
    let gene = &chromosome.genes[gene_idx];
    let lecture = model.lecture_for_gene(gene_idx);

    for _ in 0..max_attempts {
        let candidate = slots[rng.random_range(0..slots.len())].id;
        if candidate == gene.timeslot_id {
            continue;
        }
        if !model.is_hard_available(lecture, candidate, gene.classroom_id) {
            continue;
        }
        let clashes = chromosome.genes.iter().enumerate().any(|(other_idx, other)| {
            if other_idx == gene_idx || other.timeslot_id != candidate {
                return false;
            }
            if other.classroom_id == gene.classroom_id {
                return true;
            }
            let other_lecture = model.lecture_for_gene(other_idx);
            other_lecture.teacher_id == lecture.teacher_id
                || (!is_elective_pair(lecture, other_lecture)
                    && other_lecture
                        .group_ids
                        .iter()
                        .any(|g| lecture.group_ids.contains(g)))
        });
        if !clashes {
            return Some(candidate);
        }
    }
    None
}
