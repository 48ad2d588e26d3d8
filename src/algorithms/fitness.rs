use std::cmp::Ordering;

use hashbrown::HashMap;
use serde::Serialize;

use super::checker::{check_hard_constraints, check_preferred_unavailability, completion_rate};
use super::config::{SoftConstraint, SoftLimits, SoftWeights};
use super::input::InputModel;
use super::models::{Chromosome, Violation};

/// Scalar weight of one hard violation in [`Fitness::value`].
pub const HARD_VIOLATION_PENALTY: f64 = 1_000_000.0;

/// Lower is better. Ordered by hard violations first, soft penalty second,
/// so any hard violation outranks any soft-only solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fitness {
    pub hard_violations: usize,
    pub soft_penalty: f64,
}

impl Fitness {
    pub const WORST: Fitness = Fitness {
        hard_violations: usize::MAX,
        soft_penalty: f64::INFINITY,
    };

    pub fn value(&self) -> f64 {
        self.hard_violations as f64 * HARD_VIOLATION_PENALTY + self.soft_penalty
    }

    #[inline]
    pub fn is_better_than(&self, other: &Fitness) -> bool {
        self.cmp(other) == Ordering::Less
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hard_violations
            .cmp(&other.hard_violations)
            .then_with(|| self.soft_penalty.total_cmp(&other.soft_penalty))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftCost {
    pub kind: SoftConstraint,
    pub cost: u64,
    pub instances: usize,
    pub weighted: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SoftBreakdown {
    pub entries: Vec<SoftCost>,
}

impl SoftBreakdown {
    pub fn total_penalty(&self) -> f64 {
        self.entries.iter().map(|e| e.weighted).sum()
    }

    pub fn total_instances(&self) -> usize {
        self.entries.iter().map(|e| e.instances).sum()
    }

    pub fn get(&self, kind: SoftConstraint) -> Option<&SoftCost> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl QualityGrade {
    pub fn grade(hard_violations: usize, soft_penalty: f64, completion_rate: f64) -> Self {
        if hard_violations == 0 && soft_penalty <= 50.0 {
            QualityGrade::Excellent
        } else if hard_violations == 0 {
            QualityGrade::Good
        } else if completion_rate >= 0.9 {
            QualityGrade::Acceptable
        } else {
            QualityGrade::Poor
        }
    }
}

/// Full evaluation of one chromosome, used for the final report.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fitness: Fitness,
    pub hard: Vec<Violation>,
    pub breakdown: SoftBreakdown,
    pub completion_rate: f64,
}

#[derive(Debug, Clone)]
pub struct FitnessCalculator {
    weights: SoftWeights,
    limits: SoftLimits,
}

#[derive(Default)]
struct Tally {
    cost: [u64; 8],
    instances: [usize; 8],
}

impl Tally {
    fn add(&mut self, kind: SoftConstraint, cost: u64) {
        if cost > 0 {
            self.cost[kind.index()] += cost;
            self.instances[kind.index()] += 1;
        }
    }
}

impl FitnessCalculator {
    pub fn new(weights: SoftWeights, limits: SoftLimits) -> Self {
        Self { weights, limits }
    }

    pub fn calculate_fitness(&self, chromosome: &Chromosome, model: &InputModel) -> Fitness {
        let hard_violations = check_hard_constraints(chromosome, model).len();
        let soft_penalty = self.soft_breakdown(chromosome, model).total_penalty();
        Fitness {
            hard_violations,
            soft_penalty,
        }
    }

    pub fn evaluate(&self, chromosome: &Chromosome, model: &InputModel) -> Evaluation {
        let hard = check_hard_constraints(chromosome, model);
        let breakdown = self.soft_breakdown(chromosome, model);
        Evaluation {
            fitness: Fitness {
                hard_violations: hard.len(),
                soft_penalty: breakdown.total_penalty(),
            },
            completion_rate: completion_rate(&hard, chromosome.genes.len()),
            hard,
            breakdown,
        }
    }

    pub fn soft_breakdown(&self, chromosome: &Chromosome, model: &InputModel) -> SoftBreakdown {
        let mut tally = Tally::default();

        let mut group_day: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
        let mut group_day_load: HashMap<(u32, u32), u32> = HashMap::new();
        let mut group_subject_day: HashMap<(u32, u32, u32), u32> = HashMap::new();
        let mut lecture_day: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
        let mut teacher_day: HashMap<(u32, u32), u32> = HashMap::new();
        let mut teacher_week: HashMap<u32, u32> = HashMap::new();

        for (idx, gene) in chromosome.genes.iter().enumerate() {
            let Some(slot) = model.slot(gene.timeslot_id) else {
                continue;
            };
            let lecture = model.lecture_for_gene(idx);

            for &group in &lecture.group_ids {
                group_day.entry((group, slot.day)).or_default().push(slot.period);
                *group_day_load.entry((group, slot.day)).or_default() += lecture.difficulty;
                *group_subject_day
                    .entry((group, slot.day, lecture.subject_id))
                    .or_default() += 1;
            }
            lecture_day
                .entry((lecture.id, slot.day))
                .or_default()
                .push(slot.period);
            *teacher_day.entry((lecture.teacher_id, slot.day)).or_default() += lecture.duration;
            *teacher_week.entry(lecture.teacher_id).or_default() += lecture.duration;
        }

        // Idle periods and per-day counts per group
        let mut group_counts: HashMap<u32, HashMap<u32, usize>> = HashMap::new();
        for ((group, day), periods) in group_day.iter_mut() {
            periods.sort_unstable();
            periods.dedup();
            if let (Some(first), Some(last)) = (periods.first(), periods.last()) {
                let span = (last - first + 1) as u64;
                tally.add(SoftConstraint::IdleTime, span - periods.len() as u64);
            }
            group_counts
                .entry(*group)
                .or_default()
                .insert(*day, periods.len());
        }

        let day_count = model.days().len();
        for counts in group_counts.values() {
            let max = counts.values().copied().max().unwrap_or(0);
            let min = if counts.len() < day_count {
                0
            } else {
                counts.values().copied().min().unwrap_or(0)
            };
            tally.add(
                SoftConstraint::DailyDistribution,
                max.saturating_sub(min).saturating_sub(1) as u64,
            );
        }

        for periods in lecture_day.values_mut() {
            periods.sort_unstable();
            let gaps = periods.windows(2).filter(|w| w[1] - w[0] > 1).count();
            tally.add(SoftConstraint::ConsecutiveLectures, gaps as u64);
        }

        for &hours in teacher_day.values() {
            tally.add(
                SoftConstraint::TeacherDailyOverload,
                hours.saturating_sub(self.limits.max_teacher_daily_hours) as u64,
            );
        }
        for &hours in teacher_week.values() {
            tally.add(
                SoftConstraint::TeacherWeeklyOverload,
                hours.saturating_sub(self.limits.max_teacher_weekly_hours) as u64,
            );
        }
        for &load in group_day_load.values() {
            tally.add(
                SoftConstraint::CognitiveLoad,
                load.saturating_sub(self.limits.max_daily_cognitive_load) as u64,
            );
        }
        for &count in group_subject_day.values() {
            tally.add(
                SoftConstraint::SubjectRepetition,
                count.saturating_sub(self.limits.max_same_subject_per_day) as u64,
            );
        }

        for _ in check_preferred_unavailability(chromosome, model) {
            tally.add(SoftConstraint::PreferredUnavailability, 1);
        }

        SoftBreakdown {
            entries: SoftConstraint::ALL
                .iter()
                .map(|&kind| {
                    let cost = tally.cost[kind.index()];
                    SoftCost {
                        kind,
                        cost,
                        instances: tally.instances[kind.index()],
                        weighted: cost as f64 * self.weights.get(kind),
                    }
                })
                .collect(),
        }
    }
}
