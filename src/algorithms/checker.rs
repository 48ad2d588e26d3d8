use hashbrown::{HashMap, HashSet};

use super::input::{InputModel, Lecture, UnavailabilityTable};
use super::models::{Chromosome, ConstraintKind, Severity, SlotId, Violation};

// ============================================================================
// CLASH CHECKS
// ============================================================================

/// Two genes whose lectures share a teacher occupy the same timeslot.
pub fn check_teacher_clashes(chromosome: &Chromosome, model: &InputModel) -> Vec<Violation> {
    clashes_by_key(chromosome, model, ConstraintKind::TeacherClash, |_, lecture| {
        vec![lecture.teacher_id]
    })
}

/// Two genes whose lectures share a student group occupy the same timeslot,
/// unless both belong to the same elective group.
pub fn check_group_clashes(chromosome: &Chromosome, model: &InputModel) -> Vec<Violation> {
    let mut buckets: HashMap<(SlotId, u32), Vec<usize>> = HashMap::new();
    for (idx, gene) in chromosome.genes.iter().enumerate() {
        for &group in &model.lecture_for_gene(idx).group_ids {
            buckets.entry((gene.timeslot_id, group)).or_default().push(idx);
        }
    }

    let mut pairs = HashSet::new();
    for members in buckets.values() {
        for (n, &a) in members.iter().enumerate() {
            for &b in &members[n + 1..] {
                if !is_elective_pair(model.lecture_for_gene(a), model.lecture_for_gene(b)) {
                    pairs.insert((a.min(b), a.max(b)));
                }
            }
        }
    }
    pair_violations(pairs, ConstraintKind::GroupClash)
}

/// Two genes assigned the same classroom occupy the same timeslot.
pub fn check_room_clashes(chromosome: &Chromosome, model: &InputModel) -> Vec<Violation> {
    clashes_by_key(chromosome, model, ConstraintKind::RoomClash, |gene_room, _| vec![gene_room])
}

fn clashes_by_key<F>(
    chromosome: &Chromosome,
    model: &InputModel,
    kind: ConstraintKind,
    keys: F,
) -> Vec<Violation>
where
    F: Fn(u32, &Lecture) -> Vec<u32>,
{
    let mut buckets: HashMap<(SlotId, u32), Vec<usize>> = HashMap::new();
    for (idx, gene) in chromosome.genes.iter().enumerate() {
        for key in keys(gene.classroom_id, model.lecture_for_gene(idx)) {
            buckets.entry((gene.timeslot_id, key)).or_default().push(idx);
        }
    }

    let mut pairs = HashSet::new();
    for members in buckets.values() {
        for (n, &a) in members.iter().enumerate() {
            for &b in &members[n + 1..] {
                pairs.insert((a.min(b), a.max(b)));
            }
        }
    }
    pair_violations(pairs, kind)
}

/// Pairs sorted so the violation list does not depend on map iteration order.
fn pair_violations(pairs: HashSet<(usize, usize)>, kind: ConstraintKind) -> Vec<Violation> {
    let mut pairs: Vec<_> = pairs.into_iter().collect();
    pairs.sort_unstable();
    pairs
        .into_iter()
        .map(|(a, b)| Violation {
            kind,
            severity: Severity::Hard,
            gene_indices: vec![a, b],
        })
        .collect()
}

#[inline]
pub(crate) fn is_elective_pair(a: &Lecture, b: &Lecture) -> bool {
    matches!((a.elective_group, b.elective_group), (Some(x), Some(y)) if x == y)
}

// ============================================================================
// UNAVAILABILITY CHECKS
// ============================================================================

/// A gene's timeslot falls in its teacher's unavailable set.
pub fn check_teacher_unavailability(
    chromosome: &Chromosome,
    model: &InputModel,
    severity: Severity,
) -> Vec<Violation> {
    unavailability(
        chromosome,
        model,
        model.teacher_unavailability(),
        ConstraintKind::TeacherUnavailable,
        severity,
        |_, lecture| vec![lecture.teacher_id],
    )
}

/// A gene's timeslot falls in one of its groups' unavailable sets; one
/// violation per affected group.
pub fn check_group_unavailability(
    chromosome: &Chromosome,
    model: &InputModel,
    severity: Severity,
) -> Vec<Violation> {
    unavailability(
        chromosome,
        model,
        model.group_unavailability(),
        ConstraintKind::GroupUnavailable,
        severity,
        |_, lecture| lecture.group_ids.clone(),
    )
}

/// A gene's timeslot falls in its classroom's unavailable set.
pub fn check_room_unavailability(
    chromosome: &Chromosome,
    model: &InputModel,
    severity: Severity,
) -> Vec<Violation> {
    unavailability(
        chromosome,
        model,
        model.room_unavailability(),
        ConstraintKind::RoomUnavailable,
        severity,
        |room, _| vec![room],
    )
}

fn unavailability<F>(
    chromosome: &Chromosome,
    model: &InputModel,
    table: &UnavailabilityTable,
    kind: ConstraintKind,
    severity: Severity,
    entities: F,
) -> Vec<Violation>
where
    F: Fn(u32, &Lecture) -> Vec<u32>,
{
    let mut violations = Vec::new();
    for (idx, gene) in chromosome.genes.iter().enumerate() {
        for entity in entities(gene.classroom_id, model.lecture_for_gene(idx)) {
            if table.is_unavailable(entity, gene.timeslot_id, severity) {
                violations.push(Violation {
                    kind,
                    severity,
                    gene_indices: vec![idx],
                });
            }
        }
    }
    violations
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Run the hard check for one constraint family.
pub fn check_family(chromosome: &Chromosome, model: &InputModel, kind: ConstraintKind) -> Vec<Violation> {
    match kind {
        ConstraintKind::TeacherClash => check_teacher_clashes(chromosome, model),
        ConstraintKind::GroupClash => check_group_clashes(chromosome, model),
        ConstraintKind::RoomClash => check_room_clashes(chromosome, model),
        ConstraintKind::TeacherUnavailable => {
            check_teacher_unavailability(chromosome, model, Severity::Hard)
        }
        ConstraintKind::GroupUnavailable => {
            check_group_unavailability(chromosome, model, Severity::Hard)
        }
        ConstraintKind::RoomUnavailable => {
            check_room_unavailability(chromosome, model, Severity::Hard)
        }
    }
}

/// Every hard violation, family by family in [`ConstraintKind::ALL`] order.
pub fn check_hard_constraints(chromosome: &Chromosome, model: &InputModel) -> Vec<Violation> {
    ConstraintKind::ALL
        .iter()
        .flat_map(|&kind| check_family(chromosome, model, kind))
        .collect()
}

/// Preferred-unavailability hits for teachers, groups and rooms.
pub fn check_preferred_unavailability(chromosome: &Chromosome, model: &InputModel) -> Vec<Violation> {
    let mut violations = check_teacher_unavailability(chromosome, model, Severity::Preferred);
    violations.extend(check_group_unavailability(chromosome, model, Severity::Preferred));
    violations.extend(check_room_unavailability(chromosome, model, Severity::Preferred));
    violations
}

/// Fraction of genes that take part in no hard violation.
pub fn completion_rate(violations: &[Violation], gene_count: usize) -> f64 {
    if gene_count == 0 {
        return 1.0;
    }
    let affected: HashSet<usize> = violations
        .iter()
        .filter(|v| v.severity == Severity::Hard)
        .flat_map(|v| v.gene_indices.iter().copied())
        .collect();
    (gene_count - affected.len()) as f64 / gene_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::input::tests::{lecture, slots};
    use crate::algorithms::models::{Gene, InputSnapshot, UnavailabilityInput};

    fn gene(idx: u32, lecture_id: u32, slot: u32, room: u32) -> Gene {
        Gene {
            lecture_event_id: idx,
            lecture_id,
            timeslot_id: slot,
            classroom_id: room,
            is_locked: false,
        }
    }

    fn model() -> InputModel {
        let mut e1 = lecture(3, 20, &[100, 101], &[7]);
        e1.elective_group = Some(1);
        let mut e2 = lecture(4, 21, &[100, 101], &[7]);
        e2.elective_group = Some(1);
        InputModel::build(InputSnapshot {
            lectures: vec![
                lecture(1, 10, &[100, 101], &[5]),
                lecture(2, 10, &[100, 101], &[6]),
                e1,
                e2,
            ],
            slots: slots(1, 4),
            teacher_unavailability: vec![UnavailabilityInput {
                entity_id: 10,
                slot_id: 1,
                severity: Severity::Hard,
            }],
            room_unavailability: vec![UnavailabilityInput {
                entity_id: 101,
                slot_id: 2,
                severity: Severity::Preferred,
            }],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_teacher_clash_detected() {
        let model = model();
        let ch = Chromosome {
            genes: vec![
                gene(0, 1, 2, 100),
                gene(1, 2, 2, 101),
                gene(2, 3, 3, 100),
                gene(3, 4, 4, 100),
            ],
        };
        let violations = check_teacher_clashes(&ch, &model);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].gene_indices, vec![0, 1]);
        assert!(check_room_clashes(&ch, &model).is_empty());
    }

    #[test]
    fn test_elective_groups_may_share_slot() {
        let model = model();
        let ch = Chromosome {
            genes: vec![
                gene(0, 1, 2, 100),
                gene(1, 2, 3, 100),
                gene(2, 3, 4, 100),
                gene(3, 4, 4, 101),
            ],
        };
        assert!(check_group_clashes(&ch, &model).is_empty());
    }

    #[test]
    fn test_room_clash_and_unavailability() {
        let model = model();
        let ch = Chromosome {
            genes: vec![
                gene(0, 1, 1, 100),
                gene(1, 2, 2, 101),
                gene(2, 3, 3, 100),
                gene(3, 4, 3, 100),
            ],
        };
        let rooms = check_room_clashes(&ch, &model);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].gene_indices, vec![2, 3]);

        let teacher = check_teacher_unavailability(&ch, &model, Severity::Hard);
        assert_eq!(teacher.len(), 1);
        assert_eq!(teacher[0].gene_indices, vec![0]);

        let preferred = check_preferred_unavailability(&ch, &model);
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].gene_indices, vec![1]);

        let hard = check_hard_constraints(&ch, &model);
        assert_eq!(hard.len(), 2);
        assert_eq!(completion_rate(&hard, ch.genes.len()), 0.25);
    }

    #[test]
    fn test_checker_is_deterministic() {
        let model = model();
        let ch = Chromosome {
            genes: vec![
                gene(0, 1, 1, 100),
                gene(1, 2, 1, 100),
                gene(2, 3, 1, 100),
                gene(3, 4, 1, 100),
            ],
        };
        let first = check_hard_constraints(&ch, &model);
        for _ in 0..5 {
            assert_eq!(check_hard_constraints(&ch, &model), first);
        }
    }
}
