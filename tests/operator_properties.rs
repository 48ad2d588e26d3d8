//! Property-based tests for the genetic operators and repair.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use timetable_optimization_lib::algorithms::checker::check_hard_constraints;
use timetable_optimization_lib::algorithms::config::CrossoverStrategy;
use timetable_optimization_lib::algorithms::input::InputModel;
use timetable_optimization_lib::algorithms::models::{
    Chromosome, InputSnapshot, LectureInput, LockedPlacement, SlotInput,
};
use timetable_optimization_lib::algorithms::operators::{crossover, random_reset_mutation, swap_mutation};
use timetable_optimization_lib::algorithms::repair::{repair_chromosome, RepairLimits};

/// Lecture 1 is pinned to slot 1 / room 100; the rest are free.
fn model(lectures: u32, occurrences: u32, rooms: u32, days: u32) -> InputModel {
    let mut inputs = vec![LectureInput {
        id: 1,
        teacher_id: 1,
        subject_id: 1,
        duration: 1,
        occurrences: 1,
        allowed_room_ids: vec![100],
        group_ids: vec![1],
        elective_group: None,
        difficulty: 1,
        locked: vec![LockedPlacement {
            occurrence: 0,
            slot_id: 1,
            room_id: 100,
        }],
    }];
    for id in 2..=lectures + 1 {
        inputs.push(LectureInput {
            id,
            teacher_id: id % 3,
            subject_id: id,
            duration: 1,
            occurrences,
            allowed_room_ids: (0..rooms).map(|r| 100 + r).collect(),
            group_ids: vec![id % 2],
            elective_group: None,
            difficulty: 2,
            locked: vec![],
        });
    }
    let slots = (0..days * 4)
        .map(|i| SlotInput {
            id: i + 1,
            day: i / 4,
            period: i % 4,
        })
        .collect();
    InputModel::build(InputSnapshot {
        lectures: inputs,
        slots,
        ..Default::default()
    })
    .unwrap()
}

/// Every lecture owns its own pair of rooms, so no two lectures share one.
fn disjoint_rooms_model(lectures: u32, occurrences: u32) -> InputModel {
    let inputs = (1..=lectures)
        .map(|id| LectureInput {
            id,
            teacher_id: id,
            subject_id: id,
            duration: 1,
            occurrences,
            allowed_room_ids: vec![id * 10, id * 10 + 1],
            group_ids: vec![id],
            elective_group: None,
            difficulty: 1,
            locked: vec![],
        })
        .collect();
    let slots = (0..8)
        .map(|i| SlotInput {
            id: i + 1,
            day: i / 4,
            period: i % 4,
        })
        .collect();
    InputModel::build(InputSnapshot {
        lectures: inputs,
        slots,
        ..Default::default()
    })
    .unwrap()
}

fn placements(chromosome: &Chromosome) -> Vec<(u32, u32)> {
    let mut out: Vec<_> = chromosome
        .genes
        .iter()
        .map(|g| (g.timeslot_id, g.classroom_id))
        .collect();
    out.sort_unstable();
    out
}

proptest! {
    #[test]
    fn crossover_keeps_locked_genes(
        seed in any::<u64>(),
        lectures in 1u32..6,
        occurrences in 1u32..4,
        single_point in any::<bool>()
    ) {
        let model = model(lectures, occurrences, 2, 2);
        let mut rng = StdRng::seed_from_u64(seed);
        let a = Chromosome::random(&model, &mut rng);
        let b = Chromosome::random(&model, &mut rng);
        let strategy = if single_point { CrossoverStrategy::SinglePoint } else { CrossoverStrategy::Uniform };
        let child = crossover(&a, &b, strategy, &mut rng);

        prop_assert_eq!(child.len(), a.len());
        prop_assert_eq!(child.genes[0], a.genes[0]);
        for (idx, gene) in child.genes.iter().enumerate() {
            prop_assert_eq!(gene.lecture_event_id, a.genes[idx].lecture_event_id);
        }
    }

    #[test]
    fn swap_preserves_placement_multiset(
        seed in any::<u64>(),
        lectures in 1u32..6,
        occurrences in 1u32..4
    ) {
        let model = model(lectures, occurrences, 3, 2);
        let mut rng = StdRng::seed_from_u64(seed);
        let original = Chromosome::random(&model, &mut rng);
        let mut mutated = original.clone();
        swap_mutation(&mut mutated, &model, &mut rng);

        prop_assert_eq!(placements(&mutated), placements(&original));
        prop_assert_eq!(mutated.genes[0], original.genes[0]);
    }

    #[test]
    fn swap_keeps_every_room_eligible(
        seed in any::<u64>(),
        lectures in 2u32..6,
        occurrences in 1u32..3
    ) {
        let model = disjoint_rooms_model(lectures, occurrences);
        let mut rng = StdRng::seed_from_u64(seed);
        let original = Chromosome::random(&model, &mut rng);
        let mut mutated = original.clone();
        for _ in 0..10 {
            swap_mutation(&mut mutated, &model, &mut rng);
        }

        for gene in &mutated.genes {
            prop_assert!(model.allowed_rooms(gene.lecture_id).contains(&gene.classroom_id));
        }
        let slots = |ch: &Chromosome| {
            let mut out: Vec<u32> = ch.genes.iter().map(|g| g.timeslot_id).collect();
            out.sort_unstable();
            out
        };
        prop_assert_eq!(slots(&mutated), slots(&original));
    }

    #[test]
    fn random_reset_stays_in_allowed_rooms(
        seed in any::<u64>(),
        rooms in 1u32..4,
        days in 1u32..4
    ) {
        let model = model(4, 2, rooms, days);
        let mut rng = StdRng::seed_from_u64(seed);
        let original = Chromosome::random(&model, &mut rng);
        let mut mutated = original.clone();
        for _ in 0..10 {
            random_reset_mutation(&mut mutated, &model, &mut rng);
        }

        prop_assert_eq!(mutated.genes[0], original.genes[0]);
        for gene in &mutated.genes {
            prop_assert!(model.allowed_rooms(gene.lecture_id).contains(&gene.classroom_id));
            prop_assert!(model.slot(gene.timeslot_id).is_some());
        }
    }

    #[test]
    fn repair_never_adds_hard_violations(
        seed in any::<u64>(),
        lectures in 1u32..6,
        occurrences in 1u32..4
    ) {
        let model = model(lectures, occurrences, 2, 1);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut chromosome = Chromosome::random(&model, &mut rng);
        let before = check_hard_constraints(&chromosome, &model).len();
        repair_chromosome(&mut chromosome, &model, RepairLimits::default(), &mut rng);

        prop_assert!(check_hard_constraints(&chromosome, &model).len() <= before);
        prop_assert_eq!(chromosome.genes[0].timeslot_id, 1);
    }
}
