use std::hash::{DefaultHasher, Hash, Hasher};

use hashbrown::{HashMap, HashSet};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use super::input::InputModel;
use super::models::{Chromosome, Gene, RoomId, SlotId};

impl Chromosome {
    /// Uniform slot and uniform allowed room for every unlocked gene.
    pub fn random<R: Rng>(model: &InputModel, rng: &mut R) -> Self {
        let slots = model.slots();
        let genes = model
            .events()
            .iter()
            .map(|event| {
                let lecture = &model.lectures()[event.lecture_idx];
                let (timeslot_id, classroom_id, is_locked) = match event.locked {
                    Some((slot, room)) => (slot, room, true),
                    None => {
                        let slot = slots[rng.random_range(0..slots.len())].id;
                        let room = *lecture
                            .allowed_rooms
                            .choose(rng)
                            .unwrap_or(&lecture.allowed_rooms[0]);
                        (slot, room, false)
                    }
                };
                Gene {
                    lecture_event_id: event.id,
                    lecture_id: lecture.id,
                    timeslot_id,
                    classroom_id,
                    is_locked,
                }
            })
            .collect();
        Self { genes }
    }

    /// Greedy construction: locked genes first, then the most constrained
    /// genes, each placed in the first random slot/room that is hard-available
    /// and free of teacher, group and room clashes. Genes with no such
    /// placement keep their random assignment.
    pub fn heuristic<R: Rng>(model: &InputModel, rng: &mut R) -> Self {
        let mut chromosome = Self::random(model, rng);

        let mut teacher_busy: HashSet<(SlotId, u32)> = HashSet::new();
        let mut group_busy: HashMap<(SlotId, u32), Option<u32>> = HashMap::new();
        let mut room_busy: HashSet<(SlotId, RoomId)> = HashSet::new();

        let mut order: Vec<usize> = Vec::with_capacity(chromosome.genes.len());
        for (idx, gene) in chromosome.genes.iter().enumerate() {
            if gene.is_locked {
                let lecture = model.lecture_for_gene(idx);
                teacher_busy.insert((gene.timeslot_id, lecture.teacher_id));
                for &g in &lecture.group_ids {
                    group_busy.insert((gene.timeslot_id, g), lecture.elective_group);
                }
                room_busy.insert((gene.timeslot_id, gene.classroom_id));
            } else {
                order.push(idx);
            }
        }
        order.shuffle(rng);
        order.sort_by_key(|&idx| model.lecture_for_gene(idx).allowed_rooms.len());

        let mut slot_order: Vec<SlotId> = model.slots().iter().map(|s| s.id).collect();
        for idx in order {
            let lecture = model.lecture_for_gene(idx);
            let mut rooms = lecture.allowed_rooms.clone();
            slot_order.shuffle(rng);
            rooms.shuffle(rng);

            let placement = slot_order.iter().find_map(|&slot| {
                if teacher_busy.contains(&(slot, lecture.teacher_id)) {
                    return None;
                }
                // Elective partners may share a group's slot
                let group_taken = lecture.group_ids.iter().any(|&g| {
                    match group_busy.get(&(slot, g)) {
                        None => false,
                        Some(elective) => elective.is_none() || *elective != lecture.elective_group,
                    }
                });
                if group_taken {
                    return None;
                }
                rooms
                    .iter()
                    .find(|&&room| {
                        !room_busy.contains(&(slot, room))
                            && model.is_hard_available(lecture, slot, room)
                    })
                    .map(|&room| (slot, room))
            });

            if let Some((slot, room)) = placement {
                let gene = &mut chromosome.genes[idx];
                gene.timeslot_id = slot;
                gene.classroom_id = room;
                teacher_busy.insert((slot, lecture.teacher_id));
                for &g in &lecture.group_ids {
                    group_busy.insert((slot, g), lecture.elective_group);
                }
                room_busy.insert((slot, room));
            }
        }
        chromosome
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Hash of every (slot, room) assignment, used to count unique chromosomes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for gene in &self.genes {
            gene.timeslot_id.hash(&mut hasher);
            gene.classroom_id.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Number of genes whose slot or room differ.
    pub fn distance(&self, other: &Chromosome) -> usize {
        self.genes
            .iter()
            .zip(&other.genes)
            .filter(|(a, b)| a.timeslot_id != b.timeslot_id || a.classroom_id != b.classroom_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::checker::check_hard_constraints;
    use crate::algorithms::input::tests::{lecture, slots};
    use crate::algorithms::models::{InputSnapshot, LockedPlacement};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> InputModel {
        let mut pinned = lecture(1, 1, &[100, 101], &[5]);
        pinned.locked = vec![LockedPlacement {
            occurrence: 0,
            slot_id: 3,
            room_id: 101,
        }];
        let mut repeated = lecture(2, 2, &[100, 101], &[5]);
        repeated.occurrences = 3;
        InputModel::build(InputSnapshot {
            lectures: vec![pinned, repeated, lecture(3, 1, &[102], &[6])],
            slots: slots(2, 3),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_random_respects_locks_and_rooms() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let ch = Chromosome::random(&model, &mut rng);
            assert_eq!(ch.len(), model.event_count());
            assert!(ch.genes[0].is_locked);
            assert_eq!((ch.genes[0].timeslot_id, ch.genes[0].classroom_id), (3, 101));
            for gene in &ch.genes {
                assert!(model.allowed_rooms(gene.lecture_id).contains(&gene.classroom_id));
            }
        }
    }

    #[test]
    fn test_heuristic_finds_feasible_timetable() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(7);
        let ch = Chromosome::heuristic(&model, &mut rng);
        assert!(check_hard_constraints(&ch, &model).is_empty());
        assert_eq!(ch.genes[0].timeslot_id, 3);
    }

    #[test]
    fn test_distance_and_fingerprint() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Chromosome::random(&model, &mut rng);
        let mut b = a.clone();
        assert_eq!(a.distance(&b), 0);
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.genes[4].timeslot_id = if a.genes[4].timeslot_id == 1 { 2 } else { 1 };
        assert_eq!(a.distance(&b), 1);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
