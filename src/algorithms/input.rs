use hashbrown::{HashMap, HashSet};

use super::models::{
    EventId, GroupId, InputSnapshot, LectureId, RoomId, Severity, SlotId, SlotInput, SubjectId,
    TeacherId, UnavailabilityInput,
};
use crate::error::{Result, SchedulerError};

/// A lecture as seen by the optimizer, with its room list deduplicated.
#[derive(Debug, Clone)]
pub struct Lecture {
    pub id: LectureId,
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
    pub duration: u32,
    pub group_ids: Vec<GroupId>,
    pub allowed_rooms: Vec<RoomId>,
    pub elective_group: Option<u32>,
    pub difficulty: u32,
}

/// One occurrence of a lecture; gene `i` of every chromosome encodes event `i`.
#[derive(Debug, Clone)]
pub struct LectureEvent {
    pub id: EventId,
    pub lecture_idx: usize,
    pub occurrence: u32,
    pub locked: Option<(SlotId, RoomId)>,
}

/// Entity → unavailable slots, split by severity.
#[derive(Debug, Clone, Default)]
pub struct UnavailabilityTable {
    hard: HashMap<u32, HashSet<SlotId>>,
    preferred: HashMap<u32, HashSet<SlotId>>,
}

impl UnavailabilityTable {
    fn insert(&mut self, entry: &UnavailabilityInput) {
        let target = match entry.severity {
            Severity::Hard => &mut self.hard,
            Severity::Preferred => &mut self.preferred,
        };
        target.entry(entry.entity_id).or_default().insert(entry.slot_id);
    }

    #[inline]
    pub fn is_unavailable(&self, entity_id: u32, slot_id: SlotId, severity: Severity) -> bool {
        let table = match severity {
            Severity::Hard => &self.hard,
            Severity::Preferred => &self.preferred,
        };
        table
            .get(&entity_id)
            .is_some_and(|slots| slots.contains(&slot_id))
    }

    pub fn unavailable_slots(&self, entity_id: u32, severity: Severity) -> Option<&HashSet<SlotId>> {
        match severity {
            Severity::Hard => self.hard.get(&entity_id),
            Severity::Preferred => self.preferred.get(&entity_id),
        }
    }
}

/// Immutable snapshot shared by every island for the whole run.
#[derive(Debug, Clone)]
pub struct InputModel {
    slots: Vec<SlotInput>,
    slot_index: HashMap<SlotId, usize>,
    days: Vec<u32>,
    lectures: Vec<Lecture>,
    lecture_index: HashMap<LectureId, usize>,
    events: Vec<LectureEvent>,
    event_lecture: HashMap<EventId, LectureId>,
    event_groups: HashMap<EventId, Vec<GroupId>>,
    teachers: UnavailabilityTable,
    groups: UnavailabilityTable,
    rooms: UnavailabilityTable,
}

impl InputModel {
    /// Validate the snapshot and build every lookup eagerly.
    pub fn build(snapshot: InputSnapshot) -> Result<Self> {
        if snapshot.slots.is_empty() {
            return Err(SchedulerError::InvalidInput("no timeslots supplied".into()));
        }
        if snapshot.lectures.is_empty() {
            return Err(SchedulerError::InvalidInput("no lectures supplied".into()));
        }

        let mut slots = snapshot.slots;
        slots.sort_by_key(|s| (s.day, s.period, s.id));

        let mut slot_index = HashMap::with_capacity(slots.len());
        for (idx, slot) in slots.iter().enumerate() {
            if slot_index.insert(slot.id, idx).is_some() {
                return Err(SchedulerError::InvalidInput(format!(
                    "duplicate timeslot id {}",
                    slot.id
                )));
            }
        }

        let mut days: Vec<u32> = slots.iter().map(|s| s.day).collect();
        days.dedup();

        let mut lectures = Vec::with_capacity(snapshot.lectures.len());
        let mut lecture_index = HashMap::with_capacity(snapshot.lectures.len());
        let mut events = Vec::new();
        let mut event_lecture = HashMap::new();
        let mut event_groups = HashMap::new();

        for input in snapshot.lectures {
            if lecture_index.contains_key(&input.id) {
                return Err(SchedulerError::InvalidInput(format!(
                    "duplicate lecture id {}",
                    input.id
                )));
            }
            if input.occurrences == 0 {
                return Err(SchedulerError::InvalidInput(format!(
                    "lecture {} has zero occurrences",
                    input.id
                )));
            }

            let mut allowed_rooms = Vec::with_capacity(input.allowed_room_ids.len());
            for room in input.allowed_room_ids {
                if !allowed_rooms.contains(&room) {
                    allowed_rooms.push(room);
                }
            }
            if allowed_rooms.is_empty() {
                return Err(SchedulerError::InvalidInput(format!(
                    "lecture {} has no eligible room",
                    input.id
                )));
            }

            let mut group_ids = input.group_ids;
            group_ids.sort_unstable();
            group_ids.dedup();

            let mut locked: Vec<Option<(SlotId, RoomId)>> = vec![None; input.occurrences as usize];
            for placement in &input.locked {
                let Some(entry) = locked.get_mut(placement.occurrence as usize) else {
                    return Err(SchedulerError::InvalidInput(format!(
                        "lecture {} locks occurrence {} but has only {}",
                        input.id, placement.occurrence, input.occurrences
                    )));
                };
                if !slot_index.contains_key(&placement.slot_id) {
                    return Err(SchedulerError::InvalidInput(format!(
                        "lecture {} is locked to unknown timeslot {}",
                        input.id, placement.slot_id
                    )));
                }
                if !allowed_rooms.contains(&placement.room_id) {
                    return Err(SchedulerError::InvalidInput(format!(
                        "lecture {} is locked to room {} outside its allowed rooms",
                        input.id, placement.room_id
                    )));
                }
                *entry = Some((placement.slot_id, placement.room_id));
            }

            let lecture_idx = lectures.len();
            for (occurrence, pin) in locked.into_iter().enumerate() {
                let id = events.len() as EventId;
                event_lecture.insert(id, input.id);
                event_groups.insert(id, group_ids.clone());
                events.push(LectureEvent {
                    id,
                    lecture_idx,
                    occurrence: occurrence as u32,
                    locked: pin,
                });
            }

            lecture_index.insert(input.id, lecture_idx);
            lectures.push(Lecture {
                id: input.id,
                teacher_id: input.teacher_id,
                subject_id: input.subject_id,
                duration: input.duration,
                group_ids,
                allowed_rooms,
                elective_group: input.elective_group,
                difficulty: input.difficulty,
            });
        }

        let mut tables = [
            (snapshot.teacher_unavailability, UnavailabilityTable::default(), "teacher"),
            (snapshot.group_unavailability, UnavailabilityTable::default(), "group"),
            (snapshot.room_unavailability, UnavailabilityTable::default(), "room"),
        ];
        for (entries, table, label) in tables.iter_mut() {
            for entry in entries.iter() {
                if !slot_index.contains_key(&entry.slot_id) {
                    return Err(SchedulerError::InvalidInput(format!(
                        "{} {} unavailability references unknown timeslot {}",
                        label, entry.entity_id, entry.slot_id
                    )));
                }
                table.insert(entry);
            }
        }
        let [(_, teachers, _), (_, groups, _), (_, rooms, _)] = tables;

        Ok(Self {
            slots,
            slot_index,
            days,
            lectures,
            lecture_index,
            events,
            event_lecture,
            event_groups,
            teachers,
            groups,
            rooms,
        })
    }

    /// Timeslots ordered by (day, period).
    pub fn slots(&self) -> &[SlotInput] {
        &self.slots
    }

    pub fn slot(&self, slot_id: SlotId) -> Option<&SlotInput> {
        self.slot_index.get(&slot_id).map(|&idx| &self.slots[idx])
    }

    /// Distinct days in ascending order.
    pub fn days(&self) -> &[u32] {
        &self.days
    }

    pub fn lectures(&self) -> &[Lecture] {
        &self.lectures
    }

    pub fn lecture(&self, lecture_id: LectureId) -> Option<&Lecture> {
        self.lecture_index.get(&lecture_id).map(|&idx| &self.lectures[idx])
    }

    pub fn events(&self) -> &[LectureEvent] {
        &self.events
    }

    /// Number of genes in every chromosome of this run.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Lecture encoded by gene `gene_idx`.
    #[inline]
    pub fn lecture_for_gene(&self, gene_idx: usize) -> &Lecture {
        &self.lectures[self.events[gene_idx].lecture_idx]
    }

    pub fn lecture_of_event(&self, event_id: EventId) -> Option<LectureId> {
        self.event_lecture.get(&event_id).copied()
    }

    pub fn groups_of_event(&self, event_id: EventId) -> &[GroupId] {
        self.event_groups
            .get(&event_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn allowed_rooms(&self, lecture_id: LectureId) -> &[RoomId] {
        self.lecture(lecture_id)
            .map(|l| l.allowed_rooms.as_slice())
            .unwrap_or(&[])
    }

    pub fn teacher_unavailability(&self) -> &UnavailabilityTable {
        &self.teachers
    }

    pub fn group_unavailability(&self) -> &UnavailabilityTable {
        &self.groups
    }

    pub fn room_unavailability(&self) -> &UnavailabilityTable {
        &self.rooms
    }

    /// True when the lecture's teacher, every one of its groups and `room_id`
    /// are free of hard unavailability at `slot_id`.
    pub fn is_hard_available(&self, lecture: &Lecture, slot_id: SlotId, room_id: RoomId) -> bool {
        !self
            .teachers
            .is_unavailable(lecture.teacher_id, slot_id, Severity::Hard)
            && !lecture
                .group_ids
                .iter()
                .any(|&g| self.groups.is_unavailable(g, slot_id, Severity::Hard))
            && !self.rooms.is_unavailable(room_id, slot_id, Severity::Hard)
    }
}
