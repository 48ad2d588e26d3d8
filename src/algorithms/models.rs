use serde::{Deserialize, Serialize};

use super::controller::StopReason;
use super::fitness::{QualityGrade, SoftBreakdown};

pub type LectureId = u32;
pub type EventId = u32;
pub type TeacherId = u32;
pub type SubjectId = u32;
pub type RoomId = u32;
pub type GroupId = u32;
pub type SlotId = u32;

// ============================================================================
// INPUT SNAPSHOT
// ============================================================================

/// Entity snapshot supplied once at job start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub lectures: Vec<LectureInput>,
    pub slots: Vec<SlotInput>,
    #[serde(default)]
    pub teacher_unavailability: Vec<UnavailabilityInput>,
    #[serde(default)]
    pub room_unavailability: Vec<UnavailabilityInput>,
    #[serde(default)]
    pub group_unavailability: Vec<UnavailabilityInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureInput {
    pub id: LectureId,
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
    /// Teaching hours per occurrence
    #[serde(default = "one")]
    pub duration: u32,
    #[serde(default = "one")]
    pub occurrences: u32,
    pub allowed_room_ids: Vec<RoomId>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
    /// Lectures sharing an elective group may run simultaneously for the same groups
    #[serde(default)]
    pub elective_group: Option<u32>,
    #[serde(default = "one")]
    pub difficulty: u32,
    #[serde(default)]
    pub locked: Vec<LockedPlacement>,
}

/// A manual assignment pinning one occurrence of a lecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPlacement {
    pub occurrence: u32,
    pub slot_id: SlotId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInput {
    pub id: SlotId,
    pub day: u32,
    pub period: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailabilityInput {
    pub entity_id: u32,
    pub slot_id: SlotId,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Hard,
    Preferred,
}

fn one() -> u32 {
    1
}

// ============================================================================
// ENCODING
// ============================================================================

/// One lecture occurrence assigned to a timeslot and a classroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gene {
    pub lecture_event_id: EventId,
    pub lecture_id: LectureId,
    pub timeslot_id: SlotId,
    pub classroom_id: RoomId,
    pub is_locked: bool,
}

/// A complete candidate timetable, one gene per lecture event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chromosome {
    pub genes: Vec<Gene>,
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

/// Constraint families, in the order repair visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    TeacherClash,
    GroupClash,
    RoomClash,
    TeacherUnavailable,
    GroupUnavailable,
    RoomUnavailable,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 6] = [
        ConstraintKind::TeacherClash,
        ConstraintKind::GroupClash,
        ConstraintKind::RoomClash,
        ConstraintKind::TeacherUnavailable,
        ConstraintKind::GroupUnavailable,
        ConstraintKind::RoomUnavailable,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ConstraintKind,
    pub severity: Severity,
    pub gene_indices: Vec<usize>,
}

// ============================================================================
// STATISTICS & REPORTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best_fitness: f64,
    pub hard_violations: usize,
    pub mutation_probability: Option<f64>,
    pub diversity: Option<f64>,
    pub stagnation: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub generation: usize,
    pub best_fitness: f64,
    pub progress: f32,
    pub stagnation: usize,
    pub mutation_probability: Option<f64>,
    pub diversity: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultStats {
    pub completion_rate: f64,
    pub hard_violations: usize,
    pub soft_violations: usize,
    pub best_fitness: f64,
    pub generations_completed: usize,
    pub quality_grade: QualityGrade,
    pub stop_reason: StopReason,
    pub elapsed_ms: u64,
    pub soft_breakdown: SoftBreakdown,
}

/// Final payload of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResult {
    pub assignments: Vec<Gene>,
    pub stats: ResultStats,
    pub history: Vec<GenerationStats>,
}
