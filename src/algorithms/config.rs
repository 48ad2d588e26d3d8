use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Fast,
    #[default]
    Balanced,
    Thorough,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStrategy {
    #[default]
    Best,
    Random,
    Diverse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverStrategy {
    #[default]
    Uniform,
    SinglePoint,
}

/// The fixed set of soft constraints scored by the fitness function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftConstraint {
    IdleTime,
    DailyDistribution,
    ConsecutiveLectures,
    TeacherDailyOverload,
    TeacherWeeklyOverload,
    CognitiveLoad,
    SubjectRepetition,
    PreferredUnavailability,
}

impl SoftConstraint {
    pub const ALL: [SoftConstraint; 8] = [
        SoftConstraint::IdleTime,
        SoftConstraint::DailyDistribution,
        SoftConstraint::ConsecutiveLectures,
        SoftConstraint::TeacherDailyOverload,
        SoftConstraint::TeacherWeeklyOverload,
        SoftConstraint::CognitiveLoad,
        SoftConstraint::SubjectRepetition,
        SoftConstraint::PreferredUnavailability,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One weight per [`SoftConstraint`], indexed by the enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftWeights([f64; 8]);

impl SoftWeights {
    pub fn get(&self, kind: SoftConstraint) -> f64 {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: SoftConstraint, weight: f64) {
        self.0[kind.index()] = weight;
    }

    pub fn uniform(weight: f64) -> Self {
        Self([weight; 8])
    }
}

impl Default for SoftWeights {
    fn default() -> Self {
        let mut weights = Self::uniform(0.0);
        weights.set(SoftConstraint::IdleTime, 3.0);
        weights.set(SoftConstraint::DailyDistribution, 2.0);
        weights.set(SoftConstraint::ConsecutiveLectures, 1.0);
        weights.set(SoftConstraint::TeacherDailyOverload, 5.0);
        weights.set(SoftConstraint::TeacherWeeklyOverload, 5.0);
        weights.set(SoftConstraint::CognitiveLoad, 2.0);
        weights.set(SoftConstraint::SubjectRepetition, 4.0);
        weights.set(SoftConstraint::PreferredUnavailability, 10.0);
        weights
    }
}

/// Thresholds the soft constraints measure against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftLimits {
    pub max_teacher_daily_hours: u32,
    pub max_teacher_weekly_hours: u32,
    pub max_daily_cognitive_load: u32,
    pub max_same_subject_per_day: u32,
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self {
            max_teacher_daily_hours: 6,
            max_teacher_weekly_hours: 20,
            max_daily_cognitive_load: 12,
            max_same_subject_per_day: 2,
        }
    }
}

/// Resolved run configuration; immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub population_size: usize,
    pub elite_count: usize,
    pub tournament_size: usize,
    pub heuristic_init_ratio: f64,
    pub max_generations: usize,
    pub max_execution_time_ms: u64,
    pub max_stagnant_generations: usize,
    pub target_fitness: f64,
    pub crossover_probability: f64,
    pub crossover_strategy: CrossoverStrategy,
    pub mutation_probability: f64,
    pub swap_mutation_ratio: f64,
    pub adaptive_mutation: bool,
    pub track_diversity: bool,
    pub soft_weights: SoftWeights,
    pub soft_limits: SoftLimits,
    pub num_islands: usize,
    pub migration_interval: usize,
    pub migration_size: usize,
    pub migration_strategy: MigrationStrategy,
    pub progress_interval_ms: u64,
    pub seed: Option<u64>,
}

/// Island count used when none is configured: one core is left to the supervisor.
pub fn default_island_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            elite_count: 2,
            tournament_size: 3,
            heuristic_init_ratio: 0.3,
            max_generations: 1000,
            max_execution_time_ms: 60_000,
            max_stagnant_generations: 200,
            target_fitness: 0.0,
            crossover_probability: 0.8,
            crossover_strategy: CrossoverStrategy::Uniform,
            mutation_probability: 0.1,
            swap_mutation_ratio: 0.9,
            adaptive_mutation: true,
            track_diversity: true,
            soft_weights: SoftWeights::default(),
            soft_limits: SoftLimits::default(),
            num_islands: default_island_count(),
            migration_interval: 25,
            migration_size: 2,
            migration_strategy: MigrationStrategy::Best,
            progress_interval_ms: 250,
            seed: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_preset(preset: Preset) -> Self {
        let base = Self::default();
        match preset {
            Preset::Balanced => base,
            Preset::Fast => Self {
                population_size: 50,
                max_generations: 300,
                max_execution_time_ms: 15_000,
                max_stagnant_generations: 75,
                num_islands: base.num_islands.min(2),
                migration_interval: 15,
                ..base
            },
            Preset::Thorough => Self {
                population_size: 200,
                elite_count: 4,
                tournament_size: 4,
                max_generations: 3000,
                max_execution_time_ms: 300_000,
                max_stagnant_generations: 500,
                migration_interval: 40,
                migration_size: 4,
                migration_strategy: MigrationStrategy::Diverse,
                ..base
            },
        }
    }

    /// Defaults ← preset ← overrides, then validation.
    pub fn resolve(request: &ConfigRequest) -> Result<Self> {
        if !request.unknown.is_empty() {
            let keys: Vec<&str> = request.unknown.keys().map(String::as_str).collect();
            return Err(SchedulerError::InvalidConfig(format!(
                "unknown configuration keys: {}",
                keys.join(", ")
            )));
        }
        let mut config = Self::from_preset(request.preset.unwrap_or_default());
        request.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(SchedulerError::InvalidConfig(msg))
        }
        fn unit(name: &str, value: f64) -> Result<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                invalid(format!("{} must be within [0, 1], got {}", name, value))
            }
        }

        if self.population_size < 2 {
            return invalid(format!(
                "population_size must be at least 2, got {}",
                self.population_size
            ));
        }
        if self.elite_count >= self.population_size {
            return invalid("elite_count must be below population_size".into());
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return invalid("tournament_size must be within [1, population_size]".into());
        }
        unit("heuristic_init_ratio", self.heuristic_init_ratio)?;
        unit("crossover_probability", self.crossover_probability)?;
        unit("mutation_probability", self.mutation_probability)?;
        unit("swap_mutation_ratio", self.swap_mutation_ratio)?;
        if self.max_generations == 0 {
            return invalid("max_generations must be at least 1".into());
        }
        if self.max_execution_time_ms == 0 {
            return invalid("max_execution_time_ms must be at least 1".into());
        }
        if !self.target_fitness.is_finite() {
            return invalid("target_fitness must be finite".into());
        }
        if self.num_islands == 0 {
            return invalid("num_islands must be at least 1".into());
        }
        if self.migration_interval == 0 {
            return invalid("migration_interval must be at least 1".into());
        }
        if self.migration_size >= self.population_size {
            return invalid("migration_size must be below population_size".into());
        }
        for kind in SoftConstraint::ALL {
            let weight = self.soft_weights.get(kind);
            if !weight.is_finite() || weight < 0.0 {
                return invalid(format!("weight for {:?} must be finite and non-negative", kind));
            }
        }
        Ok(())
    }
}

/// User-supplied overrides; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub population_size: Option<usize>,
    pub elite_count: Option<usize>,
    pub tournament_size: Option<usize>,
    pub heuristic_init_ratio: Option<f64>,
    pub max_generations: Option<usize>,
    pub max_execution_time_ms: Option<u64>,
    pub max_stagnant_generations: Option<usize>,
    pub target_fitness: Option<f64>,
    pub crossover_probability: Option<f64>,
    pub crossover_strategy: Option<CrossoverStrategy>,
    pub mutation_probability: Option<f64>,
    pub swap_mutation_ratio: Option<f64>,
    pub adaptive_mutation: Option<bool>,
    pub track_diversity: Option<bool>,
    pub soft_weights: Option<BTreeMap<SoftConstraint, f64>>,
    pub soft_limits: Option<SoftLimits>,
    pub num_islands: Option<usize>,
    pub migration_interval: Option<usize>,
    pub migration_size: Option<usize>,
    pub migration_strategy: Option<MigrationStrategy>,
    pub progress_interval_ms: Option<u64>,
    pub seed: Option<u64>,
}

macro_rules! apply_overrides {
    ($src:expr, $dst:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $src.$field {
                $dst.$field = value;
            }
        )+
    };
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut SchedulerConfig) {
        apply_overrides!(
            self,
            config,
            population_size,
            elite_count,
            tournament_size,
            heuristic_init_ratio,
            max_generations,
            max_execution_time_ms,
            max_stagnant_generations,
            target_fitness,
            crossover_probability,
            crossover_strategy,
            mutation_probability,
            swap_mutation_ratio,
            adaptive_mutation,
            track_diversity,
            soft_limits,
            num_islands,
            migration_interval,
            migration_size,
            migration_strategy,
            progress_interval_ms,
        );
        if let Some(weights) = &self.soft_weights {
            for (&kind, &weight) in weights {
                config.soft_weights.set(kind, weight);
            }
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

/// What a caller sends to start a run: an optional preset plus overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default, flatten)]
    pub overrides: ConfigOverrides,
    /// Keys matching no option; a non-empty map fails resolution
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl ConfigRequest {
    pub fn preset(preset: Preset) -> Self {
        Self {
            preset: Some(preset),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough] {
            assert!(SchedulerConfig::from_preset(preset).validate().is_ok());
        }
    }

    #[test]
    fn test_overrides_win_over_preset() {
        let request = ConfigRequest {
            preset: Some(Preset::Fast),
            overrides: ConfigOverrides {
                population_size: Some(64),
                seed: Some(7),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = SchedulerConfig::resolve(&request).unwrap();
        assert_eq!(config.population_size, 64);
        assert_eq!(config.max_generations, 300);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_weight_overrides_by_kind() {
        let json = r#"{ "preset": "thorough", "soft_weights": { "idle_time": 9.5 } }"#;
        let request: ConfigRequest = serde_json::from_str(json).unwrap();
        let config = SchedulerConfig::resolve(&request).unwrap();
        assert_eq!(config.soft_weights.get(SoftConstraint::IdleTime), 9.5);
        assert_eq!(config.soft_weights.get(SoftConstraint::SubjectRepetition), 4.0);
        assert_eq!(config.population_size, 200);
    }

    #[test]
    fn test_unknown_weight_name_is_rejected() {
        let json = r#"{ "soft_weights": { "idel_time": 1.0 } }"#;
        assert!(serde_json::from_str::<ConfigRequest>(json).is_err());
    }

    #[test]
    fn test_misspelled_option_is_rejected() {
        let json = r#"{ "preset": "fast", "populaton_size": 40, "seed": 3 }"#;
        let request: ConfigRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.overrides.seed, Some(3));
        assert!(request.unknown.contains_key("populaton_size"));
        assert_eq!(
            SchedulerConfig::resolve(&request),
            Err(SchedulerError::InvalidConfig(
                "unknown configuration keys: populaton_size".to_string()
            ))
        );
    }

    #[test]
    fn test_validation_failures() {
        let bad = [
            ConfigOverrides {
                elite_count: Some(100),
                ..Default::default()
            },
            ConfigOverrides {
                mutation_probability: Some(1.5),
                ..Default::default()
            },
            ConfigOverrides {
                num_islands: Some(0),
                ..Default::default()
            },
            ConfigOverrides {
                migration_size: Some(100),
                ..Default::default()
            },
        ];
        for overrides in bad {
            let request = ConfigRequest {
                overrides,
                ..Default::default()
            };
            assert!(matches!(
                SchedulerConfig::resolve(&request),
                Err(SchedulerError::InvalidConfig(_))
            ));
        }
    }
}
