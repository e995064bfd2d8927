//! Startup configuration.
//!
//! Configuration is parsed once from RON into plain data structs, validated,
//! and frozen into a [`GameConfig`] that the simulation holds behind an
//! `Arc` for the rest of its life. Nothing here performs file IO; the server
//! crate reads the file and hands the text to [`GameConfig::from_ron_str`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::health::{HealthStage, HealthStageRow, HealthStageTable};
use crate::math::Millis;

/// Production data for one unit type.
///
/// # Example RON
///
/// ```ron
/// UnitProductionData(
///     id: "rifle_squad",
///     cost: (feedstock: 60, energy: 10),
///     build_time_ms: 5000,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProductionData {
    /// Unit type key buildings refer to.
    pub id: String,
    /// Resources reserved when production is queued.
    pub cost: Resources,
    /// Production time in milliseconds.
    pub build_time_ms: Millis,
}

/// Match-wide tuning values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Grace period after the match starts during which no win check runs.
    pub start_grace_ms: Millis,
    /// Delay between a winner being decided and the match ending.
    pub end_grace_ms: Millis,
    /// Time a dead unit lingers before it is removed.
    pub despawn_delay_ms: Millis,
    /// Maximum entries in one building's production queue.
    pub max_queue_len: usize,
    /// Balance every player starts with on connection.
    pub starting_resources: Resources,
    /// Health stage of newly created units.
    pub default_stage: HealthStage,
    /// Whether direct-position spawns are honoured at all.
    pub allow_direct_spawn: bool,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            start_grace_ms: 3000,
            end_grace_ms: 5000,
            despawn_delay_ms: 2000,
            max_queue_len: 5,
            starting_resources: Resources::new(200, 50),
            default_stage: HealthStage::Healthy,
            allow_direct_spawn: true,
        }
    }
}

/// Raw configuration as written in the data file.
///
/// # Example RON
///
/// ```ron
/// GameConfigData(
///     health_stages: [
///         (stage: Dead, speed_percent: 0),
///         (stage: Critical, speed_percent: 40),
///         (stage: Wounded, speed_percent: 60),
///         (stage: Grazed, speed_percent: 85),
///         (stage: Healthy, speed_percent: 100),
///     ],
///     minimum_cost: Some((feedstock: 50, energy: 0)),
///     units: [
///         (id: "rifle_squad", cost: (feedstock: 60, energy: 10), build_time_ms: 5000),
///     ],
///     rules: (start_grace_ms: 3000),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfigData {
    /// Stage to speed rows. Empty means no table is loaded.
    #[serde(default)]
    pub health_stages: Vec<HealthStageRow>,
    /// Floor for "can still afford a unit". Without one, a player can
    /// afford a unit while their available resources cover the cost of any
    /// configured unit type.
    #[serde(default)]
    pub minimum_cost: Option<Resources>,
    /// Production data per unit type.
    pub units: Vec<UnitProductionData>,
    /// Match tuning.
    #[serde(default)]
    pub rules: MatchRules,
}

/// Costs a player's available resources are checked against to decide
/// whether they can still field a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumCostConfig {
    /// Alternative floors. Meeting any one of them, in every kind, is
    /// enough.
    pub floors: Vec<Resources>,
}

impl MinimumCostConfig {
    /// Whether `available` covers at least one floor.
    #[must_use]
    pub fn is_affordable(&self, available: &Resources) -> bool {
        self.floors.iter().any(|floor| available.covers(floor))
    }
}

/// Validated production parameters for one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProduction {
    /// Resources reserved on enqueue.
    pub cost: Resources,
    /// Countdown length.
    pub build_time: Millis,
}

/// Frozen, validated configuration shared by the whole simulation.
#[derive(Debug, Clone)]
pub struct GameConfig {
    health_table: Option<HealthStageTable>,
    minimum_cost: MinimumCostConfig,
    units: BTreeMap<String, UnitProduction>,
    rules: MatchRules,
}

impl GameConfig {
    /// Parse and validate a RON document.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed RON and
    /// [`GameError::InvalidConfig`] for data that parses but is unusable.
    pub fn from_ron_str(source: &str, label: &str) -> Result<Self> {
        let data: GameConfigData = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: label.to_owned(),
            message: e.to_string(),
        })?;
        Self::from_data(data)
    }

    /// Validate already-parsed data.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] for duplicate unit ids, an empty
    /// unit list, a zero queue length, a `Dead` default stage, or a bad
    /// stage table.
    pub fn from_data(data: GameConfigData) -> Result<Self> {
        if data.units.is_empty() {
            return Err(GameError::InvalidConfig(
                "at least one unit type must be configured".to_owned(),
            ));
        }
        if data.rules.max_queue_len == 0 {
            return Err(GameError::InvalidConfig(
                "max_queue_len must be at least 1".to_owned(),
            ));
        }
        if data.rules.default_stage.is_dead() {
            return Err(GameError::InvalidConfig(
                "default_stage cannot be Dead".to_owned(),
            ));
        }

        let mut units = BTreeMap::new();
        for unit in &data.units {
            let production = UnitProduction {
                cost: unit.cost,
                build_time: unit.build_time_ms,
            };
            if units.insert(unit.id.clone(), production).is_some() {
                return Err(GameError::InvalidConfig(format!(
                    "unit type '{}' defined more than once",
                    unit.id
                )));
            }
        }

        let health_table = if data.health_stages.is_empty() {
            None
        } else {
            Some(HealthStageTable::from_rows(&data.health_stages)?)
        };

        let floors = match data.minimum_cost {
            Some(floor) => vec![floor],
            None => {
                let mut costs: Vec<Resources> = data.units.iter().map(|u| u.cost).collect();
                costs.sort_unstable_by_key(|c| (c.total(), c.feedstock));
                costs.dedup();
                costs
            }
        };

        Ok(Self {
            health_table,
            minimum_cost: MinimumCostConfig { floors },
            units,
            rules: data.rules,
        })
    }

    /// Stage speed table, if one was configured.
    #[must_use]
    pub fn health_table(&self) -> Option<&HealthStageTable> {
        self.health_table.as_ref()
    }

    /// Cheapest-unit floor used by the win-condition check.
    #[must_use]
    pub const fn minimum_cost(&self) -> &MinimumCostConfig {
        &self.minimum_cost
    }

    /// Production parameters for a unit type.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&UnitProduction> {
        self.units.get(id)
    }

    /// Configured unit type keys, sorted.
    pub fn unit_ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Match tuning values.
    #[must_use]
    pub const fn rules(&self) -> &MatchRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;

    const SAMPLE: &str = r#"
GameConfigData(
    health_stages: [
        (stage: Dead, speed_percent: 0),
        (stage: Critical, speed_percent: 40),
        (stage: Wounded, speed_percent: 60),
        (stage: Grazed, speed_percent: 85),
        (stage: Healthy, speed_percent: 100),
    ],
    units: [
        (id: "rifle_squad", cost: (feedstock: 60, energy: 10), build_time_ms: 5000),
        (id: "scout", cost: (feedstock: 30), build_time_ms: 2000),
    ],
    rules: (start_grace_ms: 1000, max_queue_len: 3),
)
"#;

    #[test]
    fn test_parse_sample() {
        let config = GameConfig::from_ron_str(SAMPLE, "sample").unwrap();
        assert_eq!(config.rules().start_grace_ms, 1000);
        assert_eq!(config.rules().max_queue_len, 3);
        // Unspecified rules keep their defaults.
        assert_eq!(config.rules().end_grace_ms, MatchRules::default().end_grace_ms);

        let rifle = config.unit("rifle_squad").unwrap();
        assert_eq!(rifle.cost, Resources::new(60, 10));
        assert_eq!(rifle.build_time, 5000);

        let table = config.health_table().unwrap();
        assert_eq!(table.speed_multiplier(HealthStage::Healthy), Fixed::from_num(1));
        assert_eq!(config.unit_ids().collect::<Vec<_>>(), vec!["rifle_squad", "scout"]);
    }

    #[test]
    fn test_minimum_cost_defaults_to_any_unit() {
        let config = GameConfig::from_ron_str(SAMPLE, "sample").unwrap();
        assert_eq!(
            config.minimum_cost().floors,
            vec![Resources::new(30, 0), Resources::new(60, 10)]
        );
        assert!(config.minimum_cost().is_affordable(&Resources::new(30, 0)));
        assert!(!config.minimum_cost().is_affordable(&Resources::new(29, 100)));
    }

    #[test]
    fn test_floor_covers_units_paid_in_different_kinds() {
        let config = GameConfig::from_ron_str(
            r#"GameConfigData(units: [
                (id: "scout", cost: (feedstock: 30), build_time_ms: 1000),
                (id: "drone", cost: (energy: 20), build_time_ms: 1000),
            ])"#,
            "inline",
        )
        .unwrap();
        let floor = config.minimum_cost();
        assert!(floor.is_affordable(&Resources::new(100, 0)));
        assert!(floor.is_affordable(&Resources::new(0, 20)));
        assert!(!floor.is_affordable(&Resources::new(29, 19)));
    }

    #[test]
    fn test_explicit_minimum_cost_is_the_only_floor() {
        let config = GameConfig::from_ron_str(
            r#"GameConfigData(
                minimum_cost: Some((feedstock: 50, energy: 5)),
                units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 1000)],
            )"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.minimum_cost().floors, vec![Resources::new(50, 5)]);
        assert!(!config.minimum_cost().is_affordable(&Resources::new(40, 10)));
    }

    #[test]
    fn test_dead_default_stage_rejected() {
        let result = GameConfig::from_ron_str(
            r#"GameConfigData(
                units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 1000)],
                rules: (default_stage: Dead),
            )"#,
            "inline",
        );
        assert!(matches!(result, Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_speed_percent_rejected() {
        let result = GameConfig::from_ron_str(
            r#"GameConfigData(
                health_stages: [
                    (stage: Dead, speed_percent: 0),
                    (stage: Critical, speed_percent: 40),
                    (stage: Wounded, speed_percent: 60),
                    (stage: Grazed, speed_percent: 85),
                    (stage: Healthy, speed_percent: 4000000000),
                ],
                units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 1000)],
            )"#,
            "inline",
        );
        assert!(matches!(result, Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_stage_table_is_allowed() {
        let config = GameConfig::from_ron_str(
            r#"GameConfigData(units: [(id: "a", cost: (feedstock: 1), build_time_ms: 1)])"#,
            "inline",
        )
        .unwrap();
        assert!(config.health_table().is_none());
    }

    #[test]
    fn test_malformed_ron_reports_label() {
        let err = GameConfig::from_ron_str("GameConfigData(units: [", "broken.ron").unwrap_err();
        match err {
            GameError::DataParseError { path, .. } => assert_eq!(path, "broken.ron"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let data = GameConfigData {
            health_stages: Vec::new(),
            minimum_cost: None,
            units: vec![
                UnitProductionData {
                    id: "a".into(),
                    cost: Resources::ZERO,
                    build_time_ms: 1,
                },
                UnitProductionData {
                    id: "a".into(),
                    cost: Resources::ZERO,
                    build_time_ms: 2,
                },
            ],
            rules: MatchRules::default(),
        };
        assert!(matches!(
            GameConfig::from_data(data),
            Err(GameError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_units_rejected() {
        let data = GameConfigData {
            health_stages: Vec::new(),
            minimum_cost: None,
            units: Vec::new(),
            rules: MatchRules::default(),
        };
        assert!(GameConfig::from_data(data).is_err());
    }
}
