use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PolicyError;
use crate::models::Course;

pub const CONFIG_ENV: &str = "CLAN_POLICY_CONFIG";
pub const DEFAULT_ALERT_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTier {
    pub name: String,
    /// Cumulative attendances required to hold this rank. `None` only on the
    /// final tier, which then cannot be reached by attendance.
    #[serde(default)]
    pub threshold: Option<u32>,
}

impl RankTier {
    pub fn new(name: &str, threshold: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            threshold,
        }
    }
}

/// Ordered rank progression. The last tier is the maximum rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankTable {
    tiers: Vec<RankTier>,
}

impl RankTable {
    pub fn new(tiers: Vec<RankTier>) -> Result<Self, PolicyError> {
        if tiers.is_empty() {
            return Err(PolicyError::EmptyRankTable);
        }

        let last = tiers.len() - 1;
        let mut previous: Option<u32> = None;

        for (index, tier) in tiers.iter().enumerate() {
            let duplicate = tiers[..index]
                .iter()
                .any(|earlier| names_match(&earlier.name, &tier.name));
            if duplicate {
                return Err(PolicyError::DuplicateRank(tier.name.clone()));
            }

            match tier.threshold {
                Some(threshold) => {
                    if let Some(prev) = previous {
                        if threshold < prev {
                            return Err(PolicyError::DecreasingThreshold {
                                rank: tier.name.clone(),
                                threshold,
                                previous: prev,
                            });
                        }
                    }
                    previous = Some(threshold);
                }
                None if index != last => {
                    return Err(PolicyError::MissingThreshold(tier.name.clone()));
                }
                None => {}
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[RankTier] {
        &self.tiers
    }

    pub fn lowest(&self) -> &RankTier {
        &self.tiers[0]
    }

    pub fn position(&self, rank: &str) -> Option<usize> {
        self.tiers
            .iter()
            .position(|tier| names_match(&tier.name, rank))
    }

    pub fn is_maximum_index(&self, index: usize) -> bool {
        index + 1 == self.tiers.len()
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                RankTier::new("Recruit", Some(0)),
                RankTier::new("Private", Some(10)),
                RankTier::new("Corporal", Some(20)),
                RankTier::new("Sergeant", Some(30)),
                RankTier::new("Lieutenant", Some(50)),
                RankTier::new("Captain", Some(80)),
                RankTier::new("Commander", None),
            ],
        }
    }
}

fn names_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// When course alerts fire, and which course wins when several qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoursePolicy {
    alert_threshold: u32,
    precedence: Vec<Course>,
}

impl CoursePolicy {
    pub fn new(alert_threshold: u32, precedence: Vec<Course>) -> Result<Self, PolicyError> {
        for (index, course) in precedence.iter().enumerate() {
            if precedence[..index].contains(course) {
                return Err(PolicyError::DuplicateCourse(*course));
            }
        }
        if let Some(missing) = Course::ALL.iter().find(|c| !precedence.contains(c)) {
            return Err(PolicyError::MissingCourse(*missing));
        }

        Ok(Self {
            alert_threshold,
            precedence,
        })
    }

    pub fn alert_threshold(&self) -> u32 {
        self.alert_threshold
    }

    pub fn precedence(&self) -> &[Course] {
        &self.precedence
    }
}

impl Default for CoursePolicy {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            precedence: Course::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyConfig {
    pub ranks: RankTable,
    pub courses: CoursePolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    ranks: Option<Vec<RankTier>>,
    courses: Option<CoursesFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoursesFile {
    alert_threshold: Option<u32>,
    precedence: Option<Vec<Course>>,
}

impl PolicyConfig {
    /// Loads the policy from `path`, then `CLAN_POLICY_CONFIG`, then built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let Some(path) = path else {
            info!("no policy file configured, using built-in rank table");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("invalid policy file {}", path.display()))?;
        info!(
            path = %path.display(),
            ranks = config.ranks.tiers().len(),
            "loaded policy file"
        );
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let file: PolicyFile = toml::from_str(raw)?;

        let ranks = match file.ranks {
            Some(tiers) => RankTable::new(tiers)?,
            None => {
                debug!("policy file has no ranks, keeping the default table");
                RankTable::default()
            }
        };

        let courses_file = file.courses.unwrap_or_default();
        let courses = CoursePolicy::new(
            courses_file
                .alert_threshold
                .unwrap_or(DEFAULT_ALERT_THRESHOLD),
            courses_file
                .precedence
                .unwrap_or_else(|| Course::ALL.to_vec()),
        )?;

        Ok(Self { ranks, courses })
    }
}
