/*!

The parameter bundle for a run, read from a JSON file. Reference tables are CSV files whose paths
are listed in the bundle and loaded by [`crate::tables`].

*/

use crate::{
    error::HpvError,
    infection::InfectionType,
    partnership::RelationshipType,
    HashSet,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

/// Whose concurrency probability decides whether an already-partnered man accepts a new
/// partnership.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyRule {
    /// The candidate man's own concurrency probability.
    #[default]
    Candidate,
    /// The concurrency probability of the woman initiating the partnership.
    Initiator,
}

/// How candidate partner ages are chosen for a woman.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerAgeModel {
    /// One exact age drawn from a Poisson with the age-specific mean.
    #[default]
    Poisson,
    /// Every age within one standard deviation of the age-specific mean.
    Band,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipParameters {
    /// Maximum duration is drawn as `12 * Poisson(mean_duration_years)` months.
    pub mean_duration_years: f64,
    /// Monthly sex acts are drawn once as `Poisson(mean_monthly_acts)`.
    pub mean_monthly_acts: f64,
}

fn default_instantaneous() -> RelationshipParameters {
    RelationshipParameters {
        mean_duration_years: 0.0,
        mean_monthly_acts: 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipParameterSet {
    pub marital: RelationshipParameters,
    pub casual: RelationshipParameters,
    pub short_term: RelationshipParameters,
    #[serde(default = "default_instantaneous")]
    pub instantaneous: RelationshipParameters,
}

impl RelationshipParameterSet {
    #[must_use]
    pub fn get(&self, relationship_type: RelationshipType) -> &RelationshipParameters {
        match relationship_type {
            RelationshipType::Marital => &self.marital,
            RelationshipType::Casual => &self.casual,
            RelationshipType::ShortTerm => &self.short_term,
            RelationshipType::Instantaneous => &self.instantaneous,
        }
    }
}

/// Probabilities that a new partnership of a previously single woman has each type. Whatever
/// they leave over is the probability of an instantaneous partnership.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormationProbabilities {
    pub marital: f64,
    pub casual: f64,
    pub short_term: f64,
}

impl FormationProbabilities {
    #[must_use]
    pub fn instantaneous(&self) -> f64 {
        (1.0 - self.marital - self.casual - self.short_term).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfectionParameters {
    pub infection_type: InfectionType,
    pub transmission_per_act: f64,
    /// Multiplier applied to `transmission_per_act` for a host who has cleared this type before.
    pub natural_immunity: f64,
    /// Probability that a member of the initial cohort starts out infected.
    #[serde(default)]
    pub initial_prevalence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablePaths {
    pub mortality: PathBuf,
    pub partner_age: PathBuf,
    pub partnership_formation: PathBuf,
    pub initial_population: PathBuf,
    pub clearance: PathBuf,
}

impl TablePaths {
    /// Resolves relative paths against `base_dir`, normally the directory of the parameter file.
    #[must_use]
    pub fn resolve(&self, base_dir: &Path) -> TablePaths {
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            }
        };
        TablePaths {
            mortality: resolve(&self.mortality),
            partner_age: resolve(&self.partner_age),
            partnership_formation: resolve(&self.partnership_formation),
            initial_population: resolve(&self.initial_population),
            clearance: resolve(&self.clearance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    pub seed: u64,
    pub cohort_size: usize,
    pub sim_years: u32,
    pub sexual_debut_age: u32,
    /// Women at or above this age no longer form partnerships.
    pub max_partnering_age: u32,
    pub concurrency_female: f64,
    pub concurrency_male: f64,
    pub relationships: RelationshipParameterSet,
    pub formation_probabilities: FormationProbabilities,
    pub infections: Vec<InfectionParameters>,
    #[serde(default)]
    pub concurrency_rule: ConcurrencyRule,
    #[serde(default)]
    pub partner_age_model: PartnerAgeModel,
    /// Row `k` of the initial population table holds people aged `k + initial_age_offset`.
    #[serde(default)]
    pub initial_age_offset: u32,
    /// Keep dissolved partnerships in an archive instead of dropping them.
    #[serde(default)]
    pub archive_dissolved: bool,
    #[serde(default)]
    pub tables: Option<TablePaths>,
}

fn check_probability(name: &str, value: f64) -> Result<(), HpvError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(HpvError::ConfigError(format!("{name} must be a probability in [0, 1], got {value}")))
    }
}

fn check_mean(name: &str, value: f64) -> Result<(), HpvError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(HpvError::ConfigError(format!("{name} must be a finite non-negative mean, got {value}")))
    }
}

impl Parameters {
    /// Total number of monthly steps in the run.
    #[must_use]
    pub fn sim_months(&self) -> u32 {
        self.sim_years * crate::clock::MONTHS_PER_YEAR
    }

    /// Number of people an initial population row with this proportion contributes.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cohort_count(&self, proportion: f64) -> usize {
        (proportion * self.cohort_size as f64).floor() as usize
    }

    #[must_use]
    pub fn infection(&self, infection_type: InfectionType) -> Option<&InfectionParameters> {
        self.infections
            .iter()
            .find(|infection| infection.infection_type == infection_type)
    }

    pub fn validate(&self) -> Result<(), HpvError> {
        if self.cohort_size == 0 {
            return Err(HpvError::ConfigError(String::from("cohort_size must be positive")));
        }
        if self.sim_years == 0 {
            return Err(HpvError::ConfigError(String::from("sim_years must be positive")));
        }
        if self.sexual_debut_age >= self.max_partnering_age {
            return Err(HpvError::ConfigError(format!(
                "sexual_debut_age ({}) must be below max_partnering_age ({})",
                self.sexual_debut_age, self.max_partnering_age
            )));
        }
        check_probability("concurrency_female", self.concurrency_female)?;
        check_probability("concurrency_male", self.concurrency_male)?;

        for relationship_type in RelationshipType::ALL {
            let relationship = self.relationships.get(relationship_type);
            check_mean(
                &format!("{relationship_type:?} mean_duration_years"),
                relationship.mean_duration_years,
            )?;
            check_mean(
                &format!("{relationship_type:?} mean_monthly_acts"),
                relationship.mean_monthly_acts,
            )?;
        }

        let formation = &self.formation_probabilities;
        check_probability("formation_probabilities.marital", formation.marital)?;
        check_probability("formation_probabilities.casual", formation.casual)?;
        check_probability("formation_probabilities.short_term", formation.short_term)?;
        let total = formation.marital + formation.casual + formation.short_term;
        // Allow for rounding in hand-written parameter files.
        if total > 1.0 + 1e-9 {
            return Err(HpvError::ConfigError(format!(
                "formation probabilities sum to {total}, which exceeds 1"
            )));
        }

        let mut seen = HashSet::default();
        for infection in &self.infections {
            if !seen.insert(infection.infection_type) {
                return Err(HpvError::ConfigError(format!(
                    "{} is configured more than once",
                    infection.infection_type
                )));
            }
            let name = infection.infection_type.to_string();
            check_probability(&format!("{name} transmission_per_act"), infection.transmission_per_act)?;
            check_probability(&format!("{name} natural_immunity"), infection.natural_immunity)?;
            check_probability(&format!("{name} initial_prevalence"), infection.initial_prevalence)?;
        }

        Ok(())
    }
}

/// Reads and validates a JSON parameter file.
pub fn load_parameters(path: &Path) -> Result<Parameters, HpvError> {
    let reader = BufReader::new(File::open(path)?);
    let parameters: Parameters = serde_json::from_reader(reader)?;
    parameters.validate()?;
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_parameters;
    use std::io::Write;

    const PARAMETER_JSON: &str = r#"{
        "seed": 1234,
        "cohort_size": 1000,
        "sim_years": 5,
        "sexual_debut_age": 15,
        "max_partnering_age": 65,
        "concurrency_female": 0.05,
        "concurrency_male": 0.1,
        "relationships": {
            "marital": { "mean_duration_years": 10, "mean_monthly_acts": 8 },
            "casual": { "mean_duration_years": 1, "mean_monthly_acts": 4 },
            "short_term": { "mean_duration_years": 0.5, "mean_monthly_acts": 6 }
        },
        "formation_probabilities": { "marital": 0.2, "casual": 0.4, "short_term": 0.3 },
        "infections": [
            { "infection_type": "HPV16", "transmission_per_act": 0.1, "natural_immunity": 0.5,
              "initial_prevalence": 0.02 },
            { "infection_type": "HPVoHR", "transmission_per_act": 0.08, "natural_immunity": 0.6 }
        ],
        "concurrency_rule": "initiator",
        "tables": {
            "mortality": "mortality.csv",
            "partner_age": "partner_age.csv",
            "partnership_formation": "formation.csv",
            "initial_population": "population.csv",
            "clearance": "/data/clearance.csv"
        }
    }"#;

    #[test]
    fn parses_parameter_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PARAMETER_JSON.as_bytes()).unwrap();

        let parameters = load_parameters(file.path()).unwrap();
        assert_eq!(parameters.seed, 1234);
        assert_eq!(parameters.sim_months(), 60);
        assert_eq!(parameters.concurrency_rule, ConcurrencyRule::Initiator);
        assert_eq!(parameters.partner_age_model, PartnerAgeModel::Poisson);
        assert_eq!(parameters.initial_age_offset, 0);
        assert_eq!(parameters.relationships.instantaneous, default_instantaneous());
        assert!((parameters.formation_probabilities.instantaneous() - 0.1).abs() < 1e-9);

        let hpv16 = parameters.infection(InfectionType::Hpv16).unwrap();
        assert!((hpv16.initial_prevalence - 0.02).abs() < 1e-12);
        let other = parameters.infection(InfectionType::HpvOhr).unwrap();
        assert_eq!(other.initial_prevalence, 0.0);
        assert!(parameters.infection(InfectionType::Hpv18).is_none());
    }

    #[test]
    fn table_paths_resolve_against_base_dir() {
        let parameters: Parameters = serde_json::from_str(PARAMETER_JSON).unwrap();
        let paths = parameters.tables.unwrap().resolve(Path::new("/runs/run001"));
        assert_eq!(paths.mortality, PathBuf::from("/runs/run001/mortality.csv"));
        assert_eq!(paths.clearance, PathBuf::from("/data/clearance.csv"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = PARAMETER_JSON.replace("\"seed\": 1234", "\"seed\": 1234, \"cycle\": 3");
        assert!(serde_json::from_str::<Parameters>(&json).is_err());
    }

    #[test]
    fn formation_probabilities_must_not_exceed_one() {
        let mut parameters = test_parameters();
        parameters.formation_probabilities = FormationProbabilities {
            marital: 0.5,
            casual: 0.4,
            short_term: 0.2,
        };
        assert!(matches!(parameters.validate(), Err(HpvError::ConfigError(_))));
    }

    #[test]
    fn probabilities_must_be_in_range() {
        let mut parameters = test_parameters();
        parameters.concurrency_male = 1.5;
        assert!(parameters.validate().is_err());

        let mut parameters = test_parameters();
        parameters.infections[0].natural_immunity = -0.1;
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn duplicate_infection_types_are_rejected() {
        let mut parameters = test_parameters();
        let duplicate = parameters.infections[0];
        parameters.infections.push(duplicate);
        assert!(matches!(parameters.validate(), Err(HpvError::ConfigError(_))));
    }

    #[test]
    fn debut_must_precede_partnering_limit() {
        let mut parameters = test_parameters();
        parameters.sexual_debut_age = parameters.max_partnering_age;
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut parameters = test_parameters();
        parameters.relationships.casual.mean_duration_years = -1.0;
        assert!(parameters.validate().is_err());
    }
}
