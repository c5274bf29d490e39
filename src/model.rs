use crate::{
    context::Context,
    data_plugin::DataPlugin,
    error::HpvError,
    formation::MAX_PARTNER_AGE,
    infection::InfectionType,
    parameters::{InfectionParameters, Parameters, RelationshipParameters},
    partnership::RelationshipType,
    people::Sex,
    random::ContextRandomExt,
    tables::ReferenceTables,
};
use log::info;
use std::rc::Rc;

/// The validated parameter bundle and reference tables for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    pub parameters: Parameters,
    pub tables: ReferenceTables,
}

impl ModelData {
    /// Validates the parameters on their own and against the tables. Every configuration problem
    /// the model can detect up front is reported here, before any step runs.
    pub fn new(parameters: Parameters, tables: ReferenceTables) -> Result<Self, HpvError> {
        parameters.validate()?;

        for infection in &parameters.infections {
            if !tables.clearance().has_curve(infection.infection_type) {
                return Err(HpvError::ConfigError(format!(
                    "{} is configured but the clearance table has no column for it",
                    infection.infection_type
                )));
            }
        }

        for age in parameters.sexual_debut_age..parameters.max_partnering_age {
            tables.formation_rate(Sex::Female, age)?;
            let partner_age = tables.partner_age(age)?;
            if partner_age.mean > f64::from(MAX_PARTNER_AGE) {
                return Err(HpvError::ConfigError(format!(
                    "mean partner age {} for women aged {age} exceeds the supported maximum of {MAX_PARTNER_AGE}",
                    partner_age.mean
                )));
            }
        }

        let oldest_reachable = oldest_reachable_age(&parameters, &tables);
        for sex in Sex::ALL {
            tables.mortality(sex, oldest_reachable).map_err(|_| {
                HpvError::TableError(format!(
                    "mortality table stops before age {oldest_reachable}, which the run can reach"
                ))
            })?;
        }

        Ok(ModelData { parameters, tables })
    }

    pub fn infection(&self, infection_type: InfectionType) -> Result<&InfectionParameters, HpvError> {
        self.parameters
            .infection(infection_type)
            .ok_or_else(|| HpvError::ConfigError(format!("{infection_type} is not configured")))
    }

    #[must_use]
    pub fn relationship(&self, relationship_type: RelationshipType) -> &RelationshipParameters {
        self.parameters.relationships.get(relationship_type)
    }

    #[must_use]
    pub fn concurrency(&self, sex: Sex) -> f64 {
        match sex {
            Sex::Female => self.parameters.concurrency_female,
            Sex::Male => self.parameters.concurrency_male,
        }
    }
}

/// The oldest age anyone can hold during the run: the oldest populated row of the initial
/// population table, shifted by the age offset, plus one year per simulated year. Newborns start
/// at 0 and stay below this.
fn oldest_reachable_age(parameters: &Parameters, tables: &ReferenceTables) -> u32 {
    let oldest_initial = tables
        .initial_population()
        .iter()
        .filter(|row| parameters.cohort_count(row.male) > 0 || parameters.cohort_count(row.female) > 0)
        .map(|row| row.age + parameters.initial_age_offset)
        .max()
        .unwrap_or(0);
    oldest_initial + parameters.sim_years
}

#[derive(Default)]
struct ModelPlugin {
    model: Option<Rc<ModelData>>,
}

impl DataPlugin for ModelPlugin {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &ModelPlugin::default;
}

pub trait ContextModelExt {
    /// Stores the model for this run and seeds the random stream with its seed.
    fn load_model(&mut self, model: ModelData);

    /// The loaded model. Passes hold this `Rc` while they mutate the rest of the context.
    fn model(&self) -> Result<Rc<ModelData>, HpvError>;
}

impl ContextModelExt for Context {
    fn load_model(&mut self, model: ModelData) {
        info!(
            "loading model: cohort size {}, {} years, seed {}",
            model.parameters.cohort_size, model.parameters.sim_years, model.parameters.seed
        );
        self.init_random(model.parameters.seed);
        self.get_data_container_mut::<ModelPlugin>().model = Some(Rc::new(model));
    }

    fn model(&self) -> Result<Rc<ModelData>, HpvError> {
        self.get_data_container::<ModelPlugin>()
            .and_then(|plugin| plugin.model.clone())
            .ok_or_else(|| HpvError::ConfigError(String::from("no model has been loaded")))
    }
}
