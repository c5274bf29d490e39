/*!

Infections and their natural history.

An [`Infection`] starts with its timer at 1 when acquired. Every month the host survives, the
infection either clears, with the probability tabulated for its type at the current timer value,
or its timer advances. A cleared infection moves into the host's cleared map and stays there for
good, where it discounts the probability of being reinfected with the same type.

*/

use crate::{
    context::Context,
    error::HpvError,
    model::ModelData,
    parameters::InfectionParameters,
    people::{ContextPeopleExt, ContextPeopleExtInternal, Individual, PersonId},
    random::{ContextRandomExt, SimulationRng},
    surveillance::ContextSurveillanceExt,
    tables::ReferenceTables,
};
use log::trace;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum InfectionType {
    #[serde(rename = "HPV16")]
    Hpv16,
    #[serde(rename = "HPV18")]
    Hpv18,
    #[serde(rename = "HPV31")]
    Hpv31,
    #[serde(rename = "HPV33")]
    Hpv33,
    #[serde(rename = "HPV45")]
    Hpv45,
    #[serde(rename = "HPV52")]
    Hpv52,
    #[serde(rename = "HPV58")]
    Hpv58,
    /// Other high-risk types.
    #[serde(rename = "HPVoHR")]
    HpvOhr,
    /// Low-risk types.
    #[serde(rename = "HPVLR")]
    HpvLr,
}

impl InfectionType {
    pub const ALL: [InfectionType; 9] = [
        InfectionType::Hpv16,
        InfectionType::Hpv18,
        InfectionType::Hpv31,
        InfectionType::Hpv33,
        InfectionType::Hpv45,
        InfectionType::Hpv52,
        InfectionType::Hpv58,
        InfectionType::HpvOhr,
        InfectionType::HpvLr,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            InfectionType::Hpv16 => "HPV16",
            InfectionType::Hpv18 => "HPV18",
            InfectionType::Hpv31 => "HPV31",
            InfectionType::Hpv33 => "HPV33",
            InfectionType::Hpv45 => "HPV45",
            InfectionType::Hpv52 => "HPV52",
            InfectionType::Hpv58 => "HPV58",
            InfectionType::HpvOhr => "HPVoHR",
            InfectionType::HpvLr => "HPVLR",
        }
    }
}

impl Display for InfectionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InfectionType {
    type Err = HpvError;

    /// Parses a type name as it appears in table headers. Case is ignored.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim();
        InfectionType::ALL
            .into_iter()
            .find(|infection_type| infection_type.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| HpvError::TableError(format!("unknown infection type {name:?}")))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct InfectionId(pub(crate) u64);

impl Display for InfectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Infection {}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Infection {
    infection_type: InfectionType,
    /// Months since acquisition, starting at 1.
    timer: u32,
    age_at_acquisition: u32,
}

impl Infection {
    #[must_use]
    pub fn acquire(infection_type: InfectionType, age: u32) -> Self {
        Infection {
            infection_type,
            timer: 1,
            age_at_acquisition: age,
        }
    }

    #[must_use]
    pub fn infection_type(&self) -> InfectionType {
        self.infection_type
    }

    #[must_use]
    pub fn timer(&self) -> u32 {
        self.timer
    }

    #[must_use]
    pub fn age_at_acquisition(&self) -> u32 {
        self.age_at_acquisition
    }

    /// The probability that this infection clears this month. Reading past the end of the
    /// tabulated timer range is an error, not a clamp.
    pub fn clearance_probability(&self, tables: &ReferenceTables) -> Result<f64, HpvError> {
        tables.clearance_probability(self.infection_type, self.timer)
    }

    pub(crate) fn advance_timer(&mut self) {
        self.timer += 1;
    }
}

/// The per-act probability that `host` acquires an infection of the type described by
/// `parameters`, discounted by natural immunity if the host has cleared that type before.
#[must_use]
pub fn effective_transmission_probability(parameters: &InfectionParameters, host: &Individual) -> f64 {
    if host.has_cleared_infection(parameters.infection_type) {
        parameters.transmission_per_act * parameters.natural_immunity
    } else {
        parameters.transmission_per_act
    }
}

pub trait ContextInfectionExt {
    /// Gives `host` a new infection of `infection_type` with its timer at 1. Returns `None` if the
    /// host is unknown or already holds an active infection of that type.
    fn acquire_infection(&mut self, host: PersonId, infection_type: InfectionType) -> Option<InfectionId>;

    /// Runs up to `sex_acts` Bernoulli trials at the effective transmission probability. The first
    /// success infects `host` and ends the trials. Returns whether a transmission happened.
    fn attempt_transmission(
        &mut self,
        model: &ModelData,
        infection_type: InfectionType,
        host: PersonId,
        sex_acts: u32,
    ) -> Result<bool, HpvError>;

    /// One month of natural history for every active infection `person` holds: each either
    /// clears or advances its timer.
    fn run_infection_history(&mut self, model: &ModelData, person: PersonId) -> Result<(), HpvError>;
}

impl ContextInfectionExt for Context {
    fn acquire_infection(&mut self, host: PersonId, infection_type: InfectionType) -> Option<InfectionId> {
        let age = self.get_person(host)?.age();
        let infection_id = self.next_infection_id();
        let person = self.get_person_mut(host)?;
        if person.add_infection(infection_id, Infection::acquire(infection_type, age)) {
            Some(infection_id)
        } else {
            None
        }
    }

    fn attempt_transmission(
        &mut self,
        model: &ModelData,
        infection_type: InfectionType,
        host: PersonId,
        sex_acts: u32,
    ) -> Result<bool, HpvError> {
        let parameters = model.infection(infection_type)?;
        let Some(person) = self.get_person(host) else {
            return Ok(false);
        };
        if !person.is_alive() || person.has_active_infection(infection_type) {
            return Ok(false);
        }
        let age = person.age();
        let probability = effective_transmission_probability(parameters, person);

        for _ in 0..sex_acts {
            if self.sample_bool::<SimulationRng>(probability) {
                if let Some(infection_id) = self.acquire_infection(host, infection_type) {
                    trace!("{host} acquired {infection_type} ({infection_id})");
                    self.record_incident(age, infection_type);
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn run_infection_history(&mut self, model: &ModelData, person: PersonId) -> Result<(), HpvError> {
        let infections: Vec<(InfectionId, Infection)> = match self.get_person(person) {
            Some(individual) => individual
                .active_infections()
                .map(|(id, infection)| (*id, *infection))
                .collect(),
            None => return Ok(()),
        };

        for (infection_id, infection) in infections {
            let probability = infection.clearance_probability(&model.tables)?;
            let cleared = self.sample_bool::<SimulationRng>(probability);
            let Some(individual) = self.get_person_mut(person) else {
                return Ok(());
            };
            if cleared {
                individual.clear_infection(infection_id);
                trace!("{person} cleared {} ({infection_id})", infection.infection_type());
            } else {
                individual.advance_infection(infection_id);
            }
        }
        Ok(())
    }
}
