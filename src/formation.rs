/*!

The monthly partnership formation pass.

Each alive woman aged from the sexual debut age up to (not including) the maximum partnering age
gets one formation draw a month: against her age-specific formation rate if she is single, or
against her concurrency probability if she already has a partner. On success she looks for a
partner among the men in the partner registry:

1. Pick candidate ages. Under [`PartnerAgeModel::Poisson`] one age is drawn from a Poisson with
   the age-specific mean, redrawn while it exceeds [`MAX_PARTNER_AGE`]. Under
   [`PartnerAgeModel::Band`] every age within one standard deviation of the mean is used.
2. Shuffle the registered men of those ages.
3. Take the first man who is alive and not already her partner. A single man always accepts; a
   partnered man accepts with a concurrency draw and the scan moves on if he declines.
4. Draw the relationship type. A woman who was single chooses among all four types; a woman
   forming a concurrent partnership chooses between casual and instantaneous only.

*/

use crate::{
    context::Context,
    error::HpvError,
    model::ModelData,
    parameters::{ConcurrencyRule, FormationProbabilities, PartnerAgeModel},
    partnership::{ContextPartnershipExt, PartnershipId, RelationshipType},
    people::{ContextPeopleExt, PersonId, Sex},
    random::{ContextRandomExt, SimulationRng},
    registry::ContextRegistryExt,
};
use log::trace;

/// The oldest partner age the partner registry is searched for.
pub const MAX_PARTNER_AGE: u32 = 75;

/// Maps a uniform draw in `[0, 1)` to a relationship type. Thresholds are cumulative in the
/// order casual, marital, short term; the remainder is instantaneous. Concurrent partnerships
/// are casual with the casual probability and instantaneous otherwise.
#[must_use]
pub fn relationship_type_for_draw(
    probabilities: &FormationProbabilities,
    single: bool,
    draw: f64,
) -> RelationshipType {
    if !single {
        return if draw < probabilities.casual {
            RelationshipType::Casual
        } else {
            RelationshipType::Instantaneous
        };
    }

    let mut threshold = probabilities.casual;
    if draw < threshold {
        return RelationshipType::Casual;
    }
    threshold += probabilities.marital;
    if draw < threshold {
        return RelationshipType::Marital;
    }
    threshold += probabilities.short_term;
    if draw < threshold {
        return RelationshipType::ShortTerm;
    }
    RelationshipType::Instantaneous
}

pub trait ContextFormationExt {
    /// Runs `run_partnerships` for every woman, in roster order.
    fn run_partnership_formation(&mut self, model: &ModelData) -> Result<(), HpvError>;

    /// One month of partnership seeking for `woman`. Returns the new partnership, if any.
    fn run_partnerships(&mut self, model: &ModelData, woman: PersonId) -> Result<Option<PartnershipId>, HpvError>;

    /// Draws a partner age for a woman aged `woman_age`, never above `MAX_PARTNER_AGE`.
    fn sample_partner_age(&mut self, model: &ModelData, woman_age: u32) -> Result<u32, HpvError>;

    /// The shuffled candidate men for a woman aged `woman_age`.
    fn candidate_partners(&mut self, model: &ModelData, woman_age: u32) -> Result<Vec<PersonId>, HpvError>;

    /// Scans `candidates` in order and returns the first eligible man who accepts `woman`.
    fn find_partner(&mut self, model: &ModelData, woman: PersonId, candidates: &[PersonId]) -> Option<PersonId>;

    fn assign_relationship_type(&mut self, model: &ModelData, single: bool) -> RelationshipType;
}

impl ContextFormationExt for Context {
    fn run_partnership_formation(&mut self, model: &ModelData) -> Result<(), HpvError> {
        for slot in 0..self.population_size(Sex::Female) {
            if let Some(woman) = self.person_at(Sex::Female, slot) {
                self.run_partnerships(model, woman)?;
            }
        }
        Ok(())
    }

    fn run_partnerships(&mut self, model: &ModelData, woman: PersonId) -> Result<Option<PartnershipId>, HpvError> {
        let Some(individual) = self.get_person(woman) else {
            return Ok(None);
        };
        let age = individual.age();
        let parameters = &model.parameters;
        if !individual.is_alive() || age < parameters.sexual_debut_age || age >= parameters.max_partnering_age {
            return Ok(None);
        }

        let single = individual.is_single();
        let probability = if single {
            model.tables.formation_rate(Sex::Female, age)?
        } else {
            individual.concurrency()
        };
        if !self.sample_bool::<SimulationRng>(probability) {
            return Ok(None);
        }

        let candidates = self.candidate_partners(model, age)?;
        let Some(man) = self.find_partner(model, woman, &candidates) else {
            trace!("{woman} found no partner among {} candidates", candidates.len());
            return Ok(None);
        };
        let relationship_type = self.assign_relationship_type(model, single);
        self.form_partnership(model, woman, man, relationship_type).map(Some)
    }

    fn sample_partner_age(&mut self, model: &ModelData, woman_age: u32) -> Result<u32, HpvError> {
        let mean = model.tables.partner_age(woman_age)?.mean;
        loop {
            let partner_age = self.sample_poisson::<SimulationRng>(mean)?;
            if partner_age <= MAX_PARTNER_AGE {
                return Ok(partner_age);
            }
        }
    }

    fn candidate_partners(&mut self, model: &ModelData, woman_age: u32) -> Result<Vec<PersonId>, HpvError> {
        let mut candidates = match model.parameters.partner_age_model {
            PartnerAgeModel::Poisson => {
                let partner_age = self.sample_partner_age(model, woman_age)?;
                self.candidates_of_age(partner_age)
            }
            PartnerAgeModel::Band => {
                let row = model.tables.partner_age(woman_age)?;
                let max_age = f64::from(MAX_PARTNER_AGE);
                // Whole ages inside [mean - sd, mean + sd].
                let low = (row.mean - row.sd).ceil().clamp(0.0, max_age);
                let high = (row.mean + row.sd).floor().clamp(0.0, max_age);
                if low > high {
                    Vec::new()
                } else {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let (low, high) = (low as u32, high as u32);
                    self.candidates_in_age_band(low, high)
                }
            }
        };
        self.shuffle::<SimulationRng, _>(&mut candidates);
        Ok(candidates)
    }

    fn find_partner(&mut self, model: &ModelData, woman: PersonId, candidates: &[PersonId]) -> Option<PersonId> {
        let initiator_concurrency = self.get_person(woman)?.concurrency();

        for candidate in candidates {
            let Some(man) = self.get_person(*candidate) else {
                continue;
            };
            if !man.is_alive() || self.are_partners(woman, *candidate) {
                continue;
            }
            if man.is_single() {
                return Some(*candidate);
            }
            let probability = match model.parameters.concurrency_rule {
                ConcurrencyRule::Candidate => man.concurrency(),
                ConcurrencyRule::Initiator => initiator_concurrency,
            };
            if self.sample_bool::<SimulationRng>(probability) {
                return Some(*candidate);
            }
        }
        None
    }

    fn assign_relationship_type(&mut self, model: &ModelData, single: bool) -> RelationshipType {
        let draw: f64 = self.sample_range::<SimulationRng, _, _>(0.0..1.0);
        relationship_type_for_draw(&model.parameters.formation_probabilities, single, draw)
    }
}
