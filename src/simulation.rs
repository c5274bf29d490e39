/*!

The monthly step and the run loop.

Every month runs these passes in a fixed order, which together with the seed fixes the sequence of
random draws:

1. Natural history for all women, then all men: a mortality draw, then (for survivors) one month
   of infection natural history and a surveillance person-month.
2. Partnership formation for all women.
3. Maintenance of every partnership: death check, transmission, duration.
4. Removal of dissolved partnerships.
5. Bookkeeping: the living age by a month; each person who died this month has the death
   recorded and is replaced in the same roster slot by an age-0 newborn.
6. The clock advances.

*/

use crate::{
    clock::{ContextClockExt, MONTHS_PER_YEAR},
    context::Context,
    error::HpvError,
    formation::ContextFormationExt,
    infection::ContextInfectionExt,
    model::{ContextModelExt, ModelData},
    partnership::ContextPartnershipExt,
    people::{ContextPeopleExt, ContextPeopleExtInternal, PersonId, Sex},
    random::{ContextRandomExt, SimulationRng},
    surveillance::ContextSurveillanceExt,
};
use log::{debug, info, trace};

pub trait ContextSimulationExt {
    /// Creates the initial cohort from the initial population table, women first, and seeds
    /// infections into it. Each age row yields `floor(proportion * cohort_size)` people.
    fn initialize_population(&mut self) -> Result<(), HpvError>;

    /// Step 1: mortality and infection natural history for every individual.
    fn run_natural_history(&mut self, model: &ModelData) -> Result<(), HpvError>;

    /// Step 5: ages the living and replaces the dead with newborns.
    fn run_bookkeeping(&mut self, model: &ModelData);

    /// Runs one full month.
    fn step_month(&mut self) -> Result<(), HpvError>;

    /// Runs `sim_years * 12` months.
    fn run_simulation(&mut self) -> Result<(), HpvError>;
}

/// One Bernoulli draw per configured infection type, in configuration order.
fn seed_infections(context: &mut Context, model: &ModelData, person: PersonId) {
    for infection in &model.parameters.infections {
        if context.sample_bool::<SimulationRng>(infection.initial_prevalence) {
            context.acquire_infection(person, infection.infection_type);
        }
    }
}

impl ContextSimulationExt for Context {
    fn initialize_population(&mut self) -> Result<(), HpvError> {
        let model = self.model()?;
        let parameters = &model.parameters;

        for sex in Sex::ALL {
            let concurrency = model.concurrency(sex);
            for row in model.tables.initial_population() {
                let proportion = match sex {
                    Sex::Female => row.female,
                    Sex::Male => row.male,
                };
                let count = parameters.cohort_count(proportion);
                let age = row.age + parameters.initial_age_offset;
                for _ in 0..count {
                    let person = self.add_person(sex, age, concurrency);
                    seed_infections(self, &model, person);
                }
            }
        }

        info!(
            "initial population: {} women, {} men, {} infected",
            self.population_size(Sex::Female),
            self.population_size(Sex::Male),
            self.infected_count(Sex::Female) + self.infected_count(Sex::Male)
        );
        Ok(())
    }

    fn run_natural_history(&mut self, model: &ModelData) -> Result<(), HpvError> {
        for sex in Sex::ALL {
            for slot in 0..self.population_size(sex) {
                let Some(person) = self.person_at(sex, slot) else {
                    continue;
                };
                let Some(individual) = self.get_person(person) else {
                    continue;
                };
                if !individual.is_alive() {
                    continue;
                }
                let age = individual.age();

                let mortality = model.tables.mortality(sex, age)?;
                if self.sample_bool::<SimulationRng>(mortality) {
                    trace!("{person} died aged {age}");
                    self.mark_dead(person);
                    continue;
                }

                self.run_infection_history(model, person)?;
                let infected = self
                    .get_person(person)
                    .is_some_and(|individual| individual.is_infected());
                self.record_person_month(age, infected);
            }
        }
        Ok(())
    }

    fn run_bookkeeping(&mut self, model: &ModelData) {
        for sex in Sex::ALL {
            let concurrency = model.concurrency(sex);
            for slot in 0..self.population_size(sex) {
                let Some(person) = self.person_at(sex, slot) else {
                    continue;
                };
                let Some(individual) = self.get_person(person) else {
                    continue;
                };
                if individual.is_alive() {
                    self.age_person(person);
                } else {
                    let age = individual.age();
                    self.record_death(age);
                    self.replace_person_at(sex, slot, concurrency);
                }
            }
        }
    }

    fn step_month(&mut self) -> Result<(), HpvError> {
        let model = self.model()?;

        self.run_natural_history(&model)?;
        self.run_partnership_formation(&model)?;
        self.run_relationship_checks(&model)?;
        let removed = self.remove_dissolved_partnerships(model.parameters.archive_dissolved);
        self.run_bookkeeping(&model);

        debug!(
            "month {}: {} active partnerships, {removed} dissolved, {} women and {} men infected",
            self.current_month(),
            self.active_partnership_count(),
            self.infected_count(Sex::Female),
            self.infected_count(Sex::Male)
        );
        self.advance_month();
        Ok(())
    }

    fn run_simulation(&mut self) -> Result<(), HpvError> {
        let months = self.model()?.parameters.sim_months();
        info!("running {months} months");

        for _ in 0..months {
            self.step_month()?;
            if self.current_month() % MONTHS_PER_YEAR == 0 {
                let (formed, dissolved) = self.partnership_totals();
                info!(
                    "year {} done: {} infected, {} active partnerships ({formed} formed, {dissolved} dissolved), \
                     {} incident infections so far",
                    self.current_year(),
                    self.infected_count(Sex::Female) + self.infected_count(Sex::Male),
                    self.active_partnership_count(),
                    self.total_incident_infections()
                );
            }
        }
        Ok(())
    }
}
