/*!

The population arena. Individuals are stored by [`PersonId`] and never hold references to each
other or to partnerships, only identifiers. Each sex has a roster of fixed length: a death leaves
a vacancy that is filled by exactly one newborn of the same sex in the same roster slot, so the
population size per sex is constant and iteration order is stable.

*/

use crate::{
    context::Context,
    data_plugin::DataPlugin,
    infection::{Infection, InfectionId, InfectionType},
    partnership::PartnershipId,
    registry::PartnerRegistry,
    HashMap,
};
use log::trace;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// Women are always processed before men.
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PersonId(pub(crate) u64);

impl Display for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Person {}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Individual {
    id: PersonId,
    sex: Sex,
    /// Completed years.
    age: u32,
    /// Completed months. The year age increments whenever this reaches a multiple of 12.
    month_age: u32,
    alive: bool,
    concurrency: f64,
    partnership_count: usize,
    partnerships: BTreeSet<PartnershipId>,
    active_infections: BTreeMap<InfectionId, Infection>,
    cleared_infections: BTreeMap<InfectionId, Infection>,
}

impl Individual {
    fn new(id: PersonId, sex: Sex, age: u32, concurrency: f64) -> Self {
        Individual {
            id,
            sex,
            age,
            month_age: age * 12,
            alive: true,
            concurrency,
            partnership_count: 0,
            partnerships: BTreeSet::new(),
            active_infections: BTreeMap::new(),
            cleared_infections: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn sex(&self) -> Sex {
        self.sex
    }

    #[must_use]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[must_use]
    pub fn month_age(&self) -> u32 {
        self.month_age
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Probability of seeking (women) or accepting (men) an additional simultaneous partnership.
    #[must_use]
    pub fn concurrency(&self) -> f64 {
        self.concurrency
    }

    #[must_use]
    pub fn partnership_count(&self) -> usize {
        self.partnership_count
    }

    #[must_use]
    pub fn is_single(&self) -> bool {
        self.partnership_count == 0
    }

    pub fn partnerships(&self) -> impl Iterator<Item = PartnershipId> + '_ {
        self.partnerships.iter().copied()
    }

    #[must_use]
    pub fn has_partnership(&self, partnership_id: PartnershipId) -> bool {
        self.partnerships.contains(&partnership_id)
    }

    pub fn active_infections(&self) -> impl Iterator<Item = (&InfectionId, &Infection)> {
        self.active_infections.iter()
    }

    pub fn cleared_infections(&self) -> impl Iterator<Item = (&InfectionId, &Infection)> {
        self.cleared_infections.iter()
    }

    #[must_use]
    pub fn is_infected(&self) -> bool {
        !self.active_infections.is_empty()
    }

    #[must_use]
    pub fn has_active_infection(&self, infection_type: InfectionType) -> bool {
        self.active_infections
            .values()
            .any(|infection| infection.infection_type() == infection_type)
    }

    #[must_use]
    pub fn has_cleared_infection(&self, infection_type: InfectionType) -> bool {
        self.cleared_infections
            .values()
            .any(|infection| infection.infection_type() == infection_type)
    }

    /// The types of all active infections, in enumeration order.
    #[must_use]
    pub fn active_infection_types(&self) -> Vec<InfectionType> {
        let mut types: Vec<InfectionType> = self
            .active_infections
            .values()
            .map(Infection::infection_type)
            .collect();
        types.sort_unstable();
        types
    }

    pub(crate) fn add_partnership(&mut self, partnership_id: PartnershipId) -> bool {
        let added = self.partnerships.insert(partnership_id);
        if added {
            self.partnership_count += 1;
        }
        added
    }

    pub(crate) fn remove_partnership(&mut self, partnership_id: PartnershipId) -> bool {
        let removed = self.partnerships.remove(&partnership_id);
        if removed {
            self.partnership_count -= 1;
        }
        removed
    }

    pub(crate) fn add_infection(&mut self, infection_id: InfectionId, infection: Infection) -> bool {
        if self.has_active_infection(infection.infection_type()) {
            return false;
        }
        self.active_infections.insert(infection_id, infection);
        true
    }

    /// Moves an active infection into the cleared map.
    pub(crate) fn clear_infection(&mut self, infection_id: InfectionId) -> bool {
        match self.active_infections.remove(&infection_id) {
            Some(infection) => {
                self.cleared_infections.insert(infection_id, infection);
                true
            }
            None => false,
        }
    }

    pub(crate) fn advance_infection(&mut self, infection_id: InfectionId) {
        if let Some(infection) = self.active_infections.get_mut(&infection_id) {
            infection.advance_timer();
        }
    }

    /// Adds a month of age. Returns the old and new year age on a birthday.
    fn age_one_month(&mut self) -> Option<(u32, u32)> {
        self.month_age += 1;
        if self.month_age % 12 == 0 {
            self.age += 1;
            Some((self.age - 1, self.age))
        } else {
            None
        }
    }
}

/// Stores every living individual plus those who died this month and await replacement.
pub struct PeopleData {
    individuals: HashMap<PersonId, Individual>,
    women: Vec<PersonId>,
    men: Vec<PersonId>,
    next_person_id: u64,
    next_infection_id: u64,
}

impl DataPlugin for PeopleData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| PeopleData {
        individuals: HashMap::default(),
        women: Vec::new(),
        men: Vec::new(),
        next_person_id: 0,
        next_infection_id: 0,
    };
}

impl PeopleData {
    fn roster(&self, sex: Sex) -> &[PersonId] {
        match sex {
            Sex::Female => &self.women,
            Sex::Male => &self.men,
        }
    }

    fn roster_mut(&mut self, sex: Sex) -> &mut Vec<PersonId> {
        match sex {
            Sex::Female => &mut self.women,
            Sex::Male => &mut self.men,
        }
    }

    fn create(&mut self, sex: Sex, age: u32, concurrency: f64) -> PersonId {
        let person_id = PersonId(self.next_person_id);
        self.next_person_id += 1;
        self.individuals
            .insert(person_id, Individual::new(person_id, sex, age, concurrency));
        person_id
    }
}

pub trait ContextPeopleExt {
    /// Adds a new individual to the end of their sex's roster. Men are also entered into the
    /// age-indexed partner registry.
    fn add_person(&mut self, sex: Sex, age: u32, concurrency: f64) -> PersonId;

    fn get_person(&self, person_id: PersonId) -> Option<&Individual>;

    /// The roster for `sex`, in processing order.
    fn people(&self, sex: Sex) -> Vec<PersonId>;

    /// Whoever occupies `slot` in the roster for `sex`. Passes that mutate the context walk the
    /// roster by slot with this instead of copying it.
    fn person_at(&self, sex: Sex, slot: usize) -> Option<PersonId>;

    fn population_size(&self, sex: Sex) -> usize;

    /// Number of individuals of `sex` who hold at least one active infection.
    fn infected_count(&self, sex: Sex) -> usize;
}

impl ContextPeopleExt for Context {
    fn add_person(&mut self, sex: Sex, age: u32, concurrency: f64) -> PersonId {
        let people_data = self.get_data_container_mut::<PeopleData>();
        let person_id = people_data.create(sex, age, concurrency);
        people_data.roster_mut(sex).push(person_id);

        if sex == Sex::Male {
            self.get_data_container_mut::<PartnerRegistry>()
                .insert(age, person_id);
        }
        person_id
    }

    fn get_person(&self, person_id: PersonId) -> Option<&Individual> {
        self.get_data_container::<PeopleData>()
            .and_then(|people_data| people_data.individuals.get(&person_id))
    }

    fn people(&self, sex: Sex) -> Vec<PersonId> {
        self.get_data_container::<PeopleData>()
            .map(|people_data| people_data.roster(sex).to_vec())
            .unwrap_or_default()
    }

    fn person_at(&self, sex: Sex, slot: usize) -> Option<PersonId> {
        self.get_data_container::<PeopleData>()
            .and_then(|people_data| people_data.roster(sex).get(slot).copied())
    }

    fn population_size(&self, sex: Sex) -> usize {
        self.get_data_container::<PeopleData>()
            .map_or(0, |people_data| people_data.roster(sex).len())
    }

    fn infected_count(&self, sex: Sex) -> usize {
        let Some(people_data) = self.get_data_container::<PeopleData>() else {
            return 0;
        };
        people_data
            .roster(sex)
            .iter()
            .filter_map(|person_id| people_data.individuals.get(person_id))
            .filter(|individual| individual.is_infected())
            .count()
    }
}

pub(crate) trait ContextPeopleExtInternal {
    fn get_person_mut(&mut self, person_id: PersonId) -> Option<&mut Individual>;
    fn next_infection_id(&mut self) -> InfectionId;
    fn mark_dead(&mut self, person_id: PersonId);
    /// Adds a month of age, moving men to their new registry bucket on a birthday.
    fn age_person(&mut self, person_id: PersonId);
    /// Removes whoever occupies `slot` in the roster for `sex` and puts an age-0 newborn there.
    fn replace_person_at(&mut self, sex: Sex, slot: usize, concurrency: f64) -> Option<PersonId>;
}

impl ContextPeopleExtInternal for Context {
    fn get_person_mut(&mut self, person_id: PersonId) -> Option<&mut Individual> {
        self.get_data_container_mut::<PeopleData>()
            .individuals
            .get_mut(&person_id)
    }

    fn next_infection_id(&mut self) -> InfectionId {
        let people_data = self.get_data_container_mut::<PeopleData>();
        let infection_id = InfectionId(people_data.next_infection_id);
        people_data.next_infection_id += 1;
        infection_id
    }

    fn mark_dead(&mut self, person_id: PersonId) {
        if let Some(individual) = self.get_person_mut(person_id) {
            individual.alive = false;
        }
    }

    fn age_person(&mut self, person_id: PersonId) {
        let Some(individual) = self.get_person_mut(person_id) else {
            return;
        };
        if !individual.is_alive() {
            return;
        }
        let sex = individual.sex();
        if let Some((old_age, new_age)) = individual.age_one_month() {
            if sex == Sex::Male {
                self.get_data_container_mut::<PartnerRegistry>()
                    .move_person(person_id, old_age, new_age);
            }
        }
    }

    fn replace_person_at(&mut self, sex: Sex, slot: usize, concurrency: f64) -> Option<PersonId> {
        let people_data = self.get_data_container_mut::<PeopleData>();
        let old_id = *people_data.roster(sex).get(slot)?;
        let old = people_data.individuals.remove(&old_id)?;
        debug_assert_eq!(old.partnership_count(), 0, "{old_id} removed with live partnerships");

        let newborn = people_data.create(sex, 0, concurrency);
        people_data.roster_mut(sex)[slot] = newborn;

        if sex == Sex::Male {
            let registry = self.get_data_container_mut::<PartnerRegistry>();
            registry.remove(old.age(), old_id);
            registry.insert(0, newborn);
        }
        trace!("{old_id} replaced by newborn {newborn}");
        Some(newborn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextRegistryExt;

    #[test]
    fn new_people_start_alive_and_single() {
        let mut context = Context::new();
        let person = context.add_person(Sex::Female, 20, 0.05);
        let individual = context.get_person(person).unwrap();

        assert!(individual.is_alive());
        assert!(individual.is_single());
        assert_eq!(individual.age(), 20);
        assert_eq!(individual.month_age(), 240);
        assert_eq!(individual.sex(), Sex::Female);
        assert!(!individual.is_infected());
    }

    #[test]
    fn rosters_keep_insertion_order() {
        let mut context = Context::new();
        let first = context.add_person(Sex::Male, 30, 0.1);
        let woman = context.add_person(Sex::Female, 30, 0.1);
        let second = context.add_person(Sex::Male, 31, 0.1);

        assert_eq!(context.people(Sex::Male), vec![first, second]);
        assert_eq!(context.people(Sex::Female), vec![woman]);
        assert_eq!(context.population_size(Sex::Male), 2);
    }

    #[test]
    fn slots_follow_the_roster() {
        let mut context = Context::new();
        assert_eq!(context.person_at(Sex::Female, 0), None);

        let first = context.add_person(Sex::Female, 30, 0.1);
        let second = context.add_person(Sex::Female, 40, 0.1);
        assert_eq!(context.person_at(Sex::Female, 0), Some(first));
        assert_eq!(context.person_at(Sex::Female, 1), Some(second));
        assert_eq!(context.person_at(Sex::Female, 2), None);
        assert_eq!(context.person_at(Sex::Male, 0), None);

        context.mark_dead(first);
        let newborn = context.replace_person_at(Sex::Female, 0, 0.1).unwrap();
        assert_eq!(context.person_at(Sex::Female, 0), Some(newborn));
        assert_eq!(context.person_at(Sex::Female, 1), Some(second));
    }

    #[test]
    fn men_are_registered_by_age() {
        let mut context = Context::new();
        let man = context.add_person(Sex::Male, 22, 0.1);
        let woman = context.add_person(Sex::Female, 22, 0.1);

        assert_eq!(context.candidates_of_age(22), vec![man]);
        assert!(!context.candidates_of_age(22).contains(&woman));
    }

    #[test]
    fn birthday_moves_registry_bucket() {
        let mut context = Context::new();
        let man = context.add_person(Sex::Male, 22, 0.1);

        for _ in 0..11 {
            context.age_person(man);
        }
        assert_eq!(context.get_person(man).unwrap().age(), 22);
        context.age_person(man);

        let individual = context.get_person(man).unwrap();
        assert_eq!(individual.age(), 23);
        assert_eq!(individual.month_age(), 23 * 12);
        assert!(context.candidates_of_age(22).is_empty());
        assert_eq!(context.candidates_of_age(23), vec![man]);
    }

    #[test]
    fn dead_people_do_not_age() {
        let mut context = Context::new();
        let person = context.add_person(Sex::Female, 50, 0.0);
        context.mark_dead(person);
        context.age_person(person);
        assert_eq!(context.get_person(person).unwrap().month_age(), 600);
    }

    #[test]
    fn replacement_keeps_slot_and_registry_consistent() {
        let mut context = Context::new();
        let first = context.add_person(Sex::Male, 40, 0.1);
        let second = context.add_person(Sex::Male, 41, 0.1);
        context.mark_dead(first);

        let newborn = context.replace_person_at(Sex::Male, 0, 0.1).unwrap();
        assert_ne!(newborn, first);
        assert_eq!(context.people(Sex::Male), vec![newborn, second]);
        assert!(context.get_person(first).is_none());
        assert_eq!(context.get_person(newborn).unwrap().age(), 0);
        assert!(context.candidates_of_age(40).is_empty());
        assert_eq!(context.candidates_of_age(0), vec![newborn]);
    }

    #[test]
    fn partnership_ids_track_count() {
        let mut context = Context::new();
        let person = context.add_person(Sex::Female, 25, 0.0);
        let individual = context.get_person_mut(person).unwrap();

        assert!(individual.add_partnership(PartnershipId(3)));
        assert!(!individual.add_partnership(PartnershipId(3)));
        assert!(individual.add_partnership(PartnershipId(4)));
        assert_eq!(individual.partnership_count(), 2);

        assert!(individual.remove_partnership(PartnershipId(3)));
        assert!(!individual.remove_partnership(PartnershipId(3)));
        assert_eq!(individual.partnership_count(), 1);
        assert_eq!(individual.partnerships().collect::<Vec<_>>(), vec![PartnershipId(4)]);
    }

    #[test]
    fn infected_count_counts_active_infections() {
        let mut context = Context::new();
        let infected = context.add_person(Sex::Female, 25, 0.0);
        context.add_person(Sex::Female, 26, 0.0);
        let infection_id = context.next_infection_id();
        context
            .get_person_mut(infected)
            .unwrap()
            .add_infection(infection_id, Infection::acquire(InfectionType::Hpv16, 25));

        assert_eq!(context.infected_count(Sex::Female), 1);
        assert_eq!(context.infected_count(Sex::Male), 0);
    }
}
