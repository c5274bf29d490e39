/*!

Partnerships and their monthly maintenance.

A partnership pairs one woman and one man. It is built in the `Forming` state, becomes `Active`
once registered with both members, and ends `Dissolved` when either member dies or its duration
reaches its maximum. Dissolution happens once: it is the only transition that removes the
partnership from its members, so repeating it can never double-decrement a partner count.

Each month every active partnership is checked in this order:
1. If either member is dead, dissolve.
2. Transmission: each infection type the man holds and the woman lacks is given the
   partnership's monthly sex acts to transmit, then the same from woman to man.
3. If `duration < max_duration`, the duration increments (except in the month the partnership
   formed, so a new partnership ends its first month at duration 1); otherwise dissolve.

*/

use crate::{
    clock::{ContextClockExt, MONTHS_PER_YEAR},
    context::Context,
    data_plugin::DataPlugin,
    error::HpvError,
    infection::{ContextInfectionExt, InfectionType},
    model::ModelData,
    people::{ContextPeopleExt, ContextPeopleExtInternal, PersonId},
    random::{ContextRandomExt, SimulationRng},
    HashSet,
};
use log::trace;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Marital,
    Casual,
    ShortTerm,
    Instantaneous,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::Marital,
        RelationshipType::Casual,
        RelationshipType::ShortTerm,
        RelationshipType::Instantaneous,
    ];
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PartnershipState {
    Forming,
    Active,
    Dissolved,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PartnershipId(pub(crate) u64);

impl Display for PartnershipId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Partnership {}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Partnership {
    id: PartnershipId,
    relationship_type: RelationshipType,
    female: PersonId,
    male: PersonId,
    /// Months elapsed, starting at 1.
    duration: u32,
    max_duration: u32,
    /// Sex acts per month, fixed for the life of the partnership.
    sex_acts: u32,
    state: PartnershipState,
    formed_month: u32,
}

impl Partnership {
    fn new(
        id: PartnershipId,
        relationship_type: RelationshipType,
        female: PersonId,
        male: PersonId,
        max_duration: u32,
        sex_acts: u32,
        formed_month: u32,
    ) -> Self {
        Partnership {
            id,
            relationship_type,
            female,
            male,
            duration: 1,
            max_duration,
            sex_acts,
            state: PartnershipState::Forming,
            formed_month,
        }
    }

    #[must_use]
    pub fn id(&self) -> PartnershipId {
        self.id
    }

    #[must_use]
    pub fn relationship_type(&self) -> RelationshipType {
        self.relationship_type
    }

    #[must_use]
    pub fn female(&self) -> PersonId {
        self.female
    }

    #[must_use]
    pub fn male(&self) -> PersonId {
        self.male
    }

    #[must_use]
    pub fn duration(&self) -> u32 {
        self.duration
    }

    #[must_use]
    pub fn max_duration(&self) -> u32 {
        self.max_duration
    }

    #[must_use]
    pub fn sex_acts(&self) -> u32 {
        self.sex_acts
    }

    #[must_use]
    pub fn state(&self) -> PartnershipState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == PartnershipState::Active
    }

    fn activate(&mut self) {
        debug_assert_eq!(self.state, PartnershipState::Forming);
        self.state = PartnershipState::Active;
    }

    /// Returns `false` if the partnership was not active, in which case nothing changes.
    fn dissolve(&mut self) -> bool {
        if self.state != PartnershipState::Active {
            return false;
        }
        self.state = PartnershipState::Dissolved;
        true
    }
}

/// Every partnership that is active or was dissolved this month, plus the optional archive of
/// older dissolved partnerships.
pub struct PartnershipData {
    partnerships: BTreeMap<PartnershipId, Partnership>,
    // (female, male) pairs with an active partnership.
    active_pairs: HashSet<(PersonId, PersonId)>,
    archive: Vec<Partnership>,
    formed_total: u64,
    dissolved_total: u64,
    next_partnership_id: u64,
}

impl DataPlugin for PartnershipData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| PartnershipData {
        partnerships: BTreeMap::new(),
        active_pairs: HashSet::default(),
        archive: Vec::new(),
        formed_total: 0,
        dissolved_total: 0,
        next_partnership_id: 0,
    };
}

pub trait ContextPartnershipExt {
    /// Draws a maximum duration of `12 * Poisson(mean_duration_years)` months and a monthly
    /// sex-act count of `Poisson(mean_monthly_acts)` for `relationship_type`, in that order, then
    /// registers the partnership.
    fn form_partnership(
        &mut self,
        model: &ModelData,
        female: PersonId,
        male: PersonId,
        relationship_type: RelationshipType,
    ) -> Result<PartnershipId, HpvError>;

    /// Registers an active partnership with the given fixed draws and adds it to both members.
    fn add_partnership(
        &mut self,
        female: PersonId,
        male: PersonId,
        relationship_type: RelationshipType,
        max_duration: u32,
        sex_acts: u32,
    ) -> PartnershipId;

    fn get_partnership(&self, partnership_id: PartnershipId) -> Option<&Partnership>;

    /// Whether `female` and `male` currently share an active partnership.
    fn are_partners(&self, female: PersonId, male: PersonId) -> bool;

    /// Ids of the active partnerships, in formation order.
    fn active_partnerships(&self) -> Vec<PartnershipId>;

    fn active_partnership_count(&self) -> usize;

    /// One month of maintenance for one partnership. Does nothing to a partnership that is
    /// already dissolved.
    fn check_relationship(&mut self, model: &ModelData, partnership_id: PartnershipId) -> Result<(), HpvError>;

    /// Runs `check_relationship` over every partnership, in formation order.
    fn run_relationship_checks(&mut self, model: &ModelData) -> Result<(), HpvError>;

    /// Ends an active partnership and removes it from both members. Returns `false`, changing
    /// nothing, if it was not active.
    fn dissolve_partnership(&mut self, partnership_id: PartnershipId) -> bool;

    /// Drops dissolved partnerships from the active registry, moving them to the archive if
    /// `archive` is set. Returns how many were removed.
    fn remove_dissolved_partnerships(&mut self, archive: bool) -> usize;

    fn archived_partnerships(&self) -> &[Partnership];

    /// Partnerships formed and dissolved since the start of the run.
    fn partnership_totals(&self) -> (u64, u64);
}

/// Offers every infection type `source` holds and `target` lacks a chance to transmit.
fn transmit_between(
    context: &mut Context,
    model: &ModelData,
    source: PersonId,
    target: PersonId,
    sex_acts: u32,
) -> Result<(), HpvError> {
    let discordant: Vec<InfectionType> = match (context.get_person(source), context.get_person(target)) {
        (Some(source), Some(target)) => source
            .active_infection_types()
            .into_iter()
            .filter(|infection_type| !target.has_active_infection(*infection_type))
            .collect(),
        _ => return Ok(()),
    };

    for infection_type in discordant {
        context.attempt_transmission(model, infection_type, target, sex_acts)?;
    }
    Ok(())
}

impl ContextPartnershipExt for Context {
    fn form_partnership(
        &mut self,
        model: &ModelData,
        female: PersonId,
        male: PersonId,
        relationship_type: RelationshipType,
    ) -> Result<PartnershipId, HpvError> {
        let parameters = model.relationship(relationship_type);
        let max_duration =
            MONTHS_PER_YEAR * self.sample_poisson::<SimulationRng>(parameters.mean_duration_years)?;
        let sex_acts = self.sample_poisson::<SimulationRng>(parameters.mean_monthly_acts)?;
        Ok(self.add_partnership(female, male, relationship_type, max_duration, sex_acts))
    }

    fn add_partnership(
        &mut self,
        female: PersonId,
        male: PersonId,
        relationship_type: RelationshipType,
        max_duration: u32,
        sex_acts: u32,
    ) -> PartnershipId {
        debug_assert!(!self.are_partners(female, male), "{female} and {male} are already partners");
        let month = self.current_month();

        let data = self.get_data_container_mut::<PartnershipData>();
        let partnership_id = PartnershipId(data.next_partnership_id);
        data.next_partnership_id += 1;
        let mut partnership = Partnership::new(
            partnership_id,
            relationship_type,
            female,
            male,
            max_duration,
            sex_acts,
            month,
        );
        partnership.activate();
        data.partnerships.insert(partnership_id, partnership);
        data.active_pairs.insert((female, male));
        data.formed_total += 1;

        for member in [female, male] {
            if let Some(individual) = self.get_person_mut(member) {
                individual.add_partnership(partnership_id);
            }
        }
        trace!(
            "{partnership_id} formed: {relationship_type:?} between {female} and {male}, \
             max duration {max_duration}, {sex_acts} acts per month"
        );
        partnership_id
    }

    fn get_partnership(&self, partnership_id: PartnershipId) -> Option<&Partnership> {
        self.get_data_container::<PartnershipData>()
            .and_then(|data| data.partnerships.get(&partnership_id))
    }

    fn are_partners(&self, female: PersonId, male: PersonId) -> bool {
        self.get_data_container::<PartnershipData>()
            .is_some_and(|data| data.active_pairs.contains(&(female, male)))
    }

    fn active_partnerships(&self) -> Vec<PartnershipId> {
        self.get_data_container::<PartnershipData>()
            .map(|data| {
                data.partnerships
                    .values()
                    .filter(|partnership| partnership.is_active())
                    .map(Partnership::id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn active_partnership_count(&self) -> usize {
        self.get_data_container::<PartnershipData>()
            .map_or(0, |data| data.active_pairs.len())
    }

    fn check_relationship(&mut self, model: &ModelData, partnership_id: PartnershipId) -> Result<(), HpvError> {
        let Some(partnership) = self.get_partnership(partnership_id) else {
            return Ok(());
        };
        if !partnership.is_active() {
            return Ok(());
        }
        let Partnership {
            female,
            male,
            sex_acts,
            duration,
            max_duration,
            formed_month,
            ..
        } = *partnership;

        let alive = |context: &Context, person_id: PersonId| {
            context
                .get_person(person_id)
                .is_some_and(|individual| individual.is_alive())
        };
        if !(alive(self, female) && alive(self, male)) {
            self.dissolve_partnership(partnership_id);
            return Ok(());
        }

        transmit_between(self, model, male, female, sex_acts)?;
        transmit_between(self, model, female, male, sex_acts)?;

        if duration < max_duration {
            if formed_month < self.current_month() {
                if let Some(partnership) = self
                    .get_data_container_mut::<PartnershipData>()
                    .partnerships
                    .get_mut(&partnership_id)
                {
                    partnership.duration += 1;
                }
            }
        } else {
            self.dissolve_partnership(partnership_id);
        }
        Ok(())
    }

    fn run_relationship_checks(&mut self, model: &ModelData) -> Result<(), HpvError> {
        let partnership_ids: Vec<PartnershipId> = self
            .get_data_container::<PartnershipData>()
            .map(|data| data.partnerships.keys().copied().collect())
            .unwrap_or_default();

        for partnership_id in partnership_ids {
            self.check_relationship(model, partnership_id)?;
        }
        Ok(())
    }

    fn dissolve_partnership(&mut self, partnership_id: PartnershipId) -> bool {
        let data = self.get_data_container_mut::<PartnershipData>();
        let Some(partnership) = data.partnerships.get_mut(&partnership_id) else {
            return false;
        };
        if !partnership.dissolve() {
            return false;
        }
        let (female, male) = (partnership.female, partnership.male);
        data.active_pairs.remove(&(female, male));
        data.dissolved_total += 1;

        for member in [female, male] {
            if let Some(individual) = self.get_person_mut(member) {
                individual.remove_partnership(partnership_id);
            }
        }
        trace!("{partnership_id} dissolved");
        true
    }

    fn remove_dissolved_partnerships(&mut self, archive: bool) -> usize {
        let data = self.get_data_container_mut::<PartnershipData>();
        let dissolved: Vec<PartnershipId> = data
            .partnerships
            .values()
            .filter(|partnership| partnership.state() == PartnershipState::Dissolved)
            .map(Partnership::id)
            .collect();

        for partnership_id in &dissolved {
            if let Some(partnership) = data.partnerships.remove(partnership_id) {
                if archive {
                    data.archive.push(partnership);
                }
            }
        }
        dissolved.len()
    }

    fn archived_partnerships(&self) -> &[Partnership] {
        self.get_data_container::<PartnershipData>()
            .map(|data| data.archive.as_slice())
            .unwrap_or_default()
    }

    fn partnership_totals(&self) -> (u64, u64) {
        self.get_data_container::<PartnershipData>()
            .map_or((0, 0), |data| (data.formed_total, data.dissolved_total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ContextClockExt,
        people::Sex,
        surveillance::ContextSurveillanceExt,
        test_support::{test_context, test_parameters, test_tables_with},
    };

    fn couple(context: &mut Context) -> (PersonId, PersonId) {
        let female = context.add_person(Sex::Female, 20, 0.0);
        let male = context.add_person(Sex::Male, 22, 0.0);
        (female, male)
    }

    #[test]
    fn new_partnership_is_active_and_registered_with_both_members() {
        let (mut context, _model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let partnership_id = context.add_partnership(female, male, RelationshipType::Casual, 24, 3);

        let partnership = context.get_partnership(partnership_id).unwrap();
        assert_eq!(partnership.state(), PartnershipState::Active);
        assert_eq!(partnership.duration(), 1);
        assert_eq!(partnership.max_duration(), 24);
        assert_eq!(partnership.sex_acts(), 3);
        assert!(context.are_partners(female, male));
        assert!(context.get_person(female).unwrap().has_partnership(partnership_id));
        assert!(context.get_person(male).unwrap().has_partnership(partnership_id));
        assert_eq!(context.get_person(female).unwrap().partnership_count(), 1);
        assert_eq!(context.get_person(male).unwrap().partnership_count(), 1);
    }

    #[test]
    fn drawn_durations_are_whole_years() {
        let (mut context, model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let partnership_id = context
            .form_partnership(&model, female, male, RelationshipType::Marital)
            .unwrap();
        let partnership = context.get_partnership(partnership_id).unwrap();
        assert_eq!(partnership.max_duration() % 12, 0);
        assert_eq!(partnership.relationship_type(), RelationshipType::Marital);
    }

    #[test]
    fn instantaneous_partnership_dissolves_on_first_check() {
        let (mut context, model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let partnership_id = context
            .form_partnership(&model, female, male, RelationshipType::Instantaneous)
            .unwrap();
        assert_eq!(context.get_partnership(partnership_id).unwrap().max_duration(), 0);

        context.check_relationship(&model, partnership_id).unwrap();

        assert_eq!(
            context.get_partnership(partnership_id).unwrap().state(),
            PartnershipState::Dissolved
        );
        assert!(!context.are_partners(female, male));
        assert_eq!(context.get_person(female).unwrap().partnership_count(), 0);
        assert_eq!(context.get_person(male).unwrap().partnership_count(), 0);
    }

    #[test]
    fn dissolution_happens_once() {
        let (mut context, model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let other_male = context.add_person(Sex::Male, 25, 1.0);
        let dissolved = context.add_partnership(female, male, RelationshipType::ShortTerm, 0, 2);
        let kept = context.add_partnership(female, other_male, RelationshipType::Casual, 36, 2);

        assert!(context.dissolve_partnership(dissolved));
        assert!(!context.dissolve_partnership(dissolved));
        context.check_relationship(&model, dissolved).unwrap();
        context.check_relationship(&model, dissolved).unwrap();

        let woman = context.get_person(female).unwrap();
        assert_eq!(woman.partnership_count(), 1);
        assert_eq!(woman.partnerships().collect::<Vec<_>>(), vec![kept]);
        assert_eq!(context.get_person(male).unwrap().partnership_count(), 0);
        assert_eq!(context.partnership_totals(), (2, 1));
    }

    #[test]
    fn death_of_a_member_dissolves_without_transmission() {
        let mut parameters = test_parameters();
        parameters.infections[0].transmission_per_act = 1.0;
        let (mut context, model) = test_context(parameters, test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        context.acquire_infection(male, InfectionType::Hpv16).unwrap();
        let partnership_id = context.add_partnership(female, male, RelationshipType::Marital, 120, 5);

        context.mark_dead(male);
        context.run_relationship_checks(&model).unwrap();

        assert!(!context.get_partnership(partnership_id).unwrap().is_active());
        assert!(!context.get_person(female).unwrap().is_infected());
        assert_eq!(context.get_person(male).unwrap().partnership_count(), 0);

        // Dissolved partnerships stay dissolved.
        context.run_relationship_checks(&model).unwrap();
        assert!(!context.get_partnership(partnership_id).unwrap().is_active());
    }

    #[test]
    fn infected_male_transmits_to_female() {
        let mut parameters = test_parameters();
        parameters.infections[0].transmission_per_act = 1.0;
        let (mut context, model) = test_context(parameters, test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        context.acquire_infection(male, InfectionType::Hpv16).unwrap();
        let partnership_id = context.add_partnership(female, male, RelationshipType::Casual, 24, 1);

        context.check_relationship(&model, partnership_id).unwrap();

        let woman = context.get_person(female).unwrap();
        let infections: Vec<_> = woman.active_infections().map(|(_, infection)| *infection).collect();
        assert_eq!(infections.len(), 1);
        assert_eq!(infections[0].infection_type(), InfectionType::Hpv16);
        assert_eq!(infections[0].timer(), 1);
        assert_eq!(context.total_incident_infections(), 1);
    }

    #[test]
    fn infected_female_transmits_to_male() {
        let mut parameters = test_parameters();
        parameters.infections[1].transmission_per_act = 1.0;
        let (mut context, model) = test_context(parameters, test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        context.acquire_infection(female, InfectionType::Hpv18).unwrap();
        let partnership_id = context.add_partnership(female, male, RelationshipType::Casual, 24, 1);

        context.check_relationship(&model, partnership_id).unwrap();
        assert!(context.get_person(male).unwrap().has_active_infection(InfectionType::Hpv18));
    }

    #[test]
    fn concordant_partners_do_not_transmit() {
        let mut parameters = test_parameters();
        parameters.infections[0].transmission_per_act = 1.0;
        let (mut context, model) = test_context(parameters, test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        context.acquire_infection(male, InfectionType::Hpv16).unwrap();
        context.acquire_infection(female, InfectionType::Hpv16).unwrap();
        let partnership_id = context.add_partnership(female, male, RelationshipType::Casual, 24, 4);

        context.check_relationship(&model, partnership_id).unwrap();
        assert_eq!(context.total_incident_infections(), 0);
        assert_eq!(context.get_person(female).unwrap().active_infections().count(), 1);
    }

    #[test]
    fn duration_counts_months_after_formation() {
        let (mut context, model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let partnership_id = context.add_partnership(female, male, RelationshipType::ShortTerm, 3, 1);

        // Formation month: no increment.
        context.check_relationship(&model, partnership_id).unwrap();
        assert_eq!(context.get_partnership(partnership_id).unwrap().duration(), 1);

        for expected in [2, 3] {
            context.advance_month();
            context.check_relationship(&model, partnership_id).unwrap();
            assert_eq!(context.get_partnership(partnership_id).unwrap().duration(), expected);
        }

        context.advance_month();
        context.check_relationship(&model, partnership_id).unwrap();
        let partnership = context.get_partnership(partnership_id).unwrap();
        assert_eq!(partnership.duration(), 3);
        assert_eq!(partnership.state(), PartnershipState::Dissolved);
    }

    #[test]
    fn removal_archives_when_asked() {
        let (mut context, _model) = test_context(test_parameters(), test_tables_with(|_| {}));
        let (female, male) = couple(&mut context);
        let first = context.add_partnership(female, male, RelationshipType::Casual, 12, 1);
        context.dissolve_partnership(first);
        assert_eq!(context.remove_dissolved_partnerships(true), 1);
        assert!(context.get_partnership(first).is_none());
        assert_eq!(context.archived_partnerships().len(), 1);

        // A former partner can be partnered again.
        let second = context.add_partnership(female, male, RelationshipType::Marital, 120, 4);
        context.dissolve_partnership(second);
        assert_eq!(context.remove_dissolved_partnerships(false), 1);
        assert_eq!(context.archived_partnerships().len(), 1);
        assert_eq!(context.active_partnership_count(), 0);
    }
}
