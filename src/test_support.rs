//! Parameter bundles, reference tables and consistency checks shared by the unit tests.

use crate::{
    context::Context,
    infection::InfectionType,
    model::{ContextModelExt, ModelData},
    parameters::{
        ConcurrencyRule, FormationProbabilities, InfectionParameters, PartnerAgeModel, Parameters,
        RelationshipParameterSet, RelationshipParameters,
    },
    partnership::ContextPartnershipExt,
    people::{ContextPeopleExt, Sex},
    registry::ContextRegistryExt,
    tables::{ClearanceTable, FormationRow, MortalityRow, PartnerAgeRow, PopulationRow, ReferenceTables},
};
use std::{collections::BTreeMap, rc::Rc};

pub(crate) const TABLE_AGES: usize = 101;

/// Per-age table columns, indexed by age from 0. `clearance` is used for every configured type.
pub(crate) struct TableSpec {
    /// Monthly death probability, the same for both sexes.
    pub mortality: Vec<f64>,
    /// `(mean, sd)` of the partner age for a woman of each age.
    pub partner_age: Vec<(f64, f64)>,
    /// Monthly formation probability, the same for both sexes.
    pub formation: Vec<f64>,
    /// `(male, female)` fraction of the cohort at each age.
    pub initial_population: Vec<(f64, f64)>,
    pub clearance: Vec<f64>,
}

impl Default for TableSpec {
    fn default() -> Self {
        TableSpec {
            mortality: vec![0.0; TABLE_AGES],
            partner_age: (0..TABLE_AGES)
                .map(|age| (f64::min(age as f64 + 2.0, 75.0), 2.0))
                .collect(),
            formation: (0..TABLE_AGES)
                .map(|age| if age < 15 { 0.0 } else { 0.1 })
                .collect(),
            initial_population: (0..TABLE_AGES)
                .map(|age| if (15..65).contains(&age) { (0.01, 0.01) } else { (0.0, 0.0) })
                .collect(),
            clearance: vec![0.05; 600],
        }
    }
}

/// Builds reference tables from the default `TableSpec` after `modify` has adjusted it.
/// Clearance curves are built for HPV16 and HPV18.
pub(crate) fn test_tables_with(modify: impl FnOnce(&mut TableSpec)) -> ReferenceTables {
    let mut spec = TableSpec::default();
    modify(&mut spec);

    let age = |index: usize| u32::try_from(index).unwrap();
    let mortality = spec
        .mortality
        .iter()
        .enumerate()
        .map(|(index, p)| MortalityRow { age: age(index), male: *p, female: *p })
        .collect();
    let partner_age = spec
        .partner_age
        .iter()
        .enumerate()
        .map(|(index, (mean, sd))| PartnerAgeRow { age: age(index), mean: *mean, sd: *sd })
        .collect();
    let formation = spec
        .formation
        .iter()
        .enumerate()
        .map(|(index, p)| FormationRow { age: age(index), female: *p, male: *p })
        .collect();
    let initial_population = spec
        .initial_population
        .iter()
        .enumerate()
        .map(|(index, (male, female))| PopulationRow { age: age(index), male: *male, female: *female })
        .collect();
    let curves: BTreeMap<InfectionType, Vec<f64>> = [InfectionType::Hpv16, InfectionType::Hpv18]
        .into_iter()
        .map(|infection_type| (infection_type, spec.clearance.clone()))
        .collect();

    ReferenceTables::new(
        mortality,
        partner_age,
        formation,
        initial_population,
        ClearanceTable::new(curves).unwrap(),
    )
    .unwrap()
}

pub(crate) fn test_parameters() -> Parameters {
    Parameters {
        seed: 8_675_309,
        cohort_size: 100,
        sim_years: 1,
        sexual_debut_age: 15,
        max_partnering_age: 65,
        concurrency_female: 0.1,
        concurrency_male: 0.1,
        relationships: RelationshipParameterSet {
            marital: RelationshipParameters { mean_duration_years: 10.0, mean_monthly_acts: 8.0 },
            casual: RelationshipParameters { mean_duration_years: 1.0, mean_monthly_acts: 4.0 },
            short_term: RelationshipParameters { mean_duration_years: 0.5, mean_monthly_acts: 6.0 },
            instantaneous: RelationshipParameters { mean_duration_years: 0.0, mean_monthly_acts: 1.0 },
        },
        formation_probabilities: FormationProbabilities { marital: 0.2, casual: 0.4, short_term: 0.3 },
        infections: vec![
            InfectionParameters {
                infection_type: InfectionType::Hpv16,
                transmission_per_act: 0.1,
                natural_immunity: 0.5,
                initial_prevalence: 0.0,
            },
            InfectionParameters {
                infection_type: InfectionType::Hpv18,
                transmission_per_act: 0.08,
                natural_immunity: 0.5,
                initial_prevalence: 0.0,
            },
        ],
        concurrency_rule: ConcurrencyRule::Candidate,
        partner_age_model: PartnerAgeModel::Poisson,
        initial_age_offset: 0,
        archive_dissolved: false,
        tables: None,
    }
}

/// A context with the model loaded and the random stream seeded, plus the model itself.
pub(crate) fn test_context(parameters: Parameters, tables: ReferenceTables) -> (Context, Rc<ModelData>) {
    let mut context = Context::new();
    context.load_model(ModelData::new(parameters, tables).unwrap());
    let model = context.model().unwrap();
    (context, model)
}

/// Panics unless partnership records, partner counts and the registry all agree.
pub(crate) fn check_invariants(context: &Context) {
    let mut expected_counts: BTreeMap<_, usize> = BTreeMap::new();
    for partnership_id in context.active_partnerships() {
        let partnership = context.get_partnership(partnership_id).unwrap();
        assert!(context.are_partners(partnership.female(), partnership.male()));
        for member in [partnership.female(), partnership.male()] {
            assert!(context.get_person(member).unwrap().has_partnership(partnership_id));
            *expected_counts.entry(member).or_default() += 1;
        }
    }
    assert_eq!(context.active_partnerships().len(), context.active_partnership_count());

    for sex in Sex::ALL {
        for person_id in context.people(sex) {
            let individual = context.get_person(person_id).unwrap();
            assert!(individual.is_alive(), "{person_id} is dead but still on the roster");
            let expected = expected_counts.get(&person_id).copied().unwrap_or(0);
            assert_eq!(individual.partnership_count(), expected, "{person_id} partner count");
            assert_eq!(individual.partnerships().count(), expected);

            let mut types = individual.active_infection_types();
            types.dedup();
            assert_eq!(types.len(), individual.active_infections().count());
        }
    }

    let men = context.people(Sex::Male);
    let mut registered = 0;
    for man in &men {
        let age = context.get_person(*man).unwrap().age();
        let matches = context
            .candidates_of_age(age)
            .iter()
            .filter(|candidate| *candidate == man)
            .count();
        assert_eq!(matches, 1, "{man} should be registered once at age {age}");
        registered += 1;
    }
    let max_age = u32::try_from(TABLE_AGES * 2).unwrap();
    assert_eq!(context.candidates_in_age_band(0, max_age).len(), registered);
}
