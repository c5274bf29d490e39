/*!

Per-(age, year) surveillance counts. The year is the clock's year index at the time of the
event. Person-months are recorded during the natural history pass for every individual who
survives the month; deaths are recorded at bookkeeping time under the age at death.

*/

use crate::{
    clock::ContextClockExt,
    context::Context,
    data_plugin::DataPlugin,
    error::HpvError,
    infection::InfectionType,
};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeYearCounts {
    pub age: u32,
    pub year: u32,
    pub incident_infections: u64,
    pub infected_person_months: u64,
    pub uninfected_person_months: u64,
    pub alive_person_months: u64,
    pub deaths: u64,
}

impl AgeYearCounts {
    fn new(age: u32, year: u32) -> Self {
        AgeYearCounts {
            age,
            year,
            ..AgeYearCounts::default()
        }
    }

    /// Share of person-months spent infected. `None` if no person-months were recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn prevalence(&self) -> Option<f64> {
        (self.alive_person_months > 0)
            .then(|| self.infected_person_months as f64 / self.alive_person_months as f64)
    }

    /// Incident infections per uninfected person-month. `None` if there was no time at risk.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn incidence_rate(&self) -> Option<f64> {
        (self.uninfected_person_months > 0)
            .then(|| self.incident_infections as f64 / self.uninfected_person_months as f64)
    }
}

#[derive(Default)]
struct SurveillanceData {
    counts: BTreeMap<(u32, u32), AgeYearCounts>,
    incident_by_type: BTreeMap<InfectionType, u64>,
}

impl DataPlugin for SurveillanceData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &SurveillanceData::default;
}

impl SurveillanceData {
    fn entry(&mut self, age: u32, year: u32) -> &mut AgeYearCounts {
        self.counts
            .entry((age, year))
            .or_insert_with(|| AgeYearCounts::new(age, year))
    }
}

/// The CSV row layout: the raw counts followed by the derived ratios.
#[derive(Serialize)]
struct SurveillanceRecord {
    age: u32,
    year: u32,
    incident_infections: u64,
    infected_person_months: u64,
    uninfected_person_months: u64,
    alive_person_months: u64,
    deaths: u64,
    prevalence: Option<f64>,
    incidence_rate: Option<f64>,
}

impl From<AgeYearCounts> for SurveillanceRecord {
    fn from(counts: AgeYearCounts) -> Self {
        SurveillanceRecord {
            age: counts.age,
            year: counts.year,
            incident_infections: counts.incident_infections,
            infected_person_months: counts.infected_person_months,
            uninfected_person_months: counts.uninfected_person_months,
            alive_person_months: counts.alive_person_months,
            deaths: counts.deaths,
            prevalence: counts.prevalence(),
            incidence_rate: counts.incidence_rate(),
        }
    }
}

pub trait ContextSurveillanceExt {
    /// Records one month alive at `age`, as infected or uninfected person-time.
    fn record_person_month(&mut self, age: u32, infected: bool);

    /// Records an infection acquired by transmission at `age`.
    fn record_incident(&mut self, age: u32, infection_type: InfectionType);

    fn record_death(&mut self, age: u32);

    /// All counts, ordered by age then year.
    fn surveillance_counts(&self) -> Vec<AgeYearCounts>;

    fn counts_for(&self, age: u32, year: u32) -> Option<AgeYearCounts>;

    fn incident_infections_by_type(&self) -> BTreeMap<InfectionType, u64>;

    fn total_incident_infections(&self) -> u64;

    /// Writes one row per (age, year) with the raw counts, prevalence and incidence rate.
    fn write_surveillance_csv(&self, path: &Path) -> Result<(), HpvError>;
}

impl ContextSurveillanceExt for Context {
    fn record_person_month(&mut self, age: u32, infected: bool) {
        let year = self.current_year();
        let counts = self.get_data_container_mut::<SurveillanceData>().entry(age, year);
        counts.alive_person_months += 1;
        if infected {
            counts.infected_person_months += 1;
        } else {
            counts.uninfected_person_months += 1;
        }
    }

    fn record_incident(&mut self, age: u32, infection_type: InfectionType) {
        let year = self.current_year();
        let data = self.get_data_container_mut::<SurveillanceData>();
        data.entry(age, year).incident_infections += 1;
        *data.incident_by_type.entry(infection_type).or_default() += 1;
    }

    fn record_death(&mut self, age: u32) {
        let year = self.current_year();
        self.get_data_container_mut::<SurveillanceData>()
            .entry(age, year)
            .deaths += 1;
    }

    fn surveillance_counts(&self) -> Vec<AgeYearCounts> {
        self.get_data_container::<SurveillanceData>()
            .map(|data| data.counts.values().copied().collect())
            .unwrap_or_default()
    }

    fn counts_for(&self, age: u32, year: u32) -> Option<AgeYearCounts> {
        self.get_data_container::<SurveillanceData>()
            .and_then(|data| data.counts.get(&(age, year)).copied())
    }

    fn incident_infections_by_type(&self) -> BTreeMap<InfectionType, u64> {
        self.get_data_container::<SurveillanceData>()
            .map(|data| data.incident_by_type.clone())
            .unwrap_or_default()
    }

    fn total_incident_infections(&self) -> u64 {
        self.get_data_container::<SurveillanceData>()
            .map_or(0, |data| data.incident_by_type.values().sum())
    }

    fn write_surveillance_csv(&self, path: &Path) -> Result<(), HpvError> {
        let mut writer = csv::Writer::from_path(path)?;
        for counts in self.surveillance_counts() {
            writer.serialize(SurveillanceRecord::from(counts))?;
        }
        writer.flush()?;
        Ok(())
    }
}
