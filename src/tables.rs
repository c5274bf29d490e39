/*!

Reference tables read from CSV files.

| Table                  | Columns                          | Indexed by        |
|------------------------|----------------------------------|-------------------|
| mortality              | `age,male,female`                | age, from 0       |
| partner age            | `age,mean,sd`                    | woman's age, from 0 |
| partnership formation  | `age,female,male`                | age, from 0       |
| initial population     | `age,male,female`                | age, from 0       |
| clearance              | `timer,<type>,<type>,...`        | infection timer, from 1 |

Clearance columns are named after infection types (`HPV16`, `HPVoHR`, ...). A lookup outside the
tabulated range is a `TableError`.

*/

use crate::{
    error::HpvError,
    infection::InfectionType,
    parameters::TablePaths,
    people::Sex,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, io::Read, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MortalityRow {
    pub age: u32,
    pub male: f64,
    pub female: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartnerAgeRow {
    pub age: u32,
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationRow {
    pub age: u32,
    pub female: f64,
    pub male: f64,
}

/// Proportions of the cohort at each age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationRow {
    pub age: u32,
    pub male: f64,
    pub female: f64,
}

trait AgeRow {
    fn age(&self) -> u32;
    /// Every probability-valued column with its name.
    fn probabilities(&self) -> Vec<(&'static str, f64)>;
}

impl AgeRow for MortalityRow {
    fn age(&self) -> u32 {
        self.age
    }
    fn probabilities(&self) -> Vec<(&'static str, f64)> {
        vec![("male", self.male), ("female", self.female)]
    }
}

impl AgeRow for PartnerAgeRow {
    fn age(&self) -> u32 {
        self.age
    }
    fn probabilities(&self) -> Vec<(&'static str, f64)> {
        Vec::new()
    }
}

impl AgeRow for FormationRow {
    fn age(&self) -> u32 {
        self.age
    }
    fn probabilities(&self) -> Vec<(&'static str, f64)> {
        vec![("female", self.female), ("male", self.male)]
    }
}

impl AgeRow for PopulationRow {
    fn age(&self) -> u32 {
        self.age
    }
    fn probabilities(&self) -> Vec<(&'static str, f64)> {
        vec![("male", self.male), ("female", self.female)]
    }
}

fn check_probability(table: &str, column: &str, row: u32, value: f64) -> Result<(), HpvError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(HpvError::TableError(format!(
            "{table} table: {column} at row {row} must be in [0, 1], got {value}"
        )))
    }
}

fn check_age_rows<T: AgeRow>(table: &str, rows: &[T]) -> Result<(), HpvError> {
    if rows.is_empty() {
        return Err(HpvError::TableError(format!("{table} table is empty")));
    }
    for (index, row) in rows.iter().enumerate() {
        if row.age() as usize != index {
            return Err(HpvError::TableError(format!(
                "{table} table: ages must run contiguously from 0, found age {} at row {index}",
                row.age()
            )));
        }
        for (column, value) in row.probabilities() {
            check_probability(table, column, row.age(), value)?;
        }
    }
    Ok(())
}

fn read_age_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, HpvError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Monthly clearance probability by infection timer, one curve per infection type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearanceTable {
    // Entry `i` of each curve is the probability at timer `i + 1`.
    curves: BTreeMap<InfectionType, Vec<f64>>,
}

impl ClearanceTable {
    pub fn new(curves: BTreeMap<InfectionType, Vec<f64>>) -> Result<Self, HpvError> {
        for (infection_type, curve) in &curves {
            for (index, value) in curve.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let timer = index as u32 + 1;
                check_probability("clearance", infection_type.name(), timer, *value)?;
            }
        }
        Ok(ClearanceTable { curves })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, HpvError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();
        let mut columns: Vec<InfectionType> = Vec::new();
        for header in headers.iter().skip(1) {
            columns.push(header.parse()?);
        }

        let mut curves: BTreeMap<InfectionType, Vec<f64>> =
            columns.iter().map(|infection_type| (*infection_type, Vec::new())).collect();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let expected_timer = index + 1;
            let timer: usize = record
                .get(0)
                .and_then(|field| field.trim().parse().ok())
                .ok_or_else(|| HpvError::TableError(format!("clearance table: bad timer in row {expected_timer}")))?;
            if timer != expected_timer {
                return Err(HpvError::TableError(format!(
                    "clearance table: timers must run contiguously from 1, found {timer} at row {expected_timer}"
                )));
            }
            for (infection_type, field) in columns.iter().zip(record.iter().skip(1)) {
                let value: f64 = field.trim().parse().map_err(|_| {
                    HpvError::TableError(format!(
                        "clearance table: {infection_type} value {field:?} at timer {timer} is not a number"
                    ))
                })?;
                if let Some(curve) = curves.get_mut(infection_type) {
                    curve.push(value);
                }
            }
        }
        ClearanceTable::new(curves)
    }

    pub fn from_path(path: &Path) -> Result<Self, HpvError> {
        ClearanceTable::from_reader(std::fs::File::open(path)?)
    }

    #[must_use]
    pub fn has_curve(&self, infection_type: InfectionType) -> bool {
        self.curves.contains_key(&infection_type)
    }

    pub fn probability(&self, infection_type: InfectionType, timer: u32) -> Result<f64, HpvError> {
        let curve = self.curves.get(&infection_type).ok_or_else(|| {
            HpvError::TableError(format!("no clearance curve for {infection_type}"))
        })?;
        timer
            .checked_sub(1)
            .and_then(|index| curve.get(index as usize))
            .copied()
            .ok_or_else(|| {
                HpvError::TableError(format!(
                    "clearance curve for {infection_type} has no entry for timer {timer}"
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTables {
    mortality: Vec<MortalityRow>,
    partner_age: Vec<PartnerAgeRow>,
    formation: Vec<FormationRow>,
    initial_population: Vec<PopulationRow>,
    clearance: ClearanceTable,
}

impl ReferenceTables {
    pub fn new(
        mortality: Vec<MortalityRow>,
        partner_age: Vec<PartnerAgeRow>,
        formation: Vec<FormationRow>,
        initial_population: Vec<PopulationRow>,
        clearance: ClearanceTable,
    ) -> Result<Self, HpvError> {
        check_age_rows("mortality", &mortality)?;
        check_age_rows("partner age", &partner_age)?;
        check_age_rows("partnership formation", &formation)?;
        check_age_rows("initial population", &initial_population)?;
        for row in &partner_age {
            if !(row.mean.is_finite() && row.mean >= 0.0 && row.sd.is_finite() && row.sd >= 0.0) {
                return Err(HpvError::TableError(format!(
                    "partner age table: mean and sd at age {} must be finite and non-negative",
                    row.age
                )));
            }
        }

        Ok(ReferenceTables {
            mortality,
            partner_age,
            formation,
            initial_population,
            clearance,
        })
    }

    pub fn load(paths: &TablePaths) -> Result<Self, HpvError> {
        ReferenceTables::new(
            read_age_table(&paths.mortality)?,
            read_age_table(&paths.partner_age)?,
            read_age_table(&paths.partnership_formation)?,
            read_age_table(&paths.initial_population)?,
            ClearanceTable::from_path(&paths.clearance)?,
        )
    }

    pub fn mortality(&self, sex: Sex, age: u32) -> Result<f64, HpvError> {
        let row = self
            .mortality
            .get(age as usize)
            .ok_or_else(|| HpvError::TableError(format!("mortality table has no row for age {age}")))?;
        Ok(match sex {
            Sex::Male => row.male,
            Sex::Female => row.female,
        })
    }

    pub fn partner_age(&self, age: u32) -> Result<&PartnerAgeRow, HpvError> {
        self.partner_age
            .get(age as usize)
            .ok_or_else(|| HpvError::TableError(format!("partner age table has no row for age {age}")))
    }

    pub fn formation_rate(&self, sex: Sex, age: u32) -> Result<f64, HpvError> {
        let row = self.formation.get(age as usize).ok_or_else(|| {
            HpvError::TableError(format!("partnership formation table has no row for age {age}"))
        })?;
        Ok(match sex {
            Sex::Female => row.female,
            Sex::Male => row.male,
        })
    }

    #[must_use]
    pub fn initial_population(&self) -> &[PopulationRow] {
        &self.initial_population
    }

    #[must_use]
    pub fn clearance(&self) -> &ClearanceTable {
        &self.clearance
    }

    pub fn clearance_probability(&self, infection_type: InfectionType, timer: u32) -> Result<f64, HpvError> {
        self.clearance.probability(infection_type, timer)
    }
}
