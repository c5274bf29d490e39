/*!

An individual-based model of HPV transmission over a dynamically forming sexual partnership
network, stepped monthly.

All simulation state lives in a [`Context`], which owns one data plugin per concern (people,
partner registry, partnerships, surveillance counts, the clock, random number generators, the
loaded model data). Each concern exposes its operations as a `Context*Ext` trait implemented for
`Context`.

*/

pub mod clock;
pub mod context;
pub mod data_plugin;
pub mod error;
pub mod formation;
pub mod hashing;
pub mod infection;
pub mod logging;
pub mod model;
pub mod parameters;
pub mod partnership;
pub mod people;
pub mod random;
pub mod registry;
pub mod simulation;
pub mod surveillance;
pub mod tables;

#[cfg(test)]
mod test_support;

// All modules import `crate::TypeId` in case we want to change the underlying type of `TypeId`.
pub(crate) use std::any::TypeId;

#[inline(always)]
pub fn type_of<T: 'static>() -> TypeId {
    TypeId::of::<T>()
}

pub use clock::ContextClockExt;
pub use context::Context;
pub use data_plugin::DataPlugin;
pub use error::HpvError;
pub use formation::ContextFormationExt;
pub use infection::{ContextInfectionExt, Infection, InfectionId, InfectionType};
pub use model::{ContextModelExt, ModelData};
pub use parameters::Parameters;
pub use partnership::{ContextPartnershipExt, Partnership, PartnershipId, PartnershipState, RelationshipType};
pub use people::{ContextPeopleExt, Individual, PersonId, Sex};
pub use random::ContextRandomExt;
pub use simulation::ContextSimulationExt;
pub use surveillance::{AgeYearCounts, ContextSurveillanceExt};
pub use tables::ReferenceTables;

// Deterministic hashing data structures
pub use hashing::{HashMap, HashSet};

// Re-export for macros
pub use rand;
