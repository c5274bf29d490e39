/*!

The age-indexed partner registry: for each integer age, the men of that age. Partner search
looks up one bucket (or a narrow band of buckets) instead of scanning the whole population.

A man is in exactly one bucket, the one for his current age. He moves bucket on his birthday, in
the same step his age increments, and leaves the registry when he is replaced after death.

*/

use crate::{context::Context, data_plugin::DataPlugin, people::PersonId};

#[derive(Debug, Default)]
pub struct PartnerRegistry {
    // Indexed by age. Bucket order only changes through insertion and removal, so it is the same
    // in every run with the same seed.
    buckets: Vec<Vec<PersonId>>,
}

impl DataPlugin for PartnerRegistry {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &PartnerRegistry::default;
}

impl PartnerRegistry {
    pub fn insert(&mut self, age: u32, person_id: PersonId) {
        let index = age as usize;
        if index >= self.buckets.len() {
            self.buckets.resize_with(index + 1, Vec::new);
        }
        debug_assert!(!self.buckets[index].contains(&person_id));
        self.buckets[index].push(person_id);
    }

    /// Removes `person_id` from the bucket for `age`. Returns whether he was there.
    pub fn remove(&mut self, age: u32, person_id: PersonId) -> bool {
        let Some(bucket) = self.buckets.get_mut(age as usize) else {
            return false;
        };
        match bucket.iter().position(|id| *id == person_id) {
            Some(position) => {
                bucket.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn move_person(&mut self, person_id: PersonId, from_age: u32, to_age: u32) {
        if self.remove(from_age, person_id) {
            self.insert(to_age, person_id);
        }
    }

    #[must_use]
    pub fn candidates(&self, age: u32) -> &[PersonId] {
        self.buckets
            .get(age as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of registered men.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(age, person)` entry, youngest bucket first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, PersonId)> + '_ {
        self.buckets.iter().enumerate().flat_map(|(age, bucket)| {
            #[allow(clippy::cast_possible_truncation)]
            let age = age as u32;
            bucket.iter().map(move |person_id| (age, *person_id))
        })
    }
}

pub trait ContextRegistryExt {
    /// The men registered at exactly `age`, in registry order.
    fn candidates_of_age(&self, age: u32) -> Vec<PersonId>;

    /// The men registered at any age in `min_age..=max_age`, youngest bucket first.
    fn candidates_in_age_band(&self, min_age: u32, max_age: u32) -> Vec<PersonId>;
}

impl ContextRegistryExt for Context {
    fn candidates_of_age(&self, age: u32) -> Vec<PersonId> {
        self.get_data_container::<PartnerRegistry>()
            .map(|registry| registry.candidates(age).to_vec())
            .unwrap_or_default()
    }

    fn candidates_in_age_band(&self, min_age: u32, max_age: u32) -> Vec<PersonId> {
        let Some(registry) = self.get_data_container::<PartnerRegistry>() else {
            return Vec::new();
        };
        (min_age..=max_age)
            .flat_map(|age| registry.candidates(age).iter().copied())
            .collect()
    }
}
