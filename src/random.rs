use crate::{
    context::Context,
    data_plugin::DataPlugin,
    error::HpvError,
    hashing::hash_str,
    type_of,
    HashMap,
    TypeId,
};
use log::trace;
use rand::{
    distr::uniform::{SampleRange, SampleUniform},
    prelude::Distribution,
    seq::SliceRandom,
    Rng,
    SeedableRng,
};
use rand_distr::Poisson;
use std::any::Any;

#[allow(non_upper_case_globals)]
pub trait RngId: Any {
    const new: &'static dyn Fn(u64) -> Self;
    const name: &'static str;
    type RngType: SeedableRng;
    fn rng(&mut self) -> &mut Self::RngType;
}

#[macro_export]
macro_rules! define_rng {
    ($vis:vis $random_id:ident) => {
        $vis struct $random_id {
            rng: $crate::rand::rngs::StdRng,
        }

        #[allow(non_upper_case_globals)]
        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::StdRng;
            const name: &'static str = stringify!($random_id);
            const new: &'static dyn Fn(u64) -> Self = &|seed| {
                use $crate::rand::SeedableRng;
                Self {
                    rng: $crate::rand::rngs::StdRng::seed_from_u64(seed),
                }
            };

            fn rng(&mut self) -> &mut Self::RngType {
                &mut self.rng
            }
        }
    };
}

// The model draws every random number from this one stream, so the draw order is part of the
// reproducibility contract.
define_rng!(pub SimulationRng);

struct RngPlugin {
    base_seed: u64,
    // This is actually a `HashMap<TypeId, Box<R: RngId>>`
    rng_map: HashMap<TypeId, Box<dyn Any>>,
}

impl RngPlugin {
    fn clear(&mut self) {
        self.rng_map.clear();
    }

    fn get_rng<R: RngId>(&mut self) -> &mut R::RngType {
        let base_seed = self.base_seed;
        self.rng_map
            .entry(type_of::<R>())
            .or_insert_with(|| {
                let seed_offset = base_seed.wrapping_add(hash_str(R::name));
                Box::new(R::new(seed_offset))
            })
            .downcast_mut::<R>()
            .unwrap() // Will never panic as only an `R` is stored under `type_of::<R>()`
            .rng()
    }
}

impl DataPlugin for RngPlugin {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| RngPlugin {
        base_seed: 0,
        rng_map: HashMap::default(),
    };
}

/// Gets a mutable reference to the random number generator associated with the given
/// `RngId`.
// This is a private free function so that it's not leaked to the public API.
fn get_rng<R: RngId>(context: &mut Context) -> &mut R::RngType {
    context.get_data_container_mut::<RngPlugin>().get_rng::<R>()
}

pub trait ContextRandomExt {
    fn init_random(&mut self, base_seed: u64);

    /// Gets a random sample from the random number generator associated with the given
    /// `RngId` by applying the specified sampler function. If the Rng has not been used
    /// before, one will be created with the base seed you defined in `init_random`.
    fn sample<R: RngId, T>(&mut self, sampler: impl FnOnce(&mut R::RngType) -> T) -> T;

    /// Gets a random sample from the specified distribution using a random number generator
    /// associated with the given `RngId`.
    fn sample_distr<R: RngId, T>(&mut self, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng;

    /// Gets a random sample within the range provided by `range`
    /// using the generator associated with the given `RngId`.
    fn sample_range<R: RngId, S, T>(&mut self, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform;

    /// Gets a random boolean value which is true with probability `p`
    /// using the generator associated with the given `RngId`. `p` must lie in `[0, 1]`.
    fn sample_bool<R: RngId>(&mut self, p: f64) -> bool
    where
        R::RngType: Rng;

    /// Draws a Poisson variate with the given mean. A mean of zero always yields zero and does
    /// not consume a draw.
    fn sample_poisson<R: RngId>(&mut self, mean: f64) -> Result<u32, HpvError>
    where
        R::RngType: Rng;

    /// Puts `values` into a uniformly random order.
    fn shuffle<R: RngId, T>(&mut self, values: &mut [T])
    where
        R::RngType: Rng;
}

impl ContextRandomExt for Context {
    /// Initializes the `RngPlugin` data container to store rngs as well as a base
    /// seed. Note that rngs are created lazily when `get_rng` is called.
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module with seed {base_seed}");
        let rng_container = self.get_data_container_mut::<RngPlugin>();
        rng_container.base_seed = base_seed;

        // Clear any existing Rngs to ensure they get re-seeded when `get_rng` is called
        rng_container.clear();
    }

    fn sample<R: RngId, T>(&mut self, sampler: impl FnOnce(&mut R::RngType) -> T) -> T {
        let rng = get_rng::<R>(self);
        sampler(rng)
    }

    fn sample_distr<R: RngId, T>(&mut self, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng,
    {
        let rng = get_rng::<R>(self);
        distribution.sample::<R::RngType>(rng)
    }

    fn sample_range<R: RngId, S, T>(&mut self, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample::<R, T>(|rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId>(&mut self, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample::<R, bool>(|rng| rng.random_bool(p))
    }

    fn sample_poisson<R: RngId>(&mut self, mean: f64) -> Result<u32, HpvError>
    where
        R::RngType: Rng,
    {
        if mean == 0.0 {
            return Ok(0);
        }
        let poisson = Poisson::new(mean).map_err(|error| {
            HpvError::ConfigError(format!("invalid Poisson mean {mean}: {error}"))
        })?;
        let value: f64 = self.sample_distr::<R, f64>(poisson);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = value as u32;
        Ok(count)
    }

    fn shuffle<R: RngId, T>(&mut self, values: &mut [T])
    where
        R::RngType: Rng,
    {
        self.sample::<R, ()>(|rng| values.shuffle(rng));
    }
}
