use crate::{context::Context, data_plugin::DataPlugin};

pub const MONTHS_PER_YEAR: u32 = 12;

/// The simulation's month and year counters. Lives in the `Context` rather than in a static so
/// independent runs never share a clock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    month: u32,
    year: u32,
}

impl DataPlugin for SimulationClock {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &SimulationClock::default;
}

pub trait ContextClockExt {
    /// Months elapsed since the start of the run.
    fn current_month(&self) -> u32;
    /// Years elapsed since the start of the run. This is the surveillance year index.
    fn current_year(&self) -> u32;
    /// Advances the month counter, and the year counter on every 12-month boundary.
    fn advance_month(&mut self);
}

impl ContextClockExt for Context {
    fn current_month(&self) -> u32 {
        self.get_data_container::<SimulationClock>()
            .map_or(0, |clock| clock.month)
    }

    fn current_year(&self) -> u32 {
        self.get_data_container::<SimulationClock>()
            .map_or(0, |clock| clock.year)
    }

    fn advance_month(&mut self) {
        let clock = self.get_data_container_mut::<SimulationClock>();
        clock.month += 1;
        if clock.month % MONTHS_PER_YEAR == 0 {
            clock.year += 1;
        }
    }
}
