use crate::{
    data_plugin::DataPlugin,
    type_of,
    HashMap,
    TypeId,
};
use std::any::Any;

/// Owns every piece of simulation state. Modules never keep their own statics; they store a
/// data plugin here and reach it through their `Context*Ext` trait, so two contexts are fully
/// isolated from each other.
pub struct Context {
    // This is actually a `HashMap<TypeId, Box<dyn DataPlugin>>` but must be declared this way to
    // avoid having to implement an `as_any()` method on everything.
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
}

impl Context {
    pub fn new() -> Self {
        Context {
            data_plugins: HashMap::default(),
        }
    }

    /// Returns a mutable reference for the data container for `T`, creating it if it doesn't exist yet.
    pub fn get_data_container_mut<T: DataPlugin>(&mut self) -> &mut T {
        self.data_plugins
            .entry(type_of::<T>())
            .or_insert_with(|| Box::new(<T as DataPlugin>::new()))
            .downcast_mut::<T>()
            .unwrap() // Will never panic as data container has the matching type
    }

    /// Returns a reference to the data container for `T` if it exists.
    /// If you need a mutable reference or lazy instantiation, use `Context::get_data_container_mut()`.
    pub fn get_data_container<T: DataPlugin>(&self) -> Option<&T> {
        self.data_plugins
            .get(&type_of::<T>())
            .and_then(|data| data.downcast_ref::<T>())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let mut context = Context::new();
        {
            // If you specify the type of the variable the compiler can infer the generic type.
            let ages: &mut Vec<u32> = context.get_data_container_mut();
            ages.push(1);
            ages.push(2);
        }
        {
            let names: &mut Vec<&str> = context.get_data_container_mut();
            names.push("HPV16");
        }

        assert_eq!(context.get_data_container::<Vec<u32>>(), Some(&vec![1, 2]));
        assert_eq!(context.get_data_container::<Vec<&str>>(), Some(&vec!["HPV16"]));
    }

    #[test]
    fn test_missing_container() {
        let context = Context::new();
        assert!(context.get_data_container::<Vec<u8>>().is_none());
    }

    #[test]
    fn test_contexts_are_isolated() {
        let mut first = Context::new();
        let second = Context::new();
        first.get_data_container_mut::<Vec<u8>>().push(7);
        assert!(second.get_data_container::<Vec<u8>>().is_none());
    }
}
