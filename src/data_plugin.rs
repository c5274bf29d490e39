/*!

An object safe trait for the data containers a [`Context`](crate::Context) owns. Each plugin
type knows how to construct its own empty state with `new()`, so the context can create it
lazily the first time any module asks for it. The hitch is it needs to be `'static`.

```rust
# use hpv_network::DataPlugin;
#[derive(Default)]
struct DeathLog {
  deaths: Vec<u32>,
}

impl DataPlugin for DeathLog {
  const new: &'static dyn Fn() -> Self = &DeathLog::default;
}

let log = <DeathLog as DataPlugin>::new();
assert!(log.deaths.is_empty());
```

*/

use std::any::Any;

/// An object-safe trait for plugin data that can construct itself.
pub trait DataPlugin: Any + 'static {
  /// A constant reference to a constructor
  #[allow(non_upper_case_globals)]
  const new: &'static dyn Fn() -> Self;
}

impl<T: 'static> DataPlugin for Vec<T> {
  const new: &'static dyn Fn() -> Self = &Vec::<T>::new;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Counter(u32);

  impl DataPlugin for Counter {
    const new: &'static dyn Fn() -> Self = &Counter::default;
  }

  #[test]
  fn test_new_vec() {
    let mut ages = <Vec<u32> as DataPlugin>::new();
    ages.push(20);
    assert_eq!(ages, vec![20]);
  }

  #[test]
  fn test_custom_plugin() {
    let counter = <Counter as DataPlugin>::new();
    assert_eq!(counter.0, 0);
  }
}
