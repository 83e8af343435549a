use serde_json::Value;

/// Decides whether a value can change after it was handed out.
///
/// Immutable values that are rebound to an equal value need no write-back.
pub trait Immutability<V>: Send + Sync {
    /// Whether `value` cannot be mutated in place.
    fn is_immutable(&self, value: &V) -> bool;
}

impl<V, F> Immutability<V> for F
where
    F: Fn(&V) -> bool + Send + Sync,
{
    fn is_immutable(&self, value: &V) -> bool {
        self(value)
    }
}

/// Treats every value as mutable, so every write goes back to the store.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverImmutable;

impl<V> Immutability<V> for NeverImmutable {
    fn is_immutable(&self, _value: &V) -> bool {
        false
    }
}

/// JSON scalars are immutable; arrays and objects are not.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmutableScalars;

impl Immutability<Value> for ImmutableScalars {
    fn is_immutable(&self, value: &Value) -> bool {
        !matches!(value, Value::Array(_) | Value::Object(_))
    }
}
