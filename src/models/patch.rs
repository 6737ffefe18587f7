use serde::{Deserialize, Deserializer};

/// A single field of a partial update.
///
/// Absent JSON fields deserialize to `Keep`; present ones to `Set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Keep => None,
        }
    }

    /// Apply to `target` in place.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Set(value) => Patch::Set(f(value)),
            Patch::Keep => Patch::Keep,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        count: Patch<u32>,
    }

    #[test]
    fn absent_fields_are_kept() {
        let s: Sample = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(s.name, Patch::Set("x".to_string()));
        assert_eq!(s.count, Patch::Keep);
    }

    #[test]
    fn apply_leaves_target_alone_on_keep() {
        let mut v = 3;
        Patch::Keep.apply_to(&mut v);
        assert_eq!(v, 3);
        Patch::Set(7).apply_to(&mut v);
        assert_eq!(v, 7);
    }
}
