use serde::ser::{Serialize, SerializeMap, Serializer};

/// Per-checkbox mark flags plus the ballot verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkResult {
    /// One flag per checkbox, in template order.
    pub marks: Vec<bool>,
    /// A ballot is valid only with exactly one marked checkbox.
    pub invalid: bool,
    /// Mean transform error of the chosen template; lower is better.
    pub affinity_accuracy: f64,
}

impl MarkResult {
    pub fn marked_count(&self) -> usize {
        self.marks.iter().filter(|&&m| m).count()
    }
}

/// Builds the verdict for a ballot from its per-checkbox flags.
pub fn validate_ballot(marks: Vec<bool>, affinity_accuracy: f64) -> MarkResult {
    let marked = marks.iter().filter(|&&m| m).count();
    MarkResult {
        invalid: marked != 1,
        marks,
        affinity_accuracy,
    }
}

/// Serialized as `{"mark_1": bool, …, "mark_N": bool, "invalid": bool,
/// "affinity_accuracy": float}`.
impl Serialize for MarkResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.marks.len() + 2))?;
        for (i, marked) in self.marks.iter().enumerate() {
            map.serialize_entry(&format!("mark_{}", i + 1), marked)?;
        }
        map.serialize_entry("invalid", &self.invalid)?;
        map.serialize_entry("affinity_accuracy", &self.affinity_accuracy)?;
        map.end()
    }
}
