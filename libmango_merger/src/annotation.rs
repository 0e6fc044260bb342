/// Value written in place of a missing field, so that every stored column keeps a numeric type
pub const MISSING_VALUE: f32 = 0.0;

/// An ordered mapping of field name to (optional) numeric value.
///
/// Used for logbook metadata, environmental samples and the final set of fields
/// attached to an event file. Insertion order is kept because it is the order columns
/// are written in. Inserting an existing name replaces the value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    fields: Vec<(String, Option<f64>)>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Option<f64>) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Returns None if the field is absent, Some(None) if present without a value
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<f64>> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Merge another annotation into this one; the other annotation wins on name clashes
    pub fn extend(&mut self, other: &Annotation) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Keep only the fields that `other` holds with the same value. Returns the names
    /// that were dropped.
    pub fn retain_agreeing(&mut self, other: &Annotation) -> Vec<String> {
        let dropped: Vec<String> = self
            .fields
            .iter()
            .filter(|(name, value)| other.get(name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        for name in dropped.iter() {
            self.remove(name);
        }
        dropped
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The values as they are stored in an event file: 32-bit floats with missing values as 0.0
    pub fn to_stored(&self) -> Vec<(String, f32)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.map_or(MISSING_VALUE, |v| v as f32)))
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<(S, Option<f64>)> for Annotation {
    fn from_iter<T: IntoIterator<Item = (S, Option<f64>)>>(iter: T) -> Self {
        let mut annotation = Self::new();
        for (name, value) in iter {
            annotation.insert(name.as_ref(), value);
        }
        annotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut fields = Annotation::new();
        fields.insert("KEG_temp", Some(293.0));
        fields.insert("KEG_pressure", Some(101_000.0));
        fields.insert("KEG_temp", Some(294.5));
        assert_eq!(
            fields.names().collect::<Vec<_>>(),
            vec!["KEG_temp", "KEG_pressure"]
        );
        assert_eq!(fields.get("KEG_temp"), Some(Some(294.5)));
        assert_eq!(fields.get("nope"), None);
    }

    #[test]
    fn test_missing_values_are_stored_as_zero() {
        let fields: Annotation = [("VOC (-)", None), ("Humidity (%)", Some(41.5))]
            .into_iter()
            .collect();
        let stored = fields.to_stored();
        assert_eq!(stored[0], (String::from("VOC (-)"), 0.0));
        assert!(!stored[0].1.is_nan());
        assert_eq!(stored[1], (String::from("Humidity (%)"), 41.5));
    }

    #[test]
    fn test_extend_overrides() {
        let mut env: Annotation = [("DRIFT_V", Some(1.0)), ("KEG_temp", Some(290.0))]
            .into_iter()
            .collect();
        let run: Annotation = [("DRIFT_V", Some(500.0))].into_iter().collect();
        env.extend(&run);
        assert_eq!(env.get("DRIFT_V"), Some(Some(500.0)));
        assert_eq!(env.len(), 2);
        assert_eq!(env.remove("KEG_temp"), Some(Some(290.0)));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_retain_agreeing_drops_differing_and_absent() {
        let mut group: Annotation = [
            ("He(%)", Some(80.0)),
            ("DRIFT_V", Some(500.0)),
            ("HOLE_number", Some(2.0)),
            ("VOC (-)", None),
        ]
        .into_iter()
        .collect();
        let other: Annotation = [
            ("He(%)", Some(60.0)),
            ("DRIFT_V", Some(500.0)),
            ("VOC (-)", None),
        ]
        .into_iter()
        .collect();
        let dropped = group.retain_agreeing(&other);
        assert_eq!(dropped, vec!["He(%)", "HOLE_number"]);
        assert_eq!(group.names().collect::<Vec<_>>(), vec!["DRIFT_V", "VOC (-)"]);
    }
}
