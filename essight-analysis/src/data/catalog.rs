//! Variable catalog: what each survey column means and which codes are valid.

use serde::{Deserialize, Serialize};

/// Measurement level of a cataloged variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Categorical,
    Ordinal,
    Continuous,
}

/// Catalog entry for a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub label: String,
    pub kind: VariableKind,
    /// Inclusive valid range for numeric codes.
    pub valid_range: Option<(f64, f64)>,
    /// Codes meaning refusal, don't know, or no answer.
    pub sentinels: Vec<f64>,
    /// Values are free text rather than numeric codes.
    pub text: bool,
    /// Computed by the cleaner rather than read from the source.
    pub derived: bool,
}

impl VariableSpec {
    pub fn ordinal(name: &str, label: &str, lo: f64, hi: f64, sentinels: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: VariableKind::Ordinal,
            valid_range: Some((lo, hi)),
            sentinels: sentinels.to_vec(),
            text: false,
            derived: false,
        }
    }

    pub fn continuous(name: &str, label: &str, lo: f64, hi: f64, sentinels: &[f64]) -> Self {
        Self {
            kind: VariableKind::Continuous,
            ..Self::ordinal(name, label, lo, hi, sentinels)
        }
    }

    pub fn categorical(name: &str, label: &str, lo: f64, hi: f64, sentinels: &[f64]) -> Self {
        Self {
            kind: VariableKind::Categorical,
            ..Self::ordinal(name, label, lo, hi, sentinels)
        }
    }

    /// A categorical variable stored as text (country codes and derived labels).
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: VariableKind::Categorical,
            valid_range: None,
            sentinels: Vec::new(),
            text: true,
            derived: false,
        }
    }

    pub fn into_derived(mut self) -> Self {
        self.derived = true;
        self
    }

    pub fn is_numeric(&self) -> bool {
        !self.text
    }

    /// Ordinal and categorical codes must be whole numbers.
    pub fn requires_integral(&self) -> bool {
        self.is_numeric() && self.kind != VariableKind::Continuous
    }

    pub fn is_sentinel(&self, value: f64) -> bool {
        self.sentinels.iter().any(|s| *s == value)
    }

    pub fn in_range(&self, value: f64) -> bool {
        match self.valid_range {
            Some((lo, hi)) => value >= lo && value <= hi,
            None => true,
        }
    }
}

/// Ordered collection of variable specs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    specs: Vec<VariableSpec>,
}

impl Catalog {
    pub fn new(specs: Vec<VariableSpec>) -> Self {
        let mut catalog = Self::default();
        for spec in specs {
            catalog.insert(spec);
        }
        catalog
    }

    /// The ESS round 11 variables used by the analysis, plus the fields the
    /// cleaner derives from them.
    pub fn ess_default() -> Self {
        Self::new(vec![
            VariableSpec::ordinal(
                "impcntr",
                "Allow many/few immigrants from poorer countries outside Europe",
                1.0,
                4.0,
                &[7.0, 8.0, 9.0],
            ),
            VariableSpec::ordinal(
                "lrscale",
                "Placement on left right scale",
                0.0,
                10.0,
                &[77.0, 88.0, 99.0],
            ),
            VariableSpec::ordinal(
                "hincfel",
                "Feeling about household's income nowadays",
                1.0,
                4.0,
                &[7.0, 8.0, 9.0],
            ),
            VariableSpec::ordinal(
                "eisced",
                "Highest level of education, ES-ISCED",
                1.0,
                7.0,
                &[55.0, 77.0, 88.0, 99.0],
            ),
            VariableSpec::ordinal(
                "aesfdrk",
                "Feeling of safety of walking alone in local area after dark",
                1.0,
                4.0,
                &[7.0, 8.0, 9.0],
            ),
            VariableSpec::continuous(
                "agea",
                "Age of respondent, calculated",
                16.0,
                100.0,
                &[999.0],
            ),
            VariableSpec::categorical("gndr", "Gender", 1.0, 2.0, &[9.0]),
            VariableSpec::text("cntry", "Country"),
            VariableSpec::text("age_group", "Age group").into_derived(),
            VariableSpec::text("education_group", "Education group").into_derived(),
            VariableSpec::text("income_group", "Income group").into_derived(),
            VariableSpec::text("political_group", "Political orientation group").into_derived(),
            VariableSpec::text("immigration_group", "Immigration attitude group").into_derived(),
            VariableSpec::categorical("gender_female", "Respondent is female", 0.0, 1.0, &[])
                .into_derived(),
        ])
    }

    /// Insert a spec, replacing any existing entry with the same name.
    pub fn insert(&mut self, spec: VariableSpec) {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.specs.iter()
    }

    /// Variables read from the source (everything not derived).
    pub fn source_variables(&self) -> impl Iterator<Item = &VariableSpec> {
        self.specs.iter().filter(|s| !s.derived)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ess_default_catalog() {
        let catalog = Catalog::ess_default();
        let impcntr = catalog.get("impcntr").unwrap();
        assert_eq!(impcntr.kind, VariableKind::Ordinal);
        assert_eq!(impcntr.valid_range, Some((1.0, 4.0)));
        assert!(impcntr.is_sentinel(8.0));
        assert!(!impcntr.in_range(0.0));

        let eisced = catalog.get("eisced").unwrap();
        assert!(eisced.is_sentinel(55.0));

        let cntry = catalog.get("cntry").unwrap();
        assert!(cntry.text);
        assert!(!cntry.derived);

        assert_eq!(catalog.source_variables().count(), 8);
        assert!(catalog.get("age_group").unwrap().derived);
    }

    #[test]
    fn test_requires_integral() {
        let catalog = Catalog::ess_default();
        assert!(catalog.get("lrscale").unwrap().requires_integral());
        assert!(catalog.get("gndr").unwrap().requires_integral());
        assert!(!catalog.get("agea").unwrap().requires_integral());
        assert!(!catalog.get("cntry").unwrap().requires_integral());
    }

    #[test]
    fn test_insert_replaces() {
        let mut catalog = Catalog::ess_default();
        let before = catalog.len();
        catalog.insert(VariableSpec::continuous("agea", "Age", 18.0, 99.0, &[]));
        assert_eq!(catalog.len(), before);
        assert_eq!(catalog.get("agea").unwrap().valid_range, Some((18.0, 99.0)));
    }
}
