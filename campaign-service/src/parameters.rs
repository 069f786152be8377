// Parameter Space Expansion
// Expands named numeric axes into concrete combinations with stable identities

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a parameter set
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter set has no axes")]
    NoAxes,

    #[error("axis name must not be empty")]
    EmptyName,

    #[error("axis '{0}' has no values")]
    EmptyAxis(String),

    #[error("axis '{0}' is declared more than once")]
    DuplicateAxis(String),

    #[error("axis '{axis}' contains a non-finite value: {value}")]
    NonFinite { axis: String, value: f64 },

    #[error("axis '{axis}' repeats the value {value}")]
    DuplicateValue { axis: String, value: String },
}

/// One named axis of the parameter space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<f64>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: impl Into<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }
}

/// Ordered collection of axes; the campaign is their full Cartesian product.
///
/// Axis order is part of the contract: it fixes both the iteration order of
/// [`ParameterSet::combinations`] and the layout of every identity string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSet {
    axes: Vec<Axis>,
}

impl ParameterSet {
    /// Build a parameter set, rejecting empty, duplicated, or non-finite axes
    /// and axes that repeat a value
    pub fn new(axes: Vec<Axis>) -> Result<Self, ParameterError> {
        if axes.is_empty() {
            return Err(ParameterError::NoAxes);
        }

        for (i, axis) in axes.iter().enumerate() {
            if axis.name.is_empty() {
                return Err(ParameterError::EmptyName);
            }
            if axis.values.is_empty() {
                return Err(ParameterError::EmptyAxis(axis.name.clone()));
            }
            if axes[..i].iter().any(|prev| prev.name == axis.name) {
                return Err(ParameterError::DuplicateAxis(axis.name.clone()));
            }
            if let Some(value) = axis.values.iter().find(|v| !v.is_finite()) {
                return Err(ParameterError::NonFinite {
                    axis: axis.name.clone(),
                    value: *value,
                });
            }

            // Identities are built from formatted values, so compare those
            let mut seen = Vec::with_capacity(axis.values.len());
            for value in axis.values.iter().map(|v| format_value(*v)) {
                if seen.contains(&value) {
                    return Err(ParameterError::DuplicateValue {
                        axis: axis.name.clone(),
                        value,
                    });
                }
                seen.push(value);
            }
        }

        Ok(Self { axes })
    }

    /// Build from an insertion-ordered map of axis name to values
    pub fn from_map(map: IndexMap<String, Vec<f64>>) -> Result<Self, ParameterError> {
        Self::new(
            map.into_iter()
                .map(|(name, values)| Axis { name, values })
                .collect(),
        )
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Number of combinations (product of all axis sizes)
    pub fn len(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the Cartesian product in nested-loop order.
    ///
    /// The first declared axis is the outermost loop; the last axis varies
    /// fastest.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            axes: &self.axes,
            cursor: Some(vec![0; self.axes.len()]),
        }
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = IndexMap::<String, Vec<f64>>::deserialize(deserializer)?;
        ParameterSet::from_map(map).map_err(serde::de::Error::custom)
    }
}

/// Iterator over all combinations of a [`ParameterSet`]
pub struct Combinations<'a> {
    axes: &'a [Axis],
    cursor: Option<Vec<usize>>,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;

        let combination = Combination {
            assignments: self
                .axes
                .iter()
                .zip(cursor.iter())
                .map(|(axis, &i)| (axis.name.clone(), axis.values[i]))
                .collect(),
        };

        // Odometer increment, last axis first
        let mut exhausted = true;
        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < self.axes[pos].values.len() {
                exhausted = false;
                break;
            }
            cursor[pos] = 0;
        }
        if exhausted {
            self.cursor = None;
        }

        Some(combination)
    }
}

/// One concrete assignment of a value to every axis
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    /// (axis name, value) pairs in axis declaration order
    pub assignments: Vec<(String, f64)>,
}

impl Combination {
    /// Deterministic identity string: `<model>_<axis>_<value>...`
    ///
    /// Used for node naming, per-combination directories, and job names.
    pub fn identity(&self, model: &str) -> String {
        let mut identity = model.to_string();
        for (name, value) in &self.assignments {
            identity.push('_');
            identity.push_str(name);
            identity.push('_');
            identity.push_str(&format_value(*value));
        }
        identity
    }

    /// Exactly the axis to value pairs of this combination, in axis order
    pub fn substitutions(&self) -> IndexMap<String, String> {
        self.assignments
            .iter()
            .map(|(name, value)| (name.clone(), format_value(*value)))
            .collect()
    }

    pub fn get(&self, axis: &str) -> Option<f64> {
        self.assignments
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| *value)
    }
}

/// Format a parameter value for identities and substitutions.
///
/// Shortest round-trip representation; integral values keep a trailing
/// `.0` so `40000.0` and `40000` never alias across campaigns.
pub fn format_value(value: f64) -> String {
    format!("{:?}", value)
}
