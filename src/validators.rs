use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::{LabError, LabResult};
use crate::value::Value;

/// The allowed-values table attached to a property.
#[derive(Debug, Clone, PartialEq)]
pub enum Allowed {
    /// Inclusive numeric bounds
    Range { min: f64, max: f64 },
    /// Inclusive numeric bounds where the value must be a multiple of `step`
    DiscreteRange { min: f64, max: f64, step: f64 },
    /// Enumerable set of permitted values, in declaration order
    Set(Vec<Value>),
    /// `(user value, wire token)` pairs, in declaration order
    Map(Vec<(Value, Value)>),
    /// One table per validator of a [`Validator::Joined`]
    Joined(Vec<Allowed>),
}

impl Allowed {
    pub fn range(min: f64, max: f64) -> Self {
        Allowed::Range { min, max }
    }

    pub fn discrete_range(min: f64, max: f64, step: f64) -> Self {
        Allowed::DiscreteRange { min, max, step }
    }

    pub fn set<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Allowed::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<Value>, W: Into<Value>>(pairs: impl IntoIterator<Item = (K, W)>) -> Self {
        Allowed::Map(
            pairs
                .into_iter()
                .map(|(k, w)| (k.into(), w.into()))
                .collect(),
        )
    }

    /// Numeric `(min, max)` of the table. A set is bounded by its extremes.
    pub fn bounds(&self) -> LabResult<(f64, f64)> {
        match self {
            Allowed::Range { min, max } | Allowed::DiscreteRange { min, max, .. } => {
                Ok((*min, *max))
            }
            Allowed::Set(values) => {
                let numbers = values
                    .iter()
                    .map(|v| v.as_f64())
                    .collect::<Option<Vec<f64>>>()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        LabError::Configuration(format!("{} has no numeric bounds", self))
                    })?;
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Ok((min, max))
            }
            Allowed::Map(_) | Allowed::Joined(_) => Err(LabError::Configuration(format!(
                "{} has no numeric bounds",
                self
            ))),
        }
    }

    /// Candidate user values: set members or map keys.
    pub fn members(&self) -> LabResult<Vec<&Value>> {
        match self {
            Allowed::Set(values) => Ok(values.iter().collect()),
            Allowed::Map(pairs) => Ok(pairs.iter().map(|(k, _)| k).collect()),
            _ => Err(LabError::Configuration(format!(
                "{} is not a discrete set",
                self
            ))),
        }
    }
}

impl fmt::Display for Allowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allowed::Range { min, max } => write!(f, "[{}, {}]", min, max),
            Allowed::DiscreteRange { min, max, step } => {
                write!(f, "[{}, {}] in steps of {}", min, max, step)
            }
            Allowed::Set(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Allowed::Map(pairs) => {
                let items: Vec<String> = pairs.iter().map(|(k, w)| format!("{}: {}", k, w)).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Allowed::Joined(parts) => {
                let items: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", items.join(" | "))
            }
        }
    }
}

pub type ValidatorFn = Arc<dyn Fn(&Value, &Allowed) -> LabResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum Validator {
    StrictRange,
    StrictDiscreteRange,
    StrictDiscreteSet,
    TruncatedRange,
    TruncatedDiscreteSet,
    ModularRange,
    ModularRangeBidirectional,
    /// Tries each validator against the matching entry of `Allowed::Joined`
    Joined(Vec<Validator>),
    Custom(ValidatorFn),
}

impl Validator {
    pub fn custom(f: impl Fn(&Value, &Allowed) -> LabResult<Value> + Send + Sync + 'static) -> Self {
        Validator::Custom(Arc::new(f))
    }

    pub fn validate(&self, value: &Value, allowed: &Allowed) -> LabResult<Value> {
        match self {
            Validator::StrictRange => strict_range(value, allowed),
            Validator::StrictDiscreteRange => strict_discrete_range(value, allowed),
            Validator::StrictDiscreteSet => strict_discrete_set(value, allowed),
            Validator::TruncatedRange => truncated_range(value, allowed),
            Validator::TruncatedDiscreteSet => truncated_discrete_set(value, allowed),
            Validator::ModularRange => modular_range(value, allowed),
            Validator::ModularRangeBidirectional => modular_range_bidirectional(value, allowed),
            Validator::Joined(validators) => joined(validators, value, allowed),
            Validator::Custom(f) => f(value, allowed),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::StrictRange => write!(f, "StrictRange"),
            Validator::StrictDiscreteRange => write!(f, "StrictDiscreteRange"),
            Validator::StrictDiscreteSet => write!(f, "StrictDiscreteSet"),
            Validator::TruncatedRange => write!(f, "TruncatedRange"),
            Validator::TruncatedDiscreteSet => write!(f, "TruncatedDiscreteSet"),
            Validator::ModularRange => write!(f, "ModularRange"),
            Validator::ModularRangeBidirectional => write!(f, "ModularRangeBidirectional"),
            Validator::Joined(v) => f.debug_tuple("Joined").field(v).finish(),
            Validator::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

// NaN is rejected here so no validator can pass it on to the wire.
fn numeric(value: &Value) -> LabResult<f64> {
    match value.as_f64() {
        Some(v) if !v.is_nan() => Ok(v),
        _ => Err(LabError::Validation(format!("Value {} is not a number", value))),
    }
}

/// Passes `value` unchanged if `min <= value <= max`.
pub fn strict_range(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let (min, max) = allowed.bounds()?;
    let v = numeric(value)?;
    if !(min <= v && v <= max) {
        return Err(LabError::Validation(format!(
            "Value of {} is not in range [{}, {}]",
            value, min, max
        )));
    }
    Ok(value.clone())
}

/// Like [`strict_range`], additionally requiring the value to be a multiple
/// of the step.
pub fn strict_discrete_range(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let Allowed::DiscreteRange { step, .. } = allowed else {
        return Err(LabError::Configuration(format!(
            "strict_discrete_range needs a discrete range, got {}",
            allowed
        )));
    };
    strict_range(value, allowed)?;
    let v = numeric(value)?;
    let steps = (v / step).round();
    if (v - steps * step).abs() > 1e-9 * v.abs().max(1.0) {
        return Err(LabError::Validation(format!(
            "Value of {} is not a multiple of {}",
            value, step
        )));
    }
    Ok(value.clone())
}

/// Passes `value` unchanged if it is a member of the set (or a key of the map).
pub fn strict_discrete_set(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    if allowed.members()?.iter().any(|m| m.loosely_eq(value)) {
        Ok(value.clone())
    } else {
        Err(LabError::Validation(format!(
            "Value of {} is not in the discrete set {}",
            value, allowed
        )))
    }
}

/// Clamps `value` to the bounds, never rejecting a number.
pub fn truncated_range(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let (min, max) = allowed.bounds()?;
    let v = numeric(value)?;
    if v < min {
        warn!("Value {} below {}, truncated", value, min);
        Ok(Value::Float(min))
    } else if v > max {
        warn!("Value {} above {}, truncated", value, max);
        Ok(Value::Float(max))
    } else {
        Ok(value.clone())
    }
}

/// Picks the member closest to `value`; ties go to the first member.
pub fn truncated_discrete_set(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let v = numeric(value)?;
    let mut best: Option<(&Value, f64)> = None;
    for member in allowed.members()? {
        let Some(m) = member.as_f64() else {
            continue;
        };
        let distance = (m - v).abs();
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((member, distance));
        }
    }
    let (chosen, distance) = best.ok_or_else(|| {
        LabError::Configuration(format!("{} has no numeric members", allowed))
    })?;
    if distance > 0.0 {
        warn!("Value {} not in {}, using {}", value, allowed, chosen);
    }
    Ok(chosen.clone())
}

/// Wraps `value` into `[min, max)`.
pub fn modular_range(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let (min, max) = allowed.bounds()?;
    let v = numeric(value)?;
    let span = max - min;
    if span <= 0.0 {
        return Err(LabError::Configuration(format!(
            "Empty modular range {}",
            allowed
        )));
    }
    Ok(Value::Float((v - min).rem_euclid(span) + min))
}

/// Wraps the magnitude of `value` into the range while keeping its sign.
pub fn modular_range_bidirectional(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let v = numeric(value)?;
    if v > 0.0 {
        modular_range(value, allowed)
    } else {
        let wrapped = numeric(&modular_range(&Value::Float(-v), allowed)?)?;
        Ok(Value::Float(-wrapped))
    }
}

fn joined(validators: &[Validator], value: &Value, allowed: &Allowed) -> LabResult<Value> {
    let Allowed::Joined(tables) = allowed else {
        return Err(LabError::Configuration(format!(
            "Joined validators need joined allowed values, got {}",
            allowed
        )));
    };
    if tables.len() != validators.len() {
        return Err(LabError::Configuration(format!(
            "{} validators joined with {} allowed-value tables",
            validators.len(),
            tables.len()
        )));
    }
    for (validator, table) in validators.iter().zip(tables) {
        if let Ok(accepted) = validator.validate(value, table) {
            return Ok(accepted);
        }
    }
    Err(LabError::Validation(format!(
        "Value of {} is not in {}",
        value, allowed
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn range() -> Allowed {
        Allowed::range(1.0, 1000.0)
    }

    #[test]
    fn strict_range_passes_values_inside_bounds() {
        for v in [1.0, 1.5, 500.0, 1000.0] {
            assert_eq!(strict_range(&Value::Float(v), &range()).unwrap(), Value::Float(v));
        }
        assert_eq!(strict_range(&Value::Int(5), &range()).unwrap(), Value::Int(5));
    }

    #[test]
    fn strict_range_rejects_values_outside_bounds() {
        for v in [0.999, -3.0, 1000.5, f64::INFINITY, f64::NAN] {
            assert!(matches!(
                strict_range(&Value::Float(v), &range()),
                Err(LabError::Validation(_))
            ));
        }
        assert!(strict_range(&Value::Str("high".into()), &range()).is_err());
    }

    #[test]
    fn strict_range_accepts_a_two_element_set() {
        let allowed = Allowed::set([10, -10]);
        assert!(strict_range(&Value::Int(0), &allowed).is_ok());
        assert!(strict_range(&Value::Int(11), &allowed).is_err());
    }

    #[traced_test]
    #[test]
    fn truncated_range_clamps_and_warns() {
        assert_eq!(
            truncated_range(&Value::Float(-5.0), &range()).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            truncated_range(&Value::Int(2000), &range()).unwrap(),
            Value::Float(1000.0)
        );
        assert_eq!(
            truncated_range(&Value::Float(20.0), &range()).unwrap(),
            Value::Float(20.0)
        );
        assert!(logs_contain("truncated"));
    }

    #[test]
    fn nan_is_never_accepted() {
        let nan = Value::Float(f64::NAN);
        for validator in [
            Validator::TruncatedRange,
            Validator::TruncatedDiscreteSet,
            Validator::ModularRange,
            Validator::ModularRangeBidirectional,
        ] {
            let allowed = match validator {
                Validator::TruncatedDiscreteSet => Allowed::set([1, 2, 3]),
                _ => range(),
            };
            assert!(matches!(
                validator.validate(&nan, &allowed),
                Err(LabError::Validation(_))
            ));
        }
    }

    #[test]
    fn strict_discrete_set_checks_membership() {
        let allowed = Allowed::set(["AC", "DC"]);
        assert!(strict_discrete_set(&Value::from("AC"), &allowed).is_ok());
        assert!(strict_discrete_set(&Value::from("GND"), &allowed).is_err());

        let numbers = Allowed::set([1, 2, 5]);
        assert_eq!(
            strict_discrete_set(&Value::Float(2.0), &numbers).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn strict_discrete_set_uses_map_keys() {
        let allowed = Allowed::map([(true, 1), (false, 0)]);
        assert!(strict_discrete_set(&Value::Bool(true), &allowed).is_ok());
        assert!(strict_discrete_set(&Value::from("maybe"), &allowed).is_err());
    }

    #[test]
    fn truncated_discrete_set_picks_closest_member() {
        let allowed = Allowed::set([1, 10, 100]);
        assert_eq!(
            truncated_discrete_set(&Value::Float(4.0), &allowed).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            truncated_discrete_set(&Value::Float(60.0), &allowed).unwrap(),
            Value::Int(100)
        );
        assert_eq!(
            truncated_discrete_set(&Value::Float(1e6), &allowed).unwrap(),
            Value::Int(100)
        );
        assert_eq!(
            truncated_discrete_set(&Value::Float(-1.0), &allowed).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn truncated_discrete_set_ties_go_to_first_member() {
        let allowed = Allowed::set([20, 10]);
        assert_eq!(
            truncated_discrete_set(&Value::Int(15), &allowed).unwrap(),
            Value::Int(20)
        );
    }

    #[test]
    fn strict_discrete_range_requires_step_multiples() {
        let allowed = Allowed::discrete_range(0.0, 10.0, 0.1);
        assert!(strict_discrete_range(&Value::Float(0.3), &allowed).is_ok());
        assert!(strict_discrete_range(&Value::Float(0.35), &allowed).is_err());
        assert!(strict_discrete_range(&Value::Float(10.1), &allowed).is_err());
        assert!(strict_discrete_range(&Value::Float(1.0), &range()).is_err());
    }

    #[test]
    fn modular_ranges_wrap() {
        let allowed = Allowed::range(0.0, 360.0);
        assert_eq!(
            modular_range(&Value::Float(370.0), &allowed).unwrap(),
            Value::Float(10.0)
        );
        assert_eq!(
            modular_range(&Value::Float(-10.0), &allowed).unwrap(),
            Value::Float(350.0)
        );
        assert_eq!(
            modular_range_bidirectional(&Value::Float(-370.0), &allowed).unwrap(),
            Value::Float(-10.0)
        );
    }

    #[test]
    fn joined_validators_accept_first_match() {
        let validator = Validator::Joined(vec![Validator::StrictDiscreteSet, Validator::StrictRange]);
        let allowed = Allowed::Joined(vec![Allowed::set(["MIN", "MAX"]), Allowed::range(0.0, 5.0)]);
        assert_eq!(
            validator.validate(&Value::from("MAX"), &allowed).unwrap(),
            Value::from("MAX")
        );
        assert_eq!(
            validator.validate(&Value::Float(2.5), &allowed).unwrap(),
            Value::Float(2.5)
        );
        assert!(validator.validate(&Value::Float(7.0), &allowed).is_err());
    }
}
