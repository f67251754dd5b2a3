use crate::error::{LabError, LabResult};
use crate::validators::Allowed;
use crate::value::Value;

pub(crate) fn to_wire(value: &Value, allowed: &Allowed) -> LabResult<Value> {
    match allowed {
        Allowed::Map(pairs) => pairs
            .iter()
            .find(|(user, _)| user.loosely_eq(value))
            .map(|(_, wire)| wire.clone())
            .ok_or_else(|| LabError::Mapping(format!("{} has no entry in {}", value, allowed))),
        Allowed::Set(values) => values
            .iter()
            .position(|v| v.loosely_eq(value))
            .map(Value::from)
            .ok_or_else(|| LabError::Mapping(format!("{} is not in {}", value, allowed))),
        other => Err(LabError::Configuration(format!(
            "Cannot map values through {}",
            other
        ))),
    }
}

pub(crate) fn from_wire(token: &Value, allowed: &Allowed) -> LabResult<Value> {
    match allowed {
        Allowed::Map(pairs) => pairs
            .iter()
            .find(|(_, wire)| wire.loosely_eq(token))
            .map(|(user, _)| user.clone())
            .ok_or_else(|| {
                LabError::Mapping(format!("{} has no reverse entry in {}", token, allowed))
            }),
        Allowed::Set(values) => token
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| values.get(i))
            .cloned()
            .ok_or_else(|| {
                LabError::Mapping(format!("{} is not an index into {}", token, allowed))
            }),
        other => Err(LabError::Configuration(format!(
            "Cannot map values through {}",
            other
        ))),
    }
}

/// Checks at registration that a table can be used with `map_values`.
pub(crate) fn check_mappable(name: &str, allowed: Option<&Allowed>) -> LabResult<()> {
    match allowed {
        Some(Allowed::Map(_)) | Some(Allowed::Set(_)) => Ok(()),
        Some(other) => Err(LabError::Configuration(format!(
            "Property '{}' maps values through {}, which is neither a set nor a map",
            name, other
        ))),
        None => Err(LabError::Configuration(format!(
            "Property '{}' maps values but declares none",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_round_trips_every_pair() {
        let allowed = Allowed::map([("LOW", 0), ("HIGH", 1)]);
        for (user, wire) in [("LOW", 0), ("HIGH", 1)] {
            let token = to_wire(&Value::from(user), &allowed).unwrap();
            assert_eq!(token, Value::from(wire));
            assert_eq!(from_wire(&token, &allowed).unwrap(), Value::from(user));
        }
    }

    #[test]
    fn reverse_lookup_compares_numbers_loosely() {
        let allowed = Allowed::map([(true, 1), (false, 0)]);
        assert_eq!(
            from_wire(&Value::Float(1.0), &allowed).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn missing_reverse_entry_is_an_error() {
        let allowed = Allowed::map([("LOW", 0), ("HIGH", 1)]);
        assert!(matches!(
            from_wire(&Value::Int(7), &allowed),
            Err(LabError::Mapping(_))
        ));
        assert!(matches!(
            to_wire(&Value::from("MID"), &allowed),
            Err(LabError::Mapping(_))
        ));
    }

    #[test]
    fn sets_map_through_indices() {
        let allowed = Allowed::set([0.1, 1.0, 10.0]);
        assert_eq!(to_wire(&Value::Float(10.0), &allowed).unwrap(), Value::Int(2));
        assert_eq!(from_wire(&Value::Float(1.0), &allowed).unwrap(), Value::Float(1.0));
        assert!(from_wire(&Value::Int(3), &allowed).is_err());
        assert!(from_wire(&Value::Int(-1), &allowed).is_err());
    }

    #[test]
    fn ranges_cannot_be_mapped() {
        assert!(check_mappable("volts", Some(&Allowed::range(0.0, 1.0))).is_err());
        assert!(check_mappable("volts", None).is_err());
        assert!(check_mappable("mode", Some(&Allowed::set(["A"]))).is_ok());
    }
}
