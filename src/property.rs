use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::constants::DEFAULT_SEPARATOR;
use crate::error::{LabError, LabResult};
use crate::mapping::check_mappable;
use crate::template::{check_placeholders, count_value_slots};
use crate::validators::{Allowed, Validator};
use crate::value::{FromValue, Value};

pub type ProcessFn = Arc<dyn Fn(Value) -> LabResult<Value> + Send + Sync>;
pub type ReplyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type CastFn = Arc<dyn Fn(&str) -> LabResult<Value> + Send + Sync>;

/// How each field of a reply is converted after splitting.
#[derive(Clone, Default)]
pub enum Cast {
    /// Floating point, keeping the text when the field is not numeric
    #[default]
    Float,
    /// Integer, keeping the text when the field is not an integer
    Int,
    Bool,
    Str,
    Custom(CastFn),
}

impl Cast {
    pub fn custom(f: impl Fn(&str) -> LabResult<Value> + Send + Sync + 'static) -> Self {
        Cast::Custom(Arc::new(f))
    }

    pub(crate) fn apply(&self, field: &str) -> LabResult<Value> {
        match self {
            Cast::Float => Ok(field
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Str(field.to_owned()))),
            Cast::Int => Ok(field
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| {
                    field
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| Value::Int(f as i64))
                        .ok_or(())
                })
                .unwrap_or_else(|_| Value::Str(field.to_owned()))),
            Cast::Bool => bool::from_value(Value::Str(field.to_owned())).map(Value::Bool),
            Cast::Str => Ok(Value::Str(field.to_owned())),
            Cast::Custom(f) => f(field),
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Float => write!(f, "Float"),
            Cast::Int => write!(f, "Int"),
            Cast::Bool => write!(f, "Bool"),
            Cast::Str => write!(f, "Str"),
            Cast::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Readable and writable
    Control,
    /// Read-only
    Measurement,
    /// Write-only
    Setting,
}

/// Builder for a property declaration.
#[derive(Clone)]
pub struct PropertyDef {
    name: String,
    get_command: Option<String>,
    set_command: Option<String>,
    validator: Option<Validator>,
    values: Option<Allowed>,
    map_values: bool,
    cast: Cast,
    get_process: Option<ProcessFn>,
    set_process: Option<ProcessFn>,
    preprocess_reply: Option<ReplyFn>,
    separator: Option<String>,
    maxsplit: Option<usize>,
    dynamic: bool,
    check_set_errors: bool,
    check_get_errors: bool,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>) -> Self {
        PropertyDef {
            name: name.into(),
            get_command: None,
            set_command: None,
            validator: None,
            values: None,
            map_values: false,
            cast: Cast::default(),
            get_process: None,
            set_process: None,
            preprocess_reply: None,
            separator: Some(DEFAULT_SEPARATOR.to_owned()),
            maxsplit: None,
            dynamic: false,
            check_set_errors: false,
            check_get_errors: false,
        }
    }

    pub fn get(mut self, command: impl Into<String>) -> Self {
        self.get_command = Some(command.into());
        self
    }

    pub fn set(mut self, command: impl Into<String>) -> Self {
        self.set_command = Some(command.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn values(mut self, values: Allowed) -> Self {
        self.values = Some(values);
        self
    }

    pub fn map_values(mut self, map_values: bool) -> Self {
        self.map_values = map_values;
        self
    }

    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = cast;
        self
    }

    /// Applied to the parsed value after map reversal.
    pub fn get_process(mut self, f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static) -> Self {
        self.get_process = Some(Arc::new(f));
        self
    }

    /// Applied to the value after validation and mapping, before formatting.
    pub fn set_process(mut self, f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static) -> Self {
        self.set_process = Some(Arc::new(f));
        self
    }

    pub fn preprocess_reply(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.preprocess_reply = Some(Arc::new(f));
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Keep the reply as a single field.
    pub fn no_split(mut self) -> Self {
        self.separator = None;
        self
    }

    pub fn maxsplit(mut self, maxsplit: usize) -> Self {
        self.maxsplit = Some(maxsplit);
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn check_set_errors(mut self, check: bool) -> Self {
        self.check_set_errors = check;
        self
    }

    pub fn check_get_errors(mut self, check: bool) -> Self {
        self.check_get_errors = check;
        self
    }

    pub(crate) fn into_spec(self, kind: PropertyKind, placeholders: &[String]) -> LabResult<CommandSpec> {
        let name = &self.name;
        match (kind, &self.get_command, &self.set_command) {
            (PropertyKind::Control, Some(_), Some(_))
            | (PropertyKind::Measurement, Some(_), None)
            | (PropertyKind::Setting, None, Some(_)) => {}
            (PropertyKind::Control, _, _) => {
                return Err(LabError::Configuration(format!(
                    "Control '{}' needs both a get and a set command",
                    name
                )));
            }
            (PropertyKind::Measurement, _, _) => {
                return Err(LabError::Configuration(format!(
                    "Measurement '{}' needs a get command and no set command",
                    name
                )));
            }
            (PropertyKind::Setting, _, _) => {
                return Err(LabError::Configuration(format!(
                    "Setting '{}' needs a set command and no get command",
                    name
                )));
            }
        }

        if let Some(get) = &self.get_command {
            check_placeholders(get, placeholders)?;
        }
        if let Some(set) = &self.set_command {
            check_placeholders(set, placeholders)?;
            if count_value_slots(set)? == 0 {
                return Err(LabError::template(set, "set command has no value placeholder"));
            }
        }
        if self.map_values {
            check_mappable(name, self.values.as_ref())?;
        }
        if self.values.is_none() && matches!(&self.validator, Some(v) if !matches!(v, Validator::Custom(_))) {
            return Err(LabError::Configuration(format!(
                "Property '{}' has a validator but no allowed values",
                name
            )));
        }

        Ok(CommandSpec {
            name: self.name,
            kind,
            get_command: self.get_command,
            set_command: self.set_command,
            validator: self.validator,
            values: self.values,
            map_values: self.map_values,
            cast: self.cast,
            get_process: self.get_process,
            set_process: self.set_process,
            preprocess_reply: self.preprocess_reply,
            separator: self.separator,
            maxsplit: self.maxsplit,
            dynamic: self.dynamic,
            check_set_errors: self.check_set_errors,
            check_get_errors: self.check_get_errors,
        })
    }
}

/// A registered, immutable property declaration.
#[derive(Clone)]
pub struct CommandSpec {
    pub(crate) name: String,
    pub(crate) kind: PropertyKind,
    pub(crate) get_command: Option<String>,
    pub(crate) set_command: Option<String>,
    pub(crate) validator: Option<Validator>,
    pub(crate) values: Option<Allowed>,
    pub(crate) map_values: bool,
    pub(crate) cast: Cast,
    pub(crate) get_process: Option<ProcessFn>,
    pub(crate) set_process: Option<ProcessFn>,
    pub(crate) preprocess_reply: Option<ReplyFn>,
    pub(crate) separator: Option<String>,
    pub(crate) maxsplit: Option<usize>,
    pub(crate) dynamic: bool,
    pub(crate) check_set_errors: bool,
    pub(crate) check_get_errors: bool,
}

impl CommandSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn get_command(&self) -> Option<&str> {
        self.get_command.as_deref()
    }

    pub fn set_command(&self) -> Option<&str> {
        self.set_command.as_deref()
    }

    pub fn values(&self) -> Option<&Allowed> {
        self.values.as_ref()
    }

    pub fn map_values(&self) -> bool {
        self.map_values
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("get_command", &self.get_command)
            .field("set_command", &self.set_command)
            .field("validator", &self.validator)
            .field("values", &self.values)
            .field("map_values", &self.map_values)
            .field("cast", &self.cast)
            .field("separator", &self.separator)
            .field("dynamic", &self.dynamic)
            .field("check_set_errors", &self.check_set_errors)
            .field("check_get_errors", &self.check_get_errors)
            .finish_non_exhaustive()
    }
}

/// A property that can be read, converting the reply into `Output`.
pub trait Readable {
    type Output: FromValue;
    fn name(&self) -> &str;
}

/// A property that can be written with an `Input`.
pub trait Writable {
    type Input: Into<Value>;
    fn name(&self) -> &str;
}

macro_rules! handle {
    ($(#[$doc:meta])* $handle:ident) => {
        $(#[$doc])*
        pub struct $handle<T> {
            name: Arc<str>,
            _type: PhantomData<fn() -> T>,
        }

        impl<T> $handle<T> {
            pub(crate) fn new(name: &str) -> Self {
                $handle {
                    name: Arc::from(name),
                    _type: PhantomData,
                }
            }

            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl<T> Clone for $handle<T> {
            fn clone(&self) -> Self {
                $handle {
                    name: Arc::clone(&self.name),
                    _type: PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $handle<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($handle), self.name)
            }
        }
    };
}

handle!(
    /// Handle to a readable and writable property.
    Control
);
handle!(
    /// Handle to a read-only property. It has no setter.
    Measurement
);
handle!(
    /// Handle to a write-only property.
    Setting
);

impl<T: FromValue> Readable for Control<T> {
    type Output = T;
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Into<Value>> Writable for Control<T> {
    type Input = T;
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: FromValue> Readable for Measurement<T> {
    type Output = T;
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Into<Value>> Writable for Setting<T> {
    type Input = T;
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<String> {
        vec!["ch".to_string()]
    }

    #[test]
    fn kinds_enforce_their_commands() {
        let control = PropertyDef::new("freq").get("FREQ?");
        assert!(control.into_spec(PropertyKind::Control, &[]).is_err());

        let measurement = PropertyDef::new("volts").get("MEAS:VOLT?").set("VOLT %g");
        assert!(measurement.into_spec(PropertyKind::Measurement, &[]).is_err());

        let setting = PropertyDef::new("beep").get("BEEP?").set("BEEP %d");
        assert!(setting.into_spec(PropertyKind::Setting, &[]).is_err());

        let setting = PropertyDef::new("beep").set("BEEP %d");
        assert_eq!(
            setting.into_spec(PropertyKind::Setting, &[]).unwrap().kind(),
            PropertyKind::Setting
        );
    }

    #[test]
    fn templates_are_checked_against_channel_depth() {
        let def = PropertyDef::new("freq").get("SENS{ch}:FREQ?");
        assert!(def.clone().into_spec(PropertyKind::Measurement, &[]).is_err());
        assert!(def.into_spec(PropertyKind::Measurement, &chain()).is_ok());
    }

    #[test]
    fn set_command_needs_a_value_slot() {
        let def = PropertyDef::new("output").get("OUTP?").set("OUTP ON");
        assert!(matches!(
            def.into_spec(PropertyKind::Control, &[]),
            Err(LabError::Template { .. })
        ));
    }

    #[test]
    fn mapped_range_is_rejected() {
        let def = PropertyDef::new("volts")
            .get("VOLT?")
            .set("VOLT %g")
            .values(Allowed::range(0.0, 10.0))
            .map_values(true);
        assert!(matches!(
            def.into_spec(PropertyKind::Control, &[]),
            Err(LabError::Configuration(_))
        ));
    }

    #[test]
    fn validator_without_values_is_rejected() {
        let def = PropertyDef::new("volts")
            .get("VOLT?")
            .set("VOLT %g")
            .validator(Validator::StrictRange);
        assert!(def.into_spec(PropertyKind::Control, &[]).is_err());
    }

    #[test]
    fn float_cast_keeps_text() {
        assert_eq!(Cast::Float.apply("1.5").unwrap(), Value::Float(1.5));
        assert_eq!(Cast::Float.apply("ON").unwrap(), Value::Str("ON".into()));
        assert_eq!(Cast::Int.apply("4").unwrap(), Value::Int(4));
        assert_eq!(Cast::Int.apply("4.0").unwrap(), Value::Int(4));
        assert_eq!(Cast::Bool.apply("OFF").unwrap(), Value::Bool(false));
        assert!(Cast::Bool.apply("maybe").is_err());
    }
}
