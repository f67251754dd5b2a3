use tracing::debug;

use crate::error::{LabError, LabResult};
use crate::error_check::ErrorCheck;
use crate::interface::Adapter;
use crate::mapping;
use crate::overrides::{Effective, OverrideSet};
use crate::property::CommandSpec;
use crate::table::CommandTable;
use crate::template::{Scope, format_value, resolve};
use crate::validators::Allowed;
use crate::value::Value;

/// The connection side of an access.
pub(crate) struct Link<'a> {
    pub adapter: &'a mut dyn Adapter,
    pub error_check: Option<&'a mut Box<dyn ErrorCheck>>,
}

impl Link<'_> {
    fn require_error_check(&self, spec: &CommandSpec) -> LabResult<()> {
        if self.error_check.is_none() {
            return Err(LabError::Configuration(format!(
                "Property '{}' checks device errors, but no error check is installed",
                spec.name
            )));
        }
        Ok(())
    }

    fn check_errors(&mut self) -> LabResult<()> {
        let Some(check) = self.error_check.as_mut() else {
            return Ok(());
        };
        let errors = check.check_errors(&mut *self.adapter)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LabError::DeviceReported(errors))
        }
    }
}

/// The property side of an access: which table, overrides and channel
/// scopes apply.
pub(crate) struct Target<'a> {
    pub table: &'a CommandTable,
    pub overrides: &'a OverrideSet,
    pub scopes: &'a [Scope],
}

pub(crate) fn read(link: &mut Link<'_>, target: &Target<'_>, name: &str) -> LabResult<Value> {
    let spec = target.table.spec(name)?;
    let Some(get_command) = &spec.get_command else {
        return Err(LabError::WriteOnly(name.to_owned()));
    };
    if spec.check_get_errors {
        link.require_error_check(spec)?;
    }
    let effective = Effective::merge(spec, target.overrides.get(name));
    let command = resolve(get_command, target.scopes)?;

    debug!("Reading '{}' with {:?}", name, command);
    let reply = link.adapter.ask(&command)?;
    // the error queue is drained even when the reply does not parse
    let fields = parse_reply(spec, &reply);
    if spec.check_get_errors {
        link.check_errors()?;
    }
    let fields = fields?;

    let value = if fields.len() == 1 {
        let mut fields = fields;
        let token = fields.remove(0);
        if effective.map_values {
            mapping::from_wire(&token, mapped_values(spec, effective.values)?)?
        } else {
            token
        }
    } else {
        Value::List(fields)
    };

    match effective.get_process {
        Some(process) => process(value),
        None => Ok(value),
    }
}

pub(crate) fn write(link: &mut Link<'_>, target: &Target<'_>, name: &str, value: Value) -> LabResult<()> {
    let spec = target.table.spec(name)?;
    let Some(set_command) = &spec.set_command else {
        return Err(LabError::ReadOnly(name.to_owned()));
    };
    if spec.check_set_errors {
        link.require_error_check(spec)?;
    }
    let effective = Effective::merge(spec, target.overrides.get(name));

    let mut value = match &spec.validator {
        Some(validator) => {
            let empty = Allowed::Set(Vec::new());
            validator.validate(&value, effective.values.unwrap_or(&empty))?
        }
        None => value,
    };
    if effective.map_values {
        value = mapping::to_wire(&value, mapped_values(spec, effective.values)?)?;
    }
    if let Some(process) = effective.set_process {
        value = process(value)?;
    }
    let command = resolve(&format_value(set_command, &value)?, target.scopes)?;

    debug!("Writing '{}' with {:?}", name, command);
    link.adapter.write(&command)?;
    if spec.check_set_errors {
        link.check_errors()?;
    }
    Ok(())
}

fn mapped_values<'a>(spec: &CommandSpec, values: Option<&'a Allowed>) -> LabResult<&'a Allowed> {
    values.ok_or_else(|| {
        LabError::Configuration(format!(
            "Property '{}' maps values but declares none",
            spec.name
        ))
    })
}

/// Splits and casts a reply into its fields.
fn parse_reply(spec: &CommandSpec, reply: &str) -> LabResult<Vec<Value>> {
    let reply = match &spec.preprocess_reply {
        Some(preprocess) => preprocess(reply),
        None => reply.to_owned(),
    };
    let reply = reply.trim();
    let fields: Vec<&str> = match (&spec.separator, spec.maxsplit) {
        (Some(sep), Some(max)) => reply.splitn(max + 1, sep.as_str()).collect(),
        (Some(sep), None) => reply.split(sep.as_str()).collect(),
        (None, _) => vec![reply],
    };
    fields
        .into_iter()
        .map(|field| spec.cast.apply(field.trim()))
        .collect()
}
