use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{LabError, LabResult};
use crate::mapping::check_mappable;
use crate::property::{CommandSpec, ProcessFn};
use crate::table::CommandTable;
use crate::validators::Allowed;
use crate::value::Value;

#[derive(Clone, Default)]
pub struct PropertyOverrides {
    pub(crate) values: Option<Allowed>,
    pub(crate) map_values: Option<bool>,
    pub(crate) get_process: Option<ProcessFn>,
    pub(crate) set_process: Option<ProcessFn>,
}

/// The declaration fields in effect for one access: overrides merged over defaults.
pub(crate) struct Effective<'a> {
    pub values: Option<&'a Allowed>,
    pub map_values: bool,
    pub get_process: Option<&'a ProcessFn>,
    pub set_process: Option<&'a ProcessFn>,
}

impl<'a> Effective<'a> {
    pub(crate) fn merge(spec: &'a CommandSpec, overrides: Option<&'a PropertyOverrides>) -> Self {
        let over = overrides.filter(|_| spec.dynamic);
        Effective {
            values: over
                .and_then(|o| o.values.as_ref())
                .or(spec.values.as_ref()),
            map_values: over
                .and_then(|o| o.map_values)
                .unwrap_or(spec.map_values),
            get_process: over
                .and_then(|o| o.get_process.as_ref())
                .or(spec.get_process.as_ref()),
            set_process: over
                .and_then(|o| o.set_process.as_ref())
                .or(spec.set_process.as_ref()),
        }
    }
}

/// Overrides held by one instrument or channel, keyed by property name.
#[derive(Clone, Default)]
pub struct OverrideSet {
    entries: HashMap<String, PropertyOverrides>,
}

impl OverrideSet {
    pub(crate) fn get(&self, name: &str) -> Option<&PropertyOverrides> {
        self.entries.get(name)
    }

    fn entry(&mut self, table: &CommandTable, name: &str) -> LabResult<&mut PropertyOverrides> {
        let spec = table.spec(name)?;
        if !spec.is_dynamic() {
            return Err(LabError::NotDynamic(name.to_owned()));
        }
        Ok(self.entries.entry(name.to_owned()).or_default())
    }

    /// Applies `update` to a copy of the overrides of `name` and keeps it
    /// only if the merged declaration can still map its values.
    fn checked_update(
        &mut self,
        table: &CommandTable,
        name: &str,
        update: impl FnOnce(&mut PropertyOverrides),
    ) -> LabResult<()> {
        let spec = table.spec(name)?;
        if !spec.is_dynamic() {
            return Err(LabError::NotDynamic(name.to_owned()));
        }
        let mut candidate = self.entries.get(name).cloned().unwrap_or_default();
        update(&mut candidate);
        let merged = Effective::merge(spec, Some(&candidate));
        if merged.map_values {
            check_mappable(name, merged.values)?;
        }
        self.entries.insert(name.to_owned(), candidate);
        Ok(())
    }

    pub(crate) fn set_values(&mut self, table: &CommandTable, name: &str, values: Allowed) -> LabResult<()> {
        debug!("Overriding values of '{}' with {}", name, values);
        self.checked_update(table, name, |o| o.values = Some(values))
    }

    pub(crate) fn set_map_values(&mut self, table: &CommandTable, name: &str, map_values: bool) -> LabResult<()> {
        debug!("Overriding map_values of '{}' with {}", name, map_values);
        self.checked_update(table, name, |o| o.map_values = Some(map_values))
    }

    pub(crate) fn set_get_process(
        &mut self,
        table: &CommandTable,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        self.entry(table, name)?.get_process = Some(Arc::new(f));
        Ok(())
    }

    pub(crate) fn set_set_process(
        &mut self,
        table: &CommandTable,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        self.entry(table, name)?.set_process = Some(Arc::new(f));
        Ok(())
    }

    pub(crate) fn clear(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

/// Override surface shared by instruments and channels.
///
/// These stand in for `<name>_values`, `<name>_map_values`,
/// `<name>_get_process` and `<name>_set_process` attributes. They fail with
/// [`LabError::NotDynamic`] unless the property was declared dynamic.
pub trait DynamicProperties {
    fn override_values(&mut self, name: &str, values: Allowed) -> LabResult<()>;

    fn override_map_values(&mut self, name: &str, map_values: bool) -> LabResult<()>;

    fn override_get_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()>;

    fn override_set_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()>;

    /// Drops every override of `name`, restoring the table defaults.
    fn clear_overrides(&mut self, name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDef;

    fn table() -> Arc<CommandTable> {
        let mut builder = CommandTable::builder();
        builder
            .control::<f64>(
                PropertyDef::new("frequency")
                    .get("FREQ?")
                    .set("FREQ %g")
                    .values(Allowed::range(1.0, 1000.0))
                    .dynamic(true),
            )
            .unwrap();
        builder
            .control::<f64>(
                PropertyDef::new("power")
                    .get("POW?")
                    .set("POW %g")
                    .values(Allowed::range(-10.0, 10.0)),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn override_takes_precedence_for_dynamic_properties() {
        let table = table();
        let mut set = OverrideSet::default();
        set.set_values(&table, "frequency", Allowed::range(1.0, 20.0))
            .unwrap();

        let spec = table.spec("frequency").unwrap();
        let effective = Effective::merge(spec, set.get("frequency"));
        assert_eq!(effective.values, Some(&Allowed::range(1.0, 20.0)));

        let empty = OverrideSet::default();
        let untouched = Effective::merge(spec, empty.get("frequency"));
        assert_eq!(untouched.values, Some(&Allowed::range(1.0, 1000.0)));
    }

    #[test]
    fn static_properties_refuse_overrides() {
        let table = table();
        let mut set = OverrideSet::default();
        assert!(matches!(
            set.set_values(&table, "power", Allowed::range(0.0, 1.0)),
            Err(LabError::NotDynamic(_))
        ));
        assert!(matches!(
            set.set_map_values(&table, "missing", true),
            Err(LabError::UnknownProperty(_))
        ));
    }

    #[test]
    fn clearing_restores_defaults() {
        let table = table();
        let mut set = OverrideSet::default();
        set.set_values(&table, "frequency", Allowed::set([1.0, 10.0])).unwrap();
        set.clear("frequency");
        assert!(set.get("frequency").is_none());
    }

    #[test]
    fn overrides_that_break_mapping_are_refused() {
        let table = table();
        let mut set = OverrideSet::default();
        // the default range cannot be mapped
        assert!(matches!(
            set.set_map_values(&table, "frequency", true),
            Err(LabError::Configuration(_))
        ));
        assert!(set.get("frequency").is_none());

        set.set_values(&table, "frequency", Allowed::set([1.0, 10.0])).unwrap();
        set.set_map_values(&table, "frequency", true).unwrap();
        assert!(matches!(
            set.set_values(&table, "frequency", Allowed::range(1.0, 5.0)),
            Err(LabError::Configuration(_))
        ));
        let spec = table.spec("frequency").unwrap();
        let effective = Effective::merge(spec, set.get("frequency"));
        assert_eq!(effective.values, Some(&Allowed::set([1.0, 10.0])));
        assert!(effective.map_values);
    }
}
