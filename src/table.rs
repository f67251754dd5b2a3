//! Registered properties shared by every instrument or channel of one kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{LabError, LabResult};
use crate::property::{CommandSpec, Control, Measurement, PropertyDef, PropertyKind, Setting};

/// Immutable set of property declarations.
///
/// `placeholders` is the channel placeholder chain the table's templates are
/// filled with, innermost first. An instrument table has an empty chain.
#[derive(Debug, Clone)]
pub struct CommandTable {
    placeholders: Vec<String>,
    specs: BTreeMap<String, CommandSpec>,
}

impl CommandTable {
    /// Builder for an instrument-level table.
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder {
            placeholders: Vec::new(),
            specs: BTreeMap::new(),
        }
    }

    /// Builder for a channel table. `placeholders` lists the placeholder of
    /// the channel itself first, then those of its parent channels.
    pub fn channel_builder<S: Into<String>>(
        placeholders: impl IntoIterator<Item = S>,
    ) -> LabResult<CommandTableBuilder> {
        let placeholders: Vec<String> = placeholders.into_iter().map(Into::into).collect();
        if placeholders.is_empty() {
            return Err(LabError::Configuration(
                "A channel table needs at least one placeholder".to_string(),
            ));
        }
        if let Some(bad) = placeholders
            .iter()
            .find(|p| p.is_empty() || p.contains(['{', '}']))
        {
            return Err(LabError::Configuration(format!(
                "Invalid placeholder name {:?}",
                bad
            )));
        }
        Ok(CommandTableBuilder {
            placeholders,
            specs: BTreeMap::new(),
        })
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Placeholder filled by the channel owning this table.
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholders.first().map(String::as_str)
    }

    pub fn spec(&self, name: &str) -> LabResult<&CommandSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| LabError::UnknownProperty(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

pub struct CommandTableBuilder {
    placeholders: Vec<String>,
    specs: BTreeMap<String, CommandSpec>,
}

impl CommandTableBuilder {
    fn register(&mut self, def: PropertyDef, kind: PropertyKind) -> LabResult<String> {
        let spec = def.into_spec(kind, &self.placeholders)?;
        let name = spec.name().to_owned();
        if self.specs.contains_key(&name) {
            return Err(LabError::Configuration(format!(
                "Property '{}' registered twice",
                name
            )));
        }
        debug!("Registered {:?} '{}'", kind, name);
        self.specs.insert(name.clone(), spec);
        Ok(name)
    }

    pub fn control<T>(&mut self, def: PropertyDef) -> LabResult<Control<T>> {
        let name = self.register(def, PropertyKind::Control)?;
        Ok(Control::new(&name))
    }

    pub fn measurement<T>(&mut self, def: PropertyDef) -> LabResult<Measurement<T>> {
        let name = self.register(def, PropertyKind::Measurement)?;
        Ok(Measurement::new(&name))
    }

    pub fn setting<T>(&mut self, def: PropertyDef) -> LabResult<Setting<T>> {
        let name = self.register(def, PropertyKind::Setting)?;
        Ok(Setting::new(&name))
    }

    pub fn build(self) -> Arc<CommandTable> {
        Arc::new(CommandTable {
            placeholders: self.placeholders,
            specs: self.specs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut builder = CommandTable::builder();
        builder
            .measurement::<f64>(PropertyDef::new("volts").get("MEAS:VOLT?"))
            .unwrap();
        assert!(
            builder
                .measurement::<f64>(PropertyDef::new("volts").get("MEAS:VOLT?"))
                .is_err()
        );
    }

    #[test]
    fn channel_tables_know_their_placeholder() {
        let mut builder = CommandTable::channel_builder(["pt", "ch"]).unwrap();
        builder
            .measurement::<f64>(PropertyDef::new("power").get(":SOUR{{ch}}:POW:PORT{pt}?"))
            .unwrap();
        let table = builder.build();
        assert_eq!(table.placeholder(), Some("pt"));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["power"]);
        assert!(matches!(
            table.spec("frequency"),
            Err(LabError::UnknownProperty(_))
        ));
    }

    #[test]
    fn channel_builder_validates_placeholders() {
        assert!(CommandTable::channel_builder(Vec::<String>::new()).is_err());
        assert!(CommandTable::channel_builder(["c{h"]).is_err());
    }
}
