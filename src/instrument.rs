use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::{ChannelId, ChannelView, Channels};
use crate::dispatch::{self, Link, Target};
use crate::error::{DeviceError, LabError, LabResult};
use crate::error_check::ErrorCheck;
use crate::interface::Adapter;
use crate::overrides::{DynamicProperties, OverrideSet};
use crate::property::{Readable, Writable};
use crate::table::CommandTable;
use crate::validators::Allowed;
use crate::value::{FromValue, Value};

/// One connected instrument.
///
/// The instrument owns its adapter exclusively. Property tables are shared
/// between instances, overrides and channels are per instance.
pub struct Instrument {
    name: String,
    adapter: Box<dyn Adapter>,
    table: Arc<CommandTable>,
    overrides: OverrideSet,
    channels: Channels,
    error_check: Option<Box<dyn ErrorCheck>>,
}

impl Instrument {
    pub fn new(name: impl Into<String>, adapter: impl Adapter + 'static, table: Arc<CommandTable>) -> LabResult<Self> {
        if !table.placeholders().is_empty() {
            return Err(LabError::Configuration(
                "An instrument needs a table without channel placeholders".to_string(),
            ));
        }
        let name = name.into();
        info!("Opened instrument '{}' with {} properties", name, table.len());
        Ok(Instrument {
            name,
            adapter: Box::new(adapter),
            table,
            overrides: OverrideSet::default(),
            channels: Channels::default(),
            error_check: None,
        })
    }

    /// Installs the device error query used by `check_set_errors` and
    /// `check_get_errors` properties.
    pub fn with_error_check(mut self, check: impl ErrorCheck + 'static) -> Self {
        self.error_check = Some(Box::new(check));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    fn split(&mut self) -> (Link<'_>, Target<'_>) {
        (
            Link {
                adapter: &mut *self.adapter,
                error_check: self.error_check.as_mut(),
            },
            Target {
                table: &self.table,
                overrides: &self.overrides,
                scopes: &[],
            },
        )
    }

    pub fn read<P: Readable>(&mut self, property: &P) -> LabResult<P::Output> {
        P::Output::from_value(self.get(property.name())?)
    }

    pub fn write<P: Writable>(&mut self, property: &P, value: P::Input) -> LabResult<()> {
        self.set(property.name(), value)
    }

    /// Read a property by name.
    pub fn get(&mut self, name: &str) -> LabResult<Value> {
        let (mut link, target) = self.split();
        dispatch::read(&mut link, &target, name)
    }

    /// Write a property by name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> LabResult<()> {
        let (mut link, target) = self.split();
        dispatch::write(&mut link, &target, name, value.into())
    }

    /// Send a raw command.
    pub fn write_command(&mut self, command: &str) -> LabResult<()> {
        self.adapter.write(command)
    }

    /// Send a raw command and read the reply.
    pub fn ask(&mut self, command: &str) -> LabResult<String> {
        self.adapter.ask(command)
    }

    pub fn adapter(&mut self) -> &mut dyn Adapter {
        &mut *self.adapter
    }

    /// Reads the device's error report through the installed error check.
    pub fn check_errors(&mut self) -> LabResult<Vec<DeviceError>> {
        let Some(check) = self.error_check.as_mut() else {
            return Err(LabError::Configuration(format!(
                "Instrument '{}' has no error check installed",
                self.name
            )));
        };
        check.check_errors(&mut *self.adapter)
    }

    pub fn channel(&mut self, id: impl Into<ChannelId>) -> LabResult<ChannelView<'_>> {
        let channel = self.channels.get_mut(&id.into())?;
        Ok(ChannelView::new(
            &mut *self.adapter,
            self.error_check.as_mut(),
            channel,
            &[],
        ))
    }

    /// Adds a channel using `table`, whose only placeholder names this level.
    pub fn add_channel(&mut self, id: impl Into<ChannelId>, table: Arc<CommandTable>) -> LabResult<()> {
        self.channels.add(&[], id.into(), table)
    }

    pub fn remove_channel(&mut self, id: impl Into<ChannelId>) -> LabResult<()> {
        self.channels.remove(&id.into()).map(|_| ())
    }

    /// Makes the channel set equal to `ids`, e.g. after asking the device
    /// which modules are fitted.
    pub fn sync_channels<I: Into<ChannelId>>(
        &mut self,
        ids: impl IntoIterator<Item = I>,
        table: &Arc<CommandTable>,
    ) -> LabResult<()> {
        let ids = ids.into_iter().map(Into::into).collect();
        self.channels.sync(&[], ids, table)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.ids()
    }

    pub fn close(mut self) -> LabResult<()> {
        debug!("Closing instrument '{}'", self.name);
        self.adapter.close()
    }
}

impl DynamicProperties for Instrument {
    fn override_values(&mut self, name: &str, values: Allowed) -> LabResult<()> {
        self.overrides.set_values(&self.table, name, values)
    }

    fn override_map_values(&mut self, name: &str, map_values: bool) -> LabResult<()> {
        self.overrides.set_map_values(&self.table, name, map_values)
    }

    fn override_get_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        self.overrides.set_get_process(&self.table, name, f)
    }

    fn override_set_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        self.overrides.set_set_process(&self.table, name, f)
    }

    fn clear_overrides(&mut self, name: &str) {
        self.overrides.clear(name);
    }
}
