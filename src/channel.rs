use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::dispatch::{self, Link, Target};
use crate::error::{LabError, LabResult};
use crate::error_check::ErrorCheck;
use crate::interface::Adapter;
use crate::overrides::{DynamicProperties, OverrideSet};
use crate::property::{Readable, Writable};
use crate::table::CommandTable;
use crate::template::Scope;
use crate::validators::Allowed;
use crate::value::{FromValue, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelId {
    Index(i64),
    Name(String),
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Index(i) => write!(f, "{}", i),
            ChannelId::Name(n) => write!(f, "{}", n),
        }
    }
}

impl From<i64> for ChannelId {
    fn from(i: i64) -> Self {
        ChannelId::Index(i)
    }
}

impl From<i32> for ChannelId {
    fn from(i: i32) -> Self {
        ChannelId::Index(i as i64)
    }
}

impl From<u32> for ChannelId {
    fn from(i: u32) -> Self {
        ChannelId::Index(i as i64)
    }
}

impl From<&str> for ChannelId {
    fn from(n: &str) -> Self {
        ChannelId::Name(n.to_owned())
    }
}

impl From<String> for ChannelId {
    fn from(n: String) -> Self {
        ChannelId::Name(n)
    }
}

pub struct Channel {
    id: ChannelId,
    table: Arc<CommandTable>,
    overrides: OverrideSet,
    channels: Channels,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, table: Arc<CommandTable>) -> Self {
        Channel {
            id,
            table,
            overrides: OverrideSet::default(),
            channels: Channels::default(),
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    fn scope(&self) -> Scope {
        Scope::new(self.table.placeholder().unwrap_or_default(), &self.id)
    }
}

/// Child channels keyed by id.
#[derive(Default)]
pub(crate) struct Channels {
    entries: BTreeMap<ChannelId, Channel>,
}

impl Channels {
    /// `parent_chain` is the placeholder chain of the owner, empty for an
    /// instrument.
    pub(crate) fn add(
        &mut self,
        parent_chain: &[String],
        id: ChannelId,
        table: Arc<CommandTable>,
    ) -> LabResult<()> {
        let chain = table.placeholders();
        if chain.len() != parent_chain.len() + 1 || chain[1..] != *parent_chain {
            return Err(LabError::Configuration(format!(
                "Channel table with placeholders {:?} cannot live under {:?}",
                chain, parent_chain
            )));
        }
        if self.entries.contains_key(&id) {
            return Err(LabError::Configuration(format!(
                "Channel '{}' already exists",
                id
            )));
        }
        debug!("Adding channel '{}'", id);
        self.entries.insert(id.clone(), Channel::new(id, table));
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &ChannelId) -> LabResult<Channel> {
        debug!("Removing channel '{}'", id);
        self.entries
            .remove(id)
            .ok_or_else(|| LabError::UnknownChannel(id.to_string()))
    }

    /// Keeps exactly `ids`: stale channels are dropped, missing ones created
    /// with `table`. Surviving channels keep their overrides.
    pub(crate) fn sync(
        &mut self,
        parent_chain: &[String],
        ids: Vec<ChannelId>,
        table: &Arc<CommandTable>,
    ) -> LabResult<()> {
        let stale: Vec<ChannelId> = self
            .entries
            .keys()
            .filter(|existing| !ids.contains(existing))
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id)?;
        }
        for id in ids {
            if !self.entries.contains_key(&id) {
                self.add(parent_chain, id, Arc::clone(table))?;
            }
        }
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, id: &ChannelId) -> LabResult<&mut Channel> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| LabError::UnknownChannel(id.to_string()))
    }

    pub(crate) fn ids(&self) -> Vec<ChannelId> {
        self.entries.keys().cloned().collect()
    }
}

/// A channel borrowed together with the instrument's connection.
pub struct ChannelView<'a> {
    adapter: &'a mut dyn Adapter,
    error_check: Option<&'a mut Box<dyn ErrorCheck>>,
    channel: &'a mut Channel,
    scopes: Vec<Scope>,
}

impl<'a> ChannelView<'a> {
    pub(crate) fn new(
        adapter: &'a mut dyn Adapter,
        error_check: Option<&'a mut Box<dyn ErrorCheck>>,
        channel: &'a mut Channel,
        parent_scopes: &[Scope],
    ) -> Self {
        let mut scopes = Vec::with_capacity(parent_scopes.len() + 1);
        scopes.push(channel.scope());
        scopes.extend_from_slice(parent_scopes);
        ChannelView {
            adapter,
            error_check,
            channel,
            scopes,
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.channel.id
    }

    fn split(&mut self) -> (Link<'_>, Target<'_>) {
        (
            Link {
                adapter: &mut *self.adapter,
                error_check: self.error_check.as_deref_mut(),
            },
            Target {
                table: &self.channel.table,
                overrides: &self.channel.overrides,
                scopes: &self.scopes,
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

    /// Write a raw command through this channel, filling its placeholders.
    pub fn write_command(&mut self, command: &str) -> LabResult<()> {
        let command = crate::template::resolve(command, &self.scopes)?;
        self.adapter.write(&command)
    }

    /// Ask a raw command through this channel, filling its placeholders.
    pub fn ask(&mut self, command: &str) -> LabResult<String> {
        let command = crate::template::resolve(command, &self.scopes)?;
        self.adapter.ask(&command)
    }

    /// View of a nested channel.
    pub fn channel(&mut self, id: impl Into<ChannelId>) -> LabResult<ChannelView<'_>> {
        let child = self.channel.channels.get_mut(&id.into())?;
        Ok(ChannelView::new(
            &mut *self.adapter,
            self.error_check.as_deref_mut(),
            child,
            &self.scopes,
        ))
    }

    pub fn add_channel(&mut self, id: impl Into<ChannelId>, table: Arc<CommandTable>) -> LabResult<()> {
        let chain = self.channel.table.placeholders().to_vec();
        self.channel.channels.add(&chain, id.into(), table)
    }

    pub fn remove_channel(&mut self, id: impl Into<ChannelId>) -> LabResult<()> {
        self.channel.channels.remove(&id.into()).map(|_| ())
    }

    pub fn sync_channels<I: Into<ChannelId>>(
        &mut self,
        ids: impl IntoIterator<Item = I>,
        table: &Arc<CommandTable>,
    ) -> LabResult<()> {
        let chain = self.channel.table.placeholders().to_vec();
        let ids = ids.into_iter().map(Into::into).collect();
        self.channel.channels.sync(&chain, ids, table)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channel.channels.ids()
    }
}

impl DynamicProperties for ChannelView<'_> {
    fn override_values(&mut self, name: &str, values: Allowed) -> LabResult<()> {
        let channel = &mut *self.channel;
        channel.overrides.set_values(&channel.table, name, values)
    }

    fn override_map_values(&mut self, name: &str, map_values: bool) -> LabResult<()> {
        let channel = &mut *self.channel;
        channel.overrides.set_map_values(&channel.table, name, map_values)
    }

    fn override_get_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        let channel = &mut *self.channel;
        channel.overrides.set_get_process(&channel.table, name, f)
    }

    fn override_set_process(
        &mut self,
        name: &str,
        f: impl Fn(Value) -> LabResult<Value> + Send + Sync + 'static,
    ) -> LabResult<()> {
        let channel = &mut *self.channel;
        channel.overrides.set_set_process(&channel.table, name, f)
    }

    fn clear_overrides(&mut self, name: &str) {
        self.channel.overrides.clear(name);
    }
}
