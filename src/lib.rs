//! Declarative command properties for laboratory instrument drivers.
//!
//! ```no_run
//! use labdrive::interface::{InterfaceType, SerialParams, open_adapter};
//! use labdrive::validators::{Allowed, Validator};
//! use labdrive::{CommandTable, Instrument, PropertyDef};
//!
//! # fn main() -> labdrive::error::LabResult<()> {
//! let mut builder = CommandTable::builder();
//! let frequency = builder.control::<f64>(
//!     PropertyDef::new("frequency")
//!         .get("FREQ?")
//!         .set("FREQ %g")
//!         .validator(Validator::StrictRange)
//!         .values(Allowed::range(1.0, 1000.0)),
//! )?;
//!
//! let interface = InterfaceType::Serial(SerialParams {
//!     port: "/dev/ttyUSB0".to_string(),
//!     baud: None,
//! });
//! let adapter = open_adapter(&interface, &Default::default())?;
//! let mut generator = Instrument::new("generator", adapter, builder.build())?;
//! generator.write(&frequency, 500.0)?;
//! let now = generator.read(&frequency)?;
//! # Ok(())
//! # }
//! ```

pub use channel::{Channel, ChannelId, ChannelView};
pub use error::{DeviceError, LabError, LabResult};
pub use error_check::{ErrorCheck, ScpiErrorQueue};
pub use instrument::Instrument;
pub use overrides::DynamicProperties;
pub use property::{Cast, Control, Measurement, PropertyDef, PropertyKind, Readable, Setting, Writable};
pub use table::{CommandTable, CommandTableBuilder};
pub use value::{FromValue, Value};

pub mod channel;
pub(crate) mod constants;
mod dispatch;
pub mod error;
pub mod error_check;
pub mod instrument;
pub mod interface;
mod mapping;
pub mod overrides;
pub mod property;
pub mod protocols;
pub mod scpi;
pub mod table;
pub mod template;
pub mod util;
pub mod validators;
pub mod value;
