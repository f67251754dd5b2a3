//! IEEE 488.2 common commands shared by SCPI instruments.

use crate::error::LabResult;
use crate::instrument::Instrument;
use crate::property::{Cast, Measurement, PropertyDef};
use crate::table::CommandTableBuilder;

/// Handles to the common properties registered by [`register_common`].
#[derive(Debug, Clone)]
pub struct ScpiCommon {
    /// `*IDN?`, returned whole
    pub id: Measurement<String>,
    /// `*OPC?`, true once pending operations are done
    pub complete: Measurement<bool>,
    /// `*STB?` status byte
    pub status: Measurement<u8>,
    /// `*OPT?` installed options
    pub options: Measurement<Vec<String>>,
}

pub fn register_common(builder: &mut CommandTableBuilder) -> LabResult<ScpiCommon> {
    Ok(ScpiCommon {
        id: builder.measurement(PropertyDef::new("id").get("*IDN?").cast(Cast::Str).no_split())?,
        complete: builder.measurement(PropertyDef::new("complete").get("*OPC?").cast(Cast::Bool))?,
        status: builder.measurement(PropertyDef::new("status").get("*STB?").cast(Cast::Int))?,
        options: builder.measurement(PropertyDef::new("options").get("*OPT?").cast(Cast::Str))?,
    })
}

/// Resets the instrument to its power-on settings.
pub fn reset(instrument: &mut Instrument) -> LabResult<()> {
    instrument.write_command("*RST")
}

/// Clears the status registers and the error queue.
pub fn clear(instrument: &mut Instrument) -> LabResult<()> {
    instrument.write_command("*CLS")
}
