#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use labdrive::interface::mock::MockAdapter;
    use labdrive::validators::{Allowed, Validator};
    use labdrive::{
        ChannelId, CommandTable, Control, DynamicProperties, Instrument, LabError, PropertyDef,
    };

    fn analyzer() -> (Instrument, MockAdapter, Control<f64>, Arc<CommandTable>) {
        let mut builder = CommandTable::channel_builder(["ch"]).unwrap();
        let frequency = builder
            .control::<f64>(
                PropertyDef::new("frequency")
                    .get("SENS{ch}:FREQ?")
                    .set("SENS{ch}:FREQ %g")
                    .validator(Validator::StrictRange)
                    .values(Allowed::range(1e3, 1e9))
                    .dynamic(true),
            )
            .unwrap();
        let channels = builder.build();
        let mock = MockAdapter::new();
        let mut inst = Instrument::new("vna", mock.clone(), CommandTable::builder().build()).unwrap();
        inst.sync_channels([1, 2, 3], &channels).unwrap();
        (inst, mock, frequency, channels)
    }

    #[test]
    fn channel_ids_fill_the_placeholder() {
        let (mut vna, mock, frequency, _) = analyzer();
        let mock = mock
            .expect_ask("SENS3:FREQ?", "1.5E+06")
            .expect_write("SENS1:FREQ 2e+06");

        assert_eq!(vna.channel(3).unwrap().read(&frequency).unwrap(), 1.5e6);
        vna.channel(1).unwrap().write(&frequency, 2e6).unwrap();
        assert_eq!(mock.remaining(), 0);
    }

    #[test]
    fn nested_channels_fill_every_level() {
        let mut source = CommandTable::channel_builder(["ch"]).unwrap();
        source
            .control::<f64>(
                PropertyDef::new("level")
                    .get(":SOUR{ch}:POW?")
                    .set(":SOUR{ch}:POW %g")
                    .validator(Validator::StrictRange)
                    .values(Allowed::range(-30.0, 10.0)),
            )
            .unwrap();
        let source = source.build();

        let mut port = CommandTable::channel_builder(["pt", "ch"]).unwrap();
        let power = port
            .measurement::<f64>(PropertyDef::new("power").get(":SOUR{{ch}}:POW:PORT{pt}?"))
            .unwrap();
        let port = port.build();

        let mock = MockAdapter::new()
            .expect_ask(":SOUR1:POW:PORT2?", "-3.5")
            .expect_ask(":SOUR1:POW?", "-3");
        let mut vna = Instrument::new("vna", mock.clone(), CommandTable::builder().build()).unwrap();
        vna.add_channel(1, source).unwrap();
        {
            let mut ch1 = vna.channel(1).unwrap();
            ch1.add_channel(2, port.clone()).unwrap();
            assert_eq!(ch1.channel(2).unwrap().read(&power).unwrap(), -3.5);
            assert_eq!(ch1.get("level").unwrap().as_f64(), Some(-3.0));
        }
        assert_eq!(mock.remaining(), 0);

        // a port table cannot hang directly off the instrument
        assert!(matches!(
            vna.add_channel(9, port),
            Err(LabError::Configuration(_))
        ));
    }

    #[test]
    fn templates_are_checked_at_registration() {
        let mut builder = CommandTable::channel_builder(["ch"]).unwrap();
        assert!(builder
            .measurement::<f64>(PropertyDef::new("bad").get("SENS{port}:FREQ?"))
            .is_err());
        let mut plain = CommandTable::builder();
        assert!(plain
            .measurement::<f64>(PropertyDef::new("bad").get("SENS{ch}:FREQ?"))
            .is_err());
    }

    #[test]
    fn overrides_stay_with_their_channel() {
        let (mut vna, mock, frequency, _) = analyzer();
        let mock = mock.expect_write("SENS2:FREQ 5e+09");

        vna.channel(2)
            .unwrap()
            .override_values("frequency", Allowed::range(1e3, 1e10))
            .unwrap();
        vna.channel(2).unwrap().write(&frequency, 5e9).unwrap();
        assert!(matches!(
            vna.channel(1).unwrap().write(&frequency, 5e9),
            Err(LabError::Validation(_))
        ));
        assert_eq!(mock.written_commands(), vec!["SENS2:FREQ 5e+09"]);
    }

    #[test]
    fn sync_adds_and_drops_channels() {
        let (mut vna, _, _, channels) = analyzer();
        assert_eq!(
            vna.channel_ids(),
            vec![ChannelId::Index(1), ChannelId::Index(2), ChannelId::Index(3)]
        );
        vna.sync_channels([2, 4], &channels).unwrap();
        assert_eq!(vna.channel_ids(), vec![ChannelId::Index(2), ChannelId::Index(4)]);
        vna.remove_channel(4).unwrap();
        assert!(matches!(vna.channel(4), Err(LabError::UnknownChannel(_))));
        assert!(vna.add_channel(2, channels).is_err());
    }
}
