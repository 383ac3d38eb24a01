//! [`DeviceProtocol`] implementation for Denon/Marantz receivers.
//!
//! # Line format
//!
//! ```text
//! <category>[<parameter>[ ]]<value>\r
//! ```
//!
//! - `category`: one or more uppercase letters and digits (`PW`, `Z2PS`).
//! - `parameter`: present for grouped settings (`BAS`, `TONE CTRL`).
//! - `value`: enumerated word, level digits, or free text.
//! - Terminator: `\r` (0x0D).
//!
//! Reports use the same format as commands and arrive both as replies and
//! unsolicited, whenever a setting changes on the front panel or remote.

use avrctl_core::{CommandLookup, CommandTable};
use avrctl_text_io::{DeviceProtocol, ParsedMessage};

use crate::commands::denon_table;

/// Denon/Marantz protocol family.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenonProtocol;

impl DeviceProtocol for DenonProtocol {
    fn load_table(&self) -> CommandTable {
        denon_table()
    }

    fn build_lookup(&self, table: &CommandTable) -> CommandLookup {
        CommandLookup::from_table(table)
    }

    fn handle_line(&self, line: &str, table: &CommandTable) -> ParsedMessage {
        ParsedMessage::parse(line, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrctl_core::{CommandEntry, CommandValue, StateUpdate};
    use avrctl_text_io::message::tokenize;

    fn table() -> CommandTable {
        denon_table()
            .with("FAKEFO", CommandEntry::new().choices(&["R T E STS"]))
            .with("FAKEN", CommandEntry::new().param("OR", CommandEntry::new()))
    }

    fn split(line: &str) -> (String, Option<String>, Option<String>) {
        let t = tokenize(line, &table());
        (t.category, t.sub_parameter, t.raw_value)
    }

    fn parts(cat: &str, sub: Option<&str>, raw: Option<&str>) -> (String, Option<String>, Option<String>) {
        (
            cat.to_string(),
            sub.map(str::to_string),
            raw.map(str::to_string),
        )
    }

    fn update(line: &str) -> Option<StateUpdate> {
        DenonProtocol.handle_line(line, &table()).state_update()
    }

    fn expect(line: &str, attribute: &str, value: Option<CommandValue>) {
        assert_eq!(
            update(line),
            Some(StateUpdate {
                attribute: attribute.to_string(),
                value,
            }),
            "line {line:?}"
        );
    }

    fn num(n: f64) -> Option<CommandValue> {
        Some(CommandValue::Number(n))
    }

    fn text(s: &str) -> Option<CommandValue> {
        Some(CommandValue::from(s))
    }

    fn flag(b: bool) -> Option<CommandValue> {
        Some(CommandValue::Bool(b))
    }

    // ---------------------------------------------------------------
    // Tokenizing
    // ---------------------------------------------------------------

    #[test]
    fn split_simple_categories() {
        assert_eq!(split("PWON"), parts("PW", None, Some("ON")));
        assert_eq!(split("PWSTANDBY"), parts("PW", None, Some("STANDBY")));
        assert_eq!(split("MUON"), parts("MU", None, Some("ON")));
        assert_eq!(split("MV60"), parts("MV", None, Some("60")));
        assert_eq!(split("MV595"), parts("MV", None, Some("595")));
        assert_eq!(split("MVMAX 80"), parts("MV", Some("MAX"), Some("80")));
        assert_eq!(split("SLPOFF"), parts("SLP", None, Some("OFF")));
        assert_eq!(split("SLP OFF"), parts("SLP", None, Some("OFF")));
    }

    #[test]
    fn split_sources_and_modes() {
        assert_eq!(split("SIPHONO"), parts("SI", None, Some("PHONO")));
        assert_eq!(split("SI PHONO "), parts("SI", None, Some("PHONO")));
        assert_eq!(split("SIUSB DIRECT"), parts("SI", None, Some("USB DIRECT")));
        assert_eq!(
            split("SINEW SOURCE VARIETY"),
            parts("SI", None, Some("NEW SOURCE VARIETY"))
        );
        assert_eq!(
            split("MSDOLBY D+ +PL2X C"),
            parts("MS", None, Some("DOLBY D+ +PL2X C"))
        );
        assert_eq!(
            split("MSYET ANOTHER POINTLESS DSP"),
            parts("MS", None, Some("YET ANOTHER POINTLESS DSP"))
        );
    }

    #[test]
    fn split_channel_levels() {
        assert_eq!(split("CVFL 60 "), parts("CV", Some("FL"), Some("60")));
        assert_eq!(split("CVFL60"), parts("CV", Some("FL"), Some("60")));
        assert_eq!(split("CV FHL 44"), parts("CV", Some("FHL"), Some("44")));
        assert_eq!(split("CVNEW SPEC 55"), parts("CV", Some("NEW SPEC"), Some("55")));
        assert_eq!(
            split("CVUNKNOWNCOMMAND55"),
            parts("CV", Some("UNKNOWNCOMMAND55"), None)
        );
    }

    #[test]
    fn split_surround_parameters() {
        assert_eq!(split("PSDELAY 000"), parts("PS", Some("DELAY"), Some("000")));
        assert_eq!(split("PSTONE CTRL ON"), parts("PS", Some("TONE CTRL"), Some("ON")));
        assert_eq!(split("PSTONE CTRLOFF"), parts("PS", Some("TONE CTRL"), Some("OFF")));
        assert_eq!(split("PSSB MTRX ON"), parts("PS", Some("SB"), Some("MTRX ON")));
        assert_eq!(split("PSSB ON"), parts("PS", Some("SB"), Some("ON")));
        assert_eq!(split("PSMULTEQ BYP.LR"), parts("PS", Some("MULTEQ"), Some("BYP.LR")));
        assert_eq!(split("PSDCO OFF"), parts("PS", Some("DCO"), Some("OFF")));
        assert_eq!(split("PSLFE -8"), parts("PS", Some("LFE"), Some("-8")));
        assert_eq!(split("PSNEWPARAM OK"), parts("PS", Some("NEWPARAM"), Some("OK")));
        assert_eq!(
            split("PSUNKNOWNCOMMAND55"),
            parts("PS", Some("UNKNOWNCOMMAND55"), None)
        );
        // Matches the EFF parameter and takes the rest as the value.
        assert_eq!(split("PSEFFECT"), parts("PS", Some("EFF"), Some("ECT")));
        assert_eq!(split("PSEFF ECT"), parts("PS", Some("EFF"), Some("ECT")));
    }

    #[test]
    fn split_zones() {
        assert_eq!(split("Z2PSBAS 51"), parts("Z2PS", Some("BAS"), Some("51")));
        assert_eq!(split("Z260"), parts("Z2", None, Some("60")));
        assert_eq!(split("Z2ON"), parts("Z2", None, Some("ON")));
        assert_eq!(split("Z2PHONO"), parts("Z2", None, Some("PHONO")));
        assert_eq!(split("Z3PSBAS 51"), parts("Z3PS", Some("BAS"), Some("51")));
        assert_eq!(split("Z360"), parts("Z3", None, Some("60")));
        assert_eq!(split("Z3ON"), parts("Z3", None, Some("ON")));
        assert_eq!(split("Z3PHONO"), parts("Z3", None, Some("PHONO")));
    }

    #[test]
    fn split_unknown_commands() {
        assert_eq!(split("NEWCMD 50"), parts("NEWCMD", None, Some("50")));
        assert_eq!(
            split("NEWCMD WITH PARAMS 50"),
            parts("NEWCMD WITH PARAMS", None, Some("50"))
        );
        assert_eq!(split("UNPARSABLE"), parts("UNPARSABLE", None, None));
        assert_eq!(split("FAKEFOR TESTS"), parts("FAKEFO", None, Some("R TESTS")));
        assert_eq!(split("FAKENORTEST"), parts("FAKEN", Some("OR"), Some("TEST")));
    }

    // ---------------------------------------------------------------
    // State updates
    // ---------------------------------------------------------------

    #[test]
    fn main_zone_updates() {
        expect("PWON", "power", flag(true));
        expect("PWSTANDBY", "power", flag(false));
        expect("MVMAX 80", "max_volume", num(0.0));
        expect("MV75", "volume", num(-5.0));
        expect("MV56", "volume", num(-24.0));
        expect("MV595", "volume", num(-20.5));
        expect("MV805", "volume", num(0.5));
        expect("MV00", "volume", num(-80.0));
        expect("MUON", "mute", flag(true));
        expect("SIPHONO", "source", text("PHONO"));
        expect("SIBD", "source", text("BD"));
        expect("SINEW SOURCE TYPE", "source", text("NEW SOURCE TYPE"));
        expect("MSDOLBY D+ +PL2X C", "sound_mode", text("DOLBY D+ +PL2X C"));
        expect("DCAUTO", "digital_signal_mode", text("AUTO"));
    }

    #[test]
    fn level_updates() {
        expect("CVFL 51", "channel_level_fl", num(1.0));
        expect("CVFL 50", "channel_level_fl", num(0.0));
        expect("CVSL 39", "channel_level_sl", num(-11.0));
        expect("CVFHL 545", "channel_level_fhl", num(4.5));
        expect("SSLEVFL 50", "channel_level_fl", num(0.0));
        expect("PSBAS 39", "bass", num(-11.0));
        expect("PSTRE 545", "treble", num(4.5));
        expect("PSLFE -6", "lfe_level", num(-6.0));
    }

    #[test]
    fn surround_updates() {
        expect("PSTONE CTRL ON", "tone_control", flag(true));
        expect("PSSBMTRX ON", "surround_back", text("MTRX ON"));
        expect("PSDYNVOL MED", "dsp_dynamic_range_control", text("medium"));
        expect("PSDELAY 000", "PS_DELAY", text("000"));
        expect("PSNEWPARAM LOW", "PS_NEWPARAM", text("LOW"));
        expect("PSNEWPARAM ANYVALUE", "PS_NEWPARAM", text("ANYVALUE"));
        expect("PSNEWPARAM", "PS_NEWPARAM", None);
        expect("NEWPARAM ANYVALUE", "NEWPARAM", text("ANYVALUE"));
    }

    #[test]
    fn mixed_value_kinds() {
        expect("PSDIL OFF", "dialog_level", flag(false));
        expect("PSDIL ON", "dialog_level", flag(true));
        expect("PSDIL 55", "dialog_level", num(5.0));
        expect("PSDIL 45", "dialog_level", num(-5.0));
    }

    #[test]
    fn zone_updates() {
        expect("ZMON", "zone1_power", flag(true));
        expect("ZMOFF", "zone1_power", flag(false));
        expect("Z2PSBAS 51", "zone2_bass", num(1.0));
        expect("Z3PSTRE 445", "zone3_treble", num(-5.5));
        expect("Z260", "zone2_volume", num(-20.0));
        expect("Z2ON", "zone2_power", flag(true));
        expect("Z2PHONO", "zone2_source", text("PHONO"));
        expect("Z2SOURCE", "zone2_source", text("SOURCE"));
        expect("Z360", "zone3_volume", num(-20.0));
        expect("Z3OFF", "zone3_power", flag(false));
        expect("Z3SOURCE", "zone3_source", text("SOURCE"));
    }

    #[test]
    fn bad_values() {
        expect("MVSTRING", "volume_string", None);
        assert_eq!(update("MV1000"), None);
    }

    #[test]
    fn garbage_never_panics() {
        let lines = [
            "90f9jf3^F*)UF(U(*#fjliuF(#)U(F@ujniljf(@#)&%T^GHkjbJBVKjY*(Y#*(@&5-00193ljl",
            "",
            " ",
            " b b b   ",
            ".:':>,",
            "578934",
            "None",
            "\r",
            "MV                                                   ",
            "                 MV",
            "é€ü",
        ];
        for line in lines {
            let _ = DenonProtocol.handle_line(line, &table());
        }
    }

    // ---------------------------------------------------------------
    // Learned commands
    // ---------------------------------------------------------------

    #[test]
    fn learning() {
        let learned = |line: &str| {
            DenonProtocol
                .handle_line(line, &table())
                .suggested_command()
                .map(|s| (s.category.clone(), s.sub_parameter.clone(), s.value.clone()))
        };
        assert_eq!(learned("PWON"), None);
        assert_eq!(
            learned("PWSCREENSAVER"),
            Some(parts("PW", None, Some("SCREENSAVER")))
        );
        assert_eq!(learned("PSNEW"), Some(parts("PS", Some("NEW"), None)));
        assert_eq!(
            learned("CVATMOS RIGHT 52"),
            Some(parts("CV", Some("ATMOS RIGHT"), Some("52")))
        );
        assert_eq!(
            learned("NEWCMD MEDIUM"),
            Some(parts("NEWCMD", None, Some("MEDIUM")))
        );
    }

    #[test]
    fn heartbeat_is_a_power_query() {
        let table = DenonProtocol.load_table();
        let lookup = DenonProtocol.build_lookup(&table);
        let heartbeat = DenonProtocol.heartbeat_command(&lookup).unwrap();
        assert_eq!(heartbeat.message(), "PW?\r");
        assert_eq!(heartbeat.qos(), 0);
    }
}
