//! Denon/Marantz command registry.
//!
//! The telnet control protocol addresses every setting by an ASCII prefix.
//! Simple settings take the value straight after the prefix (`PWON`,
//! `MV75`, `SIPHONO`); grouped settings use a category followed by a
//! parameter and a space (`PSBAS 50`, `CVFL 51`). Zone 2 and zone 3 reuse
//! the main-zone grammar under `Z2`/`Z3`, with a single prefix carrying
//! volume, power and source.
//!
//! # Volume-style levels
//!
//! Levels are sent as two digits relative to a zero point, with a third
//! digit for half steps: `MV80` is 0 dB, `MV75` is -5 dB and `MV495` is
//! -30.5 dB. Tone and channel levels use a zero point of 50.
//!
//! All functions are pure; [`denon_table`] assembles the full registry.

use avrctl_core::{CommandEntry, CommandTable};

// ---------------------------------------------------------------
// Sources
// ---------------------------------------------------------------

/// Input sources accepted by `SI` and the zone prefixes.
pub const SOURCES: &[&str] = &[
    "PHONO", "CD", "TUNER", "DVD", "BD", "TV", "SAT/CBL", "MPLAY", "GAME", "HDRADIO", "NET",
    "PANDORA", "SIRIUSXM", "SPOTIFY", "LASTFM", "FLICKR", "IRADIO", "SERVER", "FAVORITES",
    "AUX1", "AUX2", "AUX3", "AUX4", "AUX5", "AUX6", "AUX7", "BT", "USB/IPOD", "USB", "IPD",
    "IRP", "FVP",
];

/// Zone source value that follows the main zone.
pub const SOURCE_FOLLOW: &str = "SOURCE";

/// Speaker channels addressed by `CV` and `SSLEV`.
pub const CHANNELS: &[&str] = &[
    "FL", "FR", "C", "SW", "SW2", "SL", "SR", "SBL", "SBR", "SB", "FHL", "FHR", "FWL", "FWR",
    "TFL", "TFR", "TML", "TMR", "TRL", "TRR", "RHL", "RHR", "FDL", "FDR", "SDL", "SDR", "BDL",
    "BDR", "SHL", "SHR", "TS", "CH",
];

/// Zero point of main and zone volume.
pub const VOLUME_ZERO: i32 = 80;

/// Zero point of tone, channel and dialog levels.
pub const LEVEL_ZERO: i32 = 50;

fn on_off() -> CommandEntry {
    CommandEntry::new().choice("ON", true).choice("OFF", false)
}

// ---------------------------------------------------------------
// Main zone
// ---------------------------------------------------------------

fn power() -> CommandEntry {
    CommandEntry::new()
        .name("power")
        .choice("ON", true)
        .choice("OFF", false)
        .choice("STANDBY", false)
}

fn volume() -> CommandEntry {
    CommandEntry::new()
        .name("volume")
        .level()
        .zero(VOLUME_ZERO)
        .range(0, 98)
        .param("MAX", CommandEntry::new().name("max_volume"))
        .param("UP", CommandEntry::new().name("volume_up"))
        .param("DOWN", CommandEntry::new().name("volume_down"))
}

fn channel_levels() -> CommandEntry {
    CHANNELS.iter().fold(
        CommandEntry::new()
            .name("channel_level")
            .level()
            .zero(LEVEL_ZERO)
            .range(38, 62),
        |entry, ch| entry.param(ch, CommandEntry::new()),
    )
}

fn surround_parameters() -> CommandEntry {
    let tone = |name: &str| {
        CommandEntry::new()
            .name(name)
            .level()
            .zero(LEVEL_ZERO)
            .range(44, 56)
    };

    CommandEntry::new()
        .param("TONE CTRL", on_off().name("tone_control"))
        .param("BAS", tone("bass"))
        .param("TRE", tone("treble"))
        .param(
            "LFE",
            CommandEntry::new()
                .name("lfe_level")
                .level()
                .zero(0)
                .range(-10, 0)
                .digits(1),
        )
        .param(
            "DIL",
            on_off()
                .name("dialog_level")
                .level()
                .zero(LEVEL_ZERO)
                .range(38, 62),
        )
        .param(
            "SWL",
            on_off()
                .name("subwoofer_1")
                .level()
                .zero(LEVEL_ZERO)
                .range(38, 62),
        )
        .param(
            "DYNVOL",
            CommandEntry::new()
                .name("dsp_dynamic_range_control")
                .choice("OFF", "off")
                .choice("LIT", "low")
                .choice("MED", "medium")
                .choice("HEV", "high"),
        )
        .param(
            "DCO",
            CommandEntry::new()
                .name("meta_dynamic_range_control")
                .choices(&["OFF", "LOW", "MID", "HIGH", "AUTO"]),
        )
        .param(
            "MULTEQ",
            CommandEntry::new()
                .name("audyssey_multi_eq")
                .choices(&["AUDYSSEY", "BYP.LR", "FLAT", "MANUAL", "OFF"]),
        )
        .param("DYNEQ", on_off().name("audyssey_dynamic_eq"))
        .param(
            "SB",
            CommandEntry::new()
                .name("surround_back")
                .choices(&["MTRX ON", "PL2X CINEMA", "PL2X MUSIC", "ON", "OFF"]),
        )
        .param("EFF", CommandEntry::new().name("effect_level").range(1, 15))
        .param("DELAY", CommandEntry::new())
}

fn main_zone(table: CommandTable) -> CommandTable {
    table
        .with("PW", power())
        .with("ZM", on_off().name("zone1_power"))
        .with("MV", volume())
        .with("MU", on_off().name("mute"))
        .with("SI", CommandEntry::new().name("source").choices(SOURCES))
        .with("MS", CommandEntry::new().name("sound_mode"))
        .with(
            "DC",
            CommandEntry::new()
                .name("digital_signal_mode")
                .choices(&["AUTO", "PCM", "DTS"]),
        )
        .with("SLP", CommandEntry::new().name("sleep").choice("OFF", false))
        .with("CV", channel_levels())
        .with("SSLEV", channel_levels())
        .with("PS", surround_parameters())
}

// ---------------------------------------------------------------
// Zones 2 and 3
// ---------------------------------------------------------------

/// The zone prefix (`Z2`, `Z3`): volume when numeric, power for
/// `ON`/`OFF`, source otherwise.
fn zone(n: u8) -> CommandEntry {
    CommandEntry::new()
        .level()
        .zero(VOLUME_ZERO)
        .range(0, 98)
        .choice("ON", true)
        .choice("OFF", false)
        .choices(SOURCES)
        .choices(&[SOURCE_FOLLOW])
        .variant("number", &format!("zone{n}_volume"))
        .variant("ON", &format!("zone{n}_power"))
        .variant("OFF", &format!("zone{n}_power"))
        .variant("other", &format!("zone{n}_source"))
}

fn zone_tone(n: u8) -> CommandEntry {
    let tone = |name: String| {
        CommandEntry::new()
            .name(&name)
            .level()
            .zero(LEVEL_ZERO)
            .range(40, 60)
    };
    CommandEntry::new()
        .param("BAS", tone(format!("zone{n}_bass")))
        .param("TRE", tone(format!("zone{n}_treble")))
}

fn zones(table: CommandTable) -> CommandTable {
    [2u8, 3].into_iter().fold(table, |table, n| {
        table
            .with(&format!("Z{n}"), zone(n))
            .with(&format!("Z{n}PS"), zone_tone(n))
            .with(&format!("Z{n}MU"), on_off().name(&format!("zone{n}_mute")))
    })
}

/// The complete Denon/Marantz registry.
pub fn denon_table() -> CommandTable {
    zones(main_zone(CommandTable::new())).with("Z3CS", CommandEntry::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrctl_core::{CommandLookup, CommandValue, Error, ValueBounds, ValueDomain};

    fn lookup() -> CommandLookup {
        CommandLookup::from_table(&denon_table())
    }

    fn set(name: &str, value: impl Into<CommandValue>) -> String {
        lookup().command(name).unwrap().set(value, 0).unwrap().message()
    }

    fn query(name: &str) -> String {
        lookup().command(name).unwrap().query(0).message()
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    #[test]
    fn level_bounds() {
        let lookup = lookup();
        let bounds = |name: &str| lookup.command(name).unwrap().bounds().unwrap();
        assert_eq!(bounds("volume"), ValueBounds::new(-80.0, 18.0));
        assert_eq!(bounds("bass"), ValueBounds::new(-6.0, 6.0));
        assert_eq!(bounds("channel_level_fl"), ValueBounds::new(-12.0, 12.0));
        assert_eq!(bounds("lfe_level"), ValueBounds::new(-10.0, 0.0));
        assert_eq!(bounds("zone2_volume"), ValueBounds::new(-80.0, 18.0));
    }

    #[test]
    fn channel_levels_use_cv() {
        let lookup = lookup();
        assert!(lookup.get("channel_level_fr").is_some());
        assert_eq!(
            lookup.command("channel_level_fl").unwrap().wire_prefix(),
            "CVFL"
        );
    }

    #[test]
    fn enumerated_aliases() {
        let lookup = lookup();
        let drc = lookup.command("dsp_dynamic_range_control").unwrap();
        assert_eq!(drc.value_for("off").unwrap(), "OFF");
        assert_eq!(drc.value_for("low").unwrap(), "LIT");
        assert_eq!(drc.value_for("lit").unwrap(), "LIT");
        assert_eq!(drc.value_for("medium").unwrap(), "MED");
        assert_eq!(drc.value_for("med").unwrap(), "MED");
        assert_eq!(drc.value_for("high").unwrap(), "HEV");
        assert_eq!(drc.value_for("hev").unwrap(), "HEV");
        assert!(matches!(drc.value_for("de"), Err(Error::InvalidParameter(_))));
        assert!(drc.bounds().is_none());

        let multeq = lookup.command("audyssey_multi_eq").unwrap();
        assert_eq!(multeq.value_for("off").unwrap(), "OFF");
        assert_eq!(multeq.value_for("audyssey").unwrap(), "AUDYSSEY");
        assert_eq!(multeq.value_for("byp.lr").unwrap(), "BYP.LR");
    }

    #[test]
    fn unknown_command() {
        assert!(matches!(
            lookup().command("warp_drive"),
            Err(Error::UnknownCommand(_))
        ));
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn power_and_mute() {
        assert_eq!(set("power", true), "PWON\r");
        assert_eq!(set("power", false), "PWOFF\r");
        assert_eq!(query("power"), "PW?\r");
        assert_eq!(set("mute", true), "MUON\r");
        assert_eq!(set("mute", false), "MUOFF\r");
        assert_eq!(query("mute"), "MU?\r");
        assert_eq!(set("zone1_power", true), "ZMON\r");
        assert_eq!(set("zone1_power", false), "ZMOFF\r");
    }

    #[test]
    fn volume() {
        assert_eq!(set("volume", -5), "MV75\r");
        assert_eq!(set("volume", -30.5), "MV495\r");
        assert_eq!(query("volume"), "MV?\r");
        let lookup = lookup();
        assert_eq!(lookup.command("volume_up").unwrap().trigger(0).message(), "MVUP\r");
        assert_eq!(
            lookup.command("volume_down").unwrap().trigger(0).message(),
            "MVDOWN\r"
        );
        assert!(lookup.command("volume").unwrap().set(20, 0).is_err());
    }

    #[test]
    fn source_and_sound_mode() {
        assert_eq!(set("source", "phono"), "SIPHONO\r");
        assert_eq!(set("source", "sat/CbL"), "SISAT/CBL\r");
        assert_eq!(query("source"), "SI?\r");
        assert_eq!(set("sound_mode", "pure direct"), "MSPURE DIRECT\r");
        assert!(lookup().command("source").unwrap().set("vinyl", 0).is_err());
    }

    #[test]
    fn surround_parameters() {
        assert_eq!(set("tone_control", true), "PSTONE CTRL ON\r");
        assert_eq!(query("tone_control"), "PSTONE CTRL ?\r");
        assert_eq!(set("treble", 3), "PSTRE 53\r");
        assert_eq!(set("treble", -3.5), "PSTRE 465\r");
        assert_eq!(set("bass", 0), "PSBAS 50\r");
        assert_eq!(set("dsp_dynamic_range_control", false), "PSDYNVOL OFF\r");
        assert_eq!(query("dsp_dynamic_range_control"), "PSDYNVOL ?\r");
        assert_eq!(set("dsp_dynamic_range_control", "HEV"), "PSDYNVOL HEV\r");
        assert_eq!(set("dsp_dynamic_range_control", "high"), "PSDYNVOL HEV\r");
        assert_eq!(set("lfe_level", 0), "PSLFE 0\r");
        assert_eq!(set("lfe_level", -7), "PSLFE -7\r");
        assert_eq!(set("dialog_level", false), "PSDIL OFF\r");
        assert_eq!(set("dialog_level", 2), "PSDIL 52\r");
    }

    #[test]
    fn zones() {
        assert_eq!(set("zone2_power", true), "Z2ON\r");
        assert_eq!(set("zone3_power", false), "Z3OFF\r");
        assert_eq!(set("zone2_volume", -20), "Z260\r");
        assert_eq!(set("zone2_source", "phono"), "Z2PHONO\r");
        assert_eq!(set("zone3_source", "source"), "Z3SOURCE\r");
        assert_eq!(set("zone2_bass", 1), "Z2PSBAS 51\r");
        assert_eq!(set("zone2_mute", true), "Z2MUON\r");
        assert_eq!(set("Z3CS", "st"), "Z3CSST\r");

        let lookup = lookup();
        let zone2 = lookup.command("zone2_volume").unwrap();
        assert_eq!(zone2.wire_prefix(), "Z2");
        assert_eq!(lookup.command("zone2_power").unwrap().wire_prefix(), "Z2");
        assert!(matches!(zone2.domain(), ValueDomain::Numeric(_)));
    }
}
