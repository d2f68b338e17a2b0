//! Icon-code translation.
//!
//! Canonical icons come in two code spaces: the numeric "Yahoo+" codes used
//! for icon file names and the MetrixIcons font glyphs ("Meteo" codes). Each
//! space has a night table (day code → night code) and a day table (night
//! code → day code). The day table is only an approximate inverse.

use crate::model::IconCodes;

/// Native provider condition code → (yahoo, meteo).
pub type ProviderCodeTable = &'static [(&'static str, (&'static str, &'static str))];

#[derive(Debug, Clone, Copy)]
pub struct IconTable {
    night: &'static [(&'static str, &'static str)],
    day: &'static [(&'static str, &'static str)],
}

pub static YAHOO: IconTable = IconTable {
    night: &[
        ("3", "47"),
        ("4", "47"),
        ("11", "45"),
        ("12", "45"),
        ("13", "46"),
        ("14", "46"),
        ("15", "46"),
        ("16", "46"),
        ("28", "27"),
        ("30", "29"),
        ("32", "31"),
        ("34", "33"),
        ("37", "47"),
        ("38", "47"),
        ("40", "45"),
        ("41", "46"),
        ("42", "46"),
        ("43", "46"),
    ],
    day: &[
        ("27", "28"),
        ("29", "30"),
        ("31", "32"),
        ("33", "34"),
        ("45", "39"),
        ("46", "16"),
        ("47", "4"),
    ],
};

pub static METEO: IconTable = IconTable {
    night: &[("1", "2"), ("3", "4"), ("B", "C"), ("H", "I"), ("J", "K")],
    day: &[("2", "1"), ("3", "4"), ("C", "B"), ("I", "H"), ("K", "J")],
};

fn lookup(table: &[(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table.iter().find(|(from, _)| *from == code).map(|(_, to)| *to)
}

impl IconTable {
    pub fn night_variant(&self, code: &str) -> Option<&'static str> {
        lookup(self.night, code)
    }

    pub fn day_variant(&self, code: &str) -> Option<&'static str> {
        lookup(self.day, code)
    }

    /// Night table when night icons are enabled and it is night, day table otherwise.
    ///
    /// The day table is applied even when it is not night, so a night code
    /// delivered during the day is turned into its day counterpart.
    pub fn translate(&self, code: &str, is_night: bool, night_icons: bool) -> String {
        let mapped = if night_icons && is_night {
            self.night_variant(code)
        } else {
            self.day_variant(code)
        };
        mapped.unwrap_or(code).to_string()
    }
}

impl IconCodes {
    /// Looks up a native condition code; unknown codes pass through into both slots.
    pub fn from_native(table: ProviderCodeTable, native: Option<&str>) -> Self {
        let Some(native) = native else {
            return IconCodes::unknown();
        };
        table
            .iter()
            .find(|(code, _)| *code == native)
            .map(|(_, (yahoo, meteo))| IconCodes::new(*yahoo, *meteo))
            .unwrap_or_else(|| IconCodes::new(native, native))
    }

    pub fn translate(&self, is_night: bool, night_icons: bool) -> Self {
        IconCodes {
            yahoo: YAHOO.translate(&self.yahoo, is_night, night_icons),
            meteo: METEO.translate(&self.meteo, is_night, night_icons),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_codes() -> Vec<String> {
        let mut codes: Vec<String> = (0..=48).map(|c| c.to_string()).collect();
        codes.extend(
            ["1", "2", "3", "4", "B", "C", "H", "I", "J", "K", "Q", "Z", "NA", ""]
                .iter()
                .map(|c| c.to_string()),
        );
        codes
    }

    #[test]
    fn daytime_uses_the_day_table_even_with_night_icons_enabled() {
        for table in [&YAHOO, &METEO] {
            for code in all_codes() {
                let expected = table.day_variant(&code).unwrap_or(&code).to_string();
                assert_eq!(table.translate(&code, false, true), expected, "code {code}");
            }
        }
    }

    #[test]
    fn disabled_night_icons_use_the_day_table_at_night() {
        for table in [&YAHOO, &METEO] {
            for code in all_codes() {
                let expected = table.day_variant(&code).unwrap_or(&code).to_string();
                assert_eq!(table.translate(&code, true, false), expected, "code {code}");
            }
        }
    }

    #[test]
    fn night_with_night_icons_uses_the_night_table() {
        assert_eq!(YAHOO.translate("32", true, true), "31");
        assert_eq!(YAHOO.translate("34", true, true), "33");
        assert_eq!(YAHOO.translate("26", true, true), "26");
        assert_eq!(METEO.translate("1", true, true), "2");
        assert_eq!(METEO.translate("B", true, true), "C");
    }

    #[test]
    fn day_table_is_not_an_exact_inverse() {
        // 3 maps to 4 in both directions for the glyph font.
        assert_eq!(METEO.night_variant("3"), Some("4"));
        assert_eq!(METEO.day_variant("4"), None);
        assert_eq!(METEO.day_variant("3"), Some("4"));
        // 46 goes back to 16 although 13, 14, 15 and 16 all map to 46.
        assert_eq!(YAHOO.day_variant("46"), Some("16"));
    }

    #[test]
    fn native_codes_outside_the_table_pass_through() {
        static TABLE: ProviderCodeTable = &[("800", ("32", "B"))];
        assert_eq!(IconCodes::from_native(TABLE, Some("800")), IconCodes::new("32", "B"));
        assert_eq!(IconCodes::from_native(TABLE, Some("999")), IconCodes::new("999", "999"));
        assert_eq!(IconCodes::from_native(TABLE, None), IconCodes::unknown());
    }
}
