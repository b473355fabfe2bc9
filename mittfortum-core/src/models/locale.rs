//! Locales and the Fortum markets they map to.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ============================================================================
// Market
// ============================================================================

/// A Fortum retail market. Determines endpoints, currency and time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// Finland.
    Finland,
    /// Sweden.
    Sweden,
    /// Norway.
    Norway,
}

impl Market {
    /// Path segment under `https://www.fortum.com/`.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Finland => "fi/sahkoa",
            Self::Sweden => "se/el",
            Self::Norway => "no/strom",
        }
    }

    /// Authentication journey name used by the SSO service.
    pub fn auth_index_value(&self) -> &'static str {
        match self {
            Self::Finland => "FIB2CLogin",
            Self::Sweden => "SeB2COGWLogin",
            Self::Norway => "NoB2COGWLogin",
        }
    }

    /// Path of the logged-in area of the web site.
    pub fn logged_in_path(&self) -> &'static str {
        match self {
            Self::Finland => "kirjautunut/sahkoa",
            Self::Sweden => "inloggad/el",
            Self::Norway => "innlogget/strom",
        }
    }

    /// ISO 4217 currency used for cost figures.
    pub fn currency(&self) -> &'static str {
        match self {
            Self::Finland => "EUR",
            Self::Sweden => "SEK",
            Self::Norway => "NOK",
        }
    }

    /// Local time zone; publication times are expressed in it.
    pub fn timezone(&self) -> Tz {
        match self {
            Self::Finland => chrono_tz::Europe::Helsinki,
            Self::Sweden => chrono_tz::Europe::Stockholm,
            Self::Norway => chrono_tz::Europe::Oslo,
        }
    }

    /// Lowercase language code passed to the SSO service.
    pub fn sso_locale(&self) -> &'static str {
        match self {
            Self::Finland => "fi",
            Self::Sweden => "sv",
            Self::Norway => "no",
        }
    }
}

// ============================================================================
// Locale
// ============================================================================

/// User-selected locale.
///
/// `En` only changes UI strings; it talks to the Finnish market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Locale {
    /// Finnish.
    #[default]
    Fi,
    /// Swedish.
    Sv,
    /// Norwegian.
    No,
    /// English.
    En,
}

impl Locale {
    /// All supported locales.
    pub const ALL: [Locale; 4] = [Locale::Fi, Locale::Sv, Locale::No, Locale::En];

    /// Uppercase code as stored in configuration.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fi => "FI",
            Self::Sv => "SV",
            Self::No => "NO",
            Self::En => "EN",
        }
    }

    /// Language tag used to select translation tables.
    pub fn language(&self) -> &'static str {
        match self {
            Self::Fi => "fi",
            Self::Sv => "sv",
            Self::No => "nb",
            Self::En => "en",
        }
    }

    /// Native display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fi => "Suomi",
            Self::Sv => "Svenska",
            Self::No => "Norsk",
            Self::En => "English",
        }
    }

    /// The market this locale talks to.
    pub fn market(&self) -> Market {
        match self {
            Self::Fi | Self::En => Market::Finland,
            Self::Sv => Market::Sweden,
            Self::No => Market::Norway,
        }
    }

    /// Currency for cost statistics.
    pub fn currency(&self) -> &'static str {
        self.market().currency()
    }

    /// Market time zone.
    pub fn timezone(&self) -> Tz {
        self.market().timezone()
    }

    /// Parses a locale code, case-insensitively.
    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code.trim().to_uppercase().as_str() {
            "FI" | "FINNISH" => Ok(Self::Fi),
            "SV" | "SE" | "SWEDISH" => Ok(Self::Sv),
            "NO" | "NB" | "NORWEGIAN" => Ok(Self::No),
            "EN" | "ENGLISH" => Ok(Self::En),
            _ => Err(CoreError::UnsupportedLocale(code.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_values() {
        assert_eq!(Locale::Sv.market().path(), "se/el");
        assert_eq!(Locale::Fi.market().path(), "fi/sahkoa");
        assert_eq!(Locale::No.market().path(), "no/strom");
        assert_eq!(Locale::Sv.market().auth_index_value(), "SeB2COGWLogin");
        assert_eq!(Locale::Fi.market().auth_index_value(), "FIB2CLogin");
        assert_eq!(Locale::No.market().auth_index_value(), "NoB2COGWLogin");
        assert_eq!(Locale::Sv.market().logged_in_path(), "inloggad/el");
        assert_eq!(Locale::No.market().logged_in_path(), "innlogget/strom");
    }

    #[test]
    fn test_currency_per_locale() {
        assert_eq!(Locale::Sv.currency(), "SEK");
        assert_eq!(Locale::Fi.currency(), "EUR");
        assert_eq!(Locale::No.currency(), "NOK");
        assert_eq!(Locale::En.currency(), "EUR");
    }

    #[test]
    fn test_parse_locale() {
        assert_eq!("fi".parse::<Locale>().unwrap(), Locale::Fi);
        assert_eq!("SE".parse::<Locale>().unwrap(), Locale::Sv);
        assert_eq!("nb".parse::<Locale>().unwrap(), Locale::No);

        let err = "DE".parse::<Locale>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported locale: DE");
    }

    #[test]
    fn test_serde_uses_uppercase_codes() {
        assert_eq!(serde_json::to_string(&Locale::Sv).unwrap(), r#""SV""#);
        let parsed: Locale = serde_json::from_str(r#""NO""#).unwrap();
        assert_eq!(parsed, Locale::No);
    }
}
