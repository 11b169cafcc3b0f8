use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The single instrument an engine trades: base/quote, e.g. `BTC-USD`.
///
/// Travels over the wire as its plain string code, which is what every
/// [`Trade`](crate::trade::Trade) carries in its `ticker` field.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Instrument {
    /// The asset you buy or sell
    base: String,
    /// The asset you pay or receive
    quote: String,
}

impl Instrument {
    pub fn new(base: &str, quote: &str) -> Result<Self, String> {
        Ok(Self {
            base: asset_code(base)?,
            quote: asset_code(quote)?,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Returns the usual string code, e.g "BTC-USD"
    pub fn code(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

fn asset_code(raw: &str) -> Result<String, String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid asset code: `{}`", raw));
    }
    Ok(raw.to_ascii_uppercase())
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument {
            base: "BTC".into(),
            quote: "USD".into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Instrument {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('-')
            .ok_or_else(|| format!("unsupported symbol: `{}` (expected BASE-QUOTE)", s))?;
        Instrument::new(base, quote).map_err(|e| format!("unsupported symbol: `{}`: {}", s, e))
    }
}

impl TryFrom<String> for Instrument {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Instrument> for String {
    fn from(value: Instrument) -> Self {
        value.code()
    }
}
