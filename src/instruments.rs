//! Currency-pair universe and related-set lookup
//!
//! The 28 tracked instruments are every pairing of the eight major
//! currencies, quoted with the higher-priority currency as base
//! (EUR > GBP > AUD > NZD > USD > CAD > CHF > JPY).

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    Eur,
    Gbp,
    Aud,
    Nzd,
    Usd,
    Cad,
    Chf,
    Jpy,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Aud => "AUD",
            Currency::Nzd => "NZD",
            Currency::Usd => "USD",
            Currency::Cad => "CAD",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            "AUD" => Some(Currency::Aud),
            "NZD" => Some(Currency::Nzd),
            "USD" => Some(Currency::Usd),
            "CAD" => Some(Currency::Cad),
            "CHF" => Some(Currency::Chf),
            "JPY" => Some(Currency::Jpy),
            _ => None,
        }
    }

    /// All currencies in quoting priority order
    pub fn all() -> [Currency; 8] {
        [
            Currency::Eur,
            Currency::Gbp,
            Currency::Aud,
            Currency::Nzd,
            Currency::Usd,
            Currency::Cad,
            Currency::Chf,
            Currency::Jpy,
        ]
    }
}

/// Which naming component of an instrument a peer must share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Base,
    Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instrument {
    pub base: Currency,
    pub quote: Currency,
}

impl Instrument {
    /// Build an instrument; base must outrank quote
    pub fn new(base: Currency, quote: Currency) -> Option<Self> {
        if base < quote {
            Some(Self { base, quote })
        } else {
            None
        }
    }

    /// Parse a six-letter identifier such as `EURUSD`
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_uppercase();
        if id.len() != 6 {
            return None;
        }
        let base = Currency::from_str(id.get(..3)?)?;
        let quote = Currency::from_str(id.get(3..)?)?;
        Self::new(base, quote)
    }

    pub fn id(&self) -> String {
        format!("{}{}", self.base.as_str(), self.quote.as_str())
    }

    pub fn component(&self, component: Component) -> Currency {
        match component {
            Component::Base => self.base,
            Component::Quote => self.quote,
        }
    }

    pub fn contains(&self, currency: Currency) -> bool {
        self.base == currency || self.quote == currency
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base.as_str(), self.quote.as_str())
    }
}

/// Every tracked instrument, ordered by (base, quote) priority
pub fn all_instruments() -> Vec<Instrument> {
    let currencies = Currency::all();
    let mut out = Vec::with_capacity(28);
    for (i, base) in currencies.iter().enumerate() {
        for quote in &currencies[i + 1..] {
            out.push(Instrument {
                base: *base,
                quote: *quote,
            });
        }
    }
    out
}

/// Instruments sharing `instrument`'s chosen component, in either position
///
/// The target itself is never part of its own related set.
pub fn related_instruments(instrument: Instrument, component: Component) -> BTreeSet<Instrument> {
    let shared = instrument.component(component);
    all_instruments()
        .into_iter()
        .filter(|other| *other != instrument && other.contains(shared))
        .collect()
}
