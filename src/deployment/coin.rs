//! Coin amounts: integral `Coin` for deposits and fees, fixed-point `DecCoin` for prices

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by `DecCoin`
pub const DEC_PRECISION: u32 = 18;

const DEC_ONE: u128 = 1_000_000_000_000_000_000;

lazy_static! {
    static ref DENOM: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9/:._-]{2,127}$").unwrap();
    static ref COIN: Regex =
        Regex::new(r"^\s*([0-9]+)\s*([a-zA-Z][a-zA-Z0-9/:._-]{2,127})\s*$").unwrap();
    static ref DEC_COIN: Regex = Regex::new(
        r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z][a-zA-Z0-9/:._-]{2,127})\s*$"
    )
    .unwrap();
}

/// Check a denomination against the chain's denom rules
pub fn validate_denom(denom: &str) -> Result<(), String> {
    if DENOM.is_match(denom) {
        Ok(())
    } else {
        Err(format!("invalid denom: {:?}", denom))
    }
}

/// Integral amount of a single denomination, e.g. `5000000uakt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_denom(&self.denom)
    }
}

impl FromStr for Coin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = COIN
            .captures(s)
            .ok_or_else(|| format!("invalid coin expression: {:?}", s))?;
        let amount = caps[1]
            .parse::<u128>()
            .map_err(|e| format!("invalid coin amount {:?}: {}", &caps[1], e))?;
        Ok(Coin::new(amount, &caps[2]))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl From<Coin> for String {
    fn from(coin: Coin) -> Self {
        coin.to_string()
    }
}

impl TryFrom<String> for Coin {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Decimal amount with 18 fractional digits, e.g. `0.025uakt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DecCoin {
    pub denom: String,
    /// Amount scaled by 10^18
    atto: u128,
}

impl DecCoin {
    pub fn from_atto(atto: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            atto,
        }
    }

    pub fn atto(&self) -> u128 {
        self.atto
    }

    pub fn is_zero(&self) -> bool {
        self.atto == 0
    }

    /// Total cost of `units` at this price, rounded up to a whole coin
    pub fn cost_of(&self, units: u64) -> Coin {
        let scaled = self.atto.saturating_mul(units as u128);
        let amount = scaled / DEC_ONE + u128::from(scaled % DEC_ONE != 0);
        Coin::new(amount, self.denom.clone())
    }
}

impl FromStr for DecCoin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DEC_COIN
            .captures(s)
            .ok_or_else(|| format!("invalid decimal coin expression: {:?}", s))?;

        let (whole, frac) = match caps[1].split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (&caps[1], ""),
        };
        if frac.len() > DEC_PRECISION as usize {
            return Err(format!(
                "too many decimal places in {:?} (max {})",
                &caps[1], DEC_PRECISION
            ));
        }

        let whole = whole
            .parse::<u128>()
            .map_err(|e| format!("invalid decimal amount {:?}: {}", &caps[1], e))?;
        let frac_padded = format!("{:0<width$}", frac, width = DEC_PRECISION as usize);
        let frac = frac_padded
            .parse::<u128>()
            .map_err(|e| format!("invalid decimal amount {:?}: {}", &caps[1], e))?;

        let atto = whole
            .checked_mul(DEC_ONE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| format!("decimal amount {:?} overflows", &caps[1]))?;

        Ok(DecCoin::from_atto(atto, &caps[2]))
    }
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.atto / DEC_ONE;
        let frac = self.atto % DEC_ONE;
        if frac == 0 {
            return write!(f, "{}{}", whole, self.denom);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{}{}", whole, frac.trim_end_matches('0'), self.denom)
    }
}

impl From<DecCoin> for String {
    fn from(coin: DecCoin) -> Self {
        coin.to_string()
    }
}

impl TryFrom<String> for DecCoin {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
