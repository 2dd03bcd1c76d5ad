use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_SYMBOL_LEN: usize = 64;

/// Instrument identifier, e.g. `BTC-PERPETUAL`.
///
/// Case is preserved: venues such as Deribit treat instrument names as
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: impl Into<String>) -> Result<Self, &'static str> {
        let s: String = value.into();
        if s.is_empty() {
            return Err("Symbol cannot be empty");
        }
        if s.len() > MAX_SYMBOL_LEN {
            return Err("Symbol too long (max 64 chars)");
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err("Symbol must be alphanumeric (plus '-', '_', '.')");
        }
        Ok(Symbol(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Symbol {
    type Error = &'static str;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl TryFrom<String> for Symbol {
    type Error = &'static str;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
