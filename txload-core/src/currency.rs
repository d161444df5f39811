use std::collections::HashMap;
use std::fmt;

/// ISO-4217 style currency code. Codes outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    Usd,
    Eur,
    Idr,
    Sgd,
    Other(String),
}

impl Currency {
    /// Trims and upper-cases `code` before matching.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        match code.as_str() {
            "USD" => Self::Usd,
            "EUR" => Self::Eur,
            "IDR" => Self::Idr,
            "SGD" => Self::Sgd,
            _ => Self::Other(code),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Idr => "IDR",
            Self::Sgd => "SGD",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Maps currencies to the numeric values of a protobuf `Currency` enum.
///
/// Anything not in the table maps to `0`, the unspecified value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyCodeTable {
    codes: HashMap<Currency, i32>,
}

impl Default for CurrencyCodeTable {
    /// `payments.v1.Currency`.
    fn default() -> Self {
        Self::from_pairs([(Currency::Usd, 1), (Currency::Idr, 2), (Currency::Sgd, 3)])
    }
}

impl CurrencyCodeTable {
    pub const UNSPECIFIED: i32 = 0;

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Currency, i32)>) -> Self {
        Self {
            codes: pairs.into_iter().collect(),
        }
    }

    pub fn code(&self, currency: &Currency) -> i32 {
        self.codes
            .get(currency)
            .copied()
            .unwrap_or(Self::UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_uppercased() {
        assert_eq!(Currency::from_code(" usd"), Currency::Usd);
        assert_eq!(Currency::from_code("Sgd "), Currency::Sgd);
        assert_eq!(
            Currency::from_code("jpy"),
            Currency::Other("JPY".to_string())
        );
        assert_eq!(Currency::from_code("jpy").to_string(), "JPY");
    }

    #[test]
    fn default_table_matches_payments_enum() {
        let table = CurrencyCodeTable::default();
        assert_eq!(table.code(&Currency::Usd), 1);
        assert_eq!(table.code(&Currency::Idr), 2);
        assert_eq!(table.code(&Currency::Sgd), 3);
        assert_eq!(table.code(&Currency::Eur), 0);
        assert_eq!(table.code(&Currency::Other("JPY".to_string())), 0);
    }
}
