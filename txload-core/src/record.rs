use csv::StringRecord;

use crate::Currency;
use crate::config::ConfigError;

/// One accepted dataset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    /// Empty when the source row had no id and ids were not required.
    pub id: String,
    pub currency: Currency,
    /// Fixed-point amount in minor units (cents).
    pub amount_minor: i64,
    pub source_account: String,
    pub destination_account: String,
}

/// Why a row was left out of the dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    #[error("amount is empty")]
    EmptyAmount,
    #[error("amount is not a decimal number")]
    MalformedAmount,
    #[error("amount does not fit in 64-bit minor units")]
    AmountOutOfRange,
    #[error("currency is empty")]
    MissingCurrency,
    #[error("source account is empty")]
    MissingSourceAccount,
    #[error("destination account is empty")]
    MissingDestinationAccount,
    #[error("id is empty")]
    MissingId,
}

/// Header names of the dataset columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub id: String,
    pub currency: String,
    pub amount: String,
    pub source_account: String,
    pub destination_account: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            currency: "currency".to_string(),
            amount: "amount".to_string(),
            source_account: "source_account".to_string(),
            destination_account: "destination_account".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Reject rows with an empty id.
    pub id_required: bool,
}

/// Column positions resolved against a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    id: Option<usize>,
    currency: usize,
    amount: usize,
    source_account: usize,
    destination_account: usize,
}

impl ColumnNames {
    /// The id column may be absent from the header unless ids are required.
    pub fn resolve(
        &self,
        headers: &StringRecord,
        requirements: Requirements,
    ) -> Result<ColumnIndex, ConfigError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| ConfigError::MissingColumn {
                column: name.to_string(),
            })
        };

        let id = if requirements.id_required {
            Some(require(&self.id)?)
        } else {
            find(&self.id)
        };

        Ok(ColumnIndex {
            id,
            currency: require(&self.currency)?,
            amount: require(&self.amount)?,
            source_account: require(&self.source_account)?,
            destination_account: require(&self.destination_account)?,
        })
    }
}

/// Validates and projects one raw row.
pub fn normalize(
    row: &StringRecord,
    columns: &ColumnIndex,
    requirements: Requirements,
) -> Result<NormalizedRecord, Rejection> {
    let field = |idx: usize| row.get(idx).map(str::trim).unwrap_or_default();

    let amount_minor = parse_amount_minor(field(columns.amount))?;

    let currency = field(columns.currency);
    if currency.is_empty() {
        return Err(Rejection::MissingCurrency);
    }

    let source_account = field(columns.source_account);
    if source_account.is_empty() {
        return Err(Rejection::MissingSourceAccount);
    }

    let destination_account = field(columns.destination_account);
    if destination_account.is_empty() {
        return Err(Rejection::MissingDestinationAccount);
    }

    let id = columns.id.map(field).unwrap_or_default();
    if requirements.id_required && id.is_empty() {
        return Err(Rejection::MissingId);
    }

    Ok(NormalizedRecord {
        id: id.to_string(),
        currency: Currency::from_code(currency),
        amount_minor,
        source_account: source_account.to_string(),
        destination_account: destination_account.to_string(),
    })
}

/// Parses a decimal amount into minor units, exactly.
///
/// Thousands separators and any character other than ASCII digits, `-` and `.` are dropped
/// first. The scaled value is rounded half away from zero on the third fractional digit.
pub fn parse_amount_minor(raw: &str) -> Result<i64, Rejection> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '.'))
        .collect();

    if matches!(cleaned.as_str(), "" | "." | "-" | "-.") {
        return Err(Rejection::EmptyAmount);
    }

    let (negative, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    if unsigned.contains('-') {
        return Err(Rejection::MalformedAmount);
    }

    let (int_digits, frac_digits) = match unsigned.split_once('.') {
        Some((int, frac)) if !frac.contains('.') => (int, frac),
        Some(_) => return Err(Rejection::MalformedAmount),
        None => (unsigned, ""),
    };

    let mut minor: i128 = 0;
    for d in int_digits.bytes() {
        minor = minor
            .checked_mul(10)
            .and_then(|v| v.checked_add(i128::from(d - b'0')))
            .filter(|v| *v <= i128::from(u64::MAX))
            .ok_or(Rejection::AmountOutOfRange)?;
    }

    let mut frac = frac_digits.bytes().map(|d| i128::from(d - b'0'));
    let cents = frac.next().unwrap_or(0) * 10 + frac.next().unwrap_or(0);
    let round_up = frac.next().is_some_and(|d| d >= 5);

    minor = minor * 100 + cents + i128::from(round_up);
    if negative {
        minor = -minor;
    }

    i64::try_from(minor).map_err(|_| Rejection::AmountOutOfRange)
}
