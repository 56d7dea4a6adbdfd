//! Access key (`claveAcceso`) generation and parsing.
//!
//! An access key is 48 digits of structural fields followed by a Modulus-11 check
//! digit. It names one document for the rest of its lifecycle.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Length of a complete access key.
pub const ACCESS_KEY_LEN: usize = 49;
const FIELDS_LEN: usize = ACCESS_KEY_LEN - 1;
const WEIGHTS: [u32; 6] = [2, 3, 4, 5, 6, 7];

/// Bad input to key generation or parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedFieldError {
    #[error("{field} contains a non-digit character: {value:?}")]
    NonDigit { field: &'static str, value: String },
    #[error("access key fields concatenate to {actual} characters, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("check digit mismatch: expected {expected}, found {found}")]
    CheckDigit { expected: u8, found: u8 },
}

/// Modulus-11 check digit over a digit string.
///
/// Weights 2 through 7 are applied cyclically starting at the last digit.
///
/// # Examples
/// ```rust
/// use sri_core::access_key::compute_check_digit;
///
/// let digit = compute_check_digit("060120260109999999999900110010010000000011234567")?;
/// assert_eq!(digit, 3);
/// # Ok::<(), sri_core::access_key::MalformedFieldError>(())
/// ```
///
/// # Errors
/// Returns [`MalformedFieldError::NonDigit`] if the input has anything but ASCII digits.
pub fn compute_check_digit(digits: &str) -> Result<u8, MalformedFieldError> {
    ensure_digits("digits", digits)?;
    let sum: u32 = digits
        .bytes()
        .rev()
        .zip(WEIGHTS.iter().cycle())
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();

    Ok(match 11 - (sum % 11) {
        11 => 0,
        10 => 1,
        d => d as u8,
    })
}

fn ensure_digits(field: &'static str, value: &str) -> Result<(), MalformedFieldError> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(MalformedFieldError::NonDigit {
            field,
            value: value.to_string(),
        })
    }
}

/// Structural fields of an access key, already fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyFields {
    /// `ddMMyyyy`
    pub emission_date: String,
    pub document_type: String,
    pub ruc: String,
    pub environment: String,
    /// Establishment followed by emission point.
    pub series: String,
    pub sequential: String,
    pub numeric_code: String,
    pub emission_type: String,
}

impl AccessKeyFields {
    fn parts(&self) -> [(&'static str, &str); 8] {
        [
            ("emission_date", &self.emission_date),
            ("document_type", &self.document_type),
            ("ruc", &self.ruc),
            ("environment", &self.environment),
            ("series", &self.series),
            ("sequential", &self.sequential),
            ("numeric_code", &self.numeric_code),
            ("emission_type", &self.emission_type),
        ]
    }
}

/// A validated 49-digit access key.
///
/// # Examples
/// ```rust
/// use sri_core::access_key::{AccessKey, AccessKeyFields};
///
/// let key = AccessKey::generate(&AccessKeyFields {
///     emission_date: "06012026".into(),
///     document_type: "01".into(),
///     ruc: "0999999999001".into(),
///     environment: "1".into(),
///     series: "001001".into(),
///     sequential: "000000001".into(),
///     numeric_code: "12345678".into(),
///     emission_type: "1".into(),
/// })?;
/// assert_eq!(key.as_str().len(), 49);
/// # Ok::<(), sri_core::access_key::MalformedFieldError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    /// Concatenate the fields and append the check digit.
    ///
    /// # Errors
    /// Returns [`MalformedFieldError`] when a field holds a non-digit or the fields do
    /// not add up to 48 characters.
    pub fn generate(fields: &AccessKeyFields) -> Result<Self, MalformedFieldError> {
        let mut key = String::with_capacity(ACCESS_KEY_LEN);
        for (name, value) in fields.parts() {
            ensure_digits(name, value)?;
            key.push_str(value);
        }
        if key.len() != FIELDS_LEN {
            return Err(MalformedFieldError::Length {
                expected: FIELDS_LEN,
                actual: key.len(),
            });
        }
        let check = compute_check_digit(&key)?;
        key.push(char::from(b'0' + check));
        Ok(AccessKey(key))
    }

    /// Accept an existing key, verifying length, digits and check digit.
    ///
    /// # Errors
    /// Returns [`MalformedFieldError`] when any of those checks fails.
    pub fn parse(value: impl Into<String>) -> Result<Self, MalformedFieldError> {
        let value = value.into().trim().to_string();
        ensure_digits("access_key", &value)?;
        if value.len() != ACCESS_KEY_LEN {
            return Err(MalformedFieldError::Length {
                expected: ACCESS_KEY_LEN,
                actual: value.len(),
            });
        }
        let (body, last) = value.split_at(FIELDS_LEN);
        let expected = compute_check_digit(body)?;
        let found = last.as_bytes()[0] - b'0';
        if expected != found {
            return Err(MalformedFieldError::CheckDigit { expected, found });
        }
        Ok(AccessKey(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[FIELDS_LEN] - b'0'
    }

    /// `ddMMyyyy` emission date segment.
    pub fn emission_date(&self) -> &str {
        &self.0[0..8]
    }

    pub fn document_type(&self) -> &str {
        &self.0[8..10]
    }

    pub fn ruc(&self) -> &str {
        &self.0[10..23]
    }

    pub fn environment(&self) -> &str {
        &self.0[23..24]
    }

    pub fn series(&self) -> &str {
        &self.0[24..30]
    }

    pub fn sequential(&self) -> &str {
        &self.0[30..39]
    }

    pub fn numeric_code(&self) -> &str {
        &self.0[39..47]
    }

    pub fn emission_type(&self) -> &str {
        &self.0[47..48]
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for AccessKey {
    type Err = MalformedFieldError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessKey::parse(s)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = MalformedFieldError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccessKey::parse(value)
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Eight-digit nonce segment of an access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NumericCode(String);

impl NumericCode {
    /// # Errors
    /// Returns [`MalformedFieldError`] unless the value is exactly eight digits.
    pub fn new(value: impl Into<String>) -> Result<Self, MalformedFieldError> {
        let value = value.into();
        ensure_digits("numeric_code", &value)?;
        if value.len() != 8 {
            return Err(MalformedFieldError::Length {
                expected: 8,
                actual: value.len(),
            });
        }
        Ok(NumericCode(value))
    }

    pub fn random() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
        NumericCode(format!("{n:08}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NumericCode {
    type Error = MalformedFieldError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        NumericCode::new(value)
    }
}

impl From<NumericCode> for String {
    fn from(code: NumericCode) -> Self {
        code.0
    }
}
