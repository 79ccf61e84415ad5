//! Resource quantity arithmetic
//!
//! Kubernetes carries resource amounts as strings (`"500m"`, `"2Gi"`). The
//! pod group needs their sum over every pod of the job, so quantities are
//! parsed into an exact number of milli-units, combined, and formatted back.
//! Sub-milli amounts (`n`, `u` suffixes) round up to the next milli-unit,
//! matching how the API server rounds requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Resource name to amount, e.g. `cpu -> 500m`
pub type ResourceList = BTreeMap<String, Quantity>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("invalid quantity `{0}`")]
    Invalid(String),

    #[error("quantity `{0}` overflows")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    DecimalSi,
    BinarySi,
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// A quantity held as an exact count of milli-units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    millis: i128,
    format: Format,
}

impl ParsedQuantity {
    pub fn zero() -> Self {
        Self {
            millis: 0,
            format: Format::DecimalSi,
        }
    }

    pub fn parse(quantity: &Quantity) -> Result<Self, QuantityError> {
        quantity.0.parse()
    }

    pub fn millis(&self) -> i128 {
        self.millis
    }

    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        let format = if self.millis == 0 {
            other.format
        } else {
            self.format
        };
        let millis = self
            .millis
            .checked_add(other.millis)
            .ok_or_else(|| QuantityError::Overflow(format!("{self} + {other}")))?;
        Ok(Self { millis, format })
    }

    pub fn checked_mul(self, factor: i64) -> Result<Self, QuantityError> {
        let millis = self
            .millis
            .checked_mul(i128::from(factor))
            .ok_or_else(|| QuantityError::Overflow(format!("{self} * {factor}")))?;
        Ok(Self {
            millis,
            format: self.format,
        })
    }

    pub fn to_quantity(&self) -> Quantity {
        Quantity(self.to_string())
    }
}

impl FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        let invalid = || QuantityError::Invalid(raw.to_string());
        let overflow = || QuantityError::Overflow(raw.to_string());

        let split = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(value.len());
        let (number, suffix) = value.split_at(split);

        let (negative, digits) = match number.as_bytes().first() {
            Some(b'-') => (true, &number[1..]),
            Some(b'+') => (false, &number[1..]),
            _ => (false, number),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if (whole.is_empty() && fraction.is_empty())
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for b in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(overflow)?;
        }
        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;

        // value = mantissa * numerator / (10^scale * denominator), in milli-units
        let (mut numerator, mut denominator, format) = match suffix {
            "" => (1_i128, 1_i128, Format::DecimalSi),
            "n" => (1, 1_000_000_000, Format::DecimalSi),
            "u" => (1, 1_000_000, Format::DecimalSi),
            "m" => (1, 1_000, Format::DecimalSi),
            "k" => (1_000, 1, Format::DecimalSi),
            "M" => (1_000_000, 1, Format::DecimalSi),
            "G" => (1_000_000_000, 1, Format::DecimalSi),
            "T" => (1_000_000_000_000, 1, Format::DecimalSi),
            "P" => (1_000_000_000_000_000, 1, Format::DecimalSi),
            "E" => (1_000_000_000_000_000_000, 1, Format::DecimalSi),
            other => {
                if let Some(exponent) = other
                    .strip_prefix('e')
                    .or_else(|| other.strip_prefix('E'))
                {
                    let exponent: i32 = exponent.parse().map_err(|_| invalid())?;
                    let power = 10_i128
                        .checked_pow(exponent.unsigned_abs())
                        .ok_or_else(overflow)?;
                    if exponent >= 0 {
                        (power, 1, Format::DecimalSi)
                    } else {
                        (1, power, Format::DecimalSi)
                    }
                } else {
                    let (_, shift) = BINARY_SUFFIXES
                        .iter()
                        .find(|(name, _)| *name == other)
                        .ok_or_else(invalid)?;
                    (1_i128 << shift, 1, Format::BinarySi)
                }
            }
        };
        numerator = numerator.checked_mul(1_000).ok_or_else(overflow)?;
        denominator = denominator
            .checked_mul(10_i128.checked_pow(scale).ok_or_else(overflow)?)
            .ok_or_else(overflow)?;

        let scaled = mantissa.checked_mul(numerator).ok_or_else(overflow)?;
        let mut millis = scaled / denominator;
        if scaled % denominator != 0 {
            millis += 1;
        }
        if negative {
            millis = -millis;
        }

        Ok(Self { millis, format })
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1_000 != 0 {
            return write!(f, "{}m", self.millis);
        }
        let units = self.millis / 1_000;
        if self.format == Format::BinarySi && units != 0 {
            for (name, shift) in BINARY_SUFFIXES.iter().rev() {
                let base = 1_i128 << shift;
                if units % base == 0 {
                    return write!(f, "{}{name}", units / base);
                }
            }
        }
        write!(f, "{units}")
    }
}

/// Adds every entry of `other` into `total`.
pub fn add_resource_list(
    total: &mut ResourceList,
    other: &ResourceList,
) -> Result<(), QuantityError> {
    for (name, quantity) in other {
        let addend = ParsedQuantity::parse(quantity)?;
        let current = match total.get(name) {
            Some(existing) => ParsedQuantity::parse(existing)?,
            None => ParsedQuantity::zero(),
        };
        total.insert(name.clone(), current.checked_add(addend)?.to_quantity());
    }
    Ok(())
}

/// Raises every entry of `total` to at least the matching entry of `other`.
pub fn max_resource_list(
    total: &mut ResourceList,
    other: &ResourceList,
) -> Result<(), QuantityError> {
    for (name, quantity) in other {
        let candidate = ParsedQuantity::parse(quantity)?;
        let keep_existing = match total.get(name) {
            Some(existing) => {
                ParsedQuantity::parse(existing)?.millis() >= candidate.millis()
            }
            None => false,
        };
        if !keep_existing {
            total.insert(name.clone(), candidate.to_quantity());
        }
    }
    Ok(())
}

/// Multiplies every entry of `list` by `factor`.
pub fn scale_resource_list(
    list: &ResourceList,
    factor: i64,
) -> Result<ResourceList, QuantityError> {
    list.iter()
        .map(|(name, quantity)| {
            let scaled = ParsedQuantity::parse(quantity)?.checked_mul(factor)?;
            Ok((name.clone(), scaled.to_quantity()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn q(value: &str) -> Quantity {
        Quantity(value.to_string())
    }

    fn millis(value: &str) -> i128 {
        value.parse::<ParsedQuantity>().unwrap().millis()
    }

    #[test]
    fn parses_decimal_binary_and_exponent_forms() {
        assert_eq!(millis("2"), 2_000);
        assert_eq!(millis("500m"), 500);
        assert_eq!(millis("1.5"), 1_500);
        assert_eq!(millis("1k"), 1_000_000);
        assert_eq!(millis("1Ki"), 1_024_000);
        assert_eq!(millis("1e3"), 1_000_000);
        assert_eq!(millis("-250m"), -250);
    }

    #[test]
    fn sub_milli_amounts_round_up() {
        assert_eq!(millis("1n"), 1);
        assert_eq!(millis("1500u"), 2);
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "abc", "1Zi", "1.2.3", "m"] {
            assert!(
                raw.parse::<ParsedQuantity>().is_err(),
                "{raw} should not parse"
            );
        }
    }

    #[test]
    fn formats_back_to_canonical_strings() {
        let sum = "500m"
            .parse::<ParsedQuantity>()
            .unwrap()
            .checked_add("1".parse().unwrap())
            .unwrap();
        assert_eq!(sum.to_string(), "1500m");

        let doubled = "1Gi"
            .parse::<ParsedQuantity>()
            .unwrap()
            .checked_mul(2)
            .unwrap();
        assert_eq!(doubled.to_string(), "2Gi");

        let odd = "1536Mi".parse::<ParsedQuantity>().unwrap();
        assert_eq!(odd.to_string(), "1536Mi");
    }

    #[test]
    fn resource_list_helpers_aggregate_per_name() {
        let pod = ResourceList::from([
            ("cpu".to_string(), q("500m")),
            ("memory".to_string(), q("1Gi")),
        ]);
        let mut total = scale_resource_list(&pod, 2).unwrap();
        assert_eq!(
            total,
            ResourceList::from([
                ("cpu".to_string(), q("1")),
                ("memory".to_string(), q("2Gi")),
            ])
        );

        let gpus = ResourceList::from([("nvidia.com/gpu".to_string(), q("4"))]);
        add_resource_list(&mut total, &gpus).unwrap();
        assert_eq!(total.get("nvidia.com/gpu"), Some(&q("4")));

        let floor = ResourceList::from([
            ("cpu".to_string(), q("250m")),
            ("memory".to_string(), q("4Gi")),
        ]);
        max_resource_list(&mut total, &floor).unwrap();
        assert_eq!(total.get("cpu"), Some(&q("1")));
        assert_eq!(total.get("memory"), Some(&q("4Gi")));
    }
}
