use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::DomainError;

const SUFFIXES: [&str; 15] = [
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P", "E",
];

/// Validates a non-negative resource quantity (`10Gi`, `500m`, `1.5`, `1e3`).
pub fn parse_quantity(field: &'static str, raw: &str) -> Result<Quantity, DomainError> {
    let value = raw.trim();
    if is_quantity(value) {
        Ok(Quantity(value.to_string()))
    } else {
        Err(DomainError::InvalidQuantity {
            field,
            value: raw.to_string(),
        })
    }
}

fn is_quantity(value: &str) -> bool {
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    is_number(number) && is_suffix(suffix)
}

fn is_number(number: &str) -> bool {
    number.chars().any(|c| c.is_ascii_digit()) && number.matches('.').count() <= 1
}

fn is_suffix(suffix: &str) -> bool {
    if suffix.is_empty() || SUFFIXES.contains(&suffix) {
        return true;
    }
    match suffix.strip_prefix(['e', 'E']) {
        Some(exponent) => {
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
