//! Indian-style price formatting (crore / lakh).

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

/// Shown when a listing has no usable price
pub const PRICE_ON_REQUEST: &str = "Price On Request";

/// Format a price in rupees.
///
/// - `>= 1 crore` → `₹1.25 Cr`
/// - `>= 1 lakh` → `₹7.50 L`
/// - otherwise `₹45,000` with en-IN digit grouping
/// - zero, negative, NaN or absent → `Price On Request`
pub fn format_price(price: Option<f64>) -> String {
    let amount = match price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        _ => return PRICE_ON_REQUEST.to_string(),
    };

    if amount >= CRORE {
        format!("₹{} Cr", fixed_2(amount / CRORE))
    } else if amount >= LAKH {
        format!("₹{} L", fixed_2(amount / LAKH))
    } else {
        format!("₹{}", group_en_in(amount))
    }
}

/// Format a price given as text (the backend serializes decimals as strings)
pub fn format_price_str(price: &str) -> String {
    format_price(parse_price(price))
}

/// Parse a numeric price, accepting surrounding whitespace and thousands separators.
pub fn parse_price(price: &str) -> Option<f64> {
    let cleaned: String = price.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Two decimals, ties rounded up.
///
/// `{:.2}` rounds ties to even, so the digits are taken from the exact
/// decimal expansion instead. Every finite `f64` at or above 1 has at most
/// 52 fraction digits.
fn fixed_2(value: f64) -> String {
    let exact = format!("{value:.60}");
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((&exact, ""));
    let digit = |i: usize| {
        frac_part
            .as_bytes()
            .get(i)
            .map_or(0, |b| u64::from(b.saturating_sub(b'0')))
    };

    let mut cents = int_part
        .parse::<u64>()
        .unwrap_or(0)
        .saturating_mul(100)
        .saturating_add(digit(0) * 10 + digit(1));
    if digit(2) >= 5 {
        cents = cents.saturating_add(1);
    }
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// en-IN grouping: last three integer digits, then groups of two.
/// Up to three fraction digits are kept, trailing zeros dropped.
fn group_en_in(amount: f64) -> String {
    let rounded = (amount * 1000.0).round() / 1000.0;
    let text = format!("{rounded:.3}");
    let (int_part, frac_part) = text.split_once('.').unwrap_or((&text, ""));
    let frac = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    let len = digits.len();
    for (i, c) in digits.iter().enumerate() {
        let remaining = len - i;
        if i > 0 && (remaining == 3 || (remaining > 3 && (remaining - 3) % 2 == 0)) {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    }
}
