// Floored remainder: the result takes the sign of the divisor.
fn floored_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Euclid's algorithm over the raw amounts.
pub fn gcd(mut a: f64, mut b: f64) -> f64 {
    while b != 0.0 {
        let r = floored_rem(a, b);
        a = b;
        b = r;
    }
    a
}

/// Budget and revenue reduced by their gcd, as `"budget:revenue"`.
///
/// `None` when either side is missing or zero.
pub fn string_ratio(budget: Option<f64>, revenue: Option<f64>) -> Option<String> {
    let (a, b) = (budget?, revenue?);
    if a == 0.0 || b == 0.0 || !a.is_finite() || !b.is_finite() {
        return None;
    }
    let divisor = gcd(a, b);
    // Truncated like an integer cast, but without the i64 ceiling.
    Some(format!(
        "{:.0}:{:.0}",
        (a / divisor).trunc(),
        (b / divisor).trunc()
    ))
}

/// `budget / revenue`, null when either side is missing or revenue is zero.
pub fn float_ratio(budget: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    let (a, b) = (budget?, revenue?);
    if b == 0.0 {
        return None;
    }
    Some(a / b)
}
