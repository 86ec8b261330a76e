use rust_decimal::Decimal;

pub fn format_aud(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}

/// Units without trailing zeros
pub fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

pub fn format_pct(rate: Decimal) -> String {
    format!("{}%", (rate * Decimal::ONE_HUNDRED).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats() {
        assert_eq!(format_aud(dec!(1234.5)), "$1234.50");
        assert_eq!(format_aud(dec!(-500)), "-$500.00");
        assert_eq!(format_quantity(dec!(120.000)), "120");
        assert_eq!(format_quantity(dec!(0.25)), "0.25");
        assert_eq!(format_pct(dec!(0.5)), "50%");
        assert_eq!(format_pct(Decimal::ZERO), "0%");
    }
}
