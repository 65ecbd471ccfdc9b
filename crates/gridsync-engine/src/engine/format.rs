use super::Dynamic;

/// Significant decimals kept when a computed number is shown.
const DISPLAY_DECIMALS: usize = 6;

/// Render a computed value the way every peer must show it.
pub fn format_dynamic(value: &Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if let Ok(n) = value.as_float() {
        return format_number(n);
    }
    if let Ok(n) = value.as_int() {
        return n.to_string();
    }
    if let Ok(b) = value.as_bool() {
        return if b { "TRUE" } else { "FALSE" }.to_string();
    }
    if value.is_array() {
        let items = value.clone().into_array().unwrap_or_default();
        return items
            .iter()
            .map(format_dynamic)
            .collect::<Vec<_>>()
            .join(", ");
    }
    match value.clone().into_string() {
        Ok(s) => s,
        Err(_) => format!("{:?}", value),
    }
}

/// Format a number without trailing zeros (`2.50` -> `2.5`, `3.0` -> `3`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "#NAN!".to_string();
    }
    if n.is_infinite() {
        return "#INF!".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{:.0}", n);
    }
    let fixed = format!("{:.*}", DISPLAY_DECIMALS, n);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_trims_trailing_zeros() {
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(f64::NAN), "#NAN!");
    }

    #[test]
    fn test_format_dynamic_scalars() {
        assert_eq!(format_dynamic(&Dynamic::UNIT), "");
        assert_eq!(format_dynamic(&Dynamic::from(7_i64)), "7");
        assert_eq!(format_dynamic(&Dynamic::from(true)), "TRUE");
        assert_eq!(format_dynamic(&Dynamic::from("hi".to_string())), "hi");
    }
}
