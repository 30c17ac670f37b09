//! Measurement units and conversion to base units.
//!
//! Every `Measure` type names a base unit (`ms`, `m`, `C`, …); concrete values
//! may be written in any unit of the same dimension and are normalized to the
//! base unit at compile boundaries so the IR only ever carries base amounts.

/// Multiplier tables per dimension: `(unit, base unit, factor)` with
/// `base_amount = amount * factor`. Temperature is handled separately because
/// Fahrenheit is affine, not linear.
const UNITS: &[(&str, &str, f64)] = &[
    // time, base ms
    ("ms", "ms", 1.0),
    ("s", "ms", 1000.0),
    ("min", "ms", 60_000.0),
    ("h", "ms", 3_600_000.0),
    ("day", "ms", 86_400_000.0),
    ("week", "ms", 604_800_000.0),
    ("mon", "ms", 2_592_000_000.0),
    ("year", "ms", 31_536_000_000.0),
    // length, base m
    ("m", "m", 1.0),
    ("mm", "m", 0.001),
    ("cm", "m", 0.01),
    ("km", "m", 1000.0),
    ("in", "m", 0.0254),
    ("ft", "m", 0.3048),
    ("mi", "m", 1609.344),
    // speed, base mps
    ("mps", "mps", 1.0),
    ("kmph", "mps", 0.277_777_78),
    ("mph", "mps", 0.447_04),
    // mass, base kg
    ("kg", "kg", 1.0),
    ("g", "kg", 0.001),
    ("lb", "kg", 0.453_592_37),
    ("oz", "kg", 0.028_349_523),
    // pressure, base Pa
    ("Pa", "Pa", 1.0),
    ("bar", "Pa", 100_000.0),
    ("psi", "Pa", 6894.757_3),
    ("mmHg", "Pa", 133.322_39),
    // energy, base kcal
    ("kcal", "kcal", 1.0),
    ("kJ", "kcal", 0.239_005_74),
    // file size, base byte (KB is decimal, KiB binary)
    ("byte", "byte", 1.0),
    ("KB", "byte", 1000.0),
    ("KiB", "byte", 1024.0),
    ("MB", "byte", 1e6),
    ("MiB", "byte", 1_048_576.0),
    ("GB", "byte", 1e9),
    ("GiB", "byte", 1_073_741_824.0),
    ("TB", "byte", 1e12),
    ("TiB", "byte", 1_099_511_627_776.0),
];

const TEMPERATURE: &[&str] = &["C", "F", "K"];

/// Maps a unit spelling to the base unit of its dimension.
///
/// `defaultTemperature` is the locale-dependent temperature hole used by some
/// surface forms; it normalizes to Celsius. Returns `None` for unknown units.
pub fn normalize_unit(unit: &str) -> Option<&'static str> {
    if unit == "defaultTemperature" {
        return Some("C");
    }
    if TEMPERATURE.contains(&unit) {
        return Some("C");
    }
    UNITS.iter().find(|(u, _, _)| *u == unit).map(|(_, base, _)| *base)
}

/// True if `unit` is the base unit of its dimension.
pub fn is_base_unit(unit: &str) -> bool {
    normalize_unit(unit) == Some(unit)
}

/// Converts `amount` expressed in `unit` to the base unit of its dimension.
///
/// Returns `None` for unknown units.
pub fn to_base_unit(amount: f64, unit: &str) -> Option<f64> {
    match unit {
        "C" | "defaultTemperature" => Some(amount),
        "F" => Some((amount - 32.0) * 5.0 / 9.0),
        "K" => Some(amount - 273.15),
        _ => UNITS
            .iter()
            .find(|(u, _, _)| *u == unit)
            .map(|(_, _, factor)| amount * factor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_dimension_base() {
        assert_eq!(normalize_unit("min"), Some("ms"));
        assert_eq!(normalize_unit("km"), Some("m"));
        assert_eq!(normalize_unit("F"), Some("C"));
        assert_eq!(normalize_unit("defaultTemperature"), Some("C"));
        assert_eq!(normalize_unit("parsec"), None);
    }

    #[test]
    fn converts_linear_units() {
        assert_eq!(to_base_unit(2.0, "min"), Some(120_000.0));
        assert_eq!(to_base_unit(1.0, "KiB"), Some(1024.0));
        assert_eq!(to_base_unit(5.0, "ms"), Some(5.0));
    }

    #[test]
    fn converts_temperature_affinely() {
        assert_eq!(to_base_unit(32.0, "F"), Some(0.0));
        assert_eq!(to_base_unit(273.15, "K"), Some(0.0));
        assert_eq!(to_base_unit(21.5, "C"), Some(21.5));
    }
}
