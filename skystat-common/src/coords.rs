///! Sexagesimal angle formatting.
///!
///! Angles arrive as decimal degrees and are displayed as
///! degrees:minutes:seconds. Site coordinates use a hemisphere letter in
///! place of the sign. All fractional handling truncates; nothing rounds up
///! into the next second.

/// Format a decimal-degree angle as `{sign}DD:MM:SS` with an optional
/// truncated fractional-second suffix of `frac_digits` digits.
///
/// The sign character comes from the original signed angle, so `-0.25`
/// formats as `-00:15:00` even though its degree component is zero. The
/// angle is not normalized modulo 360: `400.0` formats as `+400:00:00`.
pub fn format_sexagesimal(angle_deg: f64, frac_digits: u32) -> String {
    let sign = if angle_deg >= 0.0 { '+' } else { '-' };
    let magnitude = angle_deg.abs();

    let degrees = magnitude.floor();
    let minutes_cont = (magnitude - degrees) * 60.0;
    let minutes = minutes_cont.floor();
    let seconds_cont = (minutes_cont - minutes) * 60.0;
    let seconds = seconds_cont.floor();

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        sign, degrees as i64, minutes as u8, seconds as u8
    );
    if frac_digits > 0 {
        let scale = 10f64.powi(frac_digits as i32);
        let frac_units = ((seconds_cont - seconds) * scale).floor() as u64;
        out.push('.');
        out.push_str(&format!("{frac_units:0width$}", width = frac_digits as usize));
    }
    out
}

/// Format a site longitude with an `E`/`W` hemisphere letter,
/// e.g. `W122:30:00`.
pub fn format_longitude(deg: f64) -> String {
    hemisphere(deg, 'E', 'W')
}

/// Format a site latitude with an `N`/`S` hemisphere letter,
/// e.g. `N37:15:00`.
pub fn format_latitude(deg: f64) -> String {
    hemisphere(deg, 'N', 'S')
}

fn hemisphere(deg: f64, positive: char, negative: char) -> String {
    let letter = if deg >= 0.0 { positive } else { negative };
    let body = format_sexagesimal(deg.abs(), 0);
    // The magnitude always formats with a leading '+'; swap it for the letter.
    format!("{}{}", letter, &body[1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Recompose a `{sign}DD:MM:SS` string back into decimal degrees.
    fn recompose(formatted: &str) -> f64 {
        let (sign, rest) = formatted.split_at(1);
        let parts: Vec<f64> = rest.split(':').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 3);
        let magnitude = parts[0] + parts[1] / 60.0 + parts[2] / 3600.0;
        if sign == "-" { -magnitude } else { magnitude }
    }

    #[test]
    fn test_hemisphere_reference_values() {
        assert_eq!(format_longitude(-122.5), "W122:30:00");
        assert_eq!(format_longitude(122.5), "E122:30:00");
        assert_eq!(format_latitude(37.25), "N37:15:00");
        assert_eq!(format_latitude(-37.25), "S37:15:00");
        assert_eq!(format_longitude(0.0), "E00:00:00");
    }

    #[test]
    fn test_sign_comes_from_original_angle() {
        assert_eq!(format_sexagesimal(-0.25, 0), "-00:15:00");
        assert_eq!(format_sexagesimal(0.25, 0), "+00:15:00");
        assert_eq!(format_sexagesimal(0.0, 0), "+00:00:00");
    }

    #[test]
    fn test_no_modulo_normalization() {
        assert_eq!(format_sexagesimal(400.0, 0), "+400:00:00");
        assert_eq!(format_sexagesimal(-400.0, 0), "-400:00:00");
    }

    #[test]
    fn test_fractional_seconds_truncate() {
        // 2^-10 degrees is exactly 3.515625 arcseconds, dyadic so the
        // decomposition is exact in f64.
        let angle = 1.0 / 1024.0;
        assert_eq!(format_sexagesimal(angle, 0), "+00:00:03");
        assert_eq!(format_sexagesimal(angle, 1), "+00:00:03.5");
        assert_eq!(format_sexagesimal(angle, 3), "+00:00:03.515");
        assert_eq!(format_sexagesimal(0.5, 2), "+00:30:00.00");
    }

    #[test]
    fn test_recomposition_within_one_arcsecond() {
        let arcsec = 1.0 / 3600.0;
        let mut angle = -90.0;
        while angle <= 90.0 {
            let formatted = format_sexagesimal(angle, 0);
            let back = recompose(&formatted);
            assert!(
                (back - angle).abs() <= arcsec,
                "{angle} -> {formatted} -> {back}"
            );
            angle += 0.37;
        }

        let mut lon = -180.0;
        while lon <= 180.0 {
            let formatted = format_sexagesimal(lon, 0);
            let back = recompose(&formatted);
            assert!((back - lon).abs() <= arcsec, "{lon} -> {formatted} -> {back}");
            lon += 1.013;
        }
    }
}
