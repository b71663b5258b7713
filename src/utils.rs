use once_cell::sync::Lazy;
use regex::Regex;

/// US zipcode: 5 digits or ZIP+4 / 美国邮编
static ZIPCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid zipcode regex"));

const EARTH_RADIUS_MILES: f64 = 3958.8;
const METERS_PER_MILE: f64 = 1609.344;

/// Check if a search query is a US zipcode
pub fn is_zipcode(query: &str) -> bool {
    ZIPCODE_RE.is_match(query.trim())
}

/// Strip ZIP+4 suffix / 去掉邮编+4后缀
pub fn clean_zipcode(zipcode: &str) -> String {
    zipcode.split('-').next().unwrap_or(zipcode).trim().to_string()
}

/// Lowercase alphanumeric form of a gym name, used to match the same gym across sources
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Great-circle distance in miles
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

/// Convert a radius in miles to whole meters, capped at `max_meters`
pub fn miles_to_meters(miles: f64, max_meters: u32) -> u32 {
    let meters = (miles.max(0.0) * METERS_PER_MILE).round();
    if meters >= max_meters as f64 {
        max_meters
    } else {
        meters as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zipcode() {
        assert!(is_zipcode("78701"));
        assert!(is_zipcode(" 78701-1234 "));
        assert!(!is_zipcode("7870"));
        assert!(!is_zipcode("Austin"));
        assert!(!is_zipcode("78701-12"));
    }

    #[test]
    fn test_clean_zipcode() {
        assert_eq!(clean_zipcode("78701-1234"), "78701");
        assert_eq!(clean_zipcode("78701"), "78701");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Gold's Gym"), "goldsgym");
        assert_eq!(normalize_name("GOLDS  GYM"), "goldsgym");
        assert_eq!(normalize_name("24 Hour Fitness"), "24hourfitness");
    }

    #[test]
    fn test_haversine_miles() {
        assert_eq!(haversine_miles(30.2672, -97.7431, 30.2672, -97.7431), 0.0);
        // Austin to Dallas is roughly 182 miles
        let d = haversine_miles(30.2672, -97.7431, 32.7767, -96.7970);
        assert!((175.0..190.0).contains(&d), "distance was {}", d);
    }

    #[test]
    fn test_miles_to_meters() {
        assert_eq!(miles_to_meters(1.0, 50_000), 1609);
        assert_eq!(miles_to_meters(100.0, 40_000), 40_000);
        assert_eq!(miles_to_meters(-3.0, 40_000), 0);
    }
}
