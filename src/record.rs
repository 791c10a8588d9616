//! Typed geographical records projected from decoded lookup values.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::GeoIpError;
use crate::value::Value;

/// Keys checked, in order, for a place code.
const CODE_KEYS: [&str; 2] = ["iso_code", "code"];

/// A name with multiple localized forms, keyed by language tag.
///
/// The `"en"` entry is the default display form.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Name(BTreeMap<String, String>);

impl Name {
    /// Returns the name in the given language, if that translation exists.
    pub fn localized(&self, lang: &str) -> Option<&str> {
        self.0.get(lang).map(String::as_str)
    }

    /// The language tags this name is localized in.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns true if no translation is available.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.localized("en").unwrap_or_default())
    }
}

/// A place with a code, a geonames identifier and a localized name.
///
/// For continents the code is one of AF, AS, EU, OC, NA and SA; for
/// countries it is the ISO 3166-1 two-letter code. The geoname ID refers to
/// the geonames.org database; both may be absent (empty / zero).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Place {
    /// The place code.
    pub code: String,
    /// The place's ID in the geonames database.
    pub geoname_id: u32,
    /// The localized place name.
    pub name: Name,
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// The geographical information associated with a looked-up IP address.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Continent where the address is located.
    pub continent: Option<Place>,
    /// Country where the address is located.
    pub country: Option<Place>,
    /// Country where the ISP registered the address. May differ from
    /// `country`.
    pub registered_country: Option<Place>,
    /// Present only when the address belongs to an entity representing a
    /// country, such as an embassy or a military base.
    pub represented_country: Option<Place>,
    /// City where the address is located.
    pub city: Option<Place>,
    /// Country subdivisions, arranged from largest to smallest.
    pub subdivisions: Vec<Place>,
    /// Latitude of the location. Latitude and longitude both zero means
    /// the coordinates are unknown.
    pub latitude: f64,
    /// Longitude of the location.
    pub longitude: f64,
    /// US metro code, where available.
    pub metro_code: u16,
    /// Postal code, where available.
    pub postal_code: String,
    /// Time zone in IANA format (e.g. America/New_York).
    pub time_zone: String,
    /// True if the address belongs to an anonymous proxy.
    pub is_anonymous_proxy: bool,
    /// True if the address is in a block managed by a satellite ISP serving
    /// multiple countries.
    pub is_satellite_provider: bool,
}

impl Record {
    /// Shorthand for the country's code, or "" when the country is unknown.
    pub fn country_code(&self) -> &str {
        self.country.as_ref().map_or("", |c| c.code.as_str())
    }

    /// Projects a decoded top-level lookup value into a record.
    ///
    /// Missing optional fields produce defaults; a top-level value that is
    /// not a map is an error.
    pub(crate) fn from_value(value: &Value) -> Result<Record, GeoIpError> {
        let m = value.as_map().ok_or_else(|| {
            GeoIpError::decode(format!(
                "invalid record shape: expected a map, got {}",
                value.type_name()
            ))
        })?;

        let mut record = Record {
            continent: place_at(m, "continent"),
            country: place_at(m, "country"),
            registered_country: place_at(m, "registered_country"),
            represented_country: place_at(m, "represented_country"),
            city: place_at(m, "city"),
            ..Record::default()
        };

        if let Some(subdivisions) = m.get("subdivisions").and_then(Value::as_array) {
            record.subdivisions = subdivisions.iter().filter_map(place_from).collect();
        }
        if let Some(location) = m.get("location").and_then(Value::as_map) {
            record.latitude = location
                .get("latitude")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            record.longitude = location
                .get("longitude")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            record.metro_code = location
                .get("metro_code")
                .and_then(Value::as_u16)
                .unwrap_or(0);
            record.time_zone = location
                .get("time_zone")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();
        }
        if let Some(postal) = m.get("postal").and_then(Value::as_map) {
            record.postal_code = postal
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();
        }
        if let Some(traits) = m.get("traits").and_then(Value::as_map) {
            record.is_anonymous_proxy = traits
                .get("is_anonymous_proxy")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            record.is_satellite_provider = traits
                .get("is_satellite_provider")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }

        Ok(record)
    }
}

fn place_at(map: &BTreeMap<String, Value>, key: &str) -> Option<Place> {
    place_from(map.get(key)?)
}

fn place_from(value: &Value) -> Option<Place> {
    let m = value.as_map()?;
    let code = CODE_KEYS
        .iter()
        .find_map(|k| m.get(*k).and_then(Value::as_str))
        .unwrap_or("")
        .to_owned();
    let mut name = BTreeMap::new();
    if let Some(names) = m.get("names").and_then(Value::as_map) {
        for (lang, v) in names {
            if let Some(s) = v.as_str() {
                name.insert(lang.clone(), s.to_owned());
            }
        }
    }
    Some(Place {
        code,
        geoname_id: m.get("geoname_id").and_then(Value::as_u32).unwrap_or(0),
        name: Name(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Value {
        Value::String(s.to_owned())
    }

    fn names(entries: &[(&str, &str)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(lang, name)| ((*lang).to_owned(), string(name)))
                .collect(),
        )
    }

    fn city_map() -> Value {
        Value::Map(BTreeMap::from([
            (
                "city".to_owned(),
                Value::Map(BTreeMap::from([
                    ("geoname_id".to_owned(), Value::Uint32(2_694_762)),
                    (
                        "names".to_owned(),
                        names(&[("en", "Linköping"), ("de", "Linköping")]),
                    ),
                ])),
            ),
            (
                "continent".to_owned(),
                Value::Map(BTreeMap::from([
                    ("code".to_owned(), string("EU")),
                    ("geoname_id".to_owned(), Value::Uint32(6_255_148)),
                    ("names".to_owned(), names(&[("en", "Europe")])),
                ])),
            ),
            (
                "country".to_owned(),
                Value::Map(BTreeMap::from([
                    ("geoname_id".to_owned(), Value::Uint32(2_661_886)),
                    ("iso_code".to_owned(), string("SE")),
                    ("names".to_owned(), names(&[("en", "Sweden")])),
                ])),
            ),
            (
                "location".to_owned(),
                Value::Map(BTreeMap::from([
                    ("latitude".to_owned(), Value::Double(58.4167)),
                    ("longitude".to_owned(), Value::Double(15.6167)),
                    ("metro_code".to_owned(), Value::Uint16(519)),
                    ("time_zone".to_owned(), string("Europe/Stockholm")),
                ])),
            ),
            (
                "postal".to_owned(),
                Value::Map(BTreeMap::from([("code".to_owned(), string("589 41"))])),
            ),
            (
                "subdivisions".to_owned(),
                Value::Array(vec![
                    Value::Map(BTreeMap::from([
                        ("iso_code".to_owned(), string("E")),
                        ("names".to_owned(), names(&[("en", "Östergötland County")])),
                    ])),
                    Value::Map(BTreeMap::from([
                        ("iso_code".to_owned(), string("X")),
                        ("names".to_owned(), names(&[("en", "Inner District")])),
                    ])),
                ]),
            ),
            (
                "traits".to_owned(),
                Value::Map(BTreeMap::from([(
                    "is_satellite_provider".to_owned(),
                    Value::Bool(true),
                )])),
            ),
        ]))
    }

    #[test]
    fn test_projection() {
        let record = Record::from_value(&city_map()).unwrap();

        let country = record.country.as_ref().unwrap();
        assert_eq!(country.code, "SE");
        assert_eq!(country.geoname_id, 2_661_886);
        assert_eq!(country.name.localized("en"), Some("Sweden"));
        assert_eq!(record.country_code(), "SE");

        let continent = record.continent.as_ref().unwrap();
        assert_eq!(continent.code, "EU");
        assert_eq!(continent.to_string(), "Europe");

        let city = record.city.as_ref().unwrap();
        assert_eq!(city.name.to_string(), "Linköping");
        assert_eq!(city.code, "");

        // Outermost subdivision first
        assert_eq!(record.subdivisions.len(), 2);
        assert_eq!(record.subdivisions[0].code, "E");
        assert_eq!(record.subdivisions[1].code, "X");

        assert_eq!(record.latitude, 58.4167);
        assert_eq!(record.longitude, 15.6167);
        assert_eq!(record.metro_code, 519);
        assert_eq!(record.time_zone, "Europe/Stockholm");
        assert_eq!(record.postal_code, "589 41");
        assert!(!record.is_anonymous_proxy);
        assert!(record.is_satellite_provider);
    }

    #[test]
    fn test_missing_fields_default() {
        let record = Record::from_value(&Value::Map(BTreeMap::new())).unwrap();
        assert_eq!(record, Record::default());
        assert_eq!(record.country_code(), "");
        assert_eq!(record.latitude, 0.0);
        assert!(record.subdivisions.is_empty());
    }

    #[test]
    fn test_non_map_values_are_skipped() {
        let value = Value::Map(BTreeMap::from([
            ("country".to_owned(), string("not a map")),
            (
                "subdivisions".to_owned(),
                Value::Array(vec![string("not a map"), city_map()]),
            ),
        ]));
        let record = Record::from_value(&value).unwrap();
        assert!(record.country.is_none());
        // Non-map subdivision entries are dropped, valid ones kept.
        assert_eq!(record.subdivisions.len(), 1);
    }

    #[test]
    fn test_invalid_record_shape() {
        let err = Record::from_value(&Value::Array(vec![])).unwrap_err();
        assert!(
            err.to_string().contains("invalid record shape"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_name_display_without_english() {
        let mut name = BTreeMap::new();
        name.insert("fr".to_owned(), "Paris".to_owned());
        let name = Name(name);
        assert_eq!(name.to_string(), "");
        assert_eq!(name.localized("fr"), Some("Paris"));
        assert_eq!(name.languages().collect::<Vec<_>>(), vec!["fr"]);
    }
}
