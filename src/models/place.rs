//! Place row and classification types.

use crate::db::escape::{escape_copy, hstore_body};

/// admin_level sentinel stored when the tag is absent.
pub const ADMINLEVEL_NONE: i32 = 100;

/// Type of OSM object, as stored in the `osm_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    /// Single-character form used by the `place` table and its queries.
    pub fn as_char(self) -> char {
        match self {
            OsmType::Node => 'N',
            OsmType::Way => 'W',
            OsmType::Relation => 'R',
        }
    }
}

impl std::fmt::Display for OsmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Shape of the primitive handed to the classifier.
///
/// Relations only reach the classifier once their `type` tag has been
/// vetted, hence the area-only variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Node,
    Way,
    AreaRelation,
}

/// A relation member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub osm_type: OsmType,
    pub id: i64,
}

/// Output of the tag classifier.
///
/// `places` drives row emission: one row per `(class, type)` pair.
/// Everything else is carried unchanged onto each of those rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub kind: Option<PrimitiveKind>,
    pub names: Vec<(String, String)>,
    pub places: Vec<(String, String)>,
    pub extratags: Vec<(String, String)>,
    pub admin_level: i32,
    pub housenumber: Option<String>,
    pub street: Option<String>,
    pub addr_place: Option<String>,
    /// Comma-prefixed concatenation of hierarchy hints; the leading
    /// comma is stripped when the row is built.
    pub isin: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
}

impl Classification {
    pub fn is_place(&self) -> bool {
        !self.places.is_empty()
    }

    /// Class names, for the class-diff delete.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.places.iter().map(|(class, _)| class.as_str())
    }
}

/// One row of the `place` table, with all text values already escaped
/// for the COPY text format.
#[derive(Debug, Clone)]
pub struct PlaceRow {
    pub osm_type: OsmType,
    pub osm_id: i64,
    pub class: String,
    pub type_name: String,
    pub name: Option<String>,
    pub admin_level: i32,
    pub housenumber: Option<String>,
    pub street: Option<String>,
    pub addr_place: Option<String>,
    pub isin: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
    pub extratags: Option<String>,
    /// Geometry as `SRID=<n>;<WKT>`.
    pub geometry: String,
}

impl PlaceRow {
    /// Assemble a row for one `(class, type)` classification.
    pub fn new(
        osm_type: OsmType,
        osm_id: i64,
        class: &str,
        type_name: &str,
        classification: &Classification,
        geometry: String,
    ) -> Self {
        Self {
            osm_type,
            osm_id,
            class: escape_copy(class),
            type_name: escape_copy(type_name),
            name: hstore_body(&classification.names),
            admin_level: classification.admin_level,
            housenumber: escape_opt(&classification.housenumber),
            street: escape_opt(&classification.street),
            addr_place: escape_opt(&classification.addr_place),
            isin: classification
                .isin
                .as_deref()
                .map(|s| s.strip_prefix(',').unwrap_or(s))
                .filter(|s| !s.is_empty())
                .map(escape_copy),
            postcode: escape_opt(&classification.postcode),
            country_code: escape_opt(&classification.country_code),
            extratags: hstore_body(&classification.extratags),
            geometry,
        }
    }

    /// The COPY text line for this row, newline terminated. Column
    /// order matches the COPY statement issued by the copy buffer.
    pub fn copy_line(&self) -> String {
        let mut line = String::with_capacity(128);
        line.push(self.osm_type.as_char());
        line.push('\t');
        line.push_str(&self.osm_id.to_string());
        line.push('\t');
        line.push_str(&self.class);
        line.push('\t');
        line.push_str(&self.type_name);
        line.push('\t');
        push_field(&mut line, &self.name);
        line.push_str(&self.admin_level.to_string());
        line.push('\t');
        push_field(&mut line, &self.housenumber);
        push_field(&mut line, &self.street);
        push_field(&mut line, &self.addr_place);
        push_field(&mut line, &self.isin);
        push_field(&mut line, &self.postcode);
        push_field(&mut line, &self.country_code);
        push_field(&mut line, &self.extratags);
        line.push_str(&self.geometry);
        line.push('\n');
        line
    }
}

fn escape_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(escape_copy)
}

fn push_field(line: &mut String, value: &Option<String>) {
    match value {
        Some(v) => line.push_str(v),
        None => line.push_str("\\N"),
    }
    line.push('\t');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> Classification {
        Classification {
            names: vec![("name".into(), "Berlin".into())],
            places: vec![("place".into(), "city".into())],
            extratags: vec![("population".into(), "3500000".into())],
            admin_level: ADMINLEVEL_NONE,
            ..Default::default()
        }
    }

    #[test]
    fn test_copy_line_layout() {
        let row = PlaceRow::new(
            OsmType::Node,
            123,
            "place",
            "city",
            &berlin(),
            "SRID=4326;POINT(13.4 52.5)".to_string(),
        );

        assert_eq!(
            row.copy_line(),
            "N\t123\tplace\tcity\t\"name\"=>\"Berlin\"\t100\t\\N\t\\N\t\\N\t\\N\t\\N\t\\N\t\"population\"=>\"3500000\"\tSRID=4326;POINT(13.4 52.5)\n"
        );
    }

    #[test]
    fn test_isin_never_starts_with_comma() {
        let classification = Classification {
            places: vec![("place".into(), "village".into())],
            isin: Some(",Bavaria,Germany".into()),
            admin_level: ADMINLEVEL_NONE,
            ..Default::default()
        };
        let row = PlaceRow::new(
            OsmType::Node,
            1,
            "place",
            "village",
            &classification,
            "SRID=4326;POINT(0 0)".to_string(),
        );

        assert_eq!(row.isin.as_deref(), Some("Bavaria,Germany"));
    }

    #[test]
    fn test_empty_optionals_become_null() {
        let classification = Classification {
            places: vec![("amenity".into(), "pub".into())],
            housenumber: Some(String::new()),
            admin_level: ADMINLEVEL_NONE,
            ..Default::default()
        };
        let row = PlaceRow::new(
            OsmType::Way,
            7,
            "amenity",
            "pub",
            &classification,
            "SRID=4326;POINT(1 1)".to_string(),
        );

        assert!(row.housenumber.is_none());
        assert!(row.name.is_none());
        assert!(row.copy_line().contains("\t\\N\t"));
    }

    #[test]
    fn test_tab_in_value_is_escaped() {
        let classification = Classification {
            places: vec![("highway".into(), "residential".into())],
            street: Some("Main\tStreet".into()),
            admin_level: ADMINLEVEL_NONE,
            ..Default::default()
        };
        let row = PlaceRow::new(
            OsmType::Way,
            9,
            "highway",
            "residential",
            &classification,
            "SRID=4326;LINESTRING(0 0,1 1)".to_string(),
        );

        assert_eq!(row.street.as_deref(), Some("Main\\tStreet"));
        // 13 tabs separate the 14 columns; the escaped tab adds two
        // literal characters, not a separator.
        assert_eq!(row.copy_line().matches('\t').count(), 13);
    }
}
