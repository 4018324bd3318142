//! Tag classification: decides which place rows an OSM object yields.
//!
//! The classifier is a pure function over the object's tags. It sorts
//! every tag into names, place classifications, extra tags and address
//! attributes, then applies a series of fallbacks for objects that
//! carry address or building information without a class of their own.

use crate::models::{Classification, PrimitiveKind, TagMap, ADMINLEVEL_NONE};

/// Keys whose values are names, searchable as-is.
const NAME_KEYS: &[&str] = &[
    "ref",
    "int_ref",
    "nat_ref",
    "reg_ref",
    "loc_ref",
    "old_ref",
    "ncn_ref",
    "rcn_ref",
    "lcn_ref",
    "iata",
    "icao",
    "pcode:1",
    "pcode:2",
    "pcode:3",
    "un:pcode:1",
    "un:pcode:2",
    "un:pcode:3",
    "name",
    "int_name",
    "nat_name",
    "reg_name",
    "loc_name",
    "old_name",
    "alt_name",
    "official_name",
    "commonname",
    "common_name",
    "place_name",
    "short_name",
    "operator",
];

/// Language-suffixed name families.
const NAME_PREFIXES: &[&str] = &[
    "name:",
    "int_name:",
    "nat_name:",
    "reg_name:",
    "loc_name:",
    "old_name:",
    "alt_name_",
    "alt_name:",
    "official_name:",
    "commonname:",
    "common_name:",
    "place_name:",
    "short_name:",
];

/// Class keys where both `yes` and `no` are meaningless.
const YESNO_CLASS_KEYS: &[&str] = &["emergency", "tourism", "historic", "military", "natural"];

/// Class keys where only `no` is rejected.
const SIMPLE_CLASS_KEYS: &[&str] = &[
    "aerialway", "aeroway", "amenity", "boundary", "bridge", "craft", "leisure", "office",
    "railway", "shop", "tunnel",
];

/// Highway values that never make a place.
const HIGHWAY_REJECTS: &[&str] = &[
    "no",
    "turning_circle",
    "traffic_signals",
    "mini_roundabout",
    "noexit",
    "crossing",
];

const POSTCODE_KEYS: &[&str] = &[
    "postal_code",
    "post_code",
    "postcode",
    "addr:postcode",
    "tiger:zip_left",
    "tiger:zip_right",
];

const COUNTRY_CODE_KEYS: &[&str] = &[
    "country_code_iso3166_1_alpha_2",
    "country_code_iso3166_1",
    "country_code_iso3166",
    "country_code",
    "iso3166-1:alpha2",
    "iso3166-1",
    "ISO3166-1",
    "iso3166",
    "is_in:country_code",
    "addr:country",
    "addr:country_code",
];

/// Keys preserved verbatim in the extratags column. The list mirrors
/// the upstream tag inventory, including its duplicate `disused` entry
/// and the `bicyle` spelling (`bicycle` is not collected).
const EXTRA_KEYS: &[&str] = &[
    "tracktype",
    "traffic_calming",
    "service",
    "cuisine",
    "capital",
    "dispensing",
    "religion",
    "denomination",
    "sport",
    "internet_access",
    "lanes",
    "surface",
    "smoothness",
    "width",
    "est_width",
    "incline",
    "opening_hours",
    "food_hours",
    "collection_times",
    "service_times",
    "smoking_hours",
    "disused",
    "wheelchair",
    "sac_scale",
    "trail_visibility",
    "mtb:scale",
    "mtb:description",
    "wood",
    "drive_thru",
    "drive_in",
    "access",
    "vehicle",
    "bicyle",
    "foot",
    "goods",
    "hgv",
    "motor_vehicle",
    "motor_car",
    "oneway",
    "date_on",
    "date_off",
    "day_on",
    "day_off",
    "hour_on",
    "hour_off",
    "maxweight",
    "maxheight",
    "maxspeed",
    "disused",
    "toll",
    "charge",
    "population",
    "description",
    "image",
    "attribution",
    "fax",
    "email",
    "url",
    "website",
    "phone",
    "tel",
    "real_ale",
    "smoking",
    "food",
    "camera",
    "brewery",
    "locality",
    "wikipedia",
];

const EXTRA_PREFIXES: &[&str] = &["access:", "contact:", "drink:", "wikipedia:"];

fn is_name_key(key: &str) -> bool {
    NAME_KEYS.contains(&key) || NAME_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn is_extra_key(key: &str) -> bool {
    EXTRA_KEYS.contains(&key) || EXTRA_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn append_isin(isin: &mut Option<String>, value: &str) {
    let joined = isin.get_or_insert_with(String::new);
    joined.push(',');
    joined.push_str(value);
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// Classify an object's tags.
///
/// Never fails: malformed values degrade silently, unknown keys are
/// dropped. Callers decide whether to emit rows based on
/// `Classification::is_place`.
pub fn classify(tags: &TagMap, kind: PrimitiveKind) -> Classification {
    let mut c = Classification {
        kind: Some(kind),
        admin_level: ADMINLEVEL_NONE,
        ..Default::default()
    };

    let mut placehouse = false;
    let mut placebuilding = false;
    let mut placeadmin = false;
    let mut landuse: Option<(String, String)> = None;
    let mut place: Option<(String, String)> = None;
    let mut conscription: Option<String> = None;
    let mut streetnumber: Option<String> = None;

    for (key, value) in tags.iter() {
        if is_name_key(key) {
            // name:prefix holds a title particle, not a name.
            if key == "name:prefix" {
                c.extratags.push(pair(key, value));
            } else {
                c.names.push(pair(key, value));
            }
        } else if YESNO_CLASS_KEYS.contains(&key) {
            if value != "no" && value != "yes" {
                c.places.push(pair(key, value));
            }
        } else if key == "highway" {
            if !HIGHWAY_REJECTS.contains(&value) {
                c.places.push(pair(key, value));
            }
        } else if SIMPLE_CLASS_KEYS.contains(&key) {
            if value != "no" {
                if key == "boundary" && value == "administrative" {
                    placeadmin = true;
                }
                c.places.push(pair(key, value));
            }
        } else if key == "waterway" && value != "riverbank" {
            c.places.push(pair(key, value));
        } else if key == "place" {
            place = Some(pair(key, value));
        } else if key == "addr:housename" {
            c.names.push(pair(key, value));
            placehouse = true;
        } else if key == "landuse" {
            if value == "cemetery" {
                c.places.push(pair(key, value));
            } else {
                // Held back: only becomes a place if nothing better
                // turns up and the object is named.
                landuse = Some(pair(key, value));
            }
        } else if POSTCODE_KEYS.contains(&key) {
            if c.postcode.is_none() {
                c.postcode = Some(value.to_string());
            }
        } else if key == "addr:street" {
            if c.street.is_none() {
                c.street = Some(value.to_string());
            }
        } else if key == "addr:place" {
            if c.addr_place.is_none() {
                c.addr_place = Some(value.to_string());
            }
        } else if COUNTRY_CODE_KEYS.contains(&key) && value.len() == 2 {
            c.country_code = Some(value.to_string());
        } else if key == "addr:housenumber" {
            // House numbers can be arbitrarily complex; stored as-is.
            if c.housenumber.is_none() {
                c.housenumber = Some(value.to_string());
                placehouse = true;
            }
        } else if key == "addr:conscriptionnumber" {
            if conscription.is_none() {
                conscription = Some(value.to_string());
                placehouse = true;
            }
        } else if key == "addr:streetnumber" {
            if streetnumber.is_none() {
                streetnumber = Some(value.to_string());
                placehouse = true;
            }
        } else if key == "addr:interpolation" {
            if c.housenumber.is_none() {
                c.housenumber = Some(value.to_string());
                c.places.push(pair("place", "houses"));
            }
        } else if key == "tiger:county" {
            // Strip the state suffix and mark the value as a county so
            // it cannot collide with a town of the same name.
            let county = value.split(',').next().unwrap_or(value);
            append_isin(&mut c.isin, &format!("{} county", county));
        } else if key.starts_with("is_in")
            || key == "addr:suburb"
            || key == "addr:county"
            || key == "addr:city"
            || key == "addr:state_code"
            || key == "addr:state"
        {
            append_isin(&mut c.isin, value);
        } else if key == "admin_level" {
            c.admin_level = value.parse().unwrap_or(0);
        } else if is_extra_key(key) {
            c.extratags.push(pair(key, value));
        } else if key == "building" {
            placebuilding = true;
        } else if key == "mountain_pass" {
            c.places.push(pair(key, value));
        }
        // everything else is dropped
    }

    // Czech/Slovak addresses carry a conscription number, a street
    // number, or both; either replaces a plain house number, and both
    // together are compounded so users can search by either.
    match (conscription, streetnumber) {
        (None, None) => {}
        (Some(cn), Some(sn)) => c.housenumber = Some(format!("{}/{}", cn, sn)),
        (Some(n), None) | (None, Some(n)) => c.housenumber = Some(n),
    }

    // An administrative boundary outranks the place tag on the same
    // object; keep the place type as an extra tag in that case.
    if let Some(p) = place {
        if placeadmin {
            c.extratags.push(p);
        } else {
            c.places.push(p);
        }
    }

    if placehouse && c.places.is_empty() {
        c.places.push(pair("place", "house"));
    }

    // Fallback place types, only used when nothing more specific
    // was found.
    if placebuilding
        && c.places.is_empty()
        && (!c.names.is_empty() || c.housenumber.is_some() || c.postcode.is_some())
    {
        c.places.push(pair("building", "yes"));
    }

    if let Some(lu) = landuse {
        if c.places.is_empty() && !c.names.is_empty() {
            c.places.push(lu);
        }
    }

    if c.postcode.is_some() && c.places.is_empty() {
        c.places.push(pair("place", "postcode"));
    }

    c
}
