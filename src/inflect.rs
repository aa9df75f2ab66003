//! Key-casing conversions between the wire and the programmatic surface.
//!
//! The Ed-Fi ODS API speaks camelCase (and occasionally PascalCase) on the
//! wire. Incoming payload keys are normalized to lower_snake once, at
//! `Response` construction, so field access uses one predictable convention.
//! Outgoing query and payload keys take the inverse trip, lower_snake →
//! lowerCamel, before transmission.

/// Converts a PascalCase/camelCase key to lower_snake.
///
/// Acronym runs keep a single boundary: `ODSVersion` becomes `ods_version`,
/// not `o_d_s_version`. Keys that already contain underscores normalize
/// cleanly (`Some_Field` → `some_field`) without doubling separators.
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1);

            let after_lower = prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            let acronym_end =
                prev.is_some_and(|p| p.is_uppercase()) && next.is_some_and(|n| n.is_lowercase());

            if (after_lower || acronym_end) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Converts a lower_snake key to lowerCamel for the wire.
///
/// The first segment keeps its leading lowercase; every later segment is
/// capitalized. Consecutive or trailing underscores collapse.
pub fn to_lower_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut first = true;

    for segment in key.split('_').filter(|s| !s.is_empty()) {
        if first {
            out.push_str(segment);
            first = false;
        } else {
            let mut cs = segment.chars();
            if let Some(head) = cs.next() {
                out.extend(head.to_uppercase());
                out.push_str(cs.as_str());
            }
        }
    }

    out
}

/// Deep-converts every object key in a JSON value to lowerCamel.
///
/// Used on outbound query and payload mappings just before transmission.
/// Array elements are transformed recursively; scalars pass through.
pub fn camelize_keys(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_lower_camel(k), camelize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(camelize_keys).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_handles_pascal_case() {
        assert_eq!(to_snake_case("SomeField"), "some_field");
        assert_eq!(to_snake_case("NestedThing"), "nested_thing");
    }

    #[test]
    fn snake_case_handles_camel_case() {
        assert_eq!(to_snake_case("studentUniqueId"), "student_unique_id");
        assert_eq!(to_snake_case("schoolReference"), "school_reference");
    }

    #[test]
    fn snake_case_does_not_double_existing_underscores() {
        assert_eq!(to_snake_case("Some_Field"), "some_field");
        assert_eq!(to_snake_case("Inner_Value"), "inner_value");
    }

    #[test]
    fn snake_case_keeps_acronym_runs_together() {
        assert_eq!(to_snake_case("ODSVersion"), "ods_version");
        assert_eq!(to_snake_case("linkHREF"), "link_href");
    }

    #[test]
    fn snake_case_splits_after_digits() {
        assert_eq!(to_snake_case("grade9Entry"), "grade9_entry");
    }

    #[test]
    fn snake_case_leaves_normalized_keys_alone() {
        // Normalization is applied once at construction; a second pass over
        // an already-normalized key must be the identity.
        assert_eq!(to_snake_case("some_field"), "some_field");
        assert_eq!(to_snake_case("href"), "href");
    }

    #[test]
    fn lower_camel_round_trips_snake_keys() {
        assert_eq!(to_lower_camel("student_unique_id"), "studentUniqueId");
        assert_eq!(to_lower_camel("school_year"), "schoolYear");
        assert_eq!(to_lower_camel("offset"), "offset");
    }

    #[test]
    fn lower_camel_collapses_stray_underscores() {
        assert_eq!(to_lower_camel("some__field"), "someField");
        assert_eq!(to_lower_camel("trailing_"), "trailing");
    }

    #[test]
    fn camelize_keys_transforms_deeply() {
        let value = serde_json::json!({
            "student_unique_id": "12345",
            "birth_data": {"birth_date": "2010-01-01"},
            "addresses": [{"street_number_name": "123 Main St"}],
        });
        let wire = camelize_keys(&value);
        assert_eq!(wire["studentUniqueId"], "12345");
        assert_eq!(wire["birthData"]["birthDate"], "2010-01-01");
        assert_eq!(wire["addresses"][0]["streetNumberName"], "123 Main St");
    }

    #[test]
    fn wire_round_trip() {
        // camelCase wire key -> snake for access -> camelCase back out.
        let wire = "begin_date";
        assert_eq!(to_snake_case(&to_lower_camel(wire)), wire);
    }
}
