//! Serde helpers for lenient deserialization of server frames.
//!
//! When the `tracing` feature is enabled, this module also logs any unknown
//! fields encountered while decoding a JSON frame, which helps spot changes in
//! what the server sends.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A `serde_as` type that reads strings, numbers and booleans as
/// `Option<String>` and treats every other shape as absent.
///
/// `false` and zero count as absent too, so callers fall back to their
/// defaults for them just as for a missing field.
///
/// Use with `#[serde_as(as = "LenientString")]` and `#[serde(default)]` on
/// `Option<String>` fields.
pub struct LenientString;

impl<'de> serde_with::DeserializeAs<'de, Option<String>> for LenientString {
    fn deserialize_as<D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::fmt;

        use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};

        struct LenientVisitor;

        impl<'de> Visitor<'de> for LenientVisitor {
            type Value = Option<String>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any JSON value")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Some(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Some(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok((v != 0).then(|| v.to_string()))
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok((v != 0).then(|| v.to_string()))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok((v.abs() > 0.0).then(|| v.to_string()))
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.then(|| v.to_string()))
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(None)
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(None)
            }
        }

        deserializer.deserialize_any(LenientVisitor)
    }
}

/// Deserialize a JSON frame, logging fields the target type does not know.
///
/// Unknown fields are reported at `debug` level and never fail the
/// deserialization.
///
/// # Example
///
/// ```ignore
/// let json = serde_json::json!({ "title": "Hi", "sender": "server" });
/// let fields: JsonFrame = deserialize_with_warnings(json)?;
/// // Logs: DEBUG unknown field in JSON frame field="sender" value="server"
/// ```
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    tracing::trace!(
        type_name = %type_name::<T>(),
        json = %value,
        "deserializing JSON"
    );

    // Kept to look up unknown field values afterwards
    let original = value.clone();

    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        // Re-deserialize with serde_path_to_error to get the error path
        let json_str = original.to_string();
        let jd = &mut serde_json::Deserializer::from_str(&json_str);
        let path_result: Result<T, _> = serde_path_to_error::deserialize(jd);
        if let Err(path_err) = path_result {
            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path_err.path(),
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    for path in unknown_paths {
        let value_display = lookup_value(&original, &path)
            .map_or_else(|| "<unable to retrieve>".to_owned(), Value::to_string);

        tracing::debug!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %value_display,
            "unknown field in JSON frame"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Look up a value by a dotted `serde_ignored` path such as `meta.sender`.
///
/// `?` segments stand for `Option` wrappers and are skipped.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
}
