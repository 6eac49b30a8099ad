//! Field extraction: location paths applied to a document, producing one
//! JSON record.
//!
//! The collapsing rule is the same everywhere: zero matches becomes a
//! null value (the key is always present), one match a scalar string,
//! several matches an array of strings.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::location_path::{LocationPath, Namespaces};
use crate::types::{ConvertError, ConvertResult};
use crate::xml_tree::Element;

/// Declares that a set of field-map keys describe one repeated
/// sub-record. Member keys that resolve to lists are zipped by position
/// into a single list of objects under `prefix`, each object keyed by
/// the member's suffix (the member name minus `prefix` + `_`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatGroup {
    pub prefix: String,
    pub keys: Vec<String>,
}

/// What to pull out of a document. Exactly one of `fields` (bare names)
/// or `field_map` (output key -> path expression) must be given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractSpec {
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub field_map: Option<IndexMap<String, String>>,
    /// Supplementary key -> path entries, merged after the primary spec;
    /// they win on key collision.
    #[serde(default)]
    pub extra_fields: Option<IndexMap<String, String>>,
    #[serde(default)]
    pub groups: Vec<RepeatGroup>,
    #[serde(default)]
    pub namespaces: HashMap<String, String>,
    /// Local name of the element extraction starts from. Defaults to the
    /// document root; otherwise the first matching descendant.
    #[serde(default)]
    pub root_tag: Option<String>,
}

impl ExtractSpec {
    /// Reject unusable specs before any per-file work happens.
    pub fn validate(&self) -> ConvertResult<()> {
        match (&self.fields, &self.field_map) {
            (Some(_), Some(_)) => {
                return Err(ConvertError::MalformedSpec(
                    "give either a field list or a field map, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConvertError::MalformedSpec(
                    "an extraction spec needs a field list or a field map".to_string(),
                ));
            }
            (Some(fields), None) if fields.is_empty() => {
                return Err(ConvertError::MalformedSpec("empty field list".to_string()));
            }
            (None, Some(map)) if map.is_empty() => {
                return Err(ConvertError::MalformedSpec("empty field map".to_string()));
            }
            _ => {}
        }
        for group in &self.groups {
            if group.prefix.is_empty() || group.keys.is_empty() {
                return Err(ConvertError::MalformedSpec(
                    "a repeat group needs a prefix and at least one key".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Extract one record from a parsed document.
pub fn extract(root: &Element, spec: &ExtractSpec) -> ConvertResult<Map<String, Value>> {
    spec.validate()?;

    let context = context_element(root, spec.root_tag.as_deref());

    if let Some(fields) = &spec.fields {
        let mut record = Map::new();
        for name in fields {
            let values = resolve_values(context, name, &spec.namespaces)?;
            record.insert(name.clone(), collapse(values));
        }
        // Supplementary entries merge flat after the primary list.
        if let Some(extra) = &spec.extra_fields {
            for (key, expr) in extra {
                let values = resolve_values(context, expr, &spec.namespaces)?;
                record.insert(key.clone(), collapse(values));
            }
        }
        return Ok(record);
    }

    let mut flat: IndexMap<String, Value> = IndexMap::new();
    if let Some(map) = &spec.field_map {
        for (key, expr) in map {
            let values = resolve_values(context, expr, &spec.namespaces)?;
            flat.insert(key.clone(), collapse(values));
        }
    }
    if let Some(extra) = &spec.extra_fields {
        for (key, expr) in extra {
            let values = resolve_values(context, expr, &spec.namespaces)?;
            flat.insert(key.clone(), collapse(values));
        }
    }

    let flat = apply_groups(flat, &spec.groups)?;
    Ok(regroup(flat))
}

fn context_element<'a>(root: &'a Element, root_tag: Option<&str>) -> Option<&'a Element> {
    match root_tag {
        None => Some(root),
        Some(tag) if root.tag == tag => Some(root),
        Some(tag) => root.descendants().into_iter().find(|el| el.tag == tag),
    }
}

fn resolve_values(
    context: Option<&Element>,
    expr: &str,
    namespaces: &Namespaces,
) -> ConvertResult<Vec<String>> {
    let path = LocationPath::parse(expr)?;
    Ok(match context {
        Some(el) => path.resolve(el, namespaces),
        // No context element: every path resolves to nothing.
        None => Vec::new(),
    })
}

fn collapse(mut values: Vec<String>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => Value::String(values.remove(0)),
        _ => Value::Array(values.into_iter().map(Value::String).collect()),
    }
}

/// Zip declared repeat groups into lists of objects. Members that
/// resolved to scalars or null stay behind as ordinary keys; unequal
/// list lengths zip up to the shortest.
fn apply_groups(
    flat: IndexMap<String, Value>,
    groups: &[RepeatGroup],
) -> ConvertResult<IndexMap<String, Value>> {
    if groups.is_empty() {
        return Ok(flat);
    }

    // member key -> the group prefix that consumed it
    let mut zip_members: HashMap<String, String> = HashMap::new();
    let mut zipped: IndexMap<String, Value> = IndexMap::new();

    for group in groups {
        let mut arrays: Vec<(String, Vec<Value>)> = Vec::new();
        for key in &group.keys {
            let value = flat.get(key).ok_or_else(|| {
                ConvertError::MalformedSpec(format!(
                    "repeat group '{}' references unknown key '{}'",
                    group.prefix, key
                ))
            })?;
            if let Value::Array(items) = value {
                let suffix = key
                    .strip_prefix(&format!("{}_", group.prefix))
                    .unwrap_or(key)
                    .to_string();
                arrays.push((suffix, items.clone()));
                zip_members.insert(key.clone(), group.prefix.clone());
            }
        }
        if arrays.is_empty() {
            continue;
        }

        let len = arrays.iter().map(|(_, items)| items.len()).min().unwrap_or(0);
        let mut records = Vec::with_capacity(len);
        for i in 0..len {
            let mut entry = Map::new();
            for (suffix, items) in &arrays {
                entry.insert(suffix.clone(), items[i].clone());
            }
            records.push(Value::Object(entry));
        }
        zipped.insert(group.prefix.clone(), Value::Array(records));
    }

    // Rebuild in order: the zipped list takes the position of its first
    // member; other members disappear.
    let mut out: IndexMap<String, Value> = IndexMap::new();
    for (key, value) in flat {
        match zip_members.get(&key) {
            Some(prefix) => {
                if let Some(list) = zipped.swap_remove(prefix) {
                    out.insert(prefix.clone(), list);
                }
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    Ok(out)
}

/// Lift dotted keys (always) and shared underscore prefixes (when two or
/// more keys share one) into nested objects.
fn regroup(flat: IndexMap<String, Value>) -> Map<String, Value> {
    let mut prefix_counts: HashMap<String, usize> = HashMap::new();
    for key in flat.keys() {
        if key.contains('.') {
            continue;
        }
        if let Some((prefix, rest)) = key.split_once('_') {
            if !prefix.is_empty() && !rest.is_empty() {
                *prefix_counts.entry(prefix.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut record = Map::new();
    for (key, value) in flat {
        if let Some((head, rest)) = key.split_once('.') {
            if !head.is_empty() && !rest.is_empty() {
                insert_nested(&mut record, head, rest, value);
                continue;
            }
            record.insert(key, value);
        } else if let Some((prefix, rest)) = key.split_once('_') {
            let shared = !prefix.is_empty()
                && !rest.is_empty()
                && prefix_counts.get(prefix).copied().unwrap_or(0) >= 2;
            if shared {
                nested_entry(&mut record, prefix).insert(rest.to_string(), value);
            } else {
                record.insert(key, value);
            }
        } else {
            record.insert(key, value);
        }
    }
    record
}

fn insert_nested(map: &mut Map<String, Value>, head: &str, rest: &str, value: Value) {
    let entry = nested_entry(map, head);
    match rest.split_once('.') {
        Some((next, tail)) if !next.is_empty() && !tail.is_empty() => {
            insert_nested(entry, next, tail, value);
        }
        _ => {
            entry.insert(rest.to_string(), value);
        }
    }
}

fn nested_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        // A scalar landed on the same name earlier; the nested object wins.
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(m) => m,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml_tree::parse_document;
    use serde_json::json;

    const DOC: &str = "<order>\
        <id>ord-77</id>\
        <buyer><name>Ana Sousa</name><city>Lisboa</city></buyer>\
        <line><sku>A1</sku><qty>2</qty></line>\
        <line><sku>B2</sku><qty>5</qty></line>\
        <line><sku>C3</sku></line>\
    </order>";

    fn doc() -> Element {
        parse_document(DOC).unwrap()
    }

    fn map_spec(entries: &[(&str, &str)]) -> ExtractSpec {
        ExtractSpec {
            field_map: Some(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_field_list_collapsing() {
        let spec = ExtractSpec {
            fields: Some(vec!["id".to_string(), "line".to_string(), "note".to_string()]),
            ..Default::default()
        };
        let record = extract(&doc(), &spec).unwrap();

        assert_eq!(record["id"], json!("ord-77"));
        // Three matches collapse to an array of itertext values.
        assert!(record["line"].is_array());
        // Zero matches: key present, value null.
        assert_eq!(record["note"], Value::Null);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id", "line", "note"]);
    }

    #[test]
    fn test_field_map_and_dotted_nesting() {
        let spec = map_spec(&[
            ("id", "id"),
            ("buyer.name", "buyer/name"),
            ("buyer.city", "buyer/city"),
        ]);
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({
                "id": "ord-77",
                "buyer": {"name": "Ana Sousa", "city": "Lisboa"}
            })
        );
    }

    #[test]
    fn test_underscore_prefix_regrouping() {
        let spec = map_spec(&[
            ("id", "id"),
            ("buyer_name", "buyer/name"),
            ("buyer_city", "buyer/city"),
            ("order_note", "note"),
        ]);
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(record["buyer"], json!({"name": "Ana Sousa", "city": "Lisboa"}));
        // A lone prefixed key keeps its flat name.
        assert!(record.contains_key("order_note"));
        assert_eq!(record["order_note"], Value::Null);
    }

    #[test]
    fn test_zero_matches_key_presence() {
        let spec = map_spec(&[("missing", ".//does/not/exist")]);
        let record = extract(&doc(), &spec).unwrap();
        assert!(record.contains_key("missing"));
        assert_eq!(record["missing"], Value::Null);
    }

    #[test]
    fn test_extra_fields_win_on_collision() {
        let mut spec = map_spec(&[("id", "id"), ("city", "buyer/city")]);
        spec.extra_fields = Some(
            [
                ("id".to_string(), "buyer/name".to_string()),
                ("first_sku".to_string(), ".//sku[1]".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(record["id"], json!("Ana Sousa"));
        assert_eq!(record["first_sku"], json!("A1"));
    }

    #[test]
    fn test_repeat_group_zips_to_shortest() {
        let mut spec = map_spec(&[
            ("id", "id"),
            ("line_sku", ".//line/sku"),
            ("line_qty", ".//line/qty"),
        ]);
        spec.groups = vec![RepeatGroup {
            prefix: "line".to_string(),
            keys: vec!["line_sku".to_string(), "line_qty".to_string()],
        }];
        let record = extract(&doc(), &spec).unwrap();
        // Three skus, two qtys: zipped up to the shortest.
        assert_eq!(
            record["line"],
            json!([
                {"sku": "A1", "qty": "2"},
                {"sku": "B2", "qty": "5"},
            ])
        );
        assert!(!record.contains_key("line_sku"));
        assert!(!record.contains_key("line_qty"));
    }

    #[test]
    fn test_repeat_group_scalar_member_stays_flat() {
        let mut spec = map_spec(&[
            ("item_sku", ".//line/sku"),
            ("item_total", "id"),
        ]);
        spec.groups = vec![RepeatGroup {
            prefix: "item".to_string(),
            keys: vec!["item_sku".to_string(), "item_total".to_string()],
        }];
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(
            record["item"],
            json!([{"sku": "A1"}, {"sku": "B2"}, {"sku": "C3"}])
        );
        // Scalar member is not zipped and keeps its flat name.
        assert_eq!(record["item_total"], json!("ord-77"));
    }

    #[test]
    fn test_repeat_group_unknown_key_is_malformed() {
        let mut spec = map_spec(&[("line_sku", ".//line/sku")]);
        spec.groups = vec![RepeatGroup {
            prefix: "line".to_string(),
            keys: vec!["line_sku".to_string(), "line_ghost".to_string()],
        }];
        assert!(matches!(
            extract(&doc(), &spec),
            Err(ConvertError::MalformedSpec(_))
        ));
    }

    #[test]
    fn test_empty_and_ambiguous_specs_rejected() {
        let empty = ExtractSpec::default();
        assert!(matches!(extract(&doc(), &empty), Err(ConvertError::MalformedSpec(_))));

        let both = ExtractSpec {
            fields: Some(vec!["id".to_string()]),
            field_map: Some(IndexMap::new()),
            ..Default::default()
        };
        assert!(matches!(extract(&doc(), &both), Err(ConvertError::MalformedSpec(_))));
    }

    #[test]
    fn test_root_tag_selects_context() {
        let spec = ExtractSpec {
            field_map: Some([("name".to_string(), "name".to_string())].into_iter().collect()),
            root_tag: Some("buyer".to_string()),
            ..Default::default()
        };
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(record["name"], json!("Ana Sousa"));

        let spec = ExtractSpec {
            root_tag: Some("warehouse".to_string()),
            ..map_spec(&[("name", "name")])
        };
        // Unmatched root tag: everything resolves to null, not an error.
        let record = extract(&doc(), &spec).unwrap();
        assert_eq!(record["name"], Value::Null);
    }
}
