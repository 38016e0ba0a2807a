//! Value-tree primitives shared by the in-memory store and the streaming client.
//! Nodes are `serde_json::Value`; `Null` means absent, and deleting a node prunes
//! any object ancestors it leaves empty.

use serde_json::{Map, Value};

use super::StoreError;

pub fn value_at(root: &Value, segments: &[String]) -> Value {
    let mut cur = root;
    for seg in segments {
        cur = match cur {
            Value::Object(m) => match m.get(seg) { Some(v) => v, None => return Value::Null },
            Value::Array(a) => match seg.parse::<usize>().ok().and_then(|i| a.get(i)) {
                Some(v) => v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    cur.clone()
}

/// Replace the node at `segments` with `value` (`Null` deletes it).
pub fn set_at(root: &mut Value, segments: &[String], value: Value) -> Result<(), StoreError> {
    let Some((head, rest)) = segments.split_first() else {
        *root = value;
        return Ok(());
    };
    if value.is_null() && !root.is_object() && !root.is_array() {
        return Ok(());
    }
    if let Value::Array(items) = root {
        let idx = head
            .parse::<usize>()
            .map_err(|_| StoreError::InvalidPath(format!("'{head}' is not an index into a list")))?;
        if idx < items.len() {
            set_at(&mut items[idx], rest, value)?;
            if items[idx].is_null() {
                items.remove(idx);
            }
            return Ok(());
        }
        if value.is_null() { return Ok(()); }
        // Writing past the end of a list converts it to a keyed object.
        let converted: Map<String, Value> = items
            .drain(..)
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *root = Value::Object(converted);
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else { unreachable!("root coerced to object above") };
    if rest.is_empty() {
        if value.is_null() { map.remove(head); } else { map.insert(head.clone(), value); }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value)?;
        if is_empty_node(child) { map.remove(head); }
    }
    Ok(())
}

fn is_empty_node(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

/// Apply a multi-path update relative to `base`: each key may contain `/`.
pub fn update_at(root: &mut Value, base: &[String], fields: &Map<String, Value>) -> Result<(), StoreError> {
    for (rel, value) in fields {
        let mut segs = base.to_vec();
        segs.extend(split_relative(rel)?);
        set_at(root, &segs, value.clone())?;
    }
    Ok(())
}

pub fn split_relative(rel: &str) -> Result<Vec<String>, StoreError> {
    let path = super::DocPath::parse(rel)?;
    Ok(path.segments().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(s: &str) -> Vec<String> { s.split('/').filter(|x| !x.is_empty()).map(String::from).collect() }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = Value::Null;
        set_at(&mut root, &segs("a/b/c"), json!(1)).unwrap();
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
        assert_eq!(value_at(&root, &segs("a/b")), json!({"c": 1}));
        assert_eq!(value_at(&root, &segs("a/x")), Value::Null);
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "keep": true});
        set_at(&mut root, &segs("a/b/c"), Value::Null).unwrap();
        assert_eq!(root, json!({"keep": true}));
    }

    #[test]
    fn arrays_are_indexable_and_kept_verbatim() {
        let mut root = json!({"list": [{"name": "x"}, {"name": "y"}]});
        assert_eq!(value_at(&root, &segs("list/1/name")), json!("y"));
        set_at(&mut root, &segs("list/0/name"), json!("z")).unwrap();
        assert_eq!(root, json!({"list": [{"name": "z"}, {"name": "y"}]}));
        set_at(&mut root, &segs("list/0"), Value::Null).unwrap();
        assert_eq!(root, json!({"list": [{"name": "y"}]}));
    }

    #[test]
    fn multi_path_update_is_applied_together() {
        let mut root = json!({"x": {"a": 1}});
        let mut fields = Map::new();
        fields.insert("x/a".into(), Value::Null);
        fields.insert("y/b".into(), json!(2));
        update_at(&mut root, &[], &fields).unwrap();
        assert_eq!(root, json!({"y": {"b": 2}}));
    }
}
