//! Key transformer registry (§4.4, §4.4.1)
//!
//! Each handler is a pure function from one curation `(key, value)` pair to zero or more
//! sample-schema fields. Handlers never perform I/O and never consult the cache — they
//! are looked up by name out of a string-keyed table, mirroring
//! `MatchCriteriaTransform.__dict__[sample_value_function_name]` dispatch in the system
//! this crate's curation vocabulary was inherited from.

use crate::criteria::Collection;
use crate::model::ParentPath;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Arguments passed to a handler for one `(trial_key, trial_value)` pair.
pub struct HandlerArgs<'a> {
    pub sample_key: String,
    pub trial_value: &'a Value,
    pub parent_path: &'a ParentPath,
    pub trial_path: Collection,
    pub trial_key: &'a str,
    /// Handler-specific options carried alongside `sample_value`/`ignore` in the mapping
    /// entry (e.g. a vocabulary table for `cnv_call`).
    pub options: &'a BTreeMap<String, Value>,
}

pub type HandlerFn = fn(&HandlerArgs) -> BTreeMap<String, Value>;

/// String-keyed lookup table of handler functions, seeded with the built-ins every
/// curation schema in practice relies on.
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, HandlerFn>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut handlers: HashMap<&'static str, HandlerFn> = HashMap::new();
        handlers.insert("nomap", nomap);
        handlers.insert("age_range_to_date", age_range_to_date);
        handlers.insert("molecular_function", molecular_function);
        handlers.insert("cnv_call", cnv_call);
        handlers.insert("wildtype", wildtype);
        handlers.insert("boolean_value", boolean_value);
        HandlerRegistry { handlers }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<HandlerFn> {
        self.handlers.get(name).copied()
    }

    pub fn register(&mut self, name: &'static str, handler: HandlerFn) {
        self.handlers.insert(name, handler);
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Identity mapping: passes the trial value through unchanged under the uppercased key.
pub fn nomap(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    out.insert(args.sample_key.clone(), args.trial_value.clone());
    out
}

/// A curation age comparison (e.g. `">=18"`, `"<=5"`) translates to a birth-date range
/// fragment, since clinical documents store birthdate rather than age. The comparison
/// operator is inverted and the numeric bound converted to a duration-ago marker so a
/// downstream driver can resolve it against "now" at query time — this crate does not
/// compute wall-clock dates itself (no `chrono` dependency is carried for this purpose).
pub fn age_range_to_date(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let raw = args.trial_value.as_str().unwrap_or_default().trim();
    let (op, years) = split_comparison(raw);
    let inverted = invert_comparison(op);
    out.insert(
        "BIRTH_DATE".to_string(),
        Value::String(format!("{inverted}{years}y")),
    );
    out
}

/// Normalizes a molecular-function curation value (e.g. `"Activating"`) into the sample
/// schema's `MOLECULAR_FUNCTION` enum spelling.
pub fn molecular_function(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let value = args
        .trial_value
        .as_str()
        .map(str::to_uppercase)
        .unwrap_or_default();
    out.insert("MOLECULAR_FUNCTION".to_string(), Value::String(value));
    out
}

/// Normalizes a copy-number-variation call and constrains `WILDTYPE` to `false`, since a
/// CNV call is only meaningful for a non-wildtype variant.
pub fn cnv_call(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let value = args
        .trial_value
        .as_str()
        .map(|v| match v.to_lowercase().as_str() {
            "loss" => "HOMOZYGOUS DELETION".to_string(),
            "gain" => "GAIN".to_string(),
            other => other.to_uppercase(),
        })
        .unwrap_or_default();
    out.insert("CNV_CALL".to_string(), Value::String(value));
    out.insert("WILDTYPE".to_string(), Value::Bool(false));
    out
}

/// Maps a curated wildtype flag onto the sample schema's `WILDTYPE` boolean.
pub fn wildtype(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let value = match args.trial_value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true") || s.trim().eq_ignore_ascii_case("y"),
        _ => false,
    };
    out.insert("WILDTYPE".to_string(), Value::Bool(value));
    out
}

/// Maps a curated yes/no string onto the sample schema's boolean encoding.
pub fn boolean_value(args: &HandlerArgs) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let value = match args.trial_value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            s == "true" || s == "yes" || s == "y"
        }
        _ => false,
    };
    out.insert(args.sample_key.clone(), Value::Bool(value));
    out
}

fn split_comparison(raw: &str) -> (&str, &str) {
    for op in [">=", "<=", ">", "<", "="] {
        if let Some(rest) = raw.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("=", raw)
}

fn invert_comparison(op: &str) -> &'static str {
    match op {
        ">=" => "<=",
        "<=" => ">=",
        ">" => "<",
        "<" => ">",
        _ => "=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args<'a>(trial_value: &'a Value, parent_path: &'a ParentPath, options: &'a BTreeMap<String, Value>) -> HandlerArgs<'a> {
        HandlerArgs {
            sample_key: "HUGO_SYMBOL".to_string(),
            trial_value,
            parent_path,
            trial_path: Collection::Genomic,
            trial_key: "hugo_symbol",
            options,
        }
    }

    #[test]
    fn nomap_passes_value_through_under_sample_key() {
        let path = ParentPath::new();
        let opts = BTreeMap::new();
        let value = json!("BRAF");
        let out = nomap(&args(&value, &path, &opts));
        assert_eq!(out.get("HUGO_SYMBOL"), Some(&json!("BRAF")));
    }

    #[test]
    fn age_range_to_date_inverts_comparison_operator() {
        let path = ParentPath::new();
        let opts = BTreeMap::new();
        let value = json!(">=18");
        let out = age_range_to_date(&args(&value, &path, &opts));
        assert_eq!(out.get("BIRTH_DATE"), Some(&json!("<=18y")));
    }

    #[test]
    fn cnv_call_also_constrains_wildtype_false() {
        let path = ParentPath::new();
        let opts = BTreeMap::new();
        let value = json!("Loss");
        let out = cnv_call(&args(&value, &path, &opts));
        assert_eq!(out.get("CNV_CALL"), Some(&json!("HOMOZYGOUS DELETION")));
        assert_eq!(out.get("WILDTYPE"), Some(&json!(false)));
    }

    #[test]
    fn boolean_value_recognizes_yes_no_vocabulary() {
        let path = ParentPath::new();
        let opts = BTreeMap::new();
        let value = json!("Yes");
        let mut a = args(&value, &path, &opts);
        a.sample_key = "MMR_STATUS".to_string();
        let out = boolean_value(&a);
        assert_eq!(out.get("MMR_STATUS"), Some(&json!(true)));
    }

    #[test]
    fn registry_resolves_all_builtin_names() {
        let registry = HandlerRegistry::with_builtins();
        for name in [
            "nomap",
            "age_range_to_date",
            "molecular_function",
            "cnv_call",
            "wildtype",
            "boolean_value",
        ] {
            assert!(registry.get(name).is_some(), "missing handler {name}");
        }
        assert!(registry.get("does_not_exist").is_none());
    }
}
