//! Attribute discovery from search facets
//!
//! Open Context search responses list facets describing which attributes the
//! matching records use. These helpers pick out attribute slugs worth
//! requesting in a paged fetch.

use serde_json::Value;

/// Facet keys holding text or identifier options
static TEXT_FACET_OPTION_KEYS: [&str; 2] = ["oc-api:has-id-options", "oc-api:has-text-options"];

/// Facet keys holding typed value options
static NON_TEXT_OPTION_KEYS: [&str; 5] = [
    "oc-api:has-numeric-options",
    "oc-api:has-boolean-options",
    "oc-api:has-integer-options",
    "oc-api:has-float-options",
    "oc-api:has-date-options",
];

/// Biological taxonomy slugs are deep hierarchies, not attributes
const NON_ATTRIBUTE_SLUG_PREFIXES: [&str; 2] = ["gbif-", "eol-p-"];

const OC_PREDICATES: &str = "http://opencontext.org/predicates/";
const OC_ZOOARCH_VOCAB: &str = "http://opencontext.org/vocabularies/open-context-zooarch/";

/// An attribute as Open Context names it in URLs and in responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSlug {
    pub slug: String,
    pub label: String,
}

fn facet_option_keys() -> impl Iterator<Item = &'static str> {
    TEXT_FACET_OPTION_KEYS
        .iter()
        .chain(NON_TEXT_OPTION_KEYS.iter())
        .copied()
}

fn facets(page: &Value) -> &[Value] {
    page.get("oc-api:has-facets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn total_results(page: &Value) -> u64 {
    page.get("totalResults").and_then(Value::as_u64).unwrap_or(0)
}

fn push_unique(out: &mut Vec<AttributeSlug>, slug: &str, label: &str) {
    if out.iter().any(|a| a.slug == slug && a.label == label) {
        return;
    }
    out.push(AttributeSlug {
        slug: slug.to_string(),
        label: label.to_string(),
    });
}

/// Whether a facet definition URI marks a cross-project "standard" attribute
fn is_standard_definition(def_uri: &str) -> bool {
    let external = !def_uri.starts_with("oc-gen:")
        && !def_uri.starts_with("oc-api:")
        && !def_uri.starts_with("http://opencontext.org");
    external || def_uri.starts_with("oc-api:facet-prop-ld") || def_uri.starts_with(OC_ZOOARCH_VOCAB)
}

/// Lists attributes defined outside a single project (linked-data standards)
///
/// Options without a slug or label are ignored, as are biological taxonomy
/// slugs. Results are de-duplicated in first-seen order.
pub fn standard_attributes(page: &Value) -> Vec<AttributeSlug> {
    let mut out = Vec::new();
    if total_results(page) < 1 {
        return out;
    }

    for facet in facets(page) {
        let Some(def_uri) = facet.get("rdfs:isDefinedBy").and_then(Value::as_str) else {
            continue;
        };
        if !is_standard_definition(def_uri) {
            continue;
        }
        for key in facet_option_keys() {
            let Some(options) = facet.get(key).and_then(Value::as_array) else {
                continue;
            };
            for option in options {
                let slug = option.get("slug").and_then(Value::as_str).unwrap_or("");
                let label = option.get("label").and_then(Value::as_str).unwrap_or("");
                if slug.is_empty() || label.is_empty() {
                    continue;
                }
                if NON_ATTRIBUTE_SLUG_PREFIXES.iter().any(|p| slug.starts_with(p)) {
                    continue;
                }
                push_unique(&mut out, slug, label);
            }
        }
    }
    out
}

/// Lists project-defined attributes used by at least `min_portion` of records
pub fn common_attributes(page: &Value, min_portion: f64) -> Vec<AttributeSlug> {
    let mut out = Vec::new();
    let total = total_results(page);
    if total < 1 {
        return out;
    }
    let threshold = total as f64 * min_portion;

    for facet in facets(page) {
        let def_uri = facet
            .get("rdfs:isDefinedBy")
            .and_then(Value::as_str)
            .unwrap_or("");
        if def_uri != "oc-api:facet-prop-var" && !def_uri.starts_with(OC_PREDICATES) {
            continue;
        }
        for key in facet_option_keys() {
            let Some(options) = facet.get(key).and_then(Value::as_array) else {
                continue;
            };
            for option in options {
                let slug = option.get("slug").and_then(Value::as_str).unwrap_or("");
                let label = option.get("label").and_then(Value::as_str).unwrap_or("");
                if slug.is_empty() || label.is_empty() {
                    continue;
                }
                let option_def = option
                    .get("rdfs:isDefinedBy")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !option_def.starts_with(OC_PREDICATES) {
                    continue;
                }
                let count = option.get("count").and_then(Value::as_f64).unwrap_or(0.0);
                if count < threshold {
                    continue;
                }
                push_unique(&mut out, slug, label);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_attributes_filters_definitions_and_taxonomies() {
        let page = json!({
            "totalResults": 40,
            "oc-api:has-facets": [
                {
                    "rdfs:isDefinedBy": "http://purl.org/dc/terms/subject",
                    "oc-api:has-id-options": [
                        { "slug": "dc-subject-a", "label": "Subject A" },
                        { "slug": "gbif-1234", "label": "Ovis" },
                        { "slug": "", "label": "blank" }
                    ]
                },
                {
                    "rdfs:isDefinedBy": "oc-gen:predicates",
                    "oc-api:has-text-options": [
                        { "slug": "local-note", "label": "Note" }
                    ]
                },
                {
                    "rdfs:isDefinedBy": "http://opencontext.org/vocabularies/open-context-zooarch/fusion",
                    "oc-api:has-numeric-options": [
                        { "slug": "zoo-fusion", "label": "Has fusion character" },
                        { "slug": "dc-subject-a", "label": "Subject A" }
                    ]
                }
            ]
        });

        let attrs = standard_attributes(&page);
        let slugs: Vec<&str> = attrs.iter().map(|a| a.slug.as_str()).collect();

        assert_eq!(slugs, ["dc-subject-a", "zoo-fusion"]);
    }

    #[test]
    fn test_standard_attributes_empty_when_no_results() {
        let page = json!({
            "totalResults": 0,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-ld",
                "oc-api:has-id-options": [{ "slug": "a", "label": "A" }]
            }]
        });
        assert!(standard_attributes(&page).is_empty());
    }

    #[test]
    fn test_common_attributes_applies_threshold() {
        let page = json!({
            "totalResults": 100,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-var",
                "oc-api:has-text-options": [
                    {
                        "slug": "24-motif", "label": "Motif", "count": 35,
                        "rdfs:isDefinedBy": "http://opencontext.org/predicates/abc"
                    },
                    {
                        "slug": "24-rare", "label": "Rare", "count": 5,
                        "rdfs:isDefinedBy": "http://opencontext.org/predicates/def"
                    },
                    {
                        "slug": "24-type", "label": "Type", "count": 90,
                        "rdfs:isDefinedBy": "http://opencontext.org/types/xyz"
                    }
                ]
            }]
        });

        let attrs = common_attributes(&page, 0.2);

        assert_eq!(
            attrs,
            vec![AttributeSlug {
                slug: "24-motif".into(),
                label: "Motif".into()
            }]
        );
    }
}
