//! Search-event payloads.
//!
//! Payloads are free-form JSON written by the front end. Only two shapes
//! carry searched terms; everything else, including invalid JSON, is
//! `Unknown`. Parsing never fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchEventPayload {
    ProductSearch { product_name: String },
    CartSearch { product_name: Option<String>, products: Vec<String> },
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTermCount {
    pub term: String,
    pub count: usize,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default, rename = "productName")]
    product_name: Option<RawTerm>,
    #[serde(default, alias = "produtos")]
    products: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTerm {
    Text(String),
    Named {
        #[serde(alias = "nome_produto", alias = "productName")]
        name: String,
    },
    Other(serde::de::IgnoredAny),
}

impl RawTerm {
    fn into_term(self) -> Option<String> {
        let term = match self {
            RawTerm::Text(text) => text,
            RawTerm::Named { name } => name,
            RawTerm::Other(_) => return None,
        };
        let trimmed = term.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl SearchEventPayload {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else { return Self::Unknown };
        let Ok(payload) = serde_json::from_str::<RawPayload>(raw) else { return Self::Unknown };

        let product_name = payload.product_name.and_then(RawTerm::into_term);
        // A non-array product list is dropped; the rest of the payload still counts.
        let products = match payload.products {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        };
        match (product_name, products) {
            (product_name, Some(items)) => Self::CartSearch {
                product_name,
                products: items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value::<RawTerm>(item).ok())
                    .filter_map(RawTerm::into_term)
                    .collect(),
            },
            (Some(product_name), None) => Self::ProductSearch { product_name },
            (None, None) => Self::Unknown,
        }
    }

    pub fn terms(&self) -> Vec<&str> {
        match self {
            Self::ProductSearch { product_name } => vec![product_name.as_str()],
            Self::CartSearch { product_name, products } => product_name
                .iter()
                .chain(products.iter())
                .map(String::as_str)
                .collect(),
            Self::Unknown => Vec::new(),
        }
    }
}

/// Most frequent terms first; ties are broken alphabetically.
pub fn count_search_terms(
    payloads: impl IntoIterator<Item = SearchEventPayload>,
    limit: usize,
) -> Vec<SearchTermCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for payload in payloads {
        for term in payload.terms() {
            *counts.entry(term.to_string()).or_default() += 1;
        }
    }

    let mut ranked = counts
        .into_iter()
        .map(|(term, count)| SearchTermCount { term, count })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::{count_search_terms, SearchEventPayload};

    #[test]
    fn parses_single_product_search() {
        assert_eq!(
            SearchEventPayload::parse(Some(r#"{"productName":" Leite "}"#)),
            SearchEventPayload::ProductSearch { product_name: "Leite".to_string() }
        );
    }

    #[test]
    fn parses_cart_with_mixed_entries() {
        let payload = SearchEventPayload::parse(Some(
            r#"{"produtos":["arroz",{"nome_produto":"feijão"},42,{"preco":3},""]}"#,
        ));

        assert_eq!(payload.terms(), vec!["arroz", "feijão"]);
    }

    #[test]
    fn malformed_payloads_are_unknown() {
        for raw in [None, Some(""), Some("[1,2]"), Some("{\"produtos\":\"arroz\"}"), Some("{}"), Some("null")] {
            assert_eq!(SearchEventPayload::parse(raw), SearchEventPayload::Unknown, "{raw:?}");
        }
    }

    #[test]
    fn non_array_products_keep_the_product_name() {
        for raw in [
            r#"{"productName":"arroz","products":"oops"}"#,
            r#"{"productName":"arroz","produtos":{"nome_produto":"feijão"}}"#,
            r#"{"productName":"arroz","products":7}"#,
        ] {
            assert_eq!(
                SearchEventPayload::parse(Some(raw)),
                SearchEventPayload::ProductSearch { product_name: "arroz".to_string() },
                "{raw}"
            );
        }
    }

    #[test]
    fn non_string_product_name_is_ignored() {
        assert_eq!(
            SearchEventPayload::parse(Some(r#"{"productName":12,"produtos":["café"]}"#)).terms(),
            vec!["café"]
        );
    }

    #[test]
    fn counts_and_limits_terms() {
        let payloads = [
            r#"{"productName":"b"}"#,
            r#"{"productName":"a"}"#,
            r#"{"produtos":["c","b"]}"#,
            r#"{"productName":"c"}"#,
        ]
        .into_iter()
        .map(|raw| SearchEventPayload::parse(Some(raw)));

        let top = count_search_terms(payloads, 2)
            .into_iter()
            .map(|term| (term.term, term.count))
            .collect::<Vec<_>>();

        assert_eq!(top, vec![("b".to_string(), 2), ("c".to_string(), 2)]);
    }
}
