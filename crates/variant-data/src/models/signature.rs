//! Normalized request identity used as the cache's content address.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// HTTP verb of an outbound request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Normalized identity of an outbound request.
///
/// Two logically identical requests normalize to the same signature
/// regardless of parameter order, surrounding whitespace, provider id casing,
/// trailing slashes on the endpoint, or key order inside a JSON body.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RequestSignature {
    provider: String,
    method: HttpMethod,
    endpoint: String,
    params: BTreeMap<String, Vec<String>>,
    body: Option<String>,
}

impl RequestSignature {
    pub fn new(
        provider: &str,
        method: HttpMethod,
        endpoint: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Self {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in params {
            grouped
                .entry(key.trim().to_string())
                .or_default()
                .push(value.trim().to_string());
        }
        for values in grouped.values_mut() {
            values.sort();
        }

        Self {
            provider: provider.trim().to_ascii_uppercase(),
            method,
            endpoint: normalize_endpoint(endpoint),
            params: grouped,
            body: body.map(canonical_json),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Parameters in canonical order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Canonical text form, stable across processes.
    pub fn canonical(&self) -> String {
        let query = self
            .params()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut text = format!("{} {} {}", self.provider, self.method, self.endpoint);
        if !query.is_empty() {
            text.push('?');
            text.push_str(&query);
        }
        if let Some(body) = &self.body {
            text.push_str(" #");
            text.push_str(body);
        }
        text
    }

    /// SHA-256 hex digest of the canonical form.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Serialize a JSON value with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", fields)
        }
        Value::Array(items) => {
            let items = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", items)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_param_order_and_whitespace_are_insignificant() {
        let a = RequestSignature::new(
            "gtex",
            HttpMethod::Get,
            "/association/singleTissueEqtl",
            &pairs(&[("gencodeId", "ENSG00000130164.13"), ("tissueSiteDetailId", "Liver")]),
            None,
        );
        let b = RequestSignature::new(
            " GTEX ",
            HttpMethod::Get,
            "association/singleTissueEqtl/",
            &pairs(&[(" tissueSiteDetailId", "Liver "), ("gencodeId", "ENSG00000130164.13")]),
            None,
        );
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_repeated_params_are_sorted() {
        let a = RequestSignature::new(
            "ENSEMBL",
            HttpMethod::Get,
            "/x",
            &pairs(&[("feature", "variation"), ("feature", "gene")]),
            None,
        );
        let b = RequestSignature::new(
            "ENSEMBL",
            HttpMethod::Get,
            "/x",
            &pairs(&[("feature", "gene"), ("feature", "variation")]),
            None,
        );
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.canonical(), "ENSEMBL GET /x?feature=gene&feature=variation");
    }

    #[test]
    fn test_body_key_order_is_insignificant() {
        let a = RequestSignature::new(
            "MYVARIANT",
            HttpMethod::Post,
            "/variant",
            &[],
            Some(&json!({"ids": "rs1,rs2", "fields": "gnomad_genome"})),
        );
        let b = RequestSignature::new(
            "MYVARIANT",
            HttpMethod::Post,
            "/variant",
            &[],
            Some(&json!({"fields": "gnomad_genome", "ids": "rs1,rs2"})),
        );
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_distinct_requests_have_distinct_digests() {
        let get = RequestSignature::new("ENSEMBL", HttpMethod::Get, "/variation/human/rs1", &[], None);
        let post = RequestSignature::new("ENSEMBL", HttpMethod::Post, "/variation/human/rs1", &[], None);
        let other = RequestSignature::new("ENSEMBL", HttpMethod::Get, "/variation/human/rs2", &[], None);
        assert_ne!(get.digest(), post.digest());
        assert_ne!(get.digest(), other.digest());
        assert_eq!(get.digest().len(), 64);
    }
}
