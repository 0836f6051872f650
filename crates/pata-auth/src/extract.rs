//! Pulls a candidate credential out of an inbound request.

use http::{HeaderMap, HeaderName};

/// Where a credential may be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only the custom header.
    HeaderOnly,
    /// The custom header, then the request body, then the query string.
    HeaderThenParams,
}

/// The parts of a request a credential can live in.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub headers: &'a HeaderMap,
    pub query: Option<&'a str>,
    /// Raw `application/x-www-form-urlencoded` body, when the request has one.
    pub form: Option<&'a [u8]>,
    /// Raw `application/json` body, when the request has one.
    pub json: Option<&'a [u8]>,
}

impl<'a> CredentialRequest<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            query: None,
            form: None,
            json: None,
        }
    }

    pub fn with_query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    pub fn with_form(mut self, form: Option<&'a [u8]>) -> Self {
        self.form = form;
        self
    }

    pub fn with_json(mut self, json: Option<&'a [u8]>) -> Self {
        self.json = json;
        self
    }
}

/// Returns the first non-empty credential named `field`.
pub fn extract(request: &CredentialRequest<'_>, field: &str, lookup: Lookup) -> Option<String> {
    if let Some(value) = header_value(request.headers, field) {
        return Some(value);
    }

    match lookup {
        Lookup::HeaderOnly => None,
        Lookup::HeaderThenParams => request
            .form
            .and_then(|body| param_value(body, field))
            .or_else(|| request.json.and_then(|body| json_value(body, field)))
            .or_else(|| request.query.and_then(|q| param_value(q.as_bytes(), field))),
    }
}

fn header_value(headers: &HeaderMap, field: &str) -> Option<String> {
    header_candidates(field)
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

// `access_token`, `access-token` and `Access-Token` name the same header.
fn header_candidates(field: &str) -> Vec<HeaderName> {
    let lower = field.to_ascii_lowercase();
    let mut names = Vec::with_capacity(3);
    for candidate in [lower.clone(), lower.replace('_', "-"), lower.replace('-', "_")] {
        if let Ok(name) = HeaderName::from_bytes(candidate.as_bytes()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

// A repeated key resolves to its last occurrence.
fn param_value(encoded: &[u8], field: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .filter(|(key, _)| key == field)
        .last()
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

// Only a top-level string member counts.
fn json_value(body: &[u8], field: &str) -> Option<String> {
    let document: serde_json::Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(error) => {
            tracing::debug!(%error, "request body is not valid json");
            return None;
        }
    };
    document
        .get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn header_lookup_ignores_case() {
        let map = headers(&[("accesstoken", "abc")]);
        let req = CredentialRequest::from_headers(&map);
        assert_eq!(
            extract(&req, "accessToken", Lookup::HeaderOnly).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn dash_and_underscore_are_interchangeable() {
        let map = headers(&[("access-token", "dash")]);
        let req = CredentialRequest::from_headers(&map);
        assert_eq!(
            extract(&req, "ACCESS_TOKEN", Lookup::HeaderOnly).as_deref(),
            Some("dash")
        );
    }

    #[test]
    fn header_only_never_reads_params() {
        let map = HeaderMap::new();
        let req = CredentialRequest::from_headers(&map).with_query(Some("accessToken=abc"));
        assert_eq!(extract(&req, "accessToken", Lookup::HeaderOnly), None);
    }

    #[test]
    fn params_fall_back_from_header() {
        let map = HeaderMap::new();
        let req = CredentialRequest::from_headers(&map).with_query(Some("a=1&token=from%20query"));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("from query")
        );

        let req = req.with_form(Some(&b"token=from-body"[..]));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("from-body")
        );
    }

    #[test]
    fn header_wins_over_params() {
        let map = headers(&[("token", "from-header")]);
        let req = CredentialRequest::from_headers(&map).with_query(Some("token=from-query"));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn repeated_params_resolve_to_the_last_occurrence() {
        let map = HeaderMap::new();
        let req = CredentialRequest::from_headers(&map).with_query(Some("token=&token=second"));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("second")
        );

        let req = CredentialRequest::from_headers(&map).with_query(Some("token=first&token=last"));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("last")
        );

        let req = CredentialRequest::from_headers(&map).with_query(Some("token=first&token="));
        assert_eq!(extract(&req, "token", Lookup::HeaderThenParams), None);
    }

    #[test]
    fn json_body_is_read_before_the_query() {
        let map = HeaderMap::new();
        let req = CredentialRequest::from_headers(&map)
            .with_query(Some("token=from-query"))
            .with_json(Some(&br#"{"token":"from-json","other":1}"#[..]));
        assert_eq!(
            extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
            Some("from-json")
        );
        assert_eq!(extract(&req, "token", Lookup::HeaderOnly), None);
    }

    #[test]
    fn json_body_without_a_string_member_falls_through() {
        let map = HeaderMap::new();
        let bodies: [&[u8]; 4] = [
            br#"{"token":42}"#,
            br#"["token"]"#,
            b"{not json",
            br#"{"token":""}"#,
        ];
        for body in bodies {
            let req = CredentialRequest::from_headers(&map)
                .with_query(Some("token=from-query"))
                .with_json(Some(body));
            assert_eq!(
                extract(&req, "token", Lookup::HeaderThenParams).as_deref(),
                Some("from-query")
            );
        }
    }

    #[test]
    fn empty_values_count_as_absent() {
        let map = headers(&[("token", "")]);
        let req = CredentialRequest::from_headers(&map).with_query(Some("token="));
        assert_eq!(extract(&req, "token", Lookup::HeaderThenParams), None);
    }
}
