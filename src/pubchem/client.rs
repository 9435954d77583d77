use std::time::Duration;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use super::{
    Candidate, CompoundSource, FaultResponse, LookupError, PropertyResponse, RetryPolicy,
    SynonymsResponse, looks_like_formula,
};
use crate::error::{ChemlinkError, Result};
use crate::types::{ChemicalRecord, PubChemOptions, SearchMode};

const USER_AGENT: &str = concat!("chemlink-core/", env!("CARGO_PKG_VERSION"));

/// Blocking PubChem PUG REST client.
#[derive(Debug, Clone)]
pub struct PubChemClient {
    http: Client,
    base: Url,
    retry: RetryPolicy,
    timeout_ms: u64,
}

impl PubChemClient {
    pub fn new(options: &PubChemOptions) -> Result<Self> {
        let base = Url::parse(&options.base_url).map_err(|err| {
            ChemlinkError::Config(format!("invalid PubChem base URL {:?}: {err}", options.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(ChemlinkError::Config(format!(
                "PubChem base URL {:?} cannot carry path segments",
                options.base_url
            )));
        }
        let http = Client::builder()
            .timeout(Duration::from_millis(options.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ChemlinkError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base,
            retry: RetryPolicy::from_options(options),
            timeout_ms: options.timeout_ms,
        })
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, LookupError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| LookupError::Unavailable("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET and decode JSON. A 404 is `Ok(None)`.
    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> std::result::Result<Option<T>, LookupError> {
        self.retry.run(url.path(), || {
            let response = self.http.get(url.clone()).send().map_err(|err| {
                if err.is_timeout() {
                    LookupError::Timeout(self.timeout_ms)
                } else {
                    LookupError::Unavailable(err.to_string())
                }
            })?;
            let status = response.status();
            let body = response
                .text()
                .map_err(|err| LookupError::Unavailable(err.to_string()))?;

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let message = serde_json::from_str::<FaultResponse>(&body)
                    .map(|fault| fault.fault.summary())
                    .unwrap_or_else(|_| body.chars().take(200).collect());
                return Err(LookupError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            serde_json::from_str(&body)
                .map(Some)
                .map_err(|err| LookupError::Decode(err.to_string()))
        })
    }

    fn synonyms_url(&self, query: &str, mode: SearchMode) -> std::result::Result<Url, LookupError> {
        match mode {
            SearchMode::Name => self.endpoint(&["compound", "name", query, "synonyms", "JSON"]),
            SearchMode::Word => {
                let mut url = self.endpoint(&["compound", "name", query, "synonyms", "JSON"])?;
                url.query_pairs_mut().append_pair("name_type", "word");
                Ok(url)
            }
            SearchMode::Formula => {
                self.endpoint(&["compound", "fastformula", query, "synonyms", "JSON"])
            }
        }
    }

    /// Fill `formula` from one batched property request. Failures leave the
    /// formulas unset.
    fn fill_formulas(&self, records: &mut [ChemicalRecord]) {
        if records.is_empty() {
            return;
        }
        let cids = records
            .iter()
            .map(|record| record.identifier.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = match self.endpoint(&[
            "compound",
            "cid",
            &cids,
            "property",
            "MolecularFormula,IUPACName",
            "JSON",
        ]) {
            Ok(url) => url,
            Err(_) => return,
        };
        match self.get_json::<PropertyResponse>(&url) {
            Ok(Some(response)) => {
                for props in response.property_table.properties {
                    let cid = props.cid.to_string();
                    if let Some(record) = records.iter_mut().find(|r| r.identifier == cid) {
                        record.formula = props.molecular_formula;
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(cids = %cids, error = %err, "formula lookup failed; continuing without formulas");
            }
        }
    }
}

impl CompoundSource for PubChemClient {
    #[tracing::instrument(skip(self), fields(mode = mode.label()))]
    fn search(&self, query: &str, mode: SearchMode) -> std::result::Result<Vec<Candidate>, LookupError> {
        if mode == SearchMode::Formula && !looks_like_formula(query) {
            tracing::trace!("query is not formula-shaped; skipping formula search");
            return Ok(Vec::new());
        }
        let url = self.synonyms_url(query, mode)?;
        let response = match self.get_json::<SynonymsResponse>(&url) {
            Ok(response) => response,
            // A name that is not a valid formula is rejected as a bad request.
            Err(LookupError::Status { status: 400, .. }) if mode == SearchMode::Formula => None,
            Err(err) => return Err(err),
        };
        let mut records = response.map(SynonymsResponse::into_records).unwrap_or_default();
        self.fill_formulas(&mut records);
        tracing::debug!(candidates = records.len(), "PubChem search finished");
        Ok(records
            .into_iter()
            .map(|record| Candidate::new(record, mode))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PubChemClient {
        PubChemClient::new(&PubChemOptions::default()).expect("client")
    }

    #[test]
    fn endpoints_percent_encode_queries() {
        let client = client();
        let url = client
            .synonyms_url("iron(III) oxide/hydrate", SearchMode::Name)
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://pubchem.ncbi.nlm.nih.gov/rest/pug/compound/name/iron(III)%20oxide%2Fhydrate/synonyms/JSON"
        );
        let word = client.synonyms_url("zinc", SearchMode::Word).expect("url");
        assert!(word.as_str().ends_with("/compound/name/zinc/synonyms/JSON?name_type=word"));
        let formula = client.synonyms_url("Al2O3", SearchMode::Formula).expect("url");
        assert!(formula.as_str().ends_with("/compound/fastformula/Al2O3/synonyms/JSON"));
    }

    #[test]
    fn trailing_slash_in_base_url_is_tolerated() {
        let options = PubChemOptions {
            base_url: "https://example.org/rest/pug/".into(),
            ..PubChemOptions::default()
        };
        let client = PubChemClient::new(&options).expect("client");
        let url = client.endpoint(&["compound", "name", "water"]).expect("url");
        assert_eq!(url.as_str(), "https://example.org/rest/pug/compound/name/water");
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let options = PubChemOptions {
            base_url: "not a url".into(),
            ..PubChemOptions::default()
        };
        let err = PubChemClient::new(&options).expect_err("invalid");
        assert!(matches!(err, ChemlinkError::Config(_)), "got {err:?}");
    }
}
