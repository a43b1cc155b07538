//! Name resolution via the CDS Sesame service (plain-text output).

use std::time::Duration;

use log::{debug, info};
use reqwest::Url;
use reqwest::blocking::Client;

use crate::data::{NameResolver, build_http_client};
use crate::domain::SkyPosition;
use crate::error::PipelineError;

pub const DEFAULT_SESAME_URL: &str = "https://cds.unistra.fr/cgi-bin/nph-sesame/-oI/SNV";

#[derive(Debug, Clone)]
pub struct SesameConfig {
    pub url: String,
    pub timeout: Duration,
}

pub struct SesameClient {
    client: Client,
    url: String,
}

impl SesameClient {
    pub fn new(config: SesameConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client(config.timeout)?,
            url: config.url,
        })
    }
}

impl NameResolver for SesameClient {
    fn resolve(&self, name: &str) -> Result<SkyPosition, PipelineError> {
        let fail = |reason: String| PipelineError::Resolution {
            query: name.to_string(),
            reason,
        };

        let mut url = Url::parse(&self.url).map_err(|e| fail(format!("invalid resolver URL: {e}")))?;
        url.set_query(Some(name.trim()));
        debug!("Sesame GET {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| fail(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(fail(format!("request failed with status {}", resp.status())));
        }
        let body = resp.text().map_err(|e| fail(format!("unreadable response: {e}")))?;

        let position = parse_sesame(&body).ok_or_else(|| fail("name not known to the resolver".to_string()))??;
        info!("Resolved '{name}' to {position}");
        Ok(position)
    }
}

/// Extract the first `%J ra dec` line from a Sesame response.
fn parse_sesame(body: &str) -> Option<Result<SkyPosition, PipelineError>> {
    let line = body.lines().find_map(|l| l.trim().strip_prefix("%J "))?;
    let mut fields = line.split_whitespace();
    let ra = fields.next()?.parse::<f64>().ok()?;
    let dec = fields.next()?.parse::<f64>().ok()?;
    Some(SkyPosition::new(ra, dec))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M87: &str = "\
# M87\t#Q25034591
#=S=Simbad (via url):    1
%@ 1020347
%I.0 M  87
%J 187.70593075 +12.39112331 = 12:30:49.42 +12:23:28.0
%J.E [34.00 34.00 0] A 2006AJ....131.1163S
%V z 0.00428 [0.00001] ~ 2000MNRAS.313..469S
";

    #[test]
    fn parses_j2000_line() {
        let pos = parse_sesame(M87).unwrap().unwrap();
        assert!((pos.ra_deg() - 187.70593075).abs() < 1e-9);
        assert!((pos.dec_deg() - 12.39112331).abs() < 1e-9);
    }

    #[test]
    fn unknown_name_has_no_position() {
        let body = "# NoSuchThing\n#! *** Nothing found *** \n";
        assert!(parse_sesame(body).is_none());
    }
}
