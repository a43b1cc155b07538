//! Foreground reddening from the IRSA Galactic Dust Reddening and Extinction service.
//!
//! The service answers with a small XML document; we only need the reference
//! pixel value of the requested map, so the parser is a tag scan rather than a
//! full XML reader.

use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;

use crate::data::{ReddeningLookup, build_http_client};
use crate::domain::{ExtinctionValue, ReddeningMap, SkyPosition};
use crate::error::PipelineError;

pub const DEFAULT_DUST_URL: &str = "https://irsa.ipac.caltech.edu/cgi-bin/DUST/nph-dust";

/// Averaging region size (deg) requested from the service.
const REGION_SIZE_DEG: &str = "2.0";

#[derive(Debug, Clone)]
pub struct DustConfig {
    pub url: String,
    pub timeout: Duration,
    pub map: ReddeningMap,
}

pub struct DustClient {
    client: Client,
    url: String,
    map: ReddeningMap,
}

impl DustClient {
    pub fn new(config: DustConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client(config.timeout)?,
            url: config.url,
            map: config.map,
        })
    }
}

impl ReddeningLookup for DustClient {
    fn lookup(&self, position: &SkyPosition) -> Result<ExtinctionValue, PipelineError> {
        let fail = |reason: String| PipelineError::ExtinctionLookup {
            position: *position,
            reason,
        };

        let locstr = format!("{:.6} {:+.6} equ j2000", position.ra_deg(), position.dec_deg());
        debug!("IRSA dust GET {} locstr={locstr}", self.url);

        let resp = self
            .client
            .get(&self.url)
            .query(&[("locstr", locstr.as_str()), ("regSize", REGION_SIZE_DEG)])
            .send()
            .map_err(|e| fail(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(fail(format!("request failed with status {}", resp.status())));
        }
        let body = resp.text().map_err(|e| fail(format!("unreadable response: {e}")))?;

        let ebv = parse_dust_response(&body, self.map).map_err(fail)?;
        info!("E(B-V) = {ebv:.4} ({:?}) at {position}", self.map);

        Ok(ExtinctionValue {
            position: *position,
            ebv,
            map: self.map,
        })
    }
}

fn map_tag(map: ReddeningMap) -> &'static str {
    match map {
        ReddeningMap::Sf2011 => "refPixelValueSandF",
        ReddeningMap::Sfd1998 => "refPixelValueSFD",
    }
}

fn parse_dust_response(body: &str, map: ReddeningMap) -> Result<f64, String> {
    if body.contains("status=\"error\"") {
        let message = extract_tag(body, "message").unwrap_or("unspecified service error");
        return Err(message.trim().to_string());
    }

    let tag = map_tag(map);
    let raw = extract_tag(body, tag).ok_or_else(|| format!("response has no <{tag}> value"))?;
    // e.g. "  0.0326 (mag)"
    let value = raw
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| format!("unparseable <{tag}> value '{}'", raw.trim()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid E(B-V) value {value}"));
    }
    Ok(value)
}

/// Text between the first `<tag>` and its closing tag.
fn extract_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    Some(&body[start..start + len])
}
