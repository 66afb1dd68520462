//! AWS Signature Version 4 for JSON-protocol POST requests

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Inputs for signing one request
pub(crate) struct SigningParams<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
    pub service: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Extra headers covered by the signature (lowercase names)
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
    pub timestamp: DateTime<Utc>,
}

/// Headers to attach to the outgoing request, including `authorization`
pub(crate) fn sign(params: &SigningParams<'_>) -> Vec<(String, String)> {
    let amz_date = params.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.timestamp.format("%Y%m%d").to_string();

    let mut signed: Vec<(String, String)> = params
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    signed.push(("host".to_string(), params.host.to_string()));
    signed.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = params.session_token {
        signed.push(("x-amz-security-token".to_string(), token.to_string()));
    }
    signed.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = signed
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = signed
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n{}\n\n{}\n{}\n{}",
        params.path,
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(params.body))
    );

    let scope = format!("{}/{}/{}/aws4_request", date, params.region, params.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(params.secret_access_key, &date, params.region, params.service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, params.access_key_id, scope, signed_headers, signature
    );

    let mut out: Vec<(String, String)> = signed
        .into_iter()
        .filter(|(k, _)| k != "host")
        .collect();
    out.push(("authorization".to_string(), authorization));
    out
}

pub(crate) fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
