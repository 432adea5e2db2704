use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Computes `X-Twilio-Signature` for a webhook request: base64 HMAC-SHA1,
/// keyed with the auth token, over the full URL followed by every form
/// parameter as `key` + `value`, sorted by key.
#[cfg(test)]
pub fn compute(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mac = signed(auth_token, url, params);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Checks a provided signature in constant time.
pub fn validate(auth_token: &str, url: &str, params: &[(String, String)], provided: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(provided) else {
        return false;
    };
    signed(auth_token, url, params)
        .verify_slice(&expected)
        .is_ok()
}

fn signed(auth_token: &str, url: &str, params: &[(String, String)]) -> HmacSha1 {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    mac
}
