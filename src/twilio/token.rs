use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::TwilioConfig;

/// Issues Voice SDK access tokens so an agent's browser can receive bridged calls.
pub struct TokenIssuer {
    account_sid: String,
    api_key_sid: String,
    encoding_key: Option<EncodingKey>,
    twiml_app_sid: Option<String>,
    ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub grants: Grants,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Grants {
    pub identity: String,
    pub voice: VoiceGrant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceGrant {
    pub incoming: IncomingGrant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<OutgoingGrant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingGrant {
    pub allow: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutgoingGrant {
    pub application_sid: String,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub identity: String,
    pub token: String,
    pub expires_at: u64,
}

impl TokenIssuer {
    pub fn new(config: &TwilioConfig) -> Self {
        let encoding_key = (!config.api_key_sid.is_empty() && !config.api_key_secret.is_empty())
            .then(|| EncodingKey::from_secret(config.api_key_secret.as_bytes()));

        Self {
            account_sid: config.account_sid.clone(),
            api_key_sid: config.api_key_sid.clone(),
            encoding_key,
            twiml_app_sid: config.twiml_app_sid.clone(),
            ttl_secs: config.token_ttl_secs,
        }
    }

    pub fn issue(&self, identity: &str) -> Result<IssuedToken, TokenError> {
        let key = self.encoding_key.as_ref().ok_or(TokenError::NotConfigured)?;

        let now = Utc::now().timestamp().max(0) as u64;
        let exp = now + self.ttl_secs;
        let claims = AccessTokenClaims {
            jti: format!("{}-{now}", self.api_key_sid),
            iss: self.api_key_sid.clone(),
            sub: self.account_sid.clone(),
            iat: now,
            exp,
            grants: Grants {
                identity: identity.to_string(),
                voice: VoiceGrant {
                    incoming: IncomingGrant { allow: true },
                    outgoing: self.twiml_app_sid.clone().map(|application_sid| OutgoingGrant {
                        application_sid,
                    }),
                },
            },
        };

        let mut header = Header::new(Algorithm::HS256);
        header.cty = Some("twilio-fpa;v=1".to_string());

        let token = encode(&header, &claims, key)?;
        tracing::debug!(identity, exp, "Issued agent access token");

        Ok(IssuedToken {
            identity: identity.to_string(),
            token,
            expires_at: exp,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Twilio API key not configured")]
    NotConfigured,
    #[error("Failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

    fn config(secret: &str) -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: "auth".into(),
            phone_number: "+15550100000".into(),
            api_key_sid: "SK456".into(),
            api_key_secret: secret.into(),
            twiml_app_sid: None,
            validate_signatures: true,
            token_ttl_secs: 600,
        }
    }

    #[test]
    fn token_carries_voice_grant() {
        let issued = TokenIssuer::new(&config("shh")).issue("agent-1").unwrap();

        let header = decode_header(&issued.token).unwrap();
        assert_eq!(header.cty.as_deref(), Some("twilio-fpa;v=1"));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let data = decode::<AccessTokenClaims>(
            &issued.token,
            &DecodingKey::from_secret(b"shh"),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims.iss, "SK456");
        assert_eq!(data.claims.sub, "AC123");
        assert_eq!(data.claims.grants.identity, "agent-1");
        assert!(data.claims.grants.voice.incoming.allow);
        assert!(data.claims.grants.voice.outgoing.is_none());
        assert_eq!(data.claims.exp - data.claims.iat, 600);
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = TokenIssuer::new(&config("")).issue("agent-1").unwrap_err();
        assert!(matches!(err, TokenError::NotConfigured));
    }
}
