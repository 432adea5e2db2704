use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::auth::check_auth;
use crate::dialer::model::Contact;
use crate::error::DialerError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewContact {
    pub name: String,
    /// E.164, e.g. "+15550100001"
    pub phone: String,
    pub campaign_id: Option<String>,
}

/// POST /api/contacts: Load leads for the dialer.
///
/// Accepts a JSON array so a CRM export can be loaded in one request.
pub async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<Vec<NewContact>>,
) -> Result<(StatusCode, Json<Vec<Contact>>), DialerError> {
    check_auth(&headers, &state.config.api.token)?;

    if let Some(bad) = batch.iter().find(|c| !is_e164(&c.phone)) {
        return Err(DialerError::Validation(format!(
            "invalid E.164 phone number: {}",
            bad.phone
        )));
    }

    let mut created = Vec::with_capacity(batch.len());
    for new in batch {
        let contact = Contact::new(new.name, new.phone, new.campaign_id);
        state.dialer.store().insert_contact(&contact).await?;
        created.push(contact);
    }

    tracing::info!(count = created.len(), "Contacts created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Basic E.164 validation: a leading +, then 7 to 15 ASCII digits.
fn is_e164(s: &str) -> bool {
    match s.strip_prefix('+') {
        Some(digits) => {
            (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_numbers() {
        assert!(is_e164("+15550100001"));
        assert!(is_e164("+34612345678"));
        assert!(!is_e164("15550100001"));
        assert!(!is_e164("+1555"));
        assert!(!is_e164("+1555-010-0001"));
        assert!(!is_e164("+"));
        assert!(!is_e164("+１５５５０１０００１"));
        assert!(!is_e164("+12345678901234567"));
    }
}
