use axum::response::{IntoResponse, Response};

/// A rendered TwiML document returned to a Twilio voice webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twiml(String);

impl Twiml {
    fn document(verbs: &str) -> Self {
        Self(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
{verbs}</Response>"#
        ))
    }

    /// Ring an agent's browser client and bridge the caller to it.
    pub fn dial_client(identity: &str) -> Self {
        Self::document(&format!(
            "    <Dial>\n        <Client>{}</Client>\n    </Dial>\n",
            escape(identity)
        ))
    }

    /// Hold the caller in the named provider queue until an agent pulls it out.
    pub fn enqueue(hold_message: &str, queue_name: &str) -> Self {
        Self::document(&format!(
            "    <Say>{}</Say>\n    <Enqueue>{}</Enqueue>\n",
            escape(hold_message),
            escape(queue_name)
        ))
    }

    /// Leave a message after the beep, then hang up.
    pub fn voicemail(script: &str) -> Self {
        Self::document(&format!(
            "    <Say>{}</Say>\n    <Hangup/>\n",
            escape(script)
        ))
    }

    pub fn hangup() -> Self {
        Self::document("    <Hangup/>\n")
    }

    /// Acknowledges a callback that expects no instructions.
    pub fn empty() -> Self {
        Self::document("")
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([("Content-Type", "text/xml")], self.0).into_response()
    }
}

/// Interpolated values only land in element text, where XML reserves just
/// these five characters.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_client_names_identity() {
        let twiml = Twiml::dial_client("agent-7");
        assert!(twiml.as_str().starts_with("<?xml"));
        assert!(twiml.as_str().contains("<Client>agent-7</Client>"));
    }

    #[test]
    fn enqueue_says_then_queues() {
        let twiml = Twiml::enqueue("Please hold", "dialer");
        let s = twiml.as_str();
        let say = s.find("<Say>Please hold</Say>").unwrap();
        let enqueue = s.find("<Enqueue>dialer</Enqueue>").unwrap();
        assert!(say < enqueue);
    }

    #[test]
    fn script_is_escaped() {
        let twiml = Twiml::voicemail("Hi <Sam> & \"family\"");
        assert!(twiml
            .as_str()
            .contains("<Say>Hi &lt;Sam&gt; &amp; &quot;family&quot;</Say>"));
        assert!(twiml.as_str().contains("<Hangup/>"));
    }

    #[test]
    fn empty_document_is_well_formed() {
        assert!(Twiml::empty().as_str().ends_with("<Response>\n</Response>"));
    }
}
