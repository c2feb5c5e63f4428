//! Canonical sign message
//!
//! Every `Sign` requirement is satisfied by a signature over the same
//! message: a JSON object wrapping the exact offer bytes and both nonces.
//!
//! ```text
//! {"offerContentSerialized":"<offer bytes>","offererNonce":"<n1>","signeeNonce":"<n2>"}
//! ```
//!
//! Field order is fixed by the struct declaration. Wrapping keeps the three
//! inputs unambiguous: moving characters between the nonces and the offer
//! always changes the message. A self-signature made by the offerer uses an
//! empty signee nonce.

use serde::Serialize;

use crate::CryptoResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignMessage<'a> {
    offer_content_serialized: &'a str,
    offerer_nonce: &'a str,
    signee_nonce: &'a str,
}

/// Build the bytes a requirement signature covers
pub fn sign_message(
    offer_content_serialized: &str,
    offerer_nonce: &str,
    signee_nonce: &str,
) -> CryptoResult<Vec<u8>> {
    let message = SignMessage {
        offer_content_serialized,
        offerer_nonce,
        signee_nonce,
    };
    Ok(serde_json::to_vec(&message)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_layout() {
        let bytes = sign_message("{\"a\":1}", "n1", "n2").unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"offerContentSerialized":"{\"a\":1}","offererNonce":"n1","signeeNonce":"n2"}"#
        );
    }

    #[test]
    fn test_nonce_boundaries_are_unambiguous() {
        let a = sign_message("offer", "ab", "c").unwrap();
        let b = sign_message("offer", "a", "bc").unwrap();
        assert_ne!(a, b);
    }
}
