//! HTTP fallback delivery: best-effort state push when no live monitoring
//! session exists.

use statewire_core::SessionId;

/// Builds the fallback request body: `{type:"STATE", id, name, payload}`.
pub fn state_body(id: Option<&SessionId>, name: &str, payload: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "STATE",
        "id": id.map(SessionId::as_str),
        "name": name,
        "payload": payload,
    })
}

/// Posts the current filtered history to the fallback endpoint.
///
/// # Errors
///
/// Returns the transport or HTTP-status error; callers log and drop it –
/// fallback delivery is best-effort by contract.
pub async fn post_state(
    client: &reqwest::Client,
    url: &str,
    id: Option<&SessionId>,
    name: &str,
    payload: &str,
) -> Result<(), reqwest::Error> {
    client
        .post(url)
        .json(&state_body(id, name, payload))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
