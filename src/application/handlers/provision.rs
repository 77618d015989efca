//! The Provision command
//!
//! Two-step policy exchange. Step 1 issues a fresh policy key with the
//! default policy document; step 2 sees the client quote that key back and
//! marks the device provisioned. Until then every other command is
//! answered with HTTP 449.

use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::dispatcher::{AppContext, CommandResponse};
use crate::common::types::Principal;
use crate::common::{Error, Result};
use crate::data::state_store::Device;
use crate::service::wbxml::tokens::{provision as pv, PAGE_PROVISION};
use crate::service::wbxml::{Element, WbxmlWriter};

const POLICY_TYPE: &str = "MS-EAS-Provisioning-WBXML";

/// MS-ASPROV policy statuses
mod policy_status {
    pub const SUCCESS: u8 = 1;
    pub const NO_POLICY: u8 = 2;
    pub const WRONG_POLICY_KEY: u8 = 5;
}

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    document: &Element,
    policy_key_header: Option<&str>,
) -> Result<CommandResponse> {
    if !document.is(PAGE_PROVISION, pv::PROVISION) {
        return Err(Error::Protocol(
            "Provision body must start with <Provision>".to_string(),
        ));
    }

    let requested_type = document
        .find(PAGE_PROVISION, pv::POLICIES)
        .and_then(|policies| policies.find(PAGE_PROVISION, pv::POLICY))
        .and_then(|policy| policy.child_text(PAGE_PROVISION, pv::POLICY_TYPE));
    match requested_type.as_deref() {
        Some(POLICY_TYPE) => {}
        other => {
            warn!(policy_type = ?other, "unsupported policy type");
            return status_response(policy_status::NO_POLICY);
        }
    }

    // The quoted key arrives in the header, the body, or both
    let quoted_key = policy_key_header
        .map(str::to_string)
        .or_else(|| {
            document
                .find(PAGE_PROVISION, pv::POLICIES)
                .and_then(|policies| policies.find(PAGE_PROVISION, pv::POLICY))
                .and_then(|policy| policy.child_text(PAGE_PROVISION, pv::POLICY_KEY))
        })
        .filter(|key| key.as_str() != "0");

    match quoted_key {
        None => {
            // Step 1: issue a fresh key
            let policy_key = fresh_policy_key();
            ctx.state_store
                .set_policy_key(principal.id, &device.device_id, &policy_key)?;
            info!(device_id = %device.device_id, "policy key issued");
            let body = policy_response(&policy_key, true)?;
            Ok(CommandResponse {
                http_status: 200,
                policy_key: Some(policy_key),
                body,
            })
        }
        Some(key) if key == device.policy_key => {
            // Step 2: the client acknowledged the key
            ctx.state_store
                .mark_provisioned(principal.id, &device.device_id)?;
            info!(device_id = %device.device_id, "device provisioned");
            let body = policy_response(&key, false)?;
            Ok(CommandResponse {
                http_status: 200,
                policy_key: Some(key),
                body,
            })
        }
        Some(key) => {
            warn!(
                device_id = %device.device_id,
                quoted = %key,
                "policy key mismatch"
            );
            status_response(policy_status::WRONG_POLICY_KEY)
        }
    }
}

/// Policy keys are non-zero decimal u32 strings; "0" is the unprovisioned
/// sentinel and never a live key
fn fresh_policy_key() -> String {
    rand::thread_rng().gen_range(1..=u32::MAX).to_string()
}

fn policy_response(policy_key: &str, include_data: bool) -> Result<Vec<u8>> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_PROVISION, pv::PROVISION);
    writer.text_element(PAGE_PROVISION, pv::STATUS, "1")?;
    writer.start_tag(PAGE_PROVISION, pv::POLICIES);
    writer.start_tag(PAGE_PROVISION, pv::POLICY);
    writer.text_element(PAGE_PROVISION, pv::POLICY_TYPE, POLICY_TYPE)?;
    writer.text_element(PAGE_PROVISION, pv::STATUS, "1")?;
    writer.text_element(PAGE_PROVISION, pv::POLICY_KEY, policy_key)?;
    if include_data {
        writer.start_tag(PAGE_PROVISION, pv::DATA);
        write_default_policy(&mut writer)?;
        writer.end_tag()?;
    }
    writer.end_tag()?; // Policy
    writer.end_tag()?; // Policies
    writer.end_tag()?; // Provision
    writer.finish()
}

/// The default policy: nothing enforced, attachments allowed
fn write_default_policy(writer: &mut WbxmlWriter) -> Result<()> {
    writer.start_tag(PAGE_PROVISION, pv::EAS_PROVISION_DOC);
    writer.text_element(PAGE_PROVISION, pv::DEVICE_PASSWORD_ENABLED, "0")?;
    writer.text_element(PAGE_PROVISION, pv::ALPHANUMERIC_DEVICE_PASSWORD_REQUIRED, "0")?;
    writer.text_element(PAGE_PROVISION, pv::PASSWORD_RECOVERY_ENABLED, "0")?;
    writer.text_element(PAGE_PROVISION, pv::ATTACHMENTS_ENABLED, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_SIMPLE_DEVICE_PASSWORD, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_STORAGE_CARD, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_CAMERA, "1")?;
    writer.text_element(PAGE_PROVISION, pv::REQUIRE_DEVICE_ENCRYPTION, "0")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_WIFI, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_POP_IMAP_EMAIL, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_HTML_EMAIL, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_BROWSER, "1")?;
    writer.text_element(PAGE_PROVISION, pv::ALLOW_CONSUMER_EMAIL, "1")?;
    writer.end_tag()
}

fn status_response(status_value: u8) -> Result<CommandResponse> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_PROVISION, pv::PROVISION);
    writer.text_element(PAGE_PROVISION, pv::STATUS, &status_value.to_string())?;
    writer.end_tag()?;
    Ok(CommandResponse::wbxml(writer.finish()?))
}
