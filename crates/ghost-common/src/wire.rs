//! JSON shapes exchanged with the n8n automation webhooks.
//!
//! Field names follow the automation workflows (camelCase). Response types
//! are lenient: every field the workflows may omit is optional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::DeploymentStatus;

/// `POST /webhook/deploy-website`: ask the AI builder for a build URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildUrlRequest {
    pub business_name: String,
    pub address: String,
    pub phone: String,
    pub package: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildUrlResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub lovable_build_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_deserializing)]
    pub is_demo: bool,
}

/// `POST /webhook/github-to-render`: provision hosting from a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDeployRequest {
    pub business_name: String,
    pub github_repo: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDeployResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub render_url: Option<String>,
    #[serde(default)]
    pub render_service_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_deserializing)]
    pub is_demo: bool,
}

/// `POST /webhook/build-site`: fire-and-forget site build trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSiteRequest {
    pub place_id: String,
    pub business_name: String,
    pub phone: String,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

/// Answer to a fire-and-forget trigger (build-site, SMS, email). The workflows
/// reply with whatever their last node produced, so nothing is read back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    /// Where the site is expected to appear; set for build-site triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,
    #[serde(default, skip_deserializing)]
    pub is_demo: bool,
}

/// `POST /webhook/deploy-and-invoice`: one-shot deploy plus invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAndInvoiceRequest {
    pub place_id: String,
    pub business_name: String,
    pub phone: String,
    pub address: String,
    pub email: String,
    pub package: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAndInvoiceResponse {
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default, skip_deserializing)]
    pub is_demo: bool,
}

/// Outreach message kinds understood by the messaging workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutreachKind {
    Sms,
    Email,
}

/// `POST /webhook/send-sms` and `POST /webhook/send-email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachRequest {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub business_name: String,
    #[serde(rename = "type")]
    pub kind: OutreachKind,
    pub timestamp: DateTime<Utc>,
}

/// Inbound deployment-status callback, as sent by the deployment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusWebhook {
    pub business_id: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub render_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_request_uses_camel_case() {
        let req = BuildUrlRequest {
            business_name: "Acme Plumbing".into(),
            address: "1 Main St".into(),
            phone: "555-0100".into(),
            package: "Business".into(),
            amount: 300.0,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["businessName"], "Acme Plumbing");
        assert_eq!(value["amount"], 300.0);
        assert!(value.get("business_name").is_none());
    }

    #[test]
    fn test_build_url_response_ignores_demo_flag_from_wire() {
        let resp: BuildUrlResponse = serde_json::from_str(
            r#"{"success": true, "lovableBuildUrl": "https://lovable.dev/x", "isDemo": true}"#,
        )
        .unwrap();
        assert!(resp.success);
        assert_eq!(resp.lovable_build_url.as_deref(), Some("https://lovable.dev/x"));
        assert!(!resp.is_demo);
    }

    #[test]
    fn test_outreach_request_type_field() {
        let req = OutreachRequest {
            to: "+15550100".into(),
            subject: None,
            message: "Hi".into(),
            business_name: "Acme".into(),
            kind: OutreachKind::Sms,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "sms");
        assert!(value.get("subject").is_none());
    }

    #[test]
    fn test_deployment_webhook_parses_optional_fields() {
        let hook: DeploymentStatusWebhook = serde_json::from_str(
            r#"{"businessId": "rec123", "status": "deploying", "timestamp": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(hook.business_id, "rec123");
        assert_eq!(hook.status, DeploymentStatus::Deploying);
        assert!(hook.render_url.is_none());
    }
}
