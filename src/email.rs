//! Outbound email contract and the invite message template.
//!
//! Delivery is a side-effecting collaborator; every send reports an
//! outcome instead of erroring so callers can stay best-effort.

use async_trait::async_trait;

use crate::models::InviteRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub sent: bool,
    pub reason: Option<String>,
}

impl SendOutcome {
    pub fn sent() -> Self {
        Self {
            sent: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            sent: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> SendOutcome;
}

/// Sender used when no delivery backend is configured.
pub struct NullSender;

#[async_trait]
impl EmailSender for NullSender {
    async fn send(&self, _to: &str, _subject: &str, _html: &str) -> SendOutcome {
        SendOutcome::failed("email delivery is not configured")
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) struct EmailMessage {
    pub subject: String,
    pub html: String,
}

pub(crate) fn build_invite_email(
    organization_name: &str,
    inviter_name: Option<&str>,
    role: InviteRole,
    invite_url: &str,
) -> EmailMessage {
    let organization_name = escape_html(organization_name);
    let invited_by = inviter_name
        .map(escape_html)
        .map(|name| format!("{name} has invited you"))
        .unwrap_or_else(|| "You have been invited".to_string());
    let role = match role {
        InviteRole::Admin => "an admin",
        InviteRole::Member => "a member",
    };
    let invite_url = escape_html(invite_url);

    EmailMessage {
        subject: format!("You're invited to join {organization_name}"),
        html: format!(
            "<p>{invited_by} to join <strong>{organization_name}</strong> as {role}.</p>\
             <p><a href=\"{invite_url}\">Accept the invitation</a></p>\
             <p>This invitation expires in 7 days. If you weren't expecting it, you can ignore this email.</p>"
        ),
    }
}
