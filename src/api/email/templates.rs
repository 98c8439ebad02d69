//! HTML bodies for outbound email. Every interpolated value is escaped.

use super::EmailMessage;
use crate::store::AccessRequest;

const FOOTER: &str = "Gatehouse Admin System";

/// Why a password link is being sent. Only the wording differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordLinkKind {
    /// First password after an approved access request.
    Invite,
    /// User-initiated reset.
    Reset,
}

#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn layout(title: &str, accent: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
  </head>
  <body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; color: #1f2937; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f9fafb;">
    <div style="background: white; border-radius: 8px; overflow: hidden; border: 1px solid #e5e7eb;">
      <div style="background: {accent}; padding: 32px 24px; text-align: center;">
        <h1 style="color: white; margin: 0; font-size: 24px; font-weight: 600;">{title}</h1>
      </div>
      <div style="padding: 32px 24px;">
{body}
      </div>
      <div style="background: #f9fafb; padding: 16px 24px; border-top: 1px solid #e5e7eb;">
        <p style="font-size: 12px; color: #9ca3af; margin: 0; text-align: center;">{FOOTER}</p>
      </div>
    </div>
  </body>
</html>
"#
    )
}

/// Sent to the admin address when someone submits a request.
#[must_use]
pub fn access_request_notification(admin_email: &str, request: &AccessRequest) -> EmailMessage {
    let body = format!(
        r#"        <p style="font-size: 16px; margin: 0 0 16px 0;">A new user has requested access to the system.</p>
        <p style="margin: 8px 0;"><strong>Name:</strong> {name}</p>
        <p style="margin: 8px 0;"><strong>Username:</strong> {username}</p>
        <p style="margin: 8px 0;"><strong>Email:</strong> {email}</p>
        <p style="margin: 8px 0;"><strong>Reason:</strong></p>
        <p style="margin: 8px 0; padding: 12px; background: #f3f4f6; border-radius: 4px; font-style: italic;">{reason}</p>
        <p style="font-size: 14px; color: #6b7280; margin-top: 20px;">Please log in to the admin panel to review this request.</p>"#,
        name = escape_html(&request.name),
        username = escape_html(&request.username),
        email = escape_html(&request.email),
        reason = escape_html(&request.reason),
    );
    EmailMessage {
        to: vec![admin_email.to_string()],
        subject: "New Access Request Received".to_string(),
        html: layout("New Access Request", "#f59e0b", &body),
        template: "access_request_notification",
    }
}

/// Carries a single-use link to `<frontend>/reset-password?token=...`.
#[must_use]
pub fn password_link(
    to: &str,
    username: &str,
    url: &str,
    ttl_minutes: i64,
    kind: PasswordLinkKind,
) -> EmailMessage {
    let (subject, title, intro, button, template) = match kind {
        PasswordLinkKind::Invite => (
            "Access Approved - Set Your Password",
            "Access Approved",
            "Your access request has been approved. Use the button below to set your password and sign in.",
            "Set Your Password",
            "access_approved",
        ),
        PasswordLinkKind::Reset => (
            "Reset Your Password",
            "Password Reset",
            "We received a request to reset your password. If you did not ask for this, you can ignore this email.",
            "Reset Password",
            "password_reset",
        ),
    };
    let url = escape_html(url);
    let expiry = if ttl_minutes % 60 == 0 {
        match ttl_minutes / 60 {
            1 => "1 hour".to_string(),
            hours => format!("{hours} hours"),
        }
    } else {
        format!("{ttl_minutes} minutes")
    };
    let body = format!(
        r#"        <p style="font-size: 16px; margin: 0 0 16px 0;">Hello <strong>{username}</strong>,</p>
        <p style="font-size: 16px; margin: 0 0 24px 0; color: #4b5563;">{intro}</p>
        <div style="text-align: center; margin: 32px 0;">
          <a href="{url}" style="display: inline-block; background: #10b981; color: white; padding: 14px 32px; text-decoration: none; border-radius: 6px; font-weight: 600;">{button}</a>
        </div>
        <p style="margin: 0; font-size: 14px; color: #92400e;"><strong>Important:</strong> This link expires in {expiry}.</p>
        <p style="font-size: 14px; margin: 24px 0 8px 0; color: #6b7280;">If the button doesn't work, copy this link:</p>
        <p style="font-size: 13px; word-break: break-all; background: #f3f4f6; padding: 12px; border-radius: 4px; margin: 0;">{url}</p>"#,
        username = escape_html(username),
    );
    EmailMessage {
        to: vec![to.to_string()],
        subject: subject.to_string(),
        html: layout(title, "#10b981", &body),
        template,
    }
}

/// Sent to the requester when an admin rejects the request.
#[must_use]
pub fn rejection(to: &str, name: &str, notes: Option<&str>) -> EmailMessage {
    let notes = notes
        .filter(|notes| !notes.trim().is_empty())
        .map(|notes| {
            format!(
                r#"
        <div style="background: #f3f4f6; padding: 16px; border-radius: 6px; margin: 24px 0;">
          <p style="margin: 0 0 8px 0; font-size: 14px; font-weight: 600;">Reviewer notes</p>
          <p style="margin: 0; font-size: 14px; color: #4b5563;">{}</p>
        </div>"#,
                escape_html(notes)
            )
        })
        .unwrap_or_default();
    let body = format!(
        r#"        <p style="font-size: 16px; margin: 0 0 16px 0;">Hello <strong>{name}</strong>,</p>
        <p style="font-size: 16px; margin: 0 0 24px 0; color: #4b5563;">Thank you for your interest. After review, your access request was not approved at this time.</p>{notes}
        <p style="font-size: 14px; color: #6b7280;">If you believe this was a mistake, please contact the administrator.</p>"#,
        name = escape_html(name),
    );
    EmailMessage {
        to: vec![to.to_string()],
        subject: "Access Request Update".to_string(),
        html: layout("Access Request Update", "#6b7280", &body),
        template: "access_rejected",
    }
}
