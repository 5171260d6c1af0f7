// src/notify/email.rs
//! Email collaborator for high-urgency alerts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::error::DependencyError;
use crate::incident::{Incident, Urgency};

const STAGE: &str = "email";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        recipients: &[String],
        html: &str,
        text: &str,
    ) -> Result<(), DependencyError>;

    fn name(&self) -> &'static str;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .with_context(|| format!("invalid SMTP host {}", cfg.host))?;
        if let Some(port) = cfg.port {
            builder = builder.port(port);
        }
        if !cfg.user.is_empty() {
            builder = builder.credentials(Credentials::new(cfg.user.clone(), cfg.pass.clone()));
        }
        let from = cfg
            .from
            .parse()
            .with_context(|| format!("invalid sender address {}", cfg.from))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        subject: &str,
        recipients: &[String],
        html: &str,
        text: &str,
    ) -> Result<(), DependencyError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        let mut any = false;
        for r in recipients {
            match r.parse::<Mailbox>() {
                Ok(mb) => {
                    builder = builder.to(mb);
                    any = true;
                }
                Err(e) => tracing::warn!(target: "notify", error = %e, "skipping invalid alert recipient"),
            }
        }
        if !any {
            return Err(DependencyError::failed(STAGE, "no valid recipients"));
        }

        let msg = builder
            .multipart(MultiPart::alternative_plain_html(text.to_string(), html.to_string()))
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        self.transport
            .send(msg)
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// No SMTP configured. Sends fail, which the fan-out logs and ignores.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _: &str, _: &[String], _: &str, _: &str) -> Result<(), DependencyError> {
        Err(DependencyError::failed(STAGE, "mailer disabled"))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn urgency_color(u: Urgency) -> &'static str {
    match u {
        Urgency::High => "#ef4444",
        Urgency::Medium => "#f97316",
        Urgency::Low => "#22c55e",
    }
}

/// Subject and bodies for one incident. Every incident-derived string is HTML-escaped.
pub fn render_alert(incident: &Incident) -> AlertEmail {
    let urgency = incident.urgency.as_str().to_uppercase();
    let title = incident.incident_type.title();
    let subject = format!("{urgency} Priority: {title}");

    let place = match (&incident.location_text, incident.location) {
        (Some(t), _) => t.clone(),
        (None, Some(p)) => format!("{:.5}, {:.5}", p.latitude, p.longitude),
        (None, None) => "Unknown".to_string(),
    };
    let reported = incident.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let confidence = format!("{:.0}%", incident.confidence * 100.0);

    let esc = |s: &str| html_escape::encode_text(s).into_owned();
    let row = |k: &str, v: &str| {
        format!(
            "<tr><td style=\"padding:8px 0;font-weight:bold;width:40%\">{k}</td><td style=\"padding:8px 0\">{}</td></tr>",
            esc(v)
        )
    };
    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"></head>\
<body style=\"font-family:Arial,sans-serif;max-width:600px;margin:0 auto;padding:20px\">\
<div style=\"background-color:{color};color:white;padding:20px;border-radius:8px 8px 0 0\">\
<h1 style=\"margin:0;font-size:24px\">Incident Alert</h1>\
<p style=\"margin:5px 0 0 0\">New {urgency} Priority Incident</p></div>\
<div style=\"background-color:#f9fafb;padding:20px;border:1px solid #e5e7eb\">\
<table style=\"width:100%;border-collapse:collapse\">{rows}</table>\
<p>{desc}</p><p style=\"color:#6b7280;font-size:12px\">Incident ID: {id}</p></div></body></html>",
        color = urgency_color(incident.urgency),
        rows = [
            row("Type:", &title),
            row("Urgency:", &urgency),
            row("Confidence:", &confidence),
            row("Location:", &place),
            row("People affected:", &incident.people_affected.to_string()),
            row("Reported:", &reported),
        ]
        .concat(),
        desc = esc(&incident.description),
        id = incident.id,
    );

    let text = format!(
        "INCIDENT ALERT\n\nType: {title}\nUrgency: {urgency}\nConfidence: {confidence}\n\
Location: {place}\nPeople affected: {people}\nReported: {reported}\n\n{desc}\n\nIncident ID: {id}\n",
        people = incident.people_affected,
        desc = incident.description,
        id = incident.id,
    );

    AlertEmail {
        subject,
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{GeoPoint, IncidentType, NewIncident, Source};
    use chrono::Utc;
    use uuid::Uuid;

    fn incident(desc: &str) -> Incident {
        NewIncident {
            incident_type: IncidentType::CollapsedBuilding,
            confidence: 0.93,
            urgency: Urgency::High,
            description: desc.into(),
            location: Some(GeoPoint::new(25.2048, 55.2708)),
            location_text: None,
            people_affected: 4,
            evidence_ref: None,
            source: Source::Image,
            source_detail: None,
            analysis_degraded: false,
        }
        .into_incident(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn subject_names_urgency_and_type() {
        let mail = render_alert(&incident("rubble"));
        assert_eq!(mail.subject, "HIGH Priority: Collapsed building");
        assert!(mail.text.contains("People affected: 4"));
        assert!(mail.text.contains("25.20480, 55.27080"));
    }

    #[test]
    fn description_is_escaped_in_html() {
        let mail = render_alert(&incident("<script>alert(1)</script>"));
        assert!(!mail.html.contains("<script>"));
        assert!(mail.html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn disabled_mailer_fails() {
        let err = DisabledMailer
            .send("s", &["ops@example.org".into()], "<p>x</p>", "x")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "email");
    }
}
