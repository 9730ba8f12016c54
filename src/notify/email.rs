// src/notify/email.rs
//! SMTP channel: one digest to the configured recipients, plus a
//! country-filtered digest per subscriber when entries are grouped.

use super::format::{email_html, email_subject, email_text};
use super::subscribers::Subscriber;
use super::{NotificationBatch, Notifier, NotifyOutcome};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

pub const ENV_SMTP_HOST: &str = "SMTP_HOST";
pub const ENV_SMTP_PORT: &str = "SMTP_PORT";
pub const ENV_SMTP_USER: &str = "SMTP_USER";
pub const ENV_SMTP_PASSWORD: &str = "SMTP_PASSWORD";
pub const ENV_EMAIL_FROM: &str = "EMAIL_FROM";
pub const ENV_EMAIL_TO: &str = "EMAIL_TO";
pub const DEFAULT_SMTP_PORT: u16 = 587;
/// Port that implies implicit TLS instead of STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl EmailSettings {
    /// `None` unless host, user, password, sender and at least one recipient
    /// are all set. A partial configuration is logged.
    pub fn from_env() -> Option<Self> {
        let get = |k: &str| std::env::var(k).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let host = get(ENV_SMTP_HOST);
        let user = get(ENV_SMTP_USER);
        let password = get(ENV_SMTP_PASSWORD);
        let from = get(ENV_EMAIL_FROM);
        let to: Vec<String> = get(ENV_EMAIL_TO)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        match (host, user, password, from) {
            (Some(host), Some(user), Some(password), Some(from)) if !to.is_empty() => {
                let port = get(ENV_SMTP_PORT)
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT);
                Some(Self {
                    host,
                    port,
                    user,
                    password,
                    from,
                    to,
                })
            }
            (None, None, None, None) if to.is_empty() => {
                debug!(target: "email", "email not configured");
                None
            }
            _ => {
                warn!(target: "email", "email partially configured, channel disabled");
                None
            }
        }
    }

    pub fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

/// One message to send: who gets it and what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEmail {
    pub recipients: Vec<String>,
    pub batch: NotificationBatch,
}

pub struct EmailNotifier {
    settings: EmailSettings,
    subscribers: Vec<Subscriber>,
    dry_run: bool,
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Self {
        Self {
            settings,
            subscribers: Vec::new(),
            dry_run: false,
        }
    }

    pub fn with_subscribers(mut self, subscribers: Vec<Subscriber>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    /// Main digest first, then one per active subscriber whose countries
    /// have new entries. Subscribers already on the main list are skipped.
    pub fn plan(&self, batch: &NotificationBatch) -> Vec<PlannedEmail> {
        if batch.is_empty() {
            return Vec::new();
        }
        let mut out = vec![PlannedEmail {
            recipients: self.settings.to.clone(),
            batch: batch.clone(),
        }];

        if let NotificationBatch::ByCountry(_) = batch {
            for sub in self.subscribers.iter().filter(|s| s.active) {
                if self.settings.to.iter().any(|t| t.eq_ignore_ascii_case(&sub.email)) {
                    continue;
                }
                let codes: Vec<&str> = sub.countries.iter().map(String::as_str).collect();
                let filtered = batch.for_countries(&codes);
                if filtered.is_empty() {
                    continue;
                }
                out.push(PlannedEmail {
                    recipients: vec![sub.email.clone()],
                    batch: filtered,
                });
            }
        }
        out
    }

    pub fn build_message(&self, planned: &PlannedEmail, now: DateTime<Utc>) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .from
            .parse()
            .with_context(|| format!("invalid {ENV_EMAIL_FROM}"))?;
        let mut builder = Message::builder()
            .from(from)
            .subject(email_subject(&planned.batch, now));
        for r in &planned.recipients {
            let to: Mailbox = r.parse().with_context(|| format!("invalid recipient {r}"))?;
            builder = builder.to(to);
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                email_text(&planned.batch, now),
                email_html(&planned.batch, now),
            ))
            .context("build email")
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let s = &self.settings;
        let relay = if s.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&s.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&s.host)
        };
        let builder = relay.with_context(|| format!("invalid {ENV_SMTP_HOST}"))?;
        Ok(builder
            .port(s.port)
            .credentials(Credentials::new(s.user.clone(), s.password.clone()))
            .build())
    }

    /// Advisory: does the server accept a connection with these settings?
    pub async fn check_connection(&self) -> bool {
        let transport = match self.transport() {
            Ok(t) => t,
            Err(e) => {
                warn!(target: "email", "smtp transport: {e:#}");
                return false;
            }
        };
        match transport.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(target: "email", "smtp connection check failed: {e}");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, batch: &NotificationBatch) -> Result<NotifyOutcome> {
        let planned = self.plan(batch);
        if planned.is_empty() {
            return Ok(NotifyOutcome::Skipped("no new entries".into()));
        }
        let now = Utc::now();
        let messages = planned
            .iter()
            .map(|p| self.build_message(p, now))
            .collect::<Result<Vec<_>>>()?;

        if self.dry_run {
            for p in &planned {
                info!(
                    target: "email",
                    recipients = ?p.recipients,
                    subject = %email_subject(&p.batch, now),
                    "[dry run] would send email"
                );
            }
            return Ok(NotifyOutcome::DryRun);
        }

        let transport = self.transport()?;
        let mut sent = 0usize;
        let mut failures = Vec::new();
        for (p, msg) in planned.iter().zip(messages) {
            match transport.send(msg).await {
                Ok(_) => {
                    sent += 1;
                    debug!(target: "email", recipients = ?p.recipients, "email sent");
                }
                Err(e) => {
                    warn!(target: "email", recipients = ?p.recipients, "send failed: {e}");
                    failures.push(format!("{}: {e}", p.recipients.join(",")));
                }
            }
        }

        if sent == 0 {
            return Err(anyhow!("no email delivered: {}", failures.join("; ")));
        }
        info!(target: "email", sent, failed = failures.len(), "email digests sent");
        Ok(NotifyOutcome::Sent {
            reference: Some(format!("{sent} message(s)")),
        })
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
