use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;

use crate::connectivity::ConnectivityMonitor;
use crate::errors::AppError;
use crate::gateway_client::CrmGatewayClient;
use crate::models::{
    ActionResult, ActionType, Contact, ContactSnapshot, InteractionOutcome, InteractionRecord,
    QuickAction,
};
use crate::offline_queue::{ActionReplayer, OfflineQueueService};
use crate::storage::{BlobStore, INTERACTION_LOG_KEY};
use crate::suggestions::{days_until_birthday, time_based_greeting};

/// Duration of generated calendar events.
const EVENT_DURATION_HOURS: i64 = 1;

/// What a successfully performed action hands back to the client.
struct Performed {
    message: String,
    deep_link: Option<String>,
    ics: Option<String>,
}

/// Executes contact actions: builds the deep link (or calendar payload) for
/// the requested channel, appends the outcome to the local interaction log
/// and best-effort records it in the CRM.
///
/// Execution failures are data, not errors: callers always get an
/// [`ActionResult`]; `Err` is reserved for storage faults while queueing.
pub struct ActionExecutionService<R: ActionReplayer> {
    store: Arc<dyn BlobStore>,
    gateway: CrmGatewayClient,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineQueueService<R>>,
    country_code: String,
}

impl<R: ActionReplayer> ActionExecutionService<R> {
    pub fn new(
        store: Arc<dyn BlobStore>,
        gateway: CrmGatewayClient,
        connectivity: Arc<ConnectivityMonitor>,
        queue: Arc<OfflineQueueService<R>>,
        country_code: String,
    ) -> Self {
        Self {
            store,
            gateway,
            connectivity,
            queue,
            country_code,
        }
    }

    pub async fn execute(
        &self,
        action: &QuickAction,
        contact: &Contact,
    ) -> Result<ActionResult, AppError> {
        match self.perform(action, contact) {
            Ok(performed) => {
                self.record(contact, action.action_type, InteractionOutcome::Successful)
                    .await;
                Ok(ActionResult {
                    success: true,
                    action_id: action.id.clone(),
                    timestamp: Utc::now(),
                    message: performed.message,
                    error: None,
                    requires_retry: false,
                    deep_link: performed.deep_link,
                    ics: performed.ics,
                })
            }
            // A failure while offline is queued for replay instead of being
            // surfaced to the caller.
            Err(_) if !self.connectivity.is_online() => {
                self.queue
                    .enqueue(action.clone(), ContactSnapshot::from(contact))?;
                Ok(ActionResult {
                    success: false,
                    action_id: action.id.clone(),
                    timestamp: Utc::now(),
                    message: "Aktion wird ausgeführt, sobald Sie online sind".to_string(),
                    error: None,
                    requires_retry: true,
                    deep_link: None,
                    ics: None,
                })
            }
            Err(reason) => {
                self.record(contact, action.action_type, InteractionOutcome::Failed)
                    .await;
                Ok(ActionResult {
                    success: false,
                    action_id: action.id.clone(),
                    timestamp: Utc::now(),
                    message: format!("Fehler: {}", reason),
                    error: Some(reason),
                    requires_retry: false,
                    deep_link: None,
                    ics: None,
                })
            }
        }
    }

    // Exhaustive over ActionType; adding a variant fails compilation here.
    fn perform(&self, action: &QuickAction, contact: &Contact) -> Result<Performed, String> {
        let done = |deep_link: Option<String>, ics: Option<String>| Performed {
            message: format!("{} erfolgreich ausgeführt", action.label),
            deep_link,
            ics,
        };

        match action.action_type {
            ActionType::Call => {
                let phone = contact
                    .any_phone()
                    .ok_or_else(|| "Keine Telefonnummer verfügbar".to_string())?;
                Ok(done(Some(tel_link(phone)), None))
            }
            ActionType::Sms => {
                let mobile = contact
                    .mobile
                    .as_deref()
                    .ok_or_else(|| "Keine Mobilnummer verfügbar".to_string())?;
                let body = format!(
                    "{} {}, ich wollte mich kurz bei Ihnen melden.",
                    time_based_greeting(),
                    contact.full_name()
                );
                Ok(done(Some(sms_link(mobile, &body)), None))
            }
            ActionType::Whatsapp => {
                let mobile = contact
                    .mobile
                    .as_deref()
                    .ok_or_else(|| "Keine Mobilnummer verfügbar".to_string())?;
                let text = format!(
                    "{} {}, ich wollte mich kurz bei Ihnen melden.",
                    time_based_greeting(),
                    contact.full_name()
                );
                Ok(done(
                    Some(whatsapp_link(mobile, &text, &self.country_code)),
                    None,
                ))
            }
            ActionType::Email => {
                let email = contact
                    .email
                    .as_deref()
                    .ok_or_else(|| "Keine E-Mail-Adresse verfügbar".to_string())?;
                let birthday_soon = matches!(
                    days_until_birthday(contact.birthday, Utc::now().date_naive()),
                    Some(days) if days <= 14
                );
                let subject = if birthday_soon {
                    "Alles Gute zum Geburtstag!".to_string()
                } else {
                    format!("Kontaktaufnahme: {}", contact.full_name())
                };
                let body = format!(
                    "{} {},\n\n",
                    time_based_greeting(),
                    contact.full_name()
                );
                Ok(done(Some(mailto_link(email, &subject, &body)), None))
            }
            ActionType::Calendar | ActionType::Meeting => {
                let start = Utc::now() + ChronoDuration::hours(1);
                let end = start + ChronoDuration::hours(EVENT_DURATION_HOURS);
                let title = format!("Termin mit {}", contact.full_name());
                let details = "Erstellt aus der Kontaktübersicht";
                Ok(done(
                    Some(google_calendar_link(&title, details, start, end)),
                    Some(build_ics(&title, details, start, end)),
                ))
            }
            ActionType::Note => Ok(done(None, None)),
        }
    }

    /// Outcome logging never fails an execution; faults are logged and
    /// swallowed.
    async fn record(&self, contact: &Contact, action_type: ActionType, outcome: InteractionOutcome) {
        let record = InteractionRecord {
            contact_id: contact.id,
            action_type,
            outcome,
            timestamp: Utc::now(),
        };

        if let Err(e) = append_interaction(self.store.as_ref(), &record) {
            tracing::warn!("Failed to append interaction log: {}", e);
        }
        if let Err(e) = self.gateway.record_interaction(&record).await {
            tracing::warn!("Failed to record interaction in CRM: {}", e);
        }
    }

    /// Locally logged interactions, oldest first.
    pub fn interaction_log(&self) -> Result<Vec<InteractionRecord>, AppError> {
        load_interactions(self.store.as_ref())
    }
}

fn load_interactions(store: &dyn BlobStore) -> Result<Vec<InteractionRecord>, AppError> {
    let Some(blob) = store.get(INTERACTION_LOG_KEY)? else {
        return Ok(Vec::new());
    };
    match crate::cache_validator::ValidatedCacheEntry::deserialize_and_validate(&blob) {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => {
            tracing::warn!("Interaction log blob failed validation, starting empty");
            Ok(Vec::new())
        }
    }
}

fn append_interaction(store: &dyn BlobStore, record: &InteractionRecord) -> Result<(), AppError> {
    let mut log = load_interactions(store)?;
    log.push(record.clone());
    let entry = crate::cache_validator::ValidatedCacheEntry::new(serde_json::to_string(&log)?);
    store.put(INTERACTION_LOG_KEY, &entry.serialize())
}

// ============ Deep links ============

/// Digits only, with a single leading `0` swapped for the country code.
/// `"0171 123 45"` with country code `49` becomes `"491712345"`.
pub fn normalize_international(raw: &str, country_code: &str) -> String {
    let digits = Regex::new(r"\D").unwrap().replace_all(raw, "").to_string();
    match digits.strip_prefix('0') {
        Some(rest) => format!("{}{}", country_code, rest),
        None => digits,
    }
}

pub fn tel_link(phone: &str) -> String {
    format!("tel:{}", phone.replace(char::is_whitespace, ""))
}

pub fn sms_link(mobile: &str, body: &str) -> String {
    format!(
        "sms:{}?body={}",
        mobile.replace(char::is_whitespace, ""),
        encode_component(body)
    )
}

pub fn mailto_link(email: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        email,
        encode_component(subject),
        encode_component(body)
    )
}

pub fn whatsapp_link(mobile: &str, text: &str, country_code: &str) -> String {
    format!(
        "https://wa.me/{}?text={}",
        normalize_international(mobile, country_code),
        encode_component(text)
    )
}

pub fn google_calendar_link(
    title: &str,
    details: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        "https://calendar.google.com/calendar/render?action=TEMPLATE&text={}&dates={}/{}&details={}",
        encode_component(title),
        ics_timestamp(start),
        ics_timestamp(end),
        encode_component(details)
    )
}

/// Minimal VCALENDAR payload for clients that import into a local calendar.
pub fn build_ics(title: &str, description: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    [
        "BEGIN:VCALENDAR",
        "VERSION:2.0",
        "PRODID:-//pipeline-api//DE",
        "BEGIN:VEVENT",
        &format!("UID:{}", uuid::Uuid::new_v4()),
        &format!("DTSTAMP:{}", ics_timestamp(Utc::now())),
        &format!("DTSTART:{}", ics_timestamp(start)),
        &format!("DTEND:{}", ics_timestamp(end)),
        &format!("SUMMARY:{}", escape_ics_text(title)),
        &format!("DESCRIPTION:{}", escape_ics_text(description)),
        "END:VEVENT",
        "END:VCALENDAR",
    ]
    .join("\r\n")
}

// RFC 5545 TEXT escaping: backslash, comma, semicolon and newlines.
fn escape_ics_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

fn ics_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

// `encodeURIComponent` analog; form-urlencoding uses `+` for spaces, which
// mailto/sms handlers do not unescape.
fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
